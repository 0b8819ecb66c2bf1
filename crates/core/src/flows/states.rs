use serde::{Deserialize, Serialize};

use crate::domain::request::{DraftInput, Stage};

/// A caller-requested transition. Only `Draft` carries a payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum WorkflowAction {
    Approve,
    Reject,
    Draft(DraftInput),
    Finalize,
}

impl WorkflowAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Approve => ActionKind::Approve,
            Self::Reject => ActionKind::Reject,
            Self::Draft(_) => ActionKind::Draft,
            Self::Finalize => ActionKind::Finalize,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Approve,
    Reject,
    Draft,
    Finalize,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] =
        [ActionKind::Approve, ActionKind::Reject, ActionKind::Draft, ActionKind::Finalize];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Draft => "draft",
            Self::Finalize => "finalize",
        }
    }

    /// The stage this action leads to when it is legal.
    pub fn target(&self) -> Stage {
        match self {
            Self::Approve => Stage::Approved,
            Self::Reject => Stage::Rejected,
            Self::Draft => Stage::Drafted,
            Self::Finalize => Stage::Finalized,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: Stage,
    pub to: Stage,
    pub action: ActionKind,
}
