use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::Stage;
use crate::flows::states::{ActionKind, TransitionOutcome};

pub trait FlowDefinition {
    fn name(&self) -> &'static str;
    fn initial_stage(&self) -> Stage;
    fn transition(
        &self,
        current: Stage,
        action: ActionKind,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Restocking procurement: submitted → approved → drafted → finalized, or
/// submitted → rejected.
#[derive(Clone, Debug, Default)]
pub struct RestockFlow;

impl FlowDefinition for RestockFlow {
    fn name(&self) -> &'static str {
        "material_restock"
    }

    fn initial_stage(&self) -> Stage {
        Stage::Submitted
    }

    fn transition(
        &self,
        current: Stage,
        action: ActionKind,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_restock(current, action)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn name(&self) -> &'static str {
        self.flow.name()
    }

    pub fn initial_stage(&self) -> Stage {
        self.flow.initial_stage()
    }

    pub fn apply(
        &self,
        current: Stage,
        action: ActionKind,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, action)
    }

    /// Actions that are legal from `current`, in declaration order.
    pub fn available_actions(&self, current: Stage) -> Vec<ActionKind> {
        ActionKind::ALL.into_iter().filter(|action| self.apply(current, *action).is_ok()).collect()
    }

    pub fn apply_with_audit<S>(
        &self,
        current: Stage,
        action: ActionKind,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, action);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", self.name())
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("action", outcome.action.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", self.name())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<RestockFlow> {
    fn default() -> Self {
        Self::new(RestockFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot {action} a request in stage {stage}")]
    NotAllowed { stage: Stage, action: ActionKind },
}

fn transition_restock(
    current: Stage,
    action: ActionKind,
) -> Result<TransitionOutcome, FlowTransitionError> {
    let to = match (current, action) {
        (Stage::Submitted, ActionKind::Approve) => Stage::Approved,
        (Stage::Submitted, ActionKind::Reject) => Stage::Rejected,
        (Stage::Approved, ActionKind::Draft) => Stage::Drafted,
        (Stage::Drafted, ActionKind::Finalize) => Stage::Finalized,
        _ => return Err(FlowTransitionError::NotAllowed { stage: current, action }),
    };

    Ok(TransitionOutcome { from: current, to, action })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::request::{RequestId, Stage};
    use crate::flows::engine::{FlowDefinition, FlowEngine, FlowTransitionError, RestockFlow};
    use crate::flows::states::ActionKind;

    #[test]
    fn restock_flow_happy_path_reaches_finalized() {
        let engine = FlowEngine::new(RestockFlow);
        let mut stage = engine.initial_stage();

        for action in [ActionKind::Approve, ActionKind::Draft, ActionKind::Finalize] {
            let outcome = engine.apply(stage, action).expect("legal step");
            assert_eq!(outcome.to, action.target());
            assert!(outcome.to.rank() > outcome.from.rank());
            stage = outcome.to;
        }

        assert_eq!(stage, Stage::Finalized);
        assert!(engine.available_actions(stage).is_empty());
    }

    #[test]
    fn rejection_is_terminal() {
        let engine = FlowEngine::default();
        let rejected = engine.apply(Stage::Submitted, ActionKind::Reject).expect("reject");
        assert_eq!(rejected.to, Stage::Rejected);

        for action in ActionKind::ALL {
            assert!(engine.apply(Stage::Rejected, action).is_err());
        }
    }

    #[test]
    fn every_illegal_pair_is_rejected() {
        let engine = FlowEngine::default();
        let legal = [
            (Stage::Submitted, ActionKind::Approve),
            (Stage::Submitted, ActionKind::Reject),
            (Stage::Approved, ActionKind::Draft),
            (Stage::Drafted, ActionKind::Finalize),
        ];

        for stage in Stage::ALL {
            for action in ActionKind::ALL {
                let result = engine.apply(stage, action);
                if legal.contains(&(stage, action)) {
                    assert!(result.is_ok(), "{stage} + {action} should be legal");
                } else {
                    assert_eq!(result, Err(FlowTransitionError::NotAllowed { stage, action }));
                }
            }
        }
    }

    #[test]
    fn available_actions_follow_the_table() {
        let engine = FlowEngine::default();
        assert_eq!(
            engine.available_actions(Stage::Submitted),
            vec![ActionKind::Approve, ActionKind::Reject]
        );
        assert_eq!(engine.available_actions(Stage::Approved), vec![ActionKind::Draft]);
        assert_eq!(RestockFlow.name(), "material_restock");
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(Some(RequestId("r-1".to_owned())), "corr-42", "analyst-1");

        engine
            .apply_with_audit(Stage::Submitted, ActionKind::Approve, &sink, &context)
            .expect("transition should succeed");
        let _ = engine.apply_with_audit(Stage::Finalized, ActionKind::Approve, &sink, &context);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("approved"));
        assert_eq!(events[1].event_type, "flow.transition_rejected");
        assert_eq!(events[1].correlation_id, "corr-42");
    }
}
