use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, ActorId};
use crate::errors::DomainError;

pub const DEFAULT_UNIT: &str = "pcs";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Yearly reference such as `MRR-2026-0007`.
pub fn request_reference(at: DateTime<Utc>, sequence: u32) -> String {
    format!("MRR-{}-{sequence:04}", at.year())
}

pub fn purchase_order_number(at: DateTime<Utc>, sequence: u32) -> String {
    format!("PO-{}-{sequence:04}", at.year())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Submitted,
    Approved,
    Rejected,
    Drafted,
    Finalized,
}

impl Stage {
    pub const ALL: [Stage; 5] =
        [Stage::Submitted, Stage::Approved, Stage::Rejected, Stage::Drafted, Stage::Finalized];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Drafted => "drafted",
            Self::Finalized => "finalized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" | "pending" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "drafted" | "draft" => Some(Self::Drafted),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Finalized)
    }

    /// Position along the happy path; used to assert forward-only movement.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Approved | Self::Rejected => 1,
            Self::Drafted => 2,
            Self::Finalized => 3,
        }
    }

    pub fn has_draft(&self) -> bool {
        matches!(self, Self::Drafted | Self::Finalized)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

impl RequestItem {
    pub fn new(name: impl Into<String>, quantity: u32, unit: impl Into<String>) -> Self {
        Self { name: name.into(), quantity, unit: unit.into() }
    }
}

/// Item as submitted by a client; quantity is signed so a negative value is a
/// validation failure rather than a decode failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItemInput {
    pub name: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit: Option<String>,
}

pub fn validate_items(items: Vec<RequestItemInput>) -> Result<Vec<RequestItem>, DomainError> {
    if items.is_empty() {
        return Err(DomainError::Validation("a request needs at least one item".to_string()));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let name = item.name.trim();
            if name.is_empty() {
                return Err(DomainError::Validation(format!("item {} has no name", index + 1)));
            }
            if item.quantity <= 0 {
                return Err(DomainError::Validation(format!(
                    "item `{name}` must have a positive quantity (got {})",
                    item.quantity
                )));
            }
            let quantity = u32::try_from(item.quantity).map_err(|_| {
                DomainError::Validation(format!("item `{name}` quantity is too large"))
            })?;
            let unit = item
                .unit
                .map(|unit| unit.trim().to_string())
                .filter(|unit| !unit.is_empty())
                .unwrap_or_else(default_unit);
            Ok(RequestItem { name: name.to_string(), quantity, unit })
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub actor_id: ActorId,
    pub actor_name: String,
    pub outcome: DecisionOutcome,
    pub decided_at: DateTime<Utc>,
}

/// Engineering sign-off on the requisition voucher. Leaves the stage alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub actor_id: ActorId,
    pub actor_name: String,
    pub signed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DraftLineInput {
    pub description: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// Purchase-order payload as sent by the drafting actor. Any totals the client
/// computed are not part of this type and are dropped during decoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DraftInput {
    pub supplier: String,
    #[serde(default)]
    pub shipping_instructions: String,
    pub address: String,
    pub lines: Vec<DraftLineInput>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    pub description: String,
    pub unit: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub po_number: String,
    pub supplier: String,
    pub shipping_instructions: String,
    pub address: String,
    pub lines: Vec<DraftLine>,
    pub grand_total: Decimal,
    pub drafted_by: ActorId,
    pub drafted_by_name: String,
    pub drafted_at: DateTime<Utc>,
}

impl Draft {
    /// Validates the payload and computes every total from quantity and unit price.
    pub fn compute(
        input: DraftInput,
        po_number: impl Into<String>,
        drafter: &Actor,
        drafted_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let supplier = input.supplier.trim();
        if supplier.is_empty() {
            return Err(DomainError::Validation("draft supplier is required".to_string()));
        }
        let address = input.address.trim();
        if address.is_empty() {
            return Err(DomainError::Validation("draft delivery address is required".to_string()));
        }
        if input.lines.is_empty() {
            return Err(DomainError::Validation("a draft needs at least one line".to_string()));
        }

        let lines = input
            .lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| {
                let description = line.description.trim();
                if description.is_empty() {
                    return Err(DomainError::Validation(format!(
                        "draft line {} has no description",
                        index + 1
                    )));
                }
                if line.quantity <= 0 {
                    return Err(DomainError::Validation(format!(
                        "draft line `{description}` must have a positive quantity"
                    )));
                }
                if line.unit_price.is_sign_negative() {
                    return Err(DomainError::Validation(format!(
                        "draft line `{description}` has a negative unit price"
                    )));
                }
                let quantity = u32::try_from(line.quantity).map_err(|_| {
                    DomainError::Validation(format!("draft line `{description}` quantity is too large"))
                })?;
                let unit_price = line.unit_price.round_dp(2);
                let total = line_total(quantity, unit_price).ok_or_else(|| {
                    DomainError::Validation(format!("draft line `{description}` total overflows"))
                })?;
                Ok(DraftLine {
                    description: description.to_string(),
                    unit: line
                        .unit
                        .map(|unit| unit.trim().to_string())
                        .filter(|unit| !unit.is_empty())
                        .unwrap_or_else(default_unit),
                    quantity,
                    unit_price,
                    line_total: total,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let grand_total = grand_total(&lines).ok_or_else(|| {
            DomainError::Validation("draft grand total overflows".to_string())
        })?;
        Ok(Self {
            po_number: po_number.into(),
            supplier: supplier.to_string(),
            shipping_instructions: input.shipping_instructions.trim().to_string(),
            address: address.to_string(),
            lines,
            grand_total,
            drafted_by: drafter.id.clone(),
            drafted_by_name: drafter.name.clone(),
            drafted_at,
        })
    }

    pub fn totals_consistent(&self) -> bool {
        self.lines
            .iter()
            .all(|line| Some(line.line_total) == line_total(line.quantity, line.unit_price))
            && Some(self.grand_total) == grand_total(&self.lines)
    }
}

/// `None` when the product does not fit a `Decimal`.
pub fn line_total(quantity: u32, unit_price: Decimal) -> Option<Decimal> {
    Decimal::from(quantity).checked_mul(unit_price).map(|total| total.round_dp(2))
}

pub fn grand_total(lines: &[DraftLine]) -> Option<Decimal> {
    lines.iter().try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line.line_total))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: ActorId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub reference: String,
    pub requester: Requester,
    pub items: Vec<RequestItem>,
    pub stage: Stage,
    pub decision: Option<Decision>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    pub draft: Option<Draft>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub version: u32,
}

impl Request {
    pub fn submit(
        requester: &Actor,
        items: Vec<RequestItem>,
        reference: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            reference: reference.into(),
            requester: Requester { id: requester.id.clone(), name: requester.name.clone() },
            items,
            stage: Stage::Submitted,
            decision: None,
            evaluation: None,
            draft: None,
            created_at,
            processed_at: None,
            finalized_at: None,
            version: 1,
        }
    }

    pub fn is_owned_by(&self, actor: &ActorId) -> bool {
        &self.requester.id == actor
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        matches!(
            (self.stage, next),
            (Stage::Submitted, Stage::Approved)
                | (Stage::Submitted, Stage::Rejected)
                | (Stage::Approved, Stage::Drafted)
                | (Stage::Drafted, Stage::Finalized)
        )
    }

    pub fn transition_to(&mut self, next: Stage) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.stage = next;
            return Ok(());
        }

        Err(DomainError::InvalidTransition { from: self.stage, to: next })
    }

    pub fn record_decision(
        &mut self,
        actor: &Actor,
        outcome: DecisionOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.decision.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "request {} already carries a decision",
                self.reference
            )));
        }
        let next = match outcome {
            DecisionOutcome::Approved => Stage::Approved,
            DecisionOutcome::Rejected => Stage::Rejected,
        };
        self.transition_to(next)?;
        self.decision = Some(Decision {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            outcome,
            decided_at: at,
        });
        self.processed_at = Some(at);
        Ok(())
    }

    /// The voucher can be co-signed until a purchase order replaces it.
    pub fn accepts_evaluation(&self) -> bool {
        matches!(self.stage, Stage::Submitted | Stage::Approved) && self.evaluation.is_none()
    }

    pub fn record_evaluation(&mut self, actor: &Actor, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.accepts_evaluation() {
            return Err(DomainError::InvariantViolation(format!(
                "requisition voucher of request {} cannot be evaluated in stage {}",
                self.reference, self.stage
            )));
        }
        self.evaluation = Some(Evaluation {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            signed_at: at,
        });
        Ok(())
    }

    pub fn attach_draft(&mut self, draft: Draft) -> Result<(), DomainError> {
        self.transition_to(Stage::Drafted)?;
        self.draft = Some(draft);
        Ok(())
    }

    pub fn finalize(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(Stage::Finalized)?;
        self.finalized_at = Some(at);
        Ok(())
    }

    pub fn replace_items(&mut self, items: Vec<RequestItem>) -> Result<(), DomainError> {
        if self.stage != Stage::Submitted {
            return Err(DomainError::InvariantViolation(format!(
                "items of request {} are frozen once it leaves submitted",
                self.reference
            )));
        }
        self.items = items;
        Ok(())
    }

    /// Checks the structural invariants that every persisted request must satisfy.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let decided = self.stage != Stage::Submitted;
        if decided != self.decision.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "request {} in stage {} has decision={}",
                self.reference,
                self.stage,
                self.decision.is_some()
            )));
        }
        if self.stage.has_draft() != self.draft.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "request {} in stage {} has draft={}",
                self.reference,
                self.stage,
                self.draft.is_some()
            )));
        }
        if let Some(draft) = &self.draft {
            if !draft.totals_consistent() {
                return Err(DomainError::InvariantViolation(format!(
                    "draft totals of request {} do not match its lines",
                    self.reference
                )));
            }
        }
        Ok(())
    }
}
