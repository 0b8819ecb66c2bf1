use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, Role};
use crate::domain::request::{Request, Stage};
use crate::flows::{ActionKind, FlowEngine, RestockFlow};
use crate::listing::Queue;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateDenial {
    UnconfirmedRole { role: Role },
    RoleNotPermitted { role: Role, action: ActionKind },
    StageMismatch { stage: Stage, action: ActionKind },
}

impl GateDenial {
    fn reason(&self) -> String {
        match self {
            Self::UnconfirmedRole { role } => {
                format!("role `{role}` has not been confirmed for this account")
            }
            Self::RoleNotPermitted { role, action } => {
                format!("role `{role}` may not {action} requests")
            }
            Self::StageMismatch { stage, action } => {
                format!("a request in stage `{stage}` cannot be sent to {action}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
    pub denial: Option<GateDenial>,
}

impl GateDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), denial: None }
    }

    fn deny(denial: GateDenial) -> Self {
        Self { allowed: false, reason: denial.reason(), denial: Some(denial) }
    }
}

/// Pure authorization over (actor, action, request). Never mutates and never fails.
#[derive(Clone, Debug)]
pub struct ApprovalGate {
    approver: Role,
    evaluator: Role,
    queue_viewers: Vec<Role>,
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self {
            approver: Role::BudgetAnalyst,
            evaluator: Role::Engineering,
            queue_viewers: vec![Role::BudgetAnalyst, Role::Manager, Role::WarehouseAdmin],
        }
    }
}

impl ApprovalGate {
    pub fn approver_role(&self) -> Role {
        self.approver
    }

    pub fn authorize(&self, actor: &Actor, action: ActionKind, request: &Request) -> bool {
        self.evaluate(actor, action, request).allowed
    }

    pub fn evaluate(&self, actor: &Actor, action: ActionKind, request: &Request) -> GateDecision {
        if !actor.role_confirmed {
            return GateDecision::deny(GateDenial::UnconfirmedRole { role: actor.role });
        }
        if actor.role != self.approver {
            return GateDecision::deny(GateDenial::RoleNotPermitted { role: actor.role, action });
        }
        if FlowEngine::new(RestockFlow).apply(request.stage, action).is_err() {
            return GateDecision::deny(GateDenial::StageMismatch { stage: request.stage, action });
        }

        GateDecision::allow(format!(
            "`{}` may {action} request {} in stage `{}`",
            actor.role, request.reference, request.stage
        ))
    }

    /// Approvers never file their own requests so the two duties stay apart.
    pub fn can_submit(&self, actor: &Actor) -> bool {
        actor.role_confirmed && actor.role != self.approver
    }

    /// Engineering co-signs requisition vouchers; no stage change is involved.
    pub fn can_evaluate(&self, actor: &Actor) -> bool {
        actor.role_confirmed && actor.role == self.evaluator
    }

    pub fn can_view_request(&self, actor: &Actor, request: &Request) -> bool {
        request.is_owned_by(&actor.id) || actor.role_confirmed
    }

    pub fn can_view_queue(&self, actor: &Actor, queue: Queue) -> bool {
        match queue {
            Queue::Mine => true,
            Queue::Pending | Queue::Approved | Queue::Drafted | Queue::History => {
                actor.role_confirmed && self.queue_viewers.contains(&actor.role)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ApprovalGate, GateDenial};
    use crate::domain::actor::{Actor, Role};
    use crate::domain::request::{Request, RequestItem, Stage};
    use crate::flows::ActionKind;
    use crate::listing::Queue;

    fn submitted() -> Request {
        Request::submit(
            &Actor::new("staff-1", "Rosa", Role::WarehouseStaff),
            vec![RequestItem::new("Bolts", 10, "pcs")],
            "MRR-2026-0001",
            Utc::now(),
        )
    }

    fn analyst() -> Actor {
        Actor::new("analyst-1", "Ben", Role::BudgetAnalyst)
    }

    #[test]
    fn confirmed_analyst_may_approve_and_reject_submitted() {
        let gate = ApprovalGate::default();
        let request = submitted();

        assert!(gate.authorize(&analyst(), ActionKind::Approve, &request));
        assert!(gate.authorize(&analyst(), ActionKind::Reject, &request));
        assert!(!gate.authorize(&analyst(), ActionKind::Finalize, &request));
    }

    #[test]
    fn every_other_role_is_a_read_only_observer() {
        let gate = ApprovalGate::default();
        let request = submitted();

        for role in Role::ALL.into_iter().filter(|role| *role != Role::BudgetAnalyst) {
            let actor = Actor::new("someone", "Someone", role);
            for action in ActionKind::ALL {
                let decision = gate.evaluate(&actor, action, &request);
                assert!(!decision.allowed);
                assert!(matches!(decision.denial, Some(GateDenial::RoleNotPermitted { .. })));
            }
        }
    }

    #[test]
    fn unconfirmed_analyst_is_denied_with_reason() {
        let gate = ApprovalGate::default();
        let decision = gate.evaluate(&analyst().unconfirmed(), ActionKind::Approve, &submitted());

        assert!(!decision.allowed);
        assert_eq!(decision.denial, Some(GateDenial::UnconfirmedRole { role: Role::BudgetAnalyst }));
        assert!(decision.reason.contains("not been confirmed"));
    }

    #[test]
    fn stage_mismatch_is_reported() {
        let gate = ApprovalGate::default();
        let mut request = submitted();
        request.stage = Stage::Finalized;

        let decision = gate.evaluate(&analyst(), ActionKind::Approve, &request);
        assert_eq!(
            decision.denial,
            Some(GateDenial::StageMismatch { stage: Stage::Finalized, action: ActionKind::Approve })
        );
    }

    #[test]
    fn submission_and_viewing_rules() {
        let gate = ApprovalGate::default();
        let staff = Actor::new("staff-1", "Rosa", Role::WarehouseStaff);
        let stranger = Actor::new("eng-1", "Eli", Role::Engineering).unconfirmed();
        let request = submitted();

        assert!(gate.can_submit(&staff));
        assert!(!gate.can_submit(&analyst()));
        assert!(!gate.can_submit(&stranger));

        assert!(gate.can_view_request(&staff, &request));
        assert!(gate.can_view_request(&analyst(), &request));
        assert!(!gate.can_view_request(&stranger, &request));
    }

    #[test]
    fn queues_are_limited_to_supervising_roles() {
        let gate = ApprovalGate::default();
        let staff = Actor::new("staff-1", "Rosa", Role::WarehouseStaff);
        let manager = Actor::new("mgr-1", "Mia", Role::Manager);

        assert!(gate.can_view_queue(&staff, Queue::Mine));
        assert!(!gate.can_view_queue(&staff, Queue::Pending));
        assert!(gate.can_view_queue(&manager, Queue::History));
        assert!(gate.can_view_queue(&analyst(), Queue::Drafted));
        assert!(!gate.can_view_queue(&manager.clone().unconfirmed(), Queue::Pending));
    }

    #[test]
    fn only_confirmed_engineering_may_evaluate() {
        let gate = ApprovalGate::default();
        let engineer = Actor::new("eng-1", "Ed", Role::Engineering);

        assert!(gate.can_evaluate(&engineer));
        assert!(!gate.can_evaluate(&engineer.clone().unconfirmed()));
        assert!(!gate.can_evaluate(&analyst()));
    }
}
