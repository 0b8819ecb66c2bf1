use std::sync::Arc;

use chrono::{DateTime, Datelike, SubsecRound, Utc};
use tracing::{info, warn};

use woms_core::approvals::{ApprovalGate, GateDenial};
use woms_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use woms_core::domain::request::{
    purchase_order_number, request_reference, validate_items, DecisionOutcome, Draft, Request,
    RequestId, RequestItemInput, Stage,
};
use woms_core::errors::{ApplicationError, DomainError};
use woms_core::flows::{ActionKind, FlowEngine, RestockFlow, WorkflowAction};
use woms_core::listing::{Page, PageLimits, PageRequest, Queue, RequestFilter};
use woms_core::notifications::NotificationRelay;
use woms_core::session::Session;

use crate::repositories::{CommitOutcome, RequestRepository};

/// Storage precision is microseconds; trimming here keeps a freshly returned
/// request equal to the one read back later.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Authoritative owner of request state. Every mutation goes through the gate,
/// the flow engine and a version compare-and-swap, and commits together with
/// the notification it produces.
pub struct WorkflowStore {
    requests: Arc<dyn RequestRepository>,
    gate: ApprovalGate,
    relay: NotificationRelay,
    engine: FlowEngine<RestockFlow>,
    audit: Arc<dyn AuditSink>,
    limits: PageLimits,
}

impl WorkflowStore {
    pub fn new(requests: Arc<dyn RequestRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            requests,
            gate: ApprovalGate::default(),
            relay: NotificationRelay::default(),
            engine: FlowEngine::default(),
            audit,
            limits: PageLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    pub async fn create(
        &self,
        session: &Session,
        items: Vec<RequestItemInput>,
    ) -> Result<Request, ApplicationError> {
        let actor = &session.actor;
        if !self.gate.can_submit(actor) {
            warn!(
                event_name = "workflow.create_denied",
                correlation_id = %session.correlation_id,
                actor_id = %actor.id.0,
                role = %actor.role,
                "request submission denied"
            );
            return Err(ApplicationError::Forbidden(format!(
                "role `{}` may not submit restocking requests",
                actor.role
            )));
        }

        let items = validate_items(items)?;
        let at = now();
        let sequence = self.requests.next_sequence(&format!("MRR-{}", at.year())).await?;
        let request = Request::submit(actor, items, request_reference(at, sequence), at);
        let notification = self.relay.on_submitted(&request, at);
        self.requests.insert(&request, &notification).await?;

        info!(
            event_name = "workflow.request_created",
            correlation_id = %session.correlation_id,
            request_id = %request.id,
            reference = %request.reference,
            item_count = request.items.len(),
            "restocking request submitted"
        );
        Ok(request)
    }

    pub async fn transition(
        &self,
        request_id: &RequestId,
        action: WorkflowAction,
        session: &Session,
    ) -> Result<Request, ApplicationError> {
        let actor = &session.actor;
        let kind = action.kind();
        let current = self.load(request_id).await?;

        let decision = self.gate.evaluate(actor, kind, &current);
        if !decision.allowed {
            warn!(
                event_name = "workflow.transition_denied",
                correlation_id = %session.correlation_id,
                request_id = %request_id,
                action = %kind,
                reason = %decision.reason,
                "transition denied by approval gate"
            );
            return Err(match decision.denial {
                Some(GateDenial::StageMismatch { stage, action }) => {
                    DomainError::InvalidTransition { from: stage, to: action.target() }.into()
                }
                _ => ApplicationError::Forbidden(decision.reason),
            });
        }

        let audit = AuditContext::new(
            Some(request_id.clone()),
            session.correlation_id.clone(),
            actor.id.0.clone(),
        );
        let outcome = self
            .engine
            .apply_with_audit(current.stage, kind, self.audit.as_ref(), &audit)
            .map_err(DomainError::from)?;

        let at = now();
        let mut next = current.clone();
        match action {
            WorkflowAction::Approve => next.record_decision(actor, DecisionOutcome::Approved, at)?,
            WorkflowAction::Reject => next.record_decision(actor, DecisionOutcome::Rejected, at)?,
            WorkflowAction::Draft(input) => {
                let mut draft = Draft::compute(input, String::new(), actor, at)?;
                let sequence = self.requests.next_sequence(&format!("PO-{}", at.year())).await?;
                draft.po_number = purchase_order_number(at, sequence);
                next.attach_draft(draft)?;
            }
            WorkflowAction::Finalize => next.finalize(at)?,
        }
        next.version = current.version + 1;
        next.check_invariants()?;

        let notification =
            self.relay.on_transition(&next, outcome.from, outcome.to, at).ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "no notification defined for {} -> {}",
                    outcome.from, outcome.to
                ))
            })?;

        match self.requests.commit(&next, current.version, Some(&notification)).await? {
            CommitOutcome::Committed => {
                info!(
                    event_name = "workflow.transition_committed",
                    correlation_id = %session.correlation_id,
                    request_id = %request_id,
                    from = %outcome.from,
                    to = %outcome.to,
                    version = next.version,
                    "request transitioned"
                );
                Ok(next)
            }
            CommitOutcome::VersionConflict => {
                Err(self.explain_conflict(request_id, kind, session).await)
            }
        }
    }

    /// Records the engineering sign-off on a requisition voucher. The stage is
    /// unchanged; the version still moves so concurrent writers see the change.
    pub async fn evaluate(
        &self,
        request_id: &RequestId,
        session: &Session,
    ) -> Result<Request, ApplicationError> {
        let actor = &session.actor;
        if !self.gate.can_evaluate(actor) {
            return Err(ApplicationError::Forbidden(format!(
                "role `{}` may not evaluate requisition vouchers",
                actor.role
            )));
        }

        let current = self.load(request_id).await?;
        if !current.accepts_evaluation() {
            return Err(ApplicationError::Conflict(match &current.evaluation {
                Some(evaluation) => format!(
                    "request {} was already evaluated by {}",
                    current.reference, evaluation.actor_name
                ),
                None => format!(
                    "request {} is {} and its requisition voucher is closed",
                    current.reference, current.stage
                ),
            }));
        }

        let mut next = current.clone();
        next.record_evaluation(actor, now())?;
        next.version = current.version + 1;
        next.check_invariants()?;

        match self.requests.commit(&next, current.version, None).await? {
            CommitOutcome::Committed => {
                self.audit.emit(
                    AuditEvent::new(
                        &AuditContext::new(
                            Some(request_id.clone()),
                            session.correlation_id.clone(),
                            actor.id.0.clone(),
                        ),
                        "workflow.voucher_evaluated",
                        AuditCategory::Approval,
                        AuditOutcome::Success,
                    )
                    .with_metadata("stage", next.stage.as_str()),
                );
                info!(
                    event_name = "workflow.voucher_evaluated",
                    correlation_id = %session.correlation_id,
                    request_id = %request_id,
                    stage = %next.stage,
                    version = next.version,
                    "requisition voucher evaluated"
                );
                Ok(next)
            }
            CommitOutcome::VersionConflict => Err(ApplicationError::Conflict(format!(
                "request {} changed while it was being evaluated; refetch and retry",
                current.reference
            ))),
        }
    }

    pub async fn get(
        &self,
        request_id: &RequestId,
        session: &Session,
    ) -> Result<Request, ApplicationError> {
        let request = self.load(request_id).await?;
        if !self.gate.can_view_request(&session.actor, &request) {
            return Err(ApplicationError::Forbidden(format!(
                "request {} belongs to another requester",
                request.reference
            )));
        }
        Ok(request)
    }

    /// Replaces the item list of a request that nobody has decided on yet.
    pub async fn revise_items(
        &self,
        request_id: &RequestId,
        items: Vec<RequestItemInput>,
        session: &Session,
    ) -> Result<Request, ApplicationError> {
        let current = self.load(request_id).await?;
        if !current.is_owned_by(&session.actor.id) {
            return Err(ApplicationError::Forbidden(
                "only the requester may revise the items of a request".to_string(),
            ));
        }
        if current.stage != Stage::Submitted {
            return Err(ApplicationError::Conflict(format!(
                "request {} is {} and its items are frozen",
                current.reference, current.stage
            )));
        }

        let items = validate_items(items)?;
        let mut next = current.clone();
        next.replace_items(items)?;
        next.version = current.version + 1;

        match self.requests.commit(&next, current.version, None).await? {
            CommitOutcome::Committed => {
                info!(
                    event_name = "workflow.items_revised",
                    correlation_id = %session.correlation_id,
                    request_id = %request_id,
                    item_count = next.items.len(),
                    "request items revised"
                );
                Ok(next)
            }
            CommitOutcome::VersionConflict => Err(ApplicationError::Conflict(format!(
                "request {} changed while its items were being revised",
                current.reference
            ))),
        }
    }

    /// Lists requests visible to the caller. Actors without access to the
    /// review queues only ever see their own requests.
    pub async fn list(
        &self,
        session: &Session,
        mut filter: RequestFilter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Request>, ApplicationError> {
        if !self.gate.can_view_queue(&session.actor, Queue::History) {
            filter.requester_id = Some(session.actor.id.clone());
        }
        self.fetch_page(filter, page, page_size).await
    }

    pub async fn queue(
        &self,
        session: &Session,
        queue: Queue,
        filter: RequestFilter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Request>, ApplicationError> {
        if !self.gate.can_view_queue(&session.actor, queue) {
            return Err(ApplicationError::Forbidden(format!(
                "role `{}` may not view the {} queue",
                session.actor.role,
                queue.as_str()
            )));
        }
        self.fetch_page(queue.apply(&session.actor, filter), page, page_size).await
    }

    async fn fetch_page(
        &self,
        filter: RequestFilter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Request>, ApplicationError> {
        filter.validate()?;
        let page = PageRequest::new(page, page_size, self.limits)?;
        let (results, count) = self.requests.list(&filter, page).await?;
        Page::assemble(results, count, page)
    }

    async fn load(&self, request_id: &RequestId) -> Result<Request, ApplicationError> {
        self.requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("request {request_id}")))
    }

    /// The losing side of a compare-and-swap re-reads once to tell a stale but
    /// still legal action apart from one the new stage no longer allows.
    async fn explain_conflict(
        &self,
        request_id: &RequestId,
        kind: ActionKind,
        session: &Session,
    ) -> ApplicationError {
        let latest = match self.load(request_id).await {
            Ok(latest) => latest,
            Err(error) => return error,
        };

        warn!(
            event_name = "workflow.transition_conflict",
            correlation_id = %session.correlation_id,
            request_id = %request_id,
            action = %kind,
            stage = %latest.stage,
            "concurrent update won the race"
        );

        if self.engine.apply(latest.stage, kind).is_err() {
            DomainError::InvalidTransition { from: latest.stage, to: kind.target() }.into()
        } else {
            ApplicationError::Conflict(format!(
                "request {} was modified concurrently; refetch and retry",
                latest.reference
            ))
        }
    }
}
