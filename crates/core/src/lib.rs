pub mod approvals;
pub mod audit;
pub mod config;
pub mod documents;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod listing;
pub mod notifications;
pub mod session;

pub use approvals::{ApprovalGate, GateDecision, GateDenial};
pub use documents::{DocumentKind, DocumentRenderer, DocumentSource, RenderError, RenderedDocument};
pub use domain::actor::{Actor, ActorId, Role};
pub use domain::notification::{Notification, NotificationId, Recipient};
pub use domain::request::{
    Decision, DecisionOutcome, Draft, DraftInput, DraftLine, DraftLineInput, Request, RequestId,
    RequestItem, RequestItemInput, Stage,
};
pub use domain::signature::Signature;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ActionKind, FlowEngine, RestockFlow, WorkflowAction};
pub use listing::{Ordering, Page, PageLimits, PageRequest, Queue, RequestFilter};
pub use notifications::NotificationRelay;
pub use session::{Claims, Session, SessionError, TokenCodec};
