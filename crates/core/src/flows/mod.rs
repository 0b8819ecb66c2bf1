pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, RestockFlow};
pub use states::{ActionKind, TransitionOutcome, WorkflowAction};
