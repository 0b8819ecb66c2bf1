pub mod connection;
pub mod fixtures;
pub mod inbox;
pub mod migrations;
pub mod repositories;
pub mod workflow;

pub use connection::{connect, connect_in_memory, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, FlowSeedInfo, SeedResult, VerificationResult};
pub use inbox::{InboxView, NotificationInbox};
pub use workflow::WorkflowStore;
