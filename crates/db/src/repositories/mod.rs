use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use woms_core::domain::actor::{Actor, ActorId};
use woms_core::domain::notification::{Notification, NotificationId};
use woms_core::domain::request::{Request, RequestId};
use woms_core::domain::signature::Signature;
use woms_core::errors::ApplicationError;
use woms_core::listing::{PageRequest, RequestFilter};

pub mod memory;
pub mod notification;
pub mod request;
pub mod signature;

pub use memory::{InMemorySignatureRepository, InMemoryWorkflowRepository};
pub use notification::SqlNotificationRepository;
pub use request::SqlRequestRepository;
pub use signature::SqlSignatureRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate key: {0}")]
    Duplicate(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// Result of a compare-and-swap commit on a request row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    VersionConflict,
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;

    /// Next value of a monotonically increasing counter, starting at 1 per scope.
    async fn next_sequence(&self, scope: &str) -> Result<u32, RepositoryError>;

    /// Inserts a new request together with the notification announcing it.
    async fn insert(
        &self,
        request: &Request,
        notification: &Notification,
    ) -> Result<(), RepositoryError>;

    /// Writes `request` only if the stored version still equals `expected_version`.
    /// The optional notification commits in the same unit.
    async fn commit(
        &self,
        request: &Request,
        expected_version: u32,
        notification: Option<&Notification>,
    ) -> Result<CommitOutcome, RepositoryError>;

    /// One page of matching requests plus the total number of matches.
    async fn list(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<Request>, u64), RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;

    /// Notifications visible to `actor`, newest first.
    async fn list_for(
        &self,
        actor: &Actor,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, RepositoryError>;

    async fn unread_count(&self, actor: &Actor) -> Result<u64, RepositoryError>;

    /// Returns `false` when no such notification exists.
    async fn mark_read(&self, id: &NotificationId) -> Result<bool, RepositoryError>;

    /// Returns `false` when no such notification exists.
    async fn delete(&self, id: &NotificationId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SignatureRepository: Send + Sync {
    async fn find(&self, actor_id: &ActorId) -> Result<Option<Signature>, RepositoryError>;

    /// Inserts or replaces the actor's signature.
    async fn save(&self, signature: &Signature) -> Result<(), RepositoryError>;
}

/// Fixed-width UTC text so lexical order in SQLite matches chronological order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
