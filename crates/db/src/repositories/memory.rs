use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use woms_core::domain::actor::{Actor, ActorId};
use woms_core::domain::notification::{Notification, NotificationId};
use woms_core::domain::request::{Request, RequestId};
use woms_core::domain::signature::Signature;
use woms_core::listing::{select_page, PageRequest, RequestFilter};

use super::{
    CommitOutcome, NotificationRepository, RepositoryError, RequestRepository, SignatureRepository,
};

#[derive(Default)]
struct WorkflowState {
    requests: HashMap<RequestId, Request>,
    notifications: Vec<Notification>,
    sequences: HashMap<String, u32>,
}

/// Request and notification storage behind one lock, so a transition and its
/// notification become visible together just like the SQL transaction.
#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    state: Arc<RwLock<WorkflowState>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryWorkflowRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        Ok(self.state.read().await.requests.get(id).cloned())
    }

    async fn next_sequence(&self, scope: &str) -> Result<u32, RepositoryError> {
        let mut state = self.state.write().await;
        let value = state.sequences.entry(scope.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn insert(
        &self,
        request: &Request,
        notification: &Notification,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let clash = state.requests.contains_key(&request.id)
            || state.requests.values().any(|stored| stored.reference == request.reference);
        if clash {
            return Err(RepositoryError::Duplicate(format!(
                "request {} or reference {} already exists",
                request.id, request.reference
            )));
        }
        state.requests.insert(request.id.clone(), request.clone());
        state.notifications.push(notification.clone());
        Ok(())
    }

    async fn commit(
        &self,
        request: &Request,
        expected_version: u32,
        notification: Option<&Notification>,
    ) -> Result<CommitOutcome, RepositoryError> {
        let mut state = self.state.write().await;
        match state.requests.get(&request.id) {
            Some(stored) if stored.version == expected_version => {}
            _ => return Ok(CommitOutcome::VersionConflict),
        }
        state.requests.insert(request.id.clone(), request.clone());
        if let Some(notification) = notification {
            state.notifications.push(notification.clone());
        }
        Ok(CommitOutcome::Committed)
    }

    async fn list(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<Request>, u64), RepositoryError> {
        let state = self.state.read().await;
        Ok(select_page(state.requests.values(), filter, page))
    }
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryWorkflowRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError> {
        self.state.write().await.notifications.push(notification.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.notifications.iter().find(|note| &note.id == id).cloned())
    }

    async fn list_for(
        &self,
        actor: &Actor,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state.read().await;
        let mut visible = state
            .notifications
            .iter()
            .filter(|note| note.recipient.includes(actor))
            .filter(|note| !unread_only || !note.is_read)
            .cloned()
            .collect::<Vec<_>>();
        visible.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.0.cmp(&left.id.0))
        });
        visible.truncate(limit as usize);
        Ok(visible)
    }

    async fn unread_count(&self, actor: &Actor) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        let count = state
            .notifications
            .iter()
            .filter(|note| !note.is_read && note.recipient.includes(actor))
            .count();
        Ok(count as u64)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.notifications.iter_mut().find(|note| &note.id == id) {
            Some(note) => {
                note.mark_read();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &NotificationId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.notifications.len();
        state.notifications.retain(|note| &note.id != id);
        Ok(state.notifications.len() < before)
    }
}

#[derive(Clone, Default)]
pub struct InMemorySignatureRepository {
    signatures: Arc<RwLock<HashMap<ActorId, Signature>>>,
}

impl InMemorySignatureRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SignatureRepository for InMemorySignatureRepository {
    async fn find(&self, actor_id: &ActorId) -> Result<Option<Signature>, RepositoryError> {
        Ok(self.signatures.read().await.get(actor_id).cloned())
    }

    async fn save(&self, signature: &Signature) -> Result<(), RepositoryError> {
        self.signatures.write().await.insert(signature.actor_id.clone(), signature.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use woms_core::domain::actor::{Actor, Role};
    use woms_core::domain::notification::{Notification, Recipient};
    use woms_core::domain::request::{Request, RequestItem};

    use super::InMemoryWorkflowRepository;
    use crate::repositories::{CommitOutcome, NotificationRepository, RequestRepository};

    #[tokio::test]
    async fn stale_commit_is_reported_as_conflict() {
        let repo = InMemoryWorkflowRepository::new();
        let staff = Actor::new("staff-1", "Rosa", Role::WarehouseStaff);
        let request =
            Request::submit(&staff, vec![RequestItem::new("Gloves", 4, "pairs")], "MRR-2026-0001", Utc::now());
        let note = Notification::new(Recipient::Role(Role::BudgetAnalyst), "new", None, Utc::now());
        RequestRepository::insert(&repo, &request, &note).await.expect("insert");

        let mut next = request.clone();
        next.version = 2;
        assert_eq!(repo.commit(&next, 1, None).await.expect("commit"), CommitOutcome::Committed);
        assert_eq!(repo.commit(&next, 1, None).await.expect("commit"), CommitOutcome::VersionConflict);
    }

    #[tokio::test]
    async fn role_notifications_share_read_state() {
        let repo = InMemoryWorkflowRepository::new();
        let first = Actor::new("analyst-1", "Ben", Role::BudgetAnalyst);
        let second = Actor::new("analyst-2", "Cora", Role::BudgetAnalyst);
        let note = Notification::new(Recipient::Role(Role::BudgetAnalyst), "review", None, Utc::now());
        NotificationRepository::insert(&repo, &note).await.expect("insert");

        assert!(repo.mark_read(&note.id).await.expect("mark"));
        assert_eq!(repo.unread_count(&first).await.expect("count"), 0);
        assert_eq!(repo.unread_count(&second).await.expect("count"), 0);
    }
}
