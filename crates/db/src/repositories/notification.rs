use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use woms_core::domain::actor::Actor;
use woms_core::domain::notification::{Notification, NotificationId, Recipient};
use woms_core::domain::request::RequestId;

use super::{decode_error, parse_timestamp, timestamp, NotificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Shared with the request repository so announcements commit with the row they describe.
pub(crate) async fn insert_notification(
    conn: &mut SqliteConnection,
    notification: &Notification,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO notification
            (id, recipient_kind, recipient_value, message, related_request_id, is_read, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&notification.id.0)
    .bind(notification.recipient.kind())
    .bind(notification.recipient.value())
    .bind(&notification.message)
    .bind(notification.related_request_id.as_ref().map(|id| id.0.clone()))
    .bind(notification.is_read)
    .bind(timestamp(notification.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let kind: String = row.try_get("recipient_kind").map_err(decode_error)?;
    let value: String = row.try_get("recipient_value").map_err(decode_error)?;
    let message: String = row.try_get("message").map_err(decode_error)?;
    let related: Option<String> = row.try_get("related_request_id").map_err(decode_error)?;
    let is_read: bool = row.try_get("is_read").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let recipient = Recipient::parse(&kind, &value).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown notification recipient `{kind}:{value}`"))
    })?;

    Ok(Notification {
        id: NotificationId(id),
        recipient,
        message,
        related_request_id: related.map(RequestId),
        is_read,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

/// Restricts to rows addressed to the actor, or to their role once confirmed.
fn push_visibility(builder: &mut QueryBuilder<'_, Sqlite>, actor: &Actor) {
    builder
        .push(" WHERE ((recipient_kind = 'actor' AND recipient_value = ")
        .push_bind(actor.id.0.clone())
        .push(")");
    if actor.role_confirmed {
        builder
            .push(" OR (recipient_kind = 'role' AND recipient_value = ")
            .push_bind(actor.role.as_str())
            .push(")");
    }
    builder.push(")");
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_notification(&mut conn, notification).await
    }

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, recipient_kind, recipient_value, message, related_request_id, is_read, created_at
             FROM notification WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_notification).transpose()
    }

    async fn list_for(
        &self,
        actor: &Actor,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, recipient_kind, recipient_value, message, related_request_id, is_read, created_at
             FROM notification",
        );
        push_visibility(&mut query, actor);
        if unread_only {
            query.push(" AND is_read = 0");
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn unread_count(&self, actor: &Actor) -> Result<u64, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM notification");
        push_visibility(&mut query, actor);
        query.push(" AND is_read = 0");

        let count: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE notification SET is_read = 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &NotificationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM notification WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use woms_core::domain::actor::{Actor, ActorId, Role};
    use woms_core::domain::notification::{Notification, Recipient};

    use super::SqlNotificationRepository;
    use crate::repositories::NotificationRepository;
    use crate::{connect_in_memory, migrations};

    async fn repo() -> SqlNotificationRepository {
        let pool = connect_in_memory().await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlNotificationRepository::new(pool)
    }

    fn at(minutes: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).single().expect("valid date")
            + Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn visibility_follows_actor_and_confirmed_role() {
        let repo = repo().await;
        let staff = Actor::new("staff-1", "Rosa", Role::WarehouseStaff);
        let analyst = Actor::new("analyst-1", "Ben", Role::BudgetAnalyst);
        let pending = Actor::new("analyst-2", "Cora", Role::BudgetAnalyst).unconfirmed();

        repo.insert(&Notification::new(Recipient::Actor(ActorId("staff-1".into())), "yours", None, at(0)))
            .await
            .expect("insert");
        repo.insert(&Notification::new(Recipient::Role(Role::BudgetAnalyst), "review", None, at(1)))
            .await
            .expect("insert");

        assert_eq!(repo.list_for(&staff, false, 10).await.expect("list").len(), 1);
        assert_eq!(repo.list_for(&analyst, false, 10).await.expect("list").len(), 1);
        assert!(repo.list_for(&pending, false, 10).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn unread_filter_and_count_track_mark_read() {
        let repo = repo().await;
        let staff = Actor::new("staff-1", "Rosa", Role::WarehouseStaff);
        let first = Notification::new(Recipient::Actor(staff.id.clone()), "first", None, at(0));
        let second = Notification::new(Recipient::Actor(staff.id.clone()), "second", None, at(5));
        repo.insert(&first).await.expect("insert");
        repo.insert(&second).await.expect("insert");

        assert_eq!(repo.unread_count(&staff).await.expect("count"), 2);
        assert!(repo.mark_read(&first.id).await.expect("mark"));
        assert!(repo.mark_read(&first.id).await.expect("mark again"));
        assert_eq!(repo.unread_count(&staff).await.expect("count"), 1);

        let unread = repo.list_for(&staff, true, 10).await.expect("list");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].message, "second");

        let all = repo.list_for(&staff, false, 10).await.expect("list");
        assert_eq!(all[0].message, "second");
        assert!(all[1].is_read);
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let repo = repo().await;
        let note = Notification::new(Recipient::Role(Role::Manager), "fyi", None, at(0));
        repo.insert(&note).await.expect("insert");

        assert!(repo.delete(&note.id).await.expect("delete"));
        assert!(!repo.delete(&note.id).await.expect("delete twice"));
        assert!(repo.find_by_id(&note.id).await.expect("find").is_none());
        assert!(!repo.mark_read(&note.id).await.expect("mark missing"));
    }

    #[tokio::test]
    async fn limit_caps_newest_first() {
        let repo = repo().await;
        let staff = Actor::new("staff-1", "Rosa", Role::WarehouseStaff);
        for minute in 0..5 {
            repo.insert(&Notification::new(
                Recipient::Actor(staff.id.clone()),
                format!("note {minute}"),
                None,
                at(minute),
            ))
            .await
            .expect("insert");
        }

        let listed = repo.list_for(&staff, false, 2).await.expect("list");
        let messages = listed.iter().map(|note| note.message.as_str()).collect::<Vec<_>>();
        assert_eq!(messages, vec!["note 4", "note 3"]);
    }
}
