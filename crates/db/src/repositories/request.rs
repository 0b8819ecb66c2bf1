use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use woms_core::domain::actor::ActorId;
use woms_core::domain::notification::Notification;
use woms_core::domain::request::{Request, RequestId, Requester, Stage};
use woms_core::listing::{PageRequest, RequestFilter};

use super::notification::insert_notification;
use super::{
    decode_error, parse_timestamp, timestamp, CommitOutcome, RepositoryError, RequestRepository,
};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, reference, requester_id, requester_name, items_json, stage, \
     decision_json, evaluation_json, draft_json, created_at, processed_at, finalized_at, version";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_request(row: &SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let reference: String = row.try_get("reference").map_err(decode_error)?;
    let requester_id: String = row.try_get("requester_id").map_err(decode_error)?;
    let requester_name: String = row.try_get("requester_name").map_err(decode_error)?;
    let items_json: String = row.try_get("items_json").map_err(decode_error)?;
    let stage_str: String = row.try_get("stage").map_err(decode_error)?;
    let decision_json: Option<String> = row.try_get("decision_json").map_err(decode_error)?;
    let evaluation_json: Option<String> = row.try_get("evaluation_json").map_err(decode_error)?;
    let draft_json: Option<String> = row.try_get("draft_json").map_err(decode_error)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_error)?;
    let processed_at_str: Option<String> = row.try_get("processed_at").map_err(decode_error)?;
    let finalized_at_str: Option<String> = row.try_get("finalized_at").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;

    let stage = Stage::parse(&stage_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown stage `{stage_str}`")))?;

    Ok(Request {
        id: RequestId(id),
        reference,
        requester: Requester { id: ActorId(requester_id), name: requester_name },
        items: serde_json::from_str(&items_json).map_err(decode_error)?,
        stage,
        decision: decision_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(decode_error)?,
        evaluation: evaluation_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(decode_error)?,
        draft: draft_json.as_deref().map(serde_json::from_str).transpose().map_err(decode_error)?,
        created_at: parse_timestamp("created_at", &created_at_str)?,
        processed_at: processed_at_str
            .as_deref()
            .map(|value| parse_timestamp("processed_at", value))
            .transpose()?,
        finalized_at: finalized_at_str
            .as_deref()
            .map(|value| parse_timestamp("finalized_at", value))
            .transpose()?,
        version: u32::try_from(version).map_err(decode_error)?,
    })
}

struct EncodedRequest {
    items_json: String,
    decision_json: Option<String>,
    evaluation_json: Option<String>,
    draft_json: Option<String>,
}

fn encode(request: &Request) -> Result<EncodedRequest, RepositoryError> {
    Ok(EncodedRequest {
        items_json: serde_json::to_string(&request.items).map_err(decode_error)?,
        decision_json: request
            .decision
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(decode_error)?,
        evaluation_json: request
            .evaluation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(decode_error)?,
        draft_json: request.draft.as_ref().map(serde_json::to_string).transpose().map_err(decode_error)?,
    })
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &RequestFilter) {
    builder.push(" WHERE 1 = 1");

    if !filter.stages.is_empty() {
        builder.push(" AND stage IN (");
        let mut stages = builder.separated(", ");
        for stage in &filter.stages {
            stages.push_bind(stage.as_str());
        }
        stages.push_unseparated(")");
    }

    if let Some(requester_id) = &filter.requester_id {
        builder.push(" AND requester_id = ").push_bind(requester_id.0.clone());
    }

    if let Some(needle) = filter.requester_needle() {
        let pattern = format!("%{}%", escape_like(&needle));
        builder
            .push(" AND (LOWER(requester_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(requester_id) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }

    let (lower, upper) = filter.created_bounds();
    if let Some(lower) = lower {
        builder.push(" AND created_at >= ").push_bind(timestamp(lower));
    }
    if let Some(upper) = upper {
        builder.push(" AND created_at < ").push_bind(timestamp(upper));
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

async fn next_sequence_in(conn: &mut SqliteConnection, scope: &str) -> Result<u32, RepositoryError> {
    let value: i64 = sqlx::query_scalar(
        "INSERT INTO sequence_counter (scope, value) VALUES (?, 1)
         ON CONFLICT(scope) DO UPDATE SET value = value + 1
         RETURNING value",
    )
    .bind(scope)
    .fetch_one(&mut *conn)
    .await?;

    u32::try_from(value).map_err(decode_error)
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM restock_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn next_sequence(&self, scope: &str) -> Result<u32, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        next_sequence_in(&mut conn, scope).await
    }

    async fn insert(
        &self,
        request: &Request,
        notification: &Notification,
    ) -> Result<(), RepositoryError> {
        let encoded = encode(request)?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO restock_request
                (id, reference, requester_id, requester_name, items_json, stage,
                 decision_json, evaluation_json, draft_json, created_at, processed_at,
                 finalized_at, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&request.id.0)
        .bind(&request.reference)
        .bind(&request.requester.id.0)
        .bind(&request.requester.name)
        .bind(&encoded.items_json)
        .bind(request.stage.as_str())
        .bind(&encoded.decision_json)
        .bind(&encoded.evaluation_json)
        .bind(&encoded.draft_json)
        .bind(timestamp(request.created_at))
        .bind(request.processed_at.map(timestamp))
        .bind(request.finalized_at.map(timestamp))
        .bind(i64::from(request.version))
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(RepositoryError::Duplicate(format!(
                "request {} or reference {} already exists",
                request.id, request.reference
            )));
        }

        insert_notification(&mut tx, notification).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit(
        &self,
        request: &Request,
        expected_version: u32,
        notification: Option<&Notification>,
    ) -> Result<CommitOutcome, RepositoryError> {
        let encoded = encode(request)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE restock_request
             SET items_json = ?, stage = ?, decision_json = ?, evaluation_json = ?,
                 draft_json = ?, processed_at = ?, finalized_at = ?, version = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&encoded.items_json)
        .bind(request.stage.as_str())
        .bind(&encoded.decision_json)
        .bind(&encoded.evaluation_json)
        .bind(&encoded.draft_json)
        .bind(request.processed_at.map(timestamp))
        .bind(request.finalized_at.map(timestamp))
        .bind(i64::from(request.version))
        .bind(&request.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::VersionConflict);
        }

        if let Some(notification) = notification {
            insert_notification(&mut tx, notification).await?;
        }
        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn list(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<Request>, u64), RepositoryError> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM restock_request");
        push_filter(&mut count_query, filter);
        let count: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let direction = if filter.ordering.is_descending() { "DESC" } else { "ASC" };
        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM restock_request"
        ));
        push_filter(&mut select, filter);
        select
            .push(format!(" ORDER BY {} {direction}, id {direction}", filter.ordering.column()))
            .push(" LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = select.build().fetch_all(&self.pool).await?;
        let requests = rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()?;

        Ok((requests, u64::try_from(count).unwrap_or_default()))
    }
}
