use sqlx::Row;

use woms_core::domain::actor::ActorId;
use woms_core::domain::signature::Signature;

use super::{decode_error, parse_timestamp, timestamp, RepositoryError, SignatureRepository};
use crate::DbPool;

pub struct SqlSignatureRepository {
    pool: DbPool,
}

impl SqlSignatureRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SignatureRepository for SqlSignatureRepository {
    async fn find(&self, actor_id: &ActorId) -> Result<Option<Signature>, RepositoryError> {
        let row = sqlx::query(
            "SELECT actor_id, content_type, image, updated_at FROM signature WHERE actor_id = ?",
        )
        .bind(&actor_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let actor_id: String = row.try_get("actor_id").map_err(decode_error)?;
        let content_type: String = row.try_get("content_type").map_err(decode_error)?;
        let image: Vec<u8> = row.try_get("image").map_err(decode_error)?;
        let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

        Ok(Some(Signature {
            actor_id: ActorId(actor_id),
            content_type,
            image,
            updated_at: parse_timestamp("updated_at", &updated_at)?,
        }))
    }

    async fn save(&self, signature: &Signature) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO signature (actor_id, content_type, image, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(actor_id) DO UPDATE SET
                content_type = excluded.content_type,
                image = excluded.image,
                updated_at = excluded.updated_at",
        )
        .bind(&signature.actor_id.0)
        .bind(&signature.content_type)
        .bind(&signature.image)
        .bind(timestamp(signature.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
