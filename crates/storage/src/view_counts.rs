use crate::error::{Error, Result};
use crate::{Storage, ViewCountStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ViewCount {
    pub id:         i64,
    pub chain:      String,
    pub object_id:  String,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ViewCountStore for Storage {
    async fn add_community(&self, community: &str) -> Result<()> {
        sqlx::query("INSERT INTO communities (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(community)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn community_exists(&self, community: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM communities WHERE id = $1)")
                .bind(community)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_view_count(&self, community: &str, object_id: &str) -> Result<Option<ViewCount>> {
        Ok(sqlx::query_as::<_, ViewCount>(
            r#"
        SELECT id, chain, object_id, view_count, created_at, updated_at
        FROM view_counts
        WHERE chain = $1 AND object_id = $2
        "#,
        )
        .bind(community)
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn init_view_count(&self, community: &str, object_id: &str) -> Result<ViewCount> {
        // the no-op update makes RETURNING yield the existing row on conflict
        let record = sqlx::query_as::<_, ViewCount>(
            r#"
        INSERT INTO view_counts (chain, object_id, view_count)
        VALUES ($1, $2, 0)
        ON CONFLICT (chain, object_id) DO UPDATE SET chain = EXCLUDED.chain
        RETURNING id, chain, object_id, view_count, created_at, updated_at
        "#,
        )
        .bind(community)
        .bind(object_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unknown_community_or(e, community))?;
        debug!(id = record.id, chain = %record.chain, object_id = %record.object_id, "view count initialized");
        Ok(record)
    }

    async fn increment_view_count(&self, id: i64) -> Result<ViewCount> {
        sqlx::query_as::<_, ViewCount>(
            r#"
        UPDATE view_counts
        SET view_count = view_count + 1, updated_at = now()
        WHERE id = $1
        RETURNING id, chain, object_id, view_count, created_at, updated_at
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::ViewCountNotFound(id))
    }
}

/// A counter for a community missing from `communities` trips the foreign
/// key, report it the way every backend does.
fn unknown_community_or(e: sqlx::Error, community: &str) -> Error {
    match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => {
            Error::UnknownCommunity(community.to_owned().into())
        }
        _ => Error::SqlxError(e),
    }
}
