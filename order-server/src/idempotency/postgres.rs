//! Postgres-backed idempotency cache (`idempotency_keys` table)
//!
//! Expiry is an epoch-millis column. Rows past `expires_at` are treated as absent
//! by every read and claim, and deleted by `evict_expired`.

use std::time::Duration;

use async_trait::async_trait;
use shared::util::now_millis;
use sqlx::PgPool;

use super::{IdempotencyRecord, IdempotencyResult, IdempotencyStore};

#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
}

impl PgIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn expires_at(ttl: Duration) -> i64 {
    now_millis() + i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX / 2)
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn get(&self, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT record FROM idempotency_keys WHERE key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(raw,)| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }

    async fn set(
        &self,
        key: &str,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> IdempotencyResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, record, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key)
            DO UPDATE SET record = EXCLUDED.record, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(record)?)
        .bind(expires_at(ttl))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> IdempotencyResult<bool> {
        // Overwrites only an expired row; a live row makes RETURNING empty
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO idempotency_keys (key, record, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key)
            DO UPDATE SET record = EXCLUDED.record, expires_at = EXCLUDED.expires_at
            WHERE idempotency_keys.expires_at <= $4
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(record)?)
        .bind(expires_at(ttl))
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }

    async fn evict_expired(&self) -> IdempotencyResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
