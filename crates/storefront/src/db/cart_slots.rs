//! Cart slots in `storefront.cart_slot`.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::cart::{CartStorage, StorageError};

/// [`CartStorage`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgCartStorage {
    pool: PgPool,
}

impl PgCartStorage {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStorage for PgCartStorage {
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload::text FROM storefront.cart_slot WHERE slot = $1")
                .bind(slot)
                .fetch_optional(&self.pool)
                .await?;
        Ok(payload)
    }

    async fn store(&self, slot: &str, payload: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO storefront.cart_slot (slot, payload, updated_at)
            VALUES ($1, $2::jsonb, now())
            ON CONFLICT (slot)
            DO UPDATE SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(slot)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
