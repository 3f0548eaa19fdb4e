//! Consent repositories - do-not-contact and opt-in registries

use crate::db::DatabasePool;
use async_trait::async_trait;
use driprust_common::types::TenantId;
use driprust_common::{Error, Result};
use uuid::Uuid;

/// Yes/no consent predicates the engine checks before every send
#[async_trait]
pub trait ConsentRegistry: Send + Sync {
    /// Whether the number is on the do-not-contact registry
    async fn is_dnc(&self, tenant_id: TenantId, phone: &str) -> Result<bool>;

    /// Whether the number has an opt-in on record
    async fn is_opted_in(&self, tenant_id: TenantId, phone: &str) -> Result<bool>;

    /// Record an opt-in with the method that granted it
    /// (e.g. `implied:voice_call`)
    async fn record_opt_in(&self, tenant_id: TenantId, phone: &str, method: &str) -> Result<()>;
}

/// Database consent registry
pub struct DbConsentRegistry {
    pool: DatabasePool,
}

impl DbConsentRegistry {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConsentRegistry for DbConsentRegistry {
    async fn is_dnc(&self, tenant_id: TenantId, phone: &str) -> Result<bool> {
        let result: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM dnc_entries WHERE tenant_id = $1 AND phone = $2)",
        )
        .bind(tenant_id)
        .bind(phone)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.0)
    }

    async fn is_opted_in(&self, tenant_id: TenantId, phone: &str) -> Result<bool> {
        let result: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM opt_ins WHERE tenant_id = $1 AND phone = $2)",
        )
        .bind(tenant_id)
        .bind(phone)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.0)
    }

    async fn record_opt_in(&self, tenant_id: TenantId, phone: &str, method: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO opt_ins (id, tenant_id, phone, method)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, phone) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(phone)
        .bind(method)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}
