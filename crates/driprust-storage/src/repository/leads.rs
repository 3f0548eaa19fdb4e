//! Lead directory repository

use crate::db::DatabasePool;
use crate::models::Lead;
use async_trait::async_trait;
use driprust_common::types::{LeadId, TenantId};
use driprust_common::{Error, Result};

/// Read access to lead records
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    /// Load a lead by id; soft-deleted leads are not returned
    async fn get(&self, tenant_id: TenantId, lead_id: LeadId) -> Result<Option<Lead>>;
}

/// Database lead directory
pub struct DbLeadDirectory {
    pool: DatabasePool,
}

impl DbLeadDirectory {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadDirectory for DbLeadDirectory {
    async fn get(&self, tenant_id: TenantId, lead_id: LeadId) -> Result<Option<Lead>> {
        sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE id = $1 AND tenant_id = $2 AND NOT deleted",
        )
        .bind(lead_id)
        .bind(tenant_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
