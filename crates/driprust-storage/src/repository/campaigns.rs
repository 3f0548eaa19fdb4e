//! Campaign catalog repository

use crate::db::DatabasePool;
use crate::models::{CampaignDefinition, CampaignStep, DripCampaign};
use async_trait::async_trait;
use driprust_common::types::{CampaignId, TenantId};
use driprust_common::{Error, Result};
use tracing::debug;

/// Read-only view of campaign definitions, as the engine sees them
#[async_trait]
pub trait CampaignCatalog: Send + Sync {
    /// Find the enabled campaign for a (tenant, category) pair.
    ///
    /// Campaigns with zero steps are treated as absent.
    async fn find_enabled(
        &self,
        tenant_id: TenantId,
        category: &str,
    ) -> Result<Option<CampaignDefinition>>;

    /// Load a campaign definition by id, enabled or not
    async fn get(&self, campaign_id: CampaignId) -> Result<Option<CampaignDefinition>>;
}

/// Database campaign catalog
pub struct DbCampaignCatalog {
    pool: DatabasePool,
}

impl DbCampaignCatalog {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn load_definition(&self, campaign: DripCampaign) -> Result<CampaignDefinition> {
        let steps = sqlx::query_as::<_, CampaignStep>(
            r#"
            SELECT * FROM campaign_steps
            WHERE campaign_id = $1
            ORDER BY step_number ASC
            "#,
        )
        .bind(campaign.id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let response_rules = campaign.response_rules()?;

        Ok(CampaignDefinition {
            campaign,
            steps,
            response_rules,
        })
    }
}

#[async_trait]
impl CampaignCatalog for DbCampaignCatalog {
    async fn find_enabled(
        &self,
        tenant_id: TenantId,
        category: &str,
    ) -> Result<Option<CampaignDefinition>> {
        let campaign = sqlx::query_as::<_, DripCampaign>(
            "SELECT * FROM drip_campaigns WHERE tenant_id = $1 AND category = $2 AND enabled",
        )
        .bind(tenant_id)
        .bind(category)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some(campaign) = campaign else {
            return Ok(None);
        };

        let definition = self.load_definition(campaign).await?;
        if definition.steps.is_empty() {
            debug!(
                campaign_id = %definition.campaign.id,
                "Campaign has no steps, treating as absent"
            );
            return Ok(None);
        }

        Ok(Some(definition))
    }

    async fn get(&self, campaign_id: CampaignId) -> Result<Option<CampaignDefinition>> {
        let campaign =
            sqlx::query_as::<_, DripCampaign>("SELECT * FROM drip_campaigns WHERE id = $1")
                .bind(campaign_id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        match campaign {
            Some(campaign) => Ok(Some(self.load_definition(campaign).await?)),
            None => Ok(None),
        }
    }
}
