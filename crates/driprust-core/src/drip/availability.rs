//! Availability lookup consulted by steps that advertise open slots

use async_trait::async_trait;
use driprust_common::types::TenantId;

/// Supplies the `{{availability}}` template variable for steps flagged
/// with an availability check. Lookup failure is not fatal; the step
/// falls back to its fallback template when one is configured.
#[async_trait]
pub trait AvailabilityChecker: Send + Sync {
    /// Human-readable summary of upcoming availability for a category
    async fn availability_summary(
        &self,
        tenant_id: TenantId,
        category: &str,
    ) -> anyhow::Result<String>;
}
