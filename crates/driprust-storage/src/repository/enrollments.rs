//! Enrollment store repository
//!
//! All mutations are guarded UPDATEs: the current status (and, for step
//! advancement, the current step) appears in the WHERE clause, and the
//! `rows_affected()` count is the compare-and-swap verdict. Two racing
//! invocations for the same enrollment cannot both win.

use crate::db::DatabasePool;
use crate::models::{CreateEnrollment, Enrollment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use driprust_common::types::{CancelReason, EnrollmentId, LeadId, TenantId};
use driprust_common::{Error, Result};
use uuid::Uuid;

/// Persistence contract for enrollment state
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Insert a new active enrollment at step 0.
    ///
    /// Returns `None` when the lead already has a live enrollment for the
    /// tenant (the partial unique index rejects the row).
    async fn create(&self, input: CreateEnrollment) -> Result<Option<Enrollment>>;

    /// Load an enrollment by id
    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>>;

    /// Find the lead's active-or-responded enrollment, if any
    async fn find_live_by_lead(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
    ) -> Result<Option<Enrollment>>;

    /// Advance the step counter after a successful send, staying active.
    /// CAS on (status = active, current_step = from_step).
    async fn record_advance(
        &self,
        id: EnrollmentId,
        from_step: i32,
        to_step: i32,
        handle: Option<&str>,
        next_step_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Advance onto the final step and complete in one transition.
    /// CAS on (status = active, current_step = from_step).
    async fn complete_final_step(
        &self,
        id: EnrollmentId,
        from_step: i32,
        to_step: i32,
    ) -> Result<bool>;

    /// Replace the pending schedule bookkeeping without touching the step.
    /// This is the quiet-hours deferral write; guarded on status = active.
    async fn set_schedule(
        &self,
        id: EnrollmentId,
        handle: Option<&str>,
        next_step_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Transition a live enrollment to responded, recording the category
    /// and the resume-check bookkeeping.
    async fn mark_responded(
        &self,
        id: EnrollmentId,
        category: &str,
        handle: Option<&str>,
        resume_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Record the classified category on a live enrollment without any
    /// status change
    async fn record_response_category(&self, id: EnrollmentId, category: &str) -> Result<bool>;

    /// Transition responded back to active for resumed step advancement
    async fn reactivate(&self, id: EnrollmentId) -> Result<bool>;

    /// Transition a live enrollment to completed
    async fn complete(&self, id: EnrollmentId, category: Option<&str>) -> Result<bool>;

    /// Transition a live enrollment to cancelled with a recorded reason
    async fn cancel(&self, id: EnrollmentId, reason: CancelReason) -> Result<bool>;

    /// Cancel every live enrollment for a lead; returns the count affected
    async fn cancel_all_for_lead(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        reason: CancelReason,
    ) -> Result<u64>;
}

/// Database enrollment store
pub struct DbEnrollmentStore {
    pool: DatabasePool,
}

impl DbEnrollmentStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentStore for DbEnrollmentStore {
    async fn create(&self, input: CreateEnrollment) -> Result<Option<Enrollment>> {
        let id = Uuid::new_v4();
        let context = serde_json::to_value(&input.context)
            .map_err(|e| Error::Internal(format!("Failed to encode enrollment context: {}", e)))?;

        sqlx::query_as::<_, Enrollment>(
            r#"
            INSERT INTO enrollments (id, tenant_id, campaign_id, lead_id, status, current_step, context)
            VALUES ($1, $2, $3, $4, 'active', 0, $5)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.tenant_id)
        .bind(input.campaign_id)
        .bind(input.lead_id)
        .bind(&context)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_live_by_lead(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
    ) -> Result<Option<Enrollment>> {
        sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT * FROM enrollments
            WHERE tenant_id = $1 AND lead_id = $2 AND status IN ('active', 'responded')
            "#,
        )
        .bind(tenant_id)
        .bind(lead_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn record_advance(
        &self,
        id: EnrollmentId,
        from_step: i32,
        to_step: i32,
        handle: Option<&str>,
        next_step_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                current_step = $3,
                pending_schedule_handle = $4,
                next_step_at = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active' AND current_step = $2
            "#,
        )
        .bind(id)
        .bind(from_step)
        .bind(to_step)
        .bind(handle)
        .bind(next_step_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_final_step(
        &self,
        id: EnrollmentId,
        from_step: i32,
        to_step: i32,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                status = 'completed',
                current_step = $3,
                pending_schedule_handle = NULL,
                next_step_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active' AND current_step = $2
            "#,
        )
        .bind(id)
        .bind(from_step)
        .bind(to_step)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_schedule(
        &self,
        id: EnrollmentId,
        handle: Option<&str>,
        next_step_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                pending_schedule_handle = $2,
                next_step_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(handle)
        .bind(next_step_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_responded(
        &self,
        id: EnrollmentId,
        category: &str,
        handle: Option<&str>,
        resume_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                status = 'responded',
                last_response_category = $2,
                pending_schedule_handle = $3,
                next_step_at = $4,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'responded')
            "#,
        )
        .bind(id)
        .bind(category)
        .bind(handle)
        .bind(resume_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_response_category(&self, id: EnrollmentId, category: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                last_response_category = $2,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'responded')
            "#,
        )
        .bind(id)
        .bind(category)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn reactivate(&self, id: EnrollmentId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                status = 'active',
                pending_schedule_handle = NULL,
                next_step_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'responded'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, id: EnrollmentId, category: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                status = 'completed',
                last_response_category = COALESCE($2, last_response_category),
                pending_schedule_handle = NULL,
                next_step_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'responded')
            "#,
        )
        .bind(id)
        .bind(category)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, id: EnrollmentId, reason: CancelReason) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                status = 'cancelled',
                cancel_reason = $2,
                pending_schedule_handle = NULL,
                next_step_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'responded')
            "#,
        )
        .bind(id)
        .bind(reason.to_string())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_all_for_lead(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        reason: CancelReason,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                status = 'cancelled',
                cancel_reason = $3,
                pending_schedule_handle = NULL,
                next_step_at = NULL,
                updated_at = NOW()
            WHERE tenant_id = $1 AND lead_id = $2 AND status IN ('active', 'responded')
            "#,
        )
        .bind(tenant_id)
        .bind(lead_id)
        .bind(reason.to_string())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
