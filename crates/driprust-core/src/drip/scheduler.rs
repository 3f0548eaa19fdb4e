//! Scheduling adapter - delayed invocations of the engine's entry points
//!
//! The engine owns no timers. Every "wait N minutes" is a task submitted
//! to an external scheduler that calls back after the delay. Delivery is
//! at-least-once; submissions for the same enrollment are FIFO.

use async_trait::async_trait;
use chrono::Duration;
use driprust_common::types::{EnrollmentId, TenantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A delayed invocation payload.
///
/// Step advancement and resume-checks are distinct task kinds so the
/// engine's transition table stays exhaustive; the payload carries only
/// identifiers, never state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DripTask {
    /// Advance the enrollment to its next step
    AdvanceStep {
        tenant_id: TenantId,
        enrollment_id: EnrollmentId,
    },
    /// Re-evaluate a responded enrollment that may have gone quiet
    ResumeCheck {
        tenant_id: TenantId,
        enrollment_id: EnrollmentId,
    },
}

impl DripTask {
    /// Task kind name, as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            DripTask::AdvanceStep { .. } => "advance_step",
            DripTask::ResumeCheck { .. } => "resume_check",
        }
    }

    /// The enrollment this task targets
    pub fn enrollment_id(&self) -> EnrollmentId {
        match self {
            DripTask::AdvanceStep { enrollment_id, .. } => *enrollment_id,
            DripTask::ResumeCheck { enrollment_id, .. } => *enrollment_id,
        }
    }
}

/// Opaque handle returned by the scheduler, kept for bookkeeping and
/// repair visibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

/// Scheduler adapter errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler rejected submission: {0}")]
    Rejected(String),

    #[error("Scheduler unavailable: {0}")]
    Unavailable(String),
}

/// Delayed-task submission capability
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Submit a task for delivery after the given delay
    async fn submit(&self, task: DripTask, delay: Duration) -> Result<TaskHandle, SchedulerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_task_serde_roundtrip() {
        let task = DripTask::ResumeCheck {
            tenant_id: uuid::Uuid::new_v4(),
            enrollment_id: uuid::Uuid::new_v4(),
        };

        let encoded = serde_json::to_value(&task).unwrap();
        assert_eq!(encoded["kind"], "resume_check");

        let decoded: DripTask = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, task);
        assert_eq!(decoded.kind(), "resume_check");
    }
}
