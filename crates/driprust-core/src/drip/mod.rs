//! Drip Campaign Module - enrollment lifecycle and scheduled advancement

mod availability;
mod classify;
mod engine;
mod quiet_hours;
mod scheduler;
mod sender;
mod template;

pub use availability::AvailabilityChecker;
pub use classify::{FreeTextClassifier, ResponseClassifier, OTHER_CATEGORY};
pub use engine::{AdvanceOutcome, DripEngine, DripError, ResponseOutcome, SMS_CHANNEL};
pub use quiet_hours::QuietHours;
pub use scheduler::{DripTask, SchedulerError, TaskHandle, TaskScheduler};
pub use sender::{MessageSender, SendError, SendReceipt};
pub use template::TemplateRenderer;
