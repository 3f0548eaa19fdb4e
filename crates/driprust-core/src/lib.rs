//! DripRust Core - Drip campaign lifecycle engine
//!
//! This crate provides the drip campaign engine: enrollment, time-delayed
//! step advancement, inbound-response classification and branching, and
//! cancellation/resume semantics. Message transport, delayed scheduling,
//! and free-text classification are consumed through boundary traits.

pub mod drip;

pub use drip::{
    AdvanceOutcome, AvailabilityChecker, DripEngine, DripError, DripTask, FreeTextClassifier,
    MessageSender, QuietHours, ResponseClassifier, ResponseOutcome, SchedulerError, SendError,
    SendReceipt, TaskHandle, TaskScheduler, TemplateRenderer,
};
