//! # TabPilot Work Queue
//!
//! Durable task queue for automated engine queries.
//!
//! ## Features
//!
//! - FIFO-with-delay claim order (no priorities)
//! - Error classification into captcha / login / retryable / skip
//! - Exponential backoff with a capped delay
//! - Persistence of the live (pending/running) subset with startup recovery
//! - Scheduler loop gated by a concurrency cap
//! - Result submission to an external sink

pub mod classifier;
pub mod config;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod task;

pub use classifier::{classify, ErrorCategory};
pub use config::{QueueConfig, SchedulerConfig};
pub use error::QueueError;
pub use queue::{FailureOutcome, QueueStats, TaskQueue};
pub use scheduler::{Scheduler, TaskHandler};
pub use sink::{submit_results, JsonlResultSink, MemoryResultSink, ResultSink};
pub use store::{FileTaskStore, MemoryTaskStore, TaskStore};
pub use task::{Citation, ManagedTask, QueryTask, TaskOutput, TaskResult, TaskStatus};
