//! Typed job queues and the scheduler driving them.
//!
//! State machine per job: `Waiting → Active → {Completed | Delayed →
//! Waiting | Failed}`. Queue-level pause blocks dequeue without touching
//! per-job state. See [`scheduler::JobScheduler`] for the operations.

mod job;
mod metrics;
mod scheduler;

pub use job::{Job, JobHandle, JobOptions, JobPriority, JobStatus, JobType};
pub use metrics::{QueueCounters, QueueMetrics};
pub use scheduler::{JobProcessor, JobScheduler, QueueConfig, SchedulerConfig};
