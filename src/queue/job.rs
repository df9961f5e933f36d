//! Job records and submission types.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// The typed queues the scheduler manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    PrAnalysis,
    CodeAnalysis,
    FixGeneration,
    Notification,
    CommentPosting,
    CostTracking,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::PrAnalysis,
        JobType::CodeAnalysis,
        JobType::FixGeneration,
        JobType::Notification,
        JobType::CommentPosting,
        JobType::CostTracking,
    ];

    pub fn as_label(&self) -> &'static str {
        match self {
            JobType::PrAnalysis => "pr-analysis",
            JobType::CodeAnalysis => "code-analysis",
            JobType::FixGeneration => "fix-generation",
            JobType::Notification => "notification",
            JobType::CommentPosting => "comment-posting",
            JobType::CostTracking => "cost-tracking",
        }
    }
}

/// Submission priority. Lower weight dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Critical,
    High,
    Normal,
    Low,
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl JobPriority {
    /// Numeric weight: critical=1, high=10, normal=20, low=30.
    pub fn weight(&self) -> u8 {
        match self {
            JobPriority::Critical => 1,
            JobPriority::High => 10,
            JobPriority::Normal => 20,
            JobPriority::Low => 30,
        }
    }
}

/// Lifecycle state of a job.
///
/// `Paused` is reported for waiting jobs whose queue is paused; the pause
/// itself is a queue-level flag, not a per-job transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Paused,
}

impl JobStatus {
    /// Whether the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Per-job options supplied at submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub priority: JobPriority,
    /// Overrides the queue's attempt bound when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Overrides the queue's backoff policy when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<RetryPolicy>,
    /// Overrides the queue's job timeout when set, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl JobOptions {
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_backoff(mut self, policy: RetryPolicy) -> Self {
        self.backoff = Some(policy);
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

/// One unit of queued work. Owned exclusively by the scheduler and mutated
/// only by queue operations; callers see snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: JobPriority,
    pub attempts_made: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub options: JobOptions,
    /// Submission sequence, used as the FIFO tie-break within a priority.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl Job {
    pub(crate) fn new(
        id: String,
        job_type: JobType,
        payload: serde_json::Value,
        options: JobOptions,
        seq: u64,
    ) -> Self {
        Self {
            id,
            job_type,
            payload,
            priority: options.priority,
            attempts_made: 0,
            status: JobStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_error: None,
            result: None,
            options,
            seq,
        }
    }
}

/// Handle returned from job submission.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: String,
    pub job_type: JobType,
}

/// Timestamp + sequence job ID, unique within a process.
pub(crate) fn generate_job_id(seq: u64) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("job-{millis}-{seq}")
}
