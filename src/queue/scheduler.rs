//! Typed job queues with per-type worker pools.
//!
//! Each [`JobType`] gets its own queue, concurrency limit, and retry policy;
//! types never share worker slots. A queue's loop claims the
//! highest-priority waiting job, holds a semaphore permit for the lifetime
//! of the spawned task, and requeues failed jobs after an exponential
//! backoff delay until their attempt budget is spent, at which point the job
//! is dead-lettered into `Failed` and exposed via `get_jobs`.
//!
//! Delivery is at-least-once: processors must be idempotent or deduplicate
//! externally.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::queue::job::{generate_job_id, Job, JobHandle, JobOptions, JobStatus, JobType};
use crate::queue::metrics::{QueueCounters, QueueMetrics};
use crate::retry::RetryPolicy;

/// Handler invoked for each job of a registered type.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Process one job, returning the serialized result stored on it.
    async fn process(&self, job: &Job) -> Result<serde_json::Value, PipelineError>;
}

/// Per-type queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum jobs of this type executing concurrently.
    pub concurrency: usize,
    /// Attempt bound and backoff shape for failed jobs.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Job-level timeout; exceeding it fails the attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry: RetryPolicy::default(),
            job_timeout_ms: None,
        }
    }
}

impl QueueConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_job_timeout_ms(mut self, ms: u64) -> Self {
        self.job_timeout_ms = Some(ms);
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.concurrency == 0 {
            return Err(PipelineError::Configuration(
                "queue concurrency must be at least 1".to_string(),
            ));
        }
        self.retry.validate()
    }
}

/// Scheduler-wide configuration: per-type overrides on top of a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub default_queue: QueueConfig,
    #[serde(default)]
    pub queues: HashMap<JobType, QueueConfig>,
}

impl SchedulerConfig {
    /// Effective configuration for one queue type.
    pub fn queue(&self, job_type: JobType) -> &QueueConfig {
        self.queues.get(&job_type).unwrap_or(&self.default_queue)
    }

    pub fn with_queue(mut self, job_type: JobType, config: QueueConfig) -> Self {
        self.queues.insert(job_type, config);
        self
    }

    pub fn with_default_queue(mut self, config: QueueConfig) -> Self {
        self.default_queue = config;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.default_queue.validate()?;
        for config in self.queues.values() {
            config.validate()?;
        }
        Ok(())
    }
}

/// Mutable per-queue bookkeeping.
#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<String>,
    paused: bool,
    active: usize,
    delayed: usize,
}

struct SchedulerShared {
    config: SchedulerConfig,
    jobs: RwLock<HashMap<String, Job>>,
    // Lock order where both are needed: queues, then jobs.
    queues: RwLock<HashMap<JobType, QueueState>>,
    processors: RwLock<HashMap<JobType, Arc<dyn JobProcessor>>>,
    semaphores: HashMap<JobType, Arc<Semaphore>>,
    wakeups: HashMap<JobType, Arc<Notify>>,
    counters: HashMap<JobType, Arc<QueueCounters>>,
    shutdown: watch::Sender<bool>,
    seq: AtomicU64,
}

/// The typed multi-queue scheduler.
///
/// Cheap to clone; clones share all queue state.
#[derive(Clone)]
pub struct JobScheduler {
    shared: Arc<SchedulerShared>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut semaphores = HashMap::new();
        let mut wakeups = HashMap::new();
        let mut counters = HashMap::new();
        let mut states = HashMap::new();
        for job_type in JobType::ALL {
            let concurrency = config.queue(job_type).concurrency;
            semaphores.insert(job_type, Arc::new(Semaphore::new(concurrency)));
            wakeups.insert(job_type, Arc::new(Notify::new()));
            counters.insert(job_type, Arc::new(QueueCounters::default()));
            states.insert(job_type, QueueState::default());
        }
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(SchedulerShared {
                config,
                jobs: RwLock::new(HashMap::new()),
                queues: RwLock::new(states),
                processors: RwLock::new(HashMap::new()),
                semaphores,
                wakeups,
                counters,
                shutdown,
                seq: AtomicU64::new(0),
            }),
        })
    }

    /// Register the handler for a queue type and start its worker loop.
    /// Re-registering replaces the handler without spawning a second loop.
    pub async fn register_processor(&self, job_type: JobType, processor: Arc<dyn JobProcessor>) {
        let previous = self
            .shared
            .processors
            .write()
            .await
            .insert(job_type, processor);
        if previous.is_none() {
            tokio::spawn(run_queue(self.shared.clone(), job_type));
        }
        self.shared.wakeups[&job_type].notify_one();
    }

    /// Enqueue a job. Returns a handle usable with `get_job` / `wait_for`.
    pub async fn add_job(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobHandle, PipelineError> {
        if *self.shared.shutdown.borrow() {
            return Err(PipelineError::QueueBackend(
                "scheduler is closed".to_string(),
            ));
        }
        if options.max_attempts == Some(0) {
            return Err(PipelineError::Configuration(
                "job max_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(backoff) = &options.backoff {
            backoff.validate()?;
        }

        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
        let id = generate_job_id(seq);
        let job = Job::new(id.clone(), job_type, payload, options, seq);
        self.shared.jobs.write().await.insert(id.clone(), job);
        {
            let mut queues = self.shared.queues.write().await;
            if let Some(state) = queues.get_mut(&job_type) {
                state.waiting.push_back(id.clone());
            }
        }
        self.shared.wakeups[&job_type].notify_one();
        debug!(job = %id, queue = job_type.as_label(), "job enqueued");
        Ok(JobHandle { id, job_type })
    }

    /// Snapshot of one job, or `None` if unknown.
    pub async fn get_job(&self, id: &str) -> Option<Job> {
        let job = self.shared.jobs.read().await.get(id).cloned()?;
        Some(self.present(job).await)
    }

    /// Snapshots of a type's jobs matching any of `statuses` (all statuses
    /// when empty), in submission order, truncated to `limit`.
    pub async fn get_jobs(
        &self,
        job_type: JobType,
        statuses: &[JobStatus],
        limit: Option<usize>,
    ) -> Vec<Job> {
        let paused = {
            let queues = self.shared.queues.read().await;
            queues.get(&job_type).is_some_and(|state| state.paused)
        };
        let mut matched: Vec<Job> = {
            let jobs = self.shared.jobs.read().await;
            jobs.values()
                .filter(|job| job.job_type == job_type)
                .cloned()
                .collect()
        };
        for job in &mut matched {
            if paused && job.status == JobStatus::Waiting {
                job.status = JobStatus::Paused;
            }
        }
        matched.retain(|job| statuses.is_empty() || statuses.contains(&job.status));
        matched.sort_by_key(|job| job.seq);
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Stop dequeuing jobs of this type. Active jobs run to completion.
    pub async fn pause_queue(&self, job_type: JobType) {
        let mut queues = self.shared.queues.write().await;
        if let Some(state) = queues.get_mut(&job_type) {
            state.paused = true;
        }
        info!(queue = job_type.as_label(), "queue paused");
    }

    /// Resume dequeuing jobs of this type.
    pub async fn resume_queue(&self, job_type: JobType) {
        {
            let mut queues = self.shared.queues.write().await;
            if let Some(state) = queues.get_mut(&job_type) {
                state.paused = false;
            }
        }
        self.shared.wakeups[&job_type].notify_one();
        info!(queue = job_type.as_label(), "queue resumed");
    }

    /// Move every failed job of this type back to waiting with a fresh
    /// attempt budget. Returns the number of jobs moved.
    pub async fn retry_failed_jobs(&self, job_type: JobType) -> usize {
        let retried: Vec<String> = {
            let mut jobs = self.shared.jobs.write().await;
            let mut ids = Vec::new();
            for job in jobs.values_mut() {
                if job.job_type == job_type && job.status == JobStatus::Failed {
                    job.status = JobStatus::Waiting;
                    job.attempts_made = 0;
                    job.finished_at = None;
                    job.result = None;
                    ids.push(job.id.clone());
                }
            }
            ids
        };
        let count = retried.len();
        if count > 0 {
            {
                let mut queues = self.shared.queues.write().await;
                if let Some(state) = queues.get_mut(&job_type) {
                    for id in retried {
                        state.waiting.push_back(id);
                    }
                }
            }
            self.shared.wakeups[&job_type].notify_one();
            info!(queue = job_type.as_label(), count, "failed jobs requeued");
        }
        count
    }

    /// Drop terminal jobs of this type that finished more than `grace` ago.
    /// Returns the number removed.
    pub async fn clean_jobs(&self, job_type: JobType, grace: Duration) -> usize {
        let cutoff =
            Utc::now() - chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero());
        let mut jobs = self.shared.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.job_type == job_type
                && job.status.is_terminal()
                && job.finished_at.is_some_and(|at| at <= cutoff))
        });
        before - jobs.len()
    }

    /// Metrics for one queue, or for all queues when `job_type` is `None`.
    pub async fn queue_metrics(&self, job_type: Option<JobType>) -> Vec<QueueMetrics> {
        let queues = self.shared.queues.read().await;
        let mut out = Vec::new();
        for candidate in JobType::ALL {
            if job_type.is_some_and(|want| want != candidate) {
                continue;
            }
            let Some(state) = queues.get(&candidate) else {
                continue;
            };
            let counters = &self.shared.counters[&candidate];
            out.push(QueueMetrics {
                queue_name: candidate.as_label().to_string(),
                waiting: state.waiting.len(),
                active: state.active,
                completed: counters.completed(),
                failed: counters.failed(),
                delayed: state.delayed,
                paused: state.paused,
                error_rate: counters.error_rate(),
                avg_processing_time_ms: counters.avg_processing_time().as_millis() as u64,
            });
        }
        out
    }

    /// Block until the job reaches a terminal status, up to `limit`.
    pub async fn wait_for(&self, id: &str, limit: Duration) -> Result<Job, PipelineError> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            {
                let jobs = self.shared.jobs.read().await;
                match jobs.get(id) {
                    Some(job) if job.status.is_terminal() => return Ok(job.clone()),
                    Some(_) => {}
                    None => return Err(PipelineError::UnknownJob(id.to_string())),
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PipelineError::JobTimeout(limit));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop all queue loops. Jobs already executing run to completion;
    /// nothing further is dequeued and new submissions are rejected.
    pub fn close(&self) {
        let _ = self.shared.shutdown.send(true);
        for wakeup in self.shared.wakeups.values() {
            wakeup.notify_one();
        }
    }

    async fn present(&self, mut job: Job) -> Job {
        if job.status == JobStatus::Waiting {
            let queues = self.shared.queues.read().await;
            if queues.get(&job.job_type).is_some_and(|state| state.paused) {
                job.status = JobStatus::Paused;
            }
        }
        job
    }
}

/// One queue's dispatch loop: claim, spawn, repeat.
async fn run_queue(shared: Arc<SchedulerShared>, job_type: JobType) {
    let semaphore = shared.semaphores[&job_type].clone();
    let wakeup = shared.wakeups[&job_type].clone();
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.changed() => continue,
        };

        let claimed = loop {
            if *shutdown.borrow() {
                break None;
            }
            if let Some(id) = claim_next(&shared, job_type).await {
                break Some(id);
            }
            tokio::select! {
                _ = wakeup.notified() => {}
                _ = shutdown.changed() => {}
            }
        };
        let Some(job_id) = claimed else {
            drop(permit);
            break;
        };
        tokio::spawn(process_job(shared.clone(), job_type, job_id, permit));
    }
    debug!(queue = job_type.as_label(), "queue loop stopped");
}

/// Pop the best waiting job (lowest priority weight, then FIFO) and mark it
/// active. Returns `None` when the queue is paused or empty.
async fn claim_next(shared: &Arc<SchedulerShared>, job_type: JobType) -> Option<String> {
    let claimed = {
        let mut queues = shared.queues.write().await;
        let state = queues.get_mut(&job_type)?;
        if state.paused || state.waiting.is_empty() {
            return None;
        }
        let jobs = shared.jobs.read().await;
        let mut best: Option<(usize, (u8, u64))> = None;
        for (index, id) in state.waiting.iter().enumerate() {
            if let Some(job) = jobs.get(id) {
                let key = (job.priority.weight(), job.seq);
                if best.map_or(true, |(_, best_key)| key < best_key) {
                    best = Some((index, key));
                }
            }
        }
        drop(jobs);
        let (index, _) = best?;
        let id = state.waiting.remove(index)?;
        state.active += 1;
        id
    };

    let mut jobs = shared.jobs.write().await;
    if let Some(job) = jobs.get_mut(&claimed) {
        job.status = JobStatus::Active;
        job.started_at = Some(Utc::now());
    }
    Some(claimed)
}

/// Execute one claimed job, holding its semaphore permit for the duration.
async fn process_job(
    shared: Arc<SchedulerShared>,
    job_type: JobType,
    job_id: String,
    permit: OwnedSemaphorePermit,
) {
    let _permit = permit;
    let started = Instant::now();

    let processor = shared.processors.read().await.get(&job_type).cloned();
    let snapshot = shared.jobs.read().await.get(&job_id).cloned();
    let Some(snapshot) = snapshot else {
        decrement_active(&shared, job_type).await;
        return;
    };
    let config = shared.config.queue(job_type).clone();

    let outcome = match processor {
        None => Err(PipelineError::NoProcessor(job_type.as_label().to_string())),
        Some(processor) => {
            let timeout = snapshot
                .options
                .timeout_ms
                .or(config.job_timeout_ms)
                .map(Duration::from_millis);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, processor.process(&snapshot)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::JobTimeout(limit)),
                },
                None => processor.process(&snapshot).await,
            }
        }
    };
    let elapsed = started.elapsed();
    let counters = shared.counters[&job_type].clone();

    match outcome {
        Ok(result) => {
            // Gauges and counters settle before the terminal status becomes
            // visible to `wait_for` callers.
            decrement_active(&shared, job_type).await;
            counters.record_completion(elapsed);
            {
                let mut jobs = shared.jobs.write().await;
                if let Some(job) = jobs.get_mut(&job_id) {
                    job.status = JobStatus::Completed;
                    job.finished_at = Some(Utc::now());
                    job.result = Some(result);
                }
            }
            debug!(
                job = %job_id,
                queue = job_type.as_label(),
                elapsed_ms = elapsed.as_millis() as u64,
                "job completed"
            );
        }
        Err(err) => {
            let max_attempts = snapshot
                .options
                .max_attempts
                .unwrap_or(config.retry.max_attempts);
            let attempts_made = {
                let mut jobs = shared.jobs.write().await;
                match jobs.get_mut(&job_id) {
                    Some(job) => {
                        job.attempts_made += 1;
                        job.last_error = Some(err.to_string());
                        job.attempts_made
                    }
                    None => {
                        decrement_active(&shared, job_type).await;
                        return;
                    }
                }
            };

            if err.is_fatal() || attempts_made >= max_attempts {
                decrement_active(&shared, job_type).await;
                counters.record_failure(elapsed);
                {
                    let mut jobs = shared.jobs.write().await;
                    if let Some(job) = jobs.get_mut(&job_id) {
                        job.status = JobStatus::Failed;
                        job.finished_at = Some(Utc::now());
                    }
                }
                warn!(
                    job = %job_id,
                    queue = job_type.as_label(),
                    attempts = attempts_made,
                    error = %err,
                    "job moved to failed"
                );
            } else {
                let policy = snapshot
                    .options
                    .backoff
                    .clone()
                    .unwrap_or_else(|| config.retry.clone());
                let delay = policy.delay_for_attempt(attempts_made - 1);
                {
                    let mut jobs = shared.jobs.write().await;
                    if let Some(job) = jobs.get_mut(&job_id) {
                        job.status = JobStatus::Delayed;
                    }
                }
                {
                    let mut queues = shared.queues.write().await;
                    if let Some(state) = queues.get_mut(&job_type) {
                        state.active = state.active.saturating_sub(1);
                        state.delayed += 1;
                    }
                }
                warn!(
                    job = %job_id,
                    queue = job_type.as_label(),
                    attempt = attempts_made,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "job failed, requeueing after backoff"
                );
                let requeue_shared = shared.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    requeue(&requeue_shared, job_type, &job_id).await;
                });
            }
        }
    }
}

async fn decrement_active(shared: &Arc<SchedulerShared>, job_type: JobType) {
    let mut queues = shared.queues.write().await;
    if let Some(state) = queues.get_mut(&job_type) {
        state.active = state.active.saturating_sub(1);
    }
}

/// Move a delayed job back to waiting after its backoff elapsed.
async fn requeue(shared: &Arc<SchedulerShared>, job_type: JobType, job_id: &str) {
    {
        let mut jobs = shared.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(job) => job.status = JobStatus::Waiting,
            None => return,
        }
    }
    {
        let mut queues = shared.queues.write().await;
        if let Some(state) = queues.get_mut(&job_type) {
            state.delayed = state.delayed.saturating_sub(1);
            state.waiting.push_back(job_id.to_string());
        }
    }
    shared.wakeups[&job_type].notify_one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::job::JobPriority;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// Fails the first `fail_times` calls, then succeeds.
    struct ScriptedProcessor {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl ScriptedProcessor {
        fn failing(fail_times: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_times,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl JobProcessor for ScriptedProcessor {
        async fn process(&self, _job: &Job) -> Result<serde_json::Value, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(PipelineError::Processor(format!("scripted failure {call}")))
            } else {
                Ok(serde_json::json!({ "call": call }))
            }
        }
    }

    /// Records the order jobs were processed in.
    struct OrderProcessor {
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobProcessor for OrderProcessor {
        async fn process(&self, job: &Job) -> Result<serde_json::Value, PipelineError> {
            self.order.lock().unwrap().push(job.id.clone());
            Ok(serde_json::Value::Null)
        }
    }

    fn fast_scheduler() -> JobScheduler {
        let config = SchedulerConfig::default().with_default_queue(
            QueueConfig::default().with_retry(
                RetryPolicy::default()
                    .with_initial_delay_ms(5)
                    .with_max_delay_ms(20)
                    .with_jitter_factor(0.0),
            ),
        );
        JobScheduler::new(config).unwrap()
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = SchedulerConfig::default()
            .with_queue(JobType::Notification, QueueConfig::default().with_concurrency(0));
        assert!(matches!(
            JobScheduler::new(config),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_job_completes_and_stores_result() {
        let scheduler = fast_scheduler();
        scheduler
            .register_processor(JobType::Notification, ScriptedProcessor::failing(0))
            .await;
        let handle = scheduler
            .add_job(
                JobType::Notification,
                serde_json::json!({"target": "slack"}),
                JobOptions::default(),
            )
            .await
            .unwrap();
        let job = scheduler
            .wait_for(&handle.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts_made, 0);
        assert_eq!(job.result, Some(serde_json::json!({ "call": 0 })));
        scheduler.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_retries_then_succeeds() {
        let scheduler = fast_scheduler();
        let processor = ScriptedProcessor::failing(2);
        scheduler
            .register_processor(JobType::CodeAnalysis, processor.clone())
            .await;
        let handle = scheduler
            .add_job(
                JobType::CodeAnalysis,
                serde_json::Value::Null,
                JobOptions::default().with_max_attempts(3),
            )
            .await
            .unwrap();
        let job = scheduler
            .wait_for(&handle.id, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        // Two recorded retries before the successful third attempt.
        assert_eq!(job.attempts_made, 2);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        scheduler.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_job_is_dead_lettered() {
        let scheduler = fast_scheduler();
        let processor = ScriptedProcessor::failing(u32::MAX);
        scheduler
            .register_processor(JobType::FixGeneration, processor.clone())
            .await;
        let handle = scheduler
            .add_job(
                JobType::FixGeneration,
                serde_json::Value::Null,
                JobOptions::default().with_max_attempts(3),
            )
            .await
            .unwrap();
        let job = scheduler
            .wait_for(&handle.id, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts_made, 3);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert!(job.last_error.unwrap().contains("scripted failure"));

        let failed = scheduler
            .get_jobs(JobType::FixGeneration, &[JobStatus::Failed], None)
            .await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, handle.id);
        scheduler.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failed_jobs_requeues_with_fresh_budget() {
        let scheduler = fast_scheduler();
        // Fails once; the first run exhausts a 1-attempt budget, the
        // retried run succeeds.
        let processor = ScriptedProcessor::failing(1);
        scheduler
            .register_processor(JobType::CommentPosting, processor)
            .await;
        let handle = scheduler
            .add_job(
                JobType::CommentPosting,
                serde_json::Value::Null,
                JobOptions::default().with_max_attempts(1),
            )
            .await
            .unwrap();
        let job = scheduler
            .wait_for(&handle.id, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);

        let retried = scheduler.retry_failed_jobs(JobType::CommentPosting).await;
        assert_eq!(retried, 1);
        let job = scheduler
            .wait_for(&handle.id, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        scheduler.close();
    }

    #[tokio::test]
    async fn test_paused_queue_blocks_dequeue() {
        let scheduler = fast_scheduler();
        scheduler
            .register_processor(JobType::Notification, ScriptedProcessor::failing(0))
            .await;
        scheduler.pause_queue(JobType::Notification).await;
        let handle = scheduler
            .add_job(
                JobType::Notification,
                serde_json::Value::Null,
                JobOptions::default(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let job = scheduler.get_job(&handle.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Paused);

        scheduler.resume_queue(JobType::Notification).await;
        let job = scheduler
            .wait_for(&handle.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        scheduler.close();
    }

    #[tokio::test]
    async fn test_critical_jobs_dequeue_before_low() {
        let config = SchedulerConfig::default().with_queue(
            JobType::PrAnalysis,
            QueueConfig::default().with_concurrency(1),
        );
        let scheduler = JobScheduler::new(config).unwrap();
        let processor = Arc::new(OrderProcessor {
            order: Mutex::new(Vec::new()),
        });
        scheduler
            .register_processor(JobType::PrAnalysis, processor.clone())
            .await;

        // Enqueue while paused so priorities decide the drain order.
        scheduler.pause_queue(JobType::PrAnalysis).await;
        let low = scheduler
            .add_job(
                JobType::PrAnalysis,
                serde_json::Value::Null,
                JobOptions::default().with_priority(JobPriority::Low),
            )
            .await
            .unwrap();
        let critical = scheduler
            .add_job(
                JobType::PrAnalysis,
                serde_json::Value::Null,
                JobOptions::default().with_priority(JobPriority::Critical),
            )
            .await
            .unwrap();
        scheduler.resume_queue(JobType::PrAnalysis).await;

        scheduler
            .wait_for(&low.id, Duration::from_secs(5))
            .await
            .unwrap();
        scheduler
            .wait_for(&critical.id, Duration::from_secs(5))
            .await
            .unwrap();
        let order = processor.order.lock().unwrap().clone();
        assert_eq!(order, vec![critical.id, low.id]);
        scheduler.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_timeout_fails_the_attempt() {
        struct SlowProcessor;
        #[async_trait]
        impl JobProcessor for SlowProcessor {
            async fn process(&self, _job: &Job) -> Result<serde_json::Value, PipelineError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(serde_json::Value::Null)
            }
        }

        let scheduler = fast_scheduler();
        scheduler
            .register_processor(JobType::CostTracking, Arc::new(SlowProcessor))
            .await;
        let handle = scheduler
            .add_job(
                JobType::CostTracking,
                serde_json::Value::Null,
                JobOptions::default()
                    .with_max_attempts(1)
                    .with_timeout_ms(50),
            )
            .await
            .unwrap();
        let job = scheduler
            .wait_for(&handle.id, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.last_error.unwrap().contains("timed out"));
        scheduler.close();
    }

    #[tokio::test]
    async fn test_queue_metrics_reflect_outcomes() {
        let scheduler = fast_scheduler();
        scheduler
            .register_processor(JobType::Notification, ScriptedProcessor::failing(0))
            .await;
        let ok = scheduler
            .add_job(
                JobType::Notification,
                serde_json::Value::Null,
                JobOptions::default(),
            )
            .await
            .unwrap();
        scheduler
            .wait_for(&ok.id, Duration::from_secs(5))
            .await
            .unwrap();

        let metrics = scheduler.queue_metrics(Some(JobType::Notification)).await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].queue_name, "notification");
        assert_eq!(metrics[0].completed, 1);
        assert_eq!(metrics[0].failed, 0);
        assert_eq!(metrics[0].waiting, 0);
        assert_eq!(metrics[0].error_rate, 0.0);

        let all = scheduler.queue_metrics(None).await;
        assert_eq!(all.len(), JobType::ALL.len());
        scheduler.close();
    }

    #[tokio::test]
    async fn test_clean_jobs_removes_old_terminal_jobs() {
        let scheduler = fast_scheduler();
        scheduler
            .register_processor(JobType::Notification, ScriptedProcessor::failing(0))
            .await;
        let handle = scheduler
            .add_job(
                JobType::Notification,
                serde_json::Value::Null,
                JobOptions::default(),
            )
            .await
            .unwrap();
        scheduler
            .wait_for(&handle.id, Duration::from_secs(5))
            .await
            .unwrap();

        // Grace longer than the job's age keeps it.
        assert_eq!(
            scheduler
                .clean_jobs(JobType::Notification, Duration::from_secs(3600))
                .await,
            0
        );
        // Zero grace removes every finished job.
        assert_eq!(
            scheduler
                .clean_jobs(JobType::Notification, Duration::ZERO)
                .await,
            1
        );
        assert!(scheduler.get_job(&handle.id).await.is_none());
        scheduler.close();
    }

    #[tokio::test]
    async fn test_closed_scheduler_rejects_submissions() {
        let scheduler = fast_scheduler();
        scheduler.close();
        let result = scheduler
            .add_job(
                JobType::Notification,
                serde_json::Value::Null,
                JobOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(PipelineError::QueueBackend(_))));
    }
}
