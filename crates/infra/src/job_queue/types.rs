//! Core job types and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::JobQueueError;

/// Unique job identifier, assigned once a strategy persists the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed
    Running,
    Completed,
    /// Failed with no retries left
    Failed,
    /// Cancelled by user/system
    Cancelled,
    /// Failed, will be picked up again once `scheduled_at` passes
    Retrying,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
            JobState::Retrying => "RETRYING",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

impl std::str::FromStr for JobState {
    type Err = JobQueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "COMPLETED" => Ok(JobState::Completed),
            "FAILED" => Ok(JobState::Failed),
            "CANCELLED" => Ok(JobState::Cancelled),
            "RETRYING" => Ok(JobState::Retrying),
            other => Err(JobQueueError::Serialization(format!("unknown job state: {other}"))),
        }
    }
}

/// Per-job submission options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// How many times a failed job is retried (total attempts = retries + 1).
    pub retries: u32,
}

impl JobOptions {
    pub fn with_retries(retries: u32) -> Self {
        Self { retries }
    }
}

/// One unit of asynchronous work on a named queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// `None` until a strategy persists the job (buffered jobs have no id).
    pub id: Option<JobId>,
    pub queue_name: String,
    /// JSON payload
    pub data: serde_json::Value,
    pub state: JobState,
    /// 0..=100
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retries: u32,
    /// Number of times execution has started.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Earliest time the job may be claimed (retry backoff).
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(queue_name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: None,
            queue_name: queue_name.into(),
            data,
            state: JobState::Pending,
            progress: 0,
            result: None,
            error: None,
            retries: 0,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            settled_at: None,
            scheduled_at: None,
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.retries = options.retries;
        self
    }

    /// Decode the payload into a typed value.
    pub fn data_as<D: DeserializeOwned>(&self) -> Result<D, JobQueueError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| JobQueueError::Serialization(e.to_string()))
    }

    pub fn is_settled(&self) -> bool {
        self.state.is_settled()
    }

    /// Ready to be claimed: pending or retrying, and not scheduled in the future.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, JobState::Pending | JobState::Retrying)
            && self.scheduled_at.is_none_or(|at| at <= now)
    }

    /// Time spent executing so far (or in total once settled).
    pub fn duration(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        let end = self.settled_at.unwrap_or_else(Utc::now);
        Some(end - started)
    }

    pub fn set_progress(&mut self, percent: u8) {
        self.progress = percent.min(100);
    }

    pub fn start(&mut self) {
        self.state = JobState::Running;
        self.attempts += 1;
        self.started_at = Some(Utc::now());
        self.scheduled_at = None;
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        self.state = JobState::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        self.settled_at = Some(Utc::now());
    }

    /// Record a failed attempt.
    ///
    /// Moves to `Retrying` while attempts remain, `Failed` (settled) otherwise.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.progress = 0;
        if self.attempts <= self.retries {
            self.state = JobState::Retrying;
        } else {
            self.state = JobState::Failed;
            self.settled_at = Some(Utc::now());
        }
    }

    /// Delay the next claim of a retrying job.
    pub fn schedule_retry(&mut self, delay: Duration) {
        if self.state == JobState::Retrying {
            self.scheduled_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        }
    }

    /// Cancel an unsettled job. Returns `false` when already settled.
    pub fn cancel(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        self.state = JobState::Cancelled;
        self.settled_at = Some(Utc::now());
        true
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt-1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "exponential" => Ok(BackoffStrategy::Exponential),
            "linear" => Ok(BackoffStrategy::Linear),
            other => Err(format!("unknown backoff strategy: {other}")),
        }
    }
}

/// Delay schedule between retry attempts.
///
/// How many retries happen is decided per job (`Job::retries`); the policy
/// only decides how long to wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately.
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay before the retry following `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1).min(30) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * (attempt as f64)).min(max_ms),
        };

        // Deterministic jitter derived from the attempt number.
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }
}
