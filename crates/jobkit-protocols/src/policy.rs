//! Per-job-type execution policy.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue used when neither the caller nor the policy names one.
pub const DEFAULT_QUEUE: &str = "default";

/// Retry attempts of a job type without an explicit policy.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What happens once retry attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptsExceededAction {
    /// The job stays in the failed state.
    #[default]
    Fail,
    /// The job is deleted.
    Delete,
}

/// Retry, queue and logging configuration bound to a job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPolicy {
    /// Human-readable job name.
    pub display_name: String,

    /// Number of retries after the first failed attempt.
    pub retry_attempts: u32,

    /// Delay before retry `k`; the last entry repeats beyond the end. Never empty.
    /// Whole seconds, the unit persisted in job parameters.
    pub retry_delays: Vec<Duration>,

    /// Terminal action once attempts are exhausted.
    pub on_attempts_exceeded: AttemptsExceededAction,

    /// Error kinds that fail the job without retrying.
    pub except_on: BTreeSet<String>,

    /// Target queue.
    pub queue: String,

    /// Whether start and completion events are logged.
    pub log_events: bool,
}

impl JobPolicy {
    /// Default policy with the given display name.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delays: vec![DEFAULT_RETRY_DELAY],
            on_attempts_exceeded: AttemptsExceededAction::Fail,
            except_on: BTreeSet::new(),
            queue: DEFAULT_QUEUE.to_string(),
            log_events: false,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the retry delay sequence. An empty sequence becomes `[1s]`.
    ///
    /// Delays are persisted in whole seconds, so sub-second parts round up.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = if delays.is_empty() {
            vec![DEFAULT_RETRY_DELAY]
        } else {
            delays
                .into_iter()
                .map(|d| Duration::from_secs(whole_secs(d)))
                .collect()
        };
        self
    }

    /// Set the retry delay sequence in whole seconds.
    pub fn with_retry_delays_secs(self, delays: &[u64]) -> Self {
        self.with_retry_delays(delays.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    pub fn with_attempts_exceeded(mut self, action: AttemptsExceededAction) -> Self {
        self.on_attempts_exceeded = action;
        self
    }

    /// Exclude an error kind from retrying.
    pub fn except_on(mut self, kind: impl Into<String>) -> Self {
        self.except_on.insert(kind.into());
        self
    }

    /// Set the queue. An empty name keeps the default queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        self.queue = if queue.trim().is_empty() {
            DEFAULT_QUEUE.to_string()
        } else {
            queue
        };
        self
    }

    pub fn with_log_events(mut self, log_events: bool) -> Self {
        self.log_events = log_events;
        self
    }

    /// Delay before the retry following failed attempt `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_delays
            .get(attempt as usize)
            .or_else(|| self.retry_delays.last())
            .copied()
            .unwrap_or(DEFAULT_RETRY_DELAY)
    }

    /// Whether failures of this kind skip retrying.
    pub fn is_excluded(&self, kind: &str) -> bool {
        self.except_on.contains(kind)
    }

    /// Retry delays in whole seconds, as persisted in job parameters.
    pub fn retry_delays_secs(&self) -> Vec<u64> {
        self.retry_delays.iter().copied().map(whole_secs).collect()
    }
}

fn whole_secs(delay: Duration) -> u64 {
    if delay.subsec_nanos() > 0 {
        delay.as_secs().saturating_add(1)
    } else {
        delay.as_secs()
    }
}
