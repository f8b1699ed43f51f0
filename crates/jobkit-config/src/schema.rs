//! Configuration schema definitions.

use std::collections::BTreeMap;

use jobkit_protocols::{AttemptsExceededAction, JobPolicy, DEFAULT_QUEUE, DEFAULT_RETRY_ATTEMPTS};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Job policies keyed by job type.
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,

    /// Worker servers keyed by server name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolved policy for a configured job type.
    pub fn policy(&self, job_type: &str) -> Option<JobPolicy> {
        self.jobs
            .get(job_type)
            .map(|job| job.to_policy(job_type, &self.defaults))
    }

    /// All queues served by at least one server.
    pub fn served_queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self
            .servers
            .values()
            .flat_map(|server| server.queues.iter().cloned())
            .collect();
        queues.sort();
        queues.dedup();
        queues
    }
}

/// Global defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Queue for job types that configure none.
    #[serde(default = "default_queue")]
    pub queue: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
        }
    }
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

/// Policy of one job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Display name; the job type when unset.
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before each retry in seconds. Empty means one second.
    #[serde(default)]
    pub retry_delays_secs: Vec<u64>,

    #[serde(default)]
    pub on_attempts_exceeded: AttemptsExceededAction,

    /// Error kinds that fail the job without retrying.
    #[serde(default)]
    pub except_on: Vec<String>,

    /// Target queue; `defaults.queue` when unset.
    #[serde(default)]
    pub queue: Option<String>,

    #[serde(default)]
    pub log_events: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            retry_attempts: default_retry_attempts(),
            retry_delays_secs: Vec::new(),
            on_attempts_exceeded: AttemptsExceededAction::default(),
            except_on: Vec::new(),
            queue: None,
            log_events: false,
        }
    }
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

impl JobConfig {
    pub fn to_policy(&self, job_type: &str, defaults: &DefaultsConfig) -> JobPolicy {
        let display_name = self
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| job_type.to_string());
        let queue = self
            .queue
            .clone()
            .unwrap_or_else(|| defaults.queue.clone());

        self.except_on.iter().fold(
            JobPolicy::new(display_name)
                .with_retry_attempts(self.retry_attempts)
                .with_retry_delays_secs(&self.retry_delays_secs)
                .with_attempts_exceeded(self.on_attempts_exceeded)
                .with_queue(queue)
                .with_log_events(self.log_events),
            |policy, kind| policy.except_on(kind.clone()),
        )
    }
}

/// A worker server draining a set of queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_queues")]
    pub queues: Vec<String>,

    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queues: default_server_queues(),
            workers: default_workers(),
        }
    }
}

fn default_server_queues() -> Vec<String> {
    vec![DEFAULT_QUEUE.to_string()]
}

fn default_workers() -> usize {
    1
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for daily rolling log files. No file output when unset.
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "jobkit".to_string()
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
