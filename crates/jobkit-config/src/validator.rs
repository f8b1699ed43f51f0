//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Retry counts above this are reported as a warning.
const MAX_REASONABLE_RETRIES: u32 = 100;

/// Retry delays above one day are reported as a warning.
const MAX_REASONABLE_DELAY_SECS: u64 = 24 * 60 * 60;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_defaults(config, &mut result);
        Self::validate_jobs(config, &mut result);
        Self::validate_servers(config, &mut result);

        Ok(result)
    }

    fn validate_defaults(config: &Config, result: &mut ValidationResult) {
        if config.defaults.queue.trim().is_empty() {
            result.add_error(ValidationError::new(
                "defaults.queue",
                "Default queue cannot be empty",
            ));
        }
    }

    fn validate_jobs(config: &Config, result: &mut ValidationResult) {
        let served = config.served_queues();

        for (job_type, job) in &config.jobs {
            if job_type.trim().is_empty() {
                result.add_error(ValidationError::new("jobs", "Job type cannot be empty"));
            }

            if let Some(ref queue) = job.queue {
                if queue.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        format!("jobs.{}.queue", job_type),
                        "Queue name cannot be empty",
                    ));
                }
            }

            if job.retry_attempts == 0 && !job.retry_delays_secs.is_empty() {
                result.add_warning(ValidationWarning::new(
                    format!("jobs.{}.retry_delays_secs", job_type),
                    "retry_delays_secs is set but retry_attempts is 0, delays are never used",
                ));
            }

            if job.retry_attempts > MAX_REASONABLE_RETRIES {
                result.add_warning(ValidationWarning::new(
                    format!("jobs.{}.retry_attempts", job_type),
                    format!(
                        "retry_attempts is very high (>{}), failing jobs will linger",
                        MAX_REASONABLE_RETRIES
                    ),
                ));
            }

            if job
                .retry_delays_secs
                .iter()
                .any(|delay| *delay > MAX_REASONABLE_DELAY_SECS)
            {
                result.add_warning(ValidationWarning::new(
                    format!("jobs.{}.retry_delays_secs", job_type),
                    "A retry delay is longer than one day",
                ));
            }

            let queue = job.queue.as_deref().unwrap_or(&config.defaults.queue);
            if !served.is_empty() && !served.iter().any(|q| q == queue) {
                result.add_warning(ValidationWarning::new(
                    format!("jobs.{}.queue", job_type),
                    format!("Queue '{}' is not served by any configured server", queue),
                ));
            }
        }
    }

    fn validate_servers(config: &Config, result: &mut ValidationResult) {
        for (name, server) in &config.servers {
            if server.queues.is_empty() {
                result.add_error(ValidationError::new(
                    format!("servers.{}.queues", name),
                    "Server must listen on at least one queue",
                ));
            }

            if server.queues.iter().any(|queue| queue.trim().is_empty()) {
                result.add_error(ValidationError::new(
                    format!("servers.{}.queues", name),
                    "Queue name cannot be empty",
                ));
            }

            if server.workers == 0 {
                result.add_error(ValidationError::new(
                    format!("servers.{}.workers", name),
                    "workers must be greater than 0",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
