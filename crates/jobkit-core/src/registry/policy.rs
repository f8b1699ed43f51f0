//! Job metadata registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jobkit_config::Config;
use jobkit_protocols::{Job, JobPolicy, DEFAULT_QUEUE};
use tracing::debug;

use crate::error::RegistryError;

/// Maps a job type to its policy.
///
/// Resolution never fails: unknown types get the default policy. Once a type
/// has been registered or resolved its policy is frozen for the lifetime of
/// the registry, so every attempt of a job sees the same policy.
pub struct PolicyRegistry {
    policies: DashMap<String, Arc<JobPolicy>>,
    default_queue: String,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::with_default_queue(DEFAULT_QUEUE)
    }

    /// Create a registry whose unconfigured types use `queue`.
    pub fn with_default_queue(queue: impl Into<String>) -> Self {
        let queue = queue.into();
        Self {
            policies: DashMap::new(),
            default_queue: if queue.trim().is_empty() {
                DEFAULT_QUEUE.to_string()
            } else {
                queue
            },
        }
    }

    /// Create a registry holding every job policy in `config`.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let registry = Self::with_default_queue(config.defaults.queue.clone());
        for job_type in config.jobs.keys() {
            if let Some(policy) = config.policy(job_type) {
                registry.register_type(job_type, policy)?;
            }
        }
        Ok(registry)
    }

    /// Register the policy of job type `J`.
    pub fn register<J: Job>(&self, policy: JobPolicy) -> Result<(), RegistryError> {
        self.register_type(J::JOB_TYPE, policy)
    }

    /// Register a policy by job type name.
    pub fn register_type(
        &self,
        job_type: impl Into<String>,
        policy: JobPolicy,
    ) -> Result<(), RegistryError> {
        let job_type = job_type.into();
        if job_type.trim().is_empty() {
            return Err(RegistryError::InvalidJobType(job_type));
        }

        match self.policies.entry(job_type) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(
                    "Registered policy for {}: retry_attempts={}, queue={}",
                    entry.key(),
                    policy.retry_attempts,
                    policy.queue
                );
                entry.insert(Arc::new(policy));
                Ok(())
            }
        }
    }

    /// Resolve the policy of a job type, freezing the default for unknown types.
    pub fn resolve(&self, job_type: &str) -> Arc<JobPolicy> {
        if let Some(policy) = self.policies.get(job_type) {
            return policy.clone();
        }
        self.policies
            .entry(job_type.to_string())
            .or_insert_with(|| Arc::new(self.default_policy(job_type)))
            .clone()
    }

    /// Policy of a job type, without memoizing a default.
    pub fn get(&self, job_type: &str) -> Option<Arc<JobPolicy>> {
        self.policies.get(job_type).map(|policy| policy.clone())
    }

    /// Default policy for a type without explicit configuration.
    pub fn default_policy(&self, job_type: &str) -> JobPolicy {
        JobPolicy::new(job_type).with_queue(self.default_queue.clone())
    }

    pub fn display_name(&self, job_type: &str) -> String {
        self.resolve(job_type).display_name.clone()
    }

    pub fn queue(&self, job_type: &str) -> String {
        self.resolve(job_type).queue.clone()
    }

    pub fn default_queue(&self) -> &str {
        &self.default_queue
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.policies.contains_key(job_type)
    }

    /// All frozen policies, sorted by job type.
    pub fn list(&self) -> Vec<(String, Arc<JobPolicy>)> {
        let mut policies: Vec<_> = self
            .policies
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        policies.sort_by(|a, b| a.0.cmp(&b.0));
        policies
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
