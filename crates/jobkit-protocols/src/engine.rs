//! Interfaces of the external job engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, StoreError};
use crate::invocation::Invocation;
use crate::job::JobId;

/// Engine-side key/value metadata attached to one invocation.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(
        &self,
        job_id: &JobId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    async fn set_parameter(
        &self,
        job_id: &JobId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.set_parameters(job_id, vec![(key.to_string(), value)])
            .await
    }

    /// Write all entries atomically: readers see either none or all of them.
    async fn set_parameters(
        &self,
        job_id: &JobId,
        entries: Vec<(String, serde_json::Value)>,
    ) -> Result<(), StoreError>;
}

/// Typed handle over the parameters of one invocation.
#[derive(Clone)]
pub struct JobParameters {
    job_id: JobId,
    store: Arc<dyn ParameterStore>,
}

impl JobParameters {
    pub fn new(job_id: JobId, store: Arc<dyn ParameterStore>) -> Self {
        Self { job_id, store }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.store.get_parameter(&self.job_id, key).await
    }

    /// Read and decode a parameter. A missing key yields `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_raw(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.store.set_parameter(&self.job_id, key, value).await
    }

    /// Write several parameters in one atomic batch.
    pub async fn set_many(
        &self,
        entries: Vec<(String, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        self.store.set_parameters(&self.job_id, entries).await
    }
}

impl fmt::Debug for JobParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobParameters")
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// How a recurring job treats occurrences missed while no worker was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisfireHandling {
    /// Run once for all missed occurrences.
    #[default]
    Relaxed,
    /// Run once per missed occurrence.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringJobOptions {
    pub misfire_handling: MisfireHandling,
}

/// The external engine that persists invocations and re-invokes them on workers.
#[async_trait]
pub trait JobEngine: Send + Sync {
    /// Persist for immediate execution.
    async fn enqueue(&self, queue: &str, invocation: Invocation) -> Result<JobId, EngineError>;

    /// Persist for execution after `delay`.
    async fn schedule(
        &self,
        queue: &str,
        invocation: Invocation,
        delay: Duration,
    ) -> Result<JobId, EngineError>;

    /// Create or replace the recurring registration `recurring_id`.
    ///
    /// `cron` is a 6- or 7-field expression evaluated in UTC.
    async fn add_or_update_recurring(
        &self,
        recurring_id: &str,
        queue: &str,
        invocation: Invocation,
        cron: &str,
        options: RecurringJobOptions,
    ) -> Result<(), EngineError>;

    /// Remove a recurring registration. Returns whether it existed.
    async fn remove_recurring(&self, recurring_id: &str) -> Result<bool, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore {
        values: Mutex<HashMap<(JobId, String), serde_json::Value>>,
    }

    #[async_trait]
    impl ParameterStore for MapStore {
        async fn get_parameter(
            &self,
            job_id: &JobId,
            key: &str,
        ) -> Result<Option<serde_json::Value>, StoreError> {
            Ok(self
                .values
                .lock()
                .get(&(job_id.clone(), key.to_string()))
                .cloned())
        }

        async fn set_parameters(
            &self,
            job_id: &JobId,
            entries: Vec<(String, serde_json::Value)>,
        ) -> Result<(), StoreError> {
            let mut values = self.values.lock();
            for (key, value) in entries {
                values.insert((job_id.clone(), key), value);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_typed_parameters() {
        let params = JobParameters::new(JobId::from("job-1"), Arc::new(MapStore::default()));
        params.set("RetryCount", &2u32).await.unwrap();
        params.set("ExceptOn", &vec!["validation"]).await.unwrap();

        assert_eq!(params.get::<u32>("RetryCount").await.unwrap(), Some(2));
        assert_eq!(
            params.get::<Vec<String>>("ExceptOn").await.unwrap(),
            Some(vec!["validation".to_string()])
        );
        assert_eq!(params.get::<u32>("Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_parameters_scoped_by_job() {
        let store: Arc<dyn ParameterStore> = Arc::new(MapStore::default());
        let a = JobParameters::new(JobId::from("a"), store.clone());
        let b = JobParameters::new(JobId::from("b"), store);
        a.set("RetryCount", &1u32).await.unwrap();
        assert_eq!(b.get::<u32>("RetryCount").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decode_mismatch_is_error() {
        let params = JobParameters::new(JobId::from("job-1"), Arc::new(MapStore::default()));
        params.set("RetryCount", "three").await.unwrap();
        assert!(params.get::<u32>("RetryCount").await.is_err());
    }

    #[test]
    fn test_misfire_default() {
        assert_eq!(RecurringJobOptions::default().misfire_handling, MisfireHandling::Relaxed);
    }
}
