//! In-process job engine.
//!
//! [`MemoryJobEngine`] keeps invocations, states and job parameters in memory
//! and drives them through the filter pipeline at the same points a durable
//! engine would: creating/created hooks on submission, performing/performed
//! hooks around each attempt, state election after each attempt, and
//! applied/unapplied hooks on every transition. Nothing survives the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use dashmap::DashMap;
use jobkit_protocols::{
    ApplyStateContext, CreatedContext, CreatingContext, ElectStateContext, EngineError,
    Invocation, JobEngine, JobId, JobParameters, JobState, MisfireHandling, ParameterStore,
    RecurringJobOptions, StoreError,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::performer::JobPerformer;
use crate::schedule::{next_occurrence, normalize_cron, parse_cron};

/// Upper bound on catch-up runs of one strict recurring job per trigger.
pub const MAX_MISFIRE_RUNS: usize = 100;

/// Job parameters kept in a concurrent map, one entry per job.
#[derive(Debug, Default)]
pub struct MemoryParameterStore {
    params: DashMap<JobId, HashMap<String, serde_json::Value>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All parameters of one job.
    pub fn snapshot(&self, job_id: &JobId) -> HashMap<String, serde_json::Value> {
        self.params
            .get(job_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get_parameter(
        &self,
        job_id: &JobId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .params
            .get(job_id)
            .and_then(|entry| entry.value().get(key).cloned()))
    }

    async fn set_parameters(
        &self,
        job_id: &JobId,
        entries: Vec<(String, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        // The entry guard holds the shard lock for the whole batch.
        let mut params = self.params.entry(job_id.clone()).or_default();
        for (key, value) in entries {
            params.insert(key, value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredJob {
    queue: String,
    invocation: Invocation,
    state: JobState,
    history: Vec<JobState>,
    sequence: u64,
    recurring_id: Option<String>,
}

#[derive(Debug, Clone)]
struct RecurringEntry {
    queue: String,
    invocation: Invocation,
    cron: String,
    schedule: Schedule,
    options: RecurringJobOptions,
    next_run: Option<DateTime<Utc>>,
    last_job_id: Option<JobId>,
}

/// Non-durable [`JobEngine`] executing jobs through a [`JobPerformer`].
pub struct MemoryJobEngine {
    performer: Arc<JobPerformer>,
    store: Arc<MemoryParameterStore>,
    jobs: RwLock<HashMap<JobId, StoredJob>>,
    recurring: RwLock<BTreeMap<String, RecurringEntry>>,
    sequence: AtomicU64,
}

impl MemoryJobEngine {
    pub fn new(performer: Arc<JobPerformer>) -> Self {
        Self {
            performer,
            store: Arc::new(MemoryParameterStore::new()),
            jobs: RwLock::new(HashMap::new()),
            recurring: RwLock::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn performer(&self) -> &Arc<JobPerformer> {
        &self.performer
    }

    pub fn parameter_store(&self) -> &Arc<MemoryParameterStore> {
        &self.store
    }

    /// Typed parameter handle for one job.
    pub fn parameters(&self, job_id: &JobId) -> JobParameters {
        JobParameters::new(job_id.clone(), self.store.clone())
    }

    pub async fn state(&self, job_id: &JobId) -> Option<JobState> {
        self.jobs.read().await.get(job_id).map(|job| job.state.clone())
    }

    /// Every state the job has been in, oldest first.
    pub async fn history(&self, job_id: &JobId) -> Vec<JobState> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|job| job.history.clone())
            .unwrap_or_default()
    }

    pub async fn invocation(&self, job_id: &JobId) -> Option<Invocation> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|job| job.invocation.clone())
    }

    pub async fn queue_of(&self, job_id: &JobId) -> Option<String> {
        self.jobs.read().await.get(job_id).map(|job| job.queue.clone())
    }

    /// Recurring id that spawned the job, if any.
    pub async fn recurring_id_of(&self, job_id: &JobId) -> Option<String> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .and_then(|job| job.recurring_id.clone())
    }

    /// Jobs still waiting to run (enqueued or scheduled).
    pub async fn pending_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| {
                matches!(
                    job.state,
                    JobState::Enqueued { .. } | JobState::Scheduled { .. }
                )
            })
            .count()
    }

    /// Ids of all jobs currently in the state named `state`.
    pub async fn jobs_in_state(&self, state: &str) -> Vec<JobId> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<_> = jobs
            .iter()
            .filter(|(_, job)| job.state.name() == state)
            .map(|(id, job)| (job.sequence, id.clone()))
            .collect();
        matching.sort();
        matching.into_iter().map(|(_, id)| id).collect()
    }

    pub async fn recurring_ids(&self) -> Vec<String> {
        self.recurring.read().await.keys().cloned().collect()
    }

    pub async fn next_run(&self, recurring_id: &str) -> Option<DateTime<Utc>> {
        self.recurring
            .read()
            .await
            .get(recurring_id)
            .and_then(|entry| entry.next_run)
    }

    /// Normalized cron expression of a recurring registration.
    pub async fn recurring_cron(&self, recurring_id: &str) -> Option<String> {
        self.recurring
            .read()
            .await
            .get(recurring_id)
            .map(|entry| entry.cron.clone())
    }

    /// Job created by the most recent trigger of a recurring registration.
    pub async fn last_job(&self, recurring_id: &str) -> Option<JobId> {
        self.recurring
            .read()
            .await
            .get(recurring_id)
            .and_then(|entry| entry.last_job_id.clone())
    }

    async fn create(
        &self,
        queue: &str,
        invocation: Invocation,
        delay: Option<Duration>,
        recurring_id: Option<String>,
    ) -> Result<JobId, EngineError> {
        let pipeline = self.performer.pipeline();

        let mut creating = CreatingContext::new(invocation, queue);
        pipeline.run_creating(&mut creating).await;
        let CreatingContext {
            invocation,
            queue,
            parameters,
        } = creating;

        let job_id = JobId::new();
        self.store
            .set_parameters(&job_id, parameters.into_iter().collect())
            .await?;

        let initial = match delay {
            Some(delay) => JobState::scheduled(delay, Utc::now(), None),
            None => JobState::enqueued(queue.as_str()),
        };
        self.jobs.write().await.insert(
            job_id.clone(),
            StoredJob {
                queue: queue.clone(),
                invocation: invocation.clone(),
                state: initial.clone(),
                history: vec![initial.clone()],
                sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
                recurring_id,
            },
        );

        let parameters = self.parameters(&job_id);
        pipeline
            .run_created(&CreatedContext {
                job_id: &job_id,
                invocation: &invocation,
                queue: &queue,
                parameters: &parameters,
            })
            .await;
        pipeline
            .state_applied(&ApplyStateContext {
                job_id: &job_id,
                invocation: &invocation,
                parameters: &parameters,
                old_state: None,
                new_state: &initial,
            })
            .await;

        debug!(
            job_id = %job_id,
            job_type = %invocation.job_type,
            queue = %queue,
            state = initial.name(),
            "Job created"
        );
        Ok(job_id)
    }

    /// Move a job to `new_state` and run the state hooks outside the lock.
    async fn transition(&self, job_id: &JobId, new_state: JobState) -> Result<(), EngineError> {
        let (old_state, invocation) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| EngineError::NotFound(job_id.clone()))?;
            let old_state = std::mem::replace(&mut job.state, new_state.clone());
            job.history.push(new_state.clone());
            if matches!(new_state, JobState::Enqueued { .. }) {
                job.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            }
            (old_state, job.invocation.clone())
        };
        self.apply_hooks(job_id, &invocation, &old_state, &new_state)
            .await;
        Ok(())
    }

    async fn apply_hooks(
        &self,
        job_id: &JobId,
        invocation: &Invocation,
        old_state: &JobState,
        new_state: &JobState,
    ) {
        let parameters = self.parameters(job_id);
        let ctx = ApplyStateContext {
            job_id,
            invocation,
            parameters: &parameters,
            old_state: Some(old_state),
            new_state,
        };
        let pipeline = self.performer.pipeline();
        pipeline.state_unapplied(&ctx).await;
        pipeline.state_applied(&ctx).await;
    }

    /// Atomically move an enqueued job to processing.
    async fn claim(&self, job_id: &JobId) -> Result<Invocation, EngineError> {
        let (old_state, invocation) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| EngineError::NotFound(job_id.clone()))?;
            if !matches!(job.state, JobState::Enqueued { .. }) {
                return Err(EngineError::InvalidState {
                    job_id: job_id.clone(),
                    state: job.state.name().to_string(),
                    expected: "Enqueued".to_string(),
                });
            }
            let old_state = std::mem::replace(&mut job.state, JobState::Processing);
            job.history.push(JobState::Processing);
            (old_state, job.invocation.clone())
        };
        self.apply_hooks(job_id, &invocation, &old_state, &JobState::Processing)
            .await;
        Ok(invocation)
    }

    /// Claim the oldest enqueued job on one of `queues` (any queue when empty).
    async fn claim_next(&self, queues: &[String]) -> Option<(JobId, Invocation)> {
        loop {
            let candidate = {
                let jobs = self.jobs.read().await;
                jobs.iter()
                    .filter(|(_, job)| match &job.state {
                        JobState::Enqueued { queue } => {
                            queues.is_empty() || queues.iter().any(|q| q == queue)
                        }
                        _ => false,
                    })
                    .min_by_key(|(_, job)| job.sequence)
                    .map(|(id, _)| id.clone())
            }?;
            // Another worker may claim it between the read and the write lock.
            match self.claim(&candidate).await {
                Ok(invocation) => return Some((candidate, invocation)),
                Err(_) => continue,
            }
        }
    }

    /// Run one claimed attempt, elect the next state and apply it.
    async fn execute(&self, job_id: &JobId, invocation: Invocation) -> Result<JobState, EngineError> {
        let parameters = self.parameters(job_id);
        let candidate = match self.performer.perform(job_id, &invocation, &parameters).await {
            Ok(()) => JobState::Succeeded,
            Err(e) => JobState::failed(e.to_failure(), None),
        };

        let current = JobState::Processing;
        let mut ctx = ElectStateContext {
            job_id,
            invocation: &invocation,
            parameters: &parameters,
            current_state: Some(&current),
            candidate_state: candidate,
        };
        self.performer.pipeline().elect_state(&mut ctx).await;
        let elected = ctx.candidate_state;

        self.transition(job_id, elected.clone()).await?;
        debug!(job_id = %job_id, state = elected.name(), "Job attempt finished");
        Ok(elected)
    }

    /// Execute a specific enqueued job now. Returns the elected state.
    pub async fn perform(&self, job_id: &JobId) -> Result<JobState, EngineError> {
        let invocation = self.claim(job_id).await?;
        self.execute(job_id, invocation).await
    }

    /// Enqueue scheduled jobs due at or before `now`. Returns how many moved.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let due: Vec<(JobId, String)> = {
            let jobs = self.jobs.read().await;
            let mut due: Vec<_> = jobs
                .iter()
                .filter_map(|(id, job)| match &job.state {
                    JobState::Scheduled { enqueue_at, .. } if *enqueue_at <= now => {
                        Some((job.sequence, id.clone(), job.queue.clone()))
                    }
                    _ => None,
                })
                .collect();
            due.sort();
            due.into_iter().map(|(_, id, queue)| (id, queue)).collect()
        };

        let mut promoted = 0;
        for (job_id, queue) in due {
            // Skip jobs whose state changed after the snapshot.
            let still_scheduled = matches!(
                self.state(&job_id).await,
                Some(JobState::Scheduled { .. })
            );
            if still_scheduled {
                self.transition(&job_id, JobState::enqueued(queue)).await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Process the next job due on `queues` at `now`.
    ///
    /// Returns the job id and its elected state, or `None` when nothing is due.
    pub async fn process_next(
        &self,
        queues: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<(JobId, JobState)>, EngineError> {
        self.promote_due(now).await?;
        match self.claim_next(queues).await {
            Some((job_id, invocation)) => {
                let state = self.execute(&job_id, invocation).await?;
                Ok(Some((job_id, state)))
            }
            None => Ok(None),
        }
    }

    /// Process jobs due at `now` until none is left. Returns the attempt count.
    pub async fn run_until_idle(
        &self,
        queues: &[String],
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let mut attempts = 0;
        while self.process_next(queues, now).await?.is_some() {
            attempts += 1;
        }
        Ok(attempts)
    }

    /// Process jobs until idle, treating every scheduled retry as already due.
    ///
    /// Stops after `max_attempts` attempts. Returns the attempt count.
    pub async fn drain(&self, queues: &[String], max_attempts: usize) -> Result<usize, EngineError> {
        let mut attempts = 0;
        while attempts < max_attempts {
            match self.process_next(queues, DateTime::<Utc>::MAX_UTC).await? {
                Some(_) => attempts += 1,
                None => break,
            }
        }
        Ok(attempts)
    }

    /// Enqueue one run of a recurring job immediately.
    pub async fn trigger_recurring(&self, recurring_id: &str) -> Result<JobId, EngineError> {
        let (queue, invocation) = {
            let recurring = self.recurring.read().await;
            let entry = recurring
                .get(recurring_id)
                .ok_or_else(|| EngineError::RecurringNotFound(recurring_id.to_string()))?;
            (entry.queue.clone(), entry.invocation.clone())
        };
        let job_id = self
            .create(&queue, invocation, None, Some(recurring_id.to_string()))
            .await?;
        if let Some(entry) = self.recurring.write().await.get_mut(recurring_id) {
            entry.last_job_id = Some(job_id.clone());
        }
        Ok(job_id)
    }

    /// Enqueue runs for every recurring job with an occurrence at or before `now`.
    ///
    /// Relaxed registrations get one run however many occurrences were missed;
    /// strict ones get one run per missed occurrence, up to [`MAX_MISFIRE_RUNS`].
    pub async fn trigger_due_recurring(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>, EngineError> {
        let due: Vec<(String, String, Invocation, usize)> = {
            let mut recurring = self.recurring.write().await;
            let mut due = Vec::new();
            for (id, entry) in recurring.iter_mut() {
                let Some(next_run) = entry.next_run else {
                    continue;
                };
                if next_run > now {
                    continue;
                }
                let runs = match entry.options.misfire_handling {
                    MisfireHandling::Relaxed => 1,
                    MisfireHandling::Strict => missed_occurrences(&entry.schedule, next_run, now),
                };
                entry.next_run = next_occurrence(&entry.schedule, now);
                due.push((id.clone(), entry.queue.clone(), entry.invocation.clone(), runs));
            }
            due
        };

        let mut created = Vec::new();
        for (recurring_id, queue, invocation, runs) in due {
            for _ in 0..runs {
                let job_id = self
                    .create(&queue, invocation.clone(), None, Some(recurring_id.clone()))
                    .await?;
                created.push(job_id);
            }
            if let Some(last) = created.last() {
                if let Some(entry) = self.recurring.write().await.get_mut(&recurring_id) {
                    entry.last_job_id = Some(last.clone());
                }
            }
            info!(recurring_id = %recurring_id, runs, "Recurring job triggered");
        }
        Ok(created)
    }
}

/// Occurrences in `[first, now]`, capped at [`MAX_MISFIRE_RUNS`].
fn missed_occurrences(schedule: &Schedule, first: DateTime<Utc>, now: DateTime<Utc>) -> usize {
    let mut runs = 0;
    let mut cursor = Some(first);
    while let Some(at) = cursor {
        if at > now || runs >= MAX_MISFIRE_RUNS {
            break;
        }
        runs += 1;
        cursor = next_occurrence(schedule, at);
    }
    runs
}

#[async_trait]
impl JobEngine for MemoryJobEngine {
    async fn enqueue(&self, queue: &str, invocation: Invocation) -> Result<JobId, EngineError> {
        self.create(queue, invocation, None, None).await
    }

    async fn schedule(
        &self,
        queue: &str,
        invocation: Invocation,
        delay: Duration,
    ) -> Result<JobId, EngineError> {
        self.create(queue, invocation, Some(delay), None).await
    }

    async fn add_or_update_recurring(
        &self,
        recurring_id: &str,
        queue: &str,
        invocation: Invocation,
        cron: &str,
        options: RecurringJobOptions,
    ) -> Result<(), EngineError> {
        let schedule = parse_cron(cron)?;
        let next_run = next_occurrence(&schedule, Utc::now());
        let mut recurring = self.recurring.write().await;
        let last_job_id = recurring
            .get(recurring_id)
            .and_then(|entry| entry.last_job_id.clone());
        recurring.insert(
            recurring_id.to_string(),
            RecurringEntry {
                queue: queue.to_string(),
                invocation,
                cron: normalize_cron(cron),
                schedule,
                options,
                next_run,
                last_job_id,
            },
        );
        debug!(recurring_id, queue, cron, "Recurring job registered");
        Ok(())
    }

    async fn remove_recurring(&self, recurring_id: &str) -> Result<bool, EngineError> {
        Ok(self.recurring.write().await.remove(recurring_id).is_some())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
