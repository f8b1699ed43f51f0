//! Sample jobs, services and filters used by the demo.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use jobkit_protocols::{
    DelayedJob, ExecutionContext, ExecutionScope, FilterError, Job, JobError, JobFilter,
    JobHandler, JobPolicy, PerformedContext, PerformingContext, RecurringJob,
};
use jobkit_runtime::filters::TIMING_ORDER;
use jobkit_runtime::JobKitBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DAILY_REPORT_ID: &str = "daily-report";
pub const DAILY_REPORT_CRON: &str = "*/7 * * * * *";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmail {
    pub email: String,
    pub subject: String,
    pub body: String,
}

impl Job for SendEmail {
    const JOB_TYPE: &'static str = "send_email";
}

impl DelayedJob for SendEmail {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateDailyReport {
    pub report_date: NaiveDate,
}

impl Job for GenerateDailyReport {
    const JOB_TYPE: &'static str = "daily_report";
}

impl RecurringJob for GenerateDailyReport {}

/// Fails every third call when enabled.
#[derive(Debug, Default)]
pub struct Flakiness {
    enabled: bool,
    calls: AtomicU64,
}

impl Flakiness {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            calls: AtomicU64::new(0),
        }
    }

    fn should_fail(&self) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.enabled && call % 3 == 0
    }
}

/// Scoped mail transport; one per attempt.
pub struct Mailer {
    flakiness: Arc<Flakiness>,
}

impl Mailer {
    async fn send(&self, email: &str, subject: &str, context: &ExecutionContext) -> Result<(), JobError> {
        if self.flakiness.should_fail() {
            return Err(JobError::new("smtp_unavailable", "SMTP server did not respond"));
        }
        info!(
            correlation_id = %context.correlation_id(),
            "Sending email to {} with subject {}",
            email,
            subject
        );
        Ok(())
    }
}

pub struct ReportService {
    flakiness: Arc<Flakiness>,
}

impl ReportService {
    async fn generate(&self, date: NaiveDate) -> Result<(), JobError> {
        if self.flakiness.should_fail() {
            return Err(JobError::new("report_source_unavailable", "report source is offline"));
        }
        info!("Generated report for {}", date);
        Ok(())
    }
}

struct SendEmailHandler {
    mailer: Option<Arc<Mailer>>,
}

#[async_trait]
impl JobHandler<SendEmail> for SendEmailHandler {
    async fn execute(&self, job: SendEmail, context: ExecutionContext) -> Result<(), JobError> {
        if !job.email.contains('@') {
            return Err(JobError::new(
                "validation",
                format!("invalid recipient address: {}", job.email),
            ));
        }
        let mailer = self
            .mailer
            .as_ref()
            .ok_or_else(|| JobError::new("configuration", "no mailer in scope"))?;
        mailer.send(&job.email, &job.subject, &context).await
    }
}

struct DailyReportHandler {
    reports: Arc<ReportService>,
}

#[async_trait]
impl JobHandler<GenerateDailyReport> for DailyReportHandler {
    async fn execute(&self, job: GenerateDailyReport, _context: ExecutionContext) -> Result<(), JobError> {
        self.reports.generate(job.report_date).await
    }
}

/// Logs the start of every attempt with its correlation id.
pub struct AuditLogFilter;

#[async_trait]
impl JobFilter for AuditLogFilter {
    fn name(&self) -> &str {
        "audit_log"
    }

    fn execution_order(&self) -> i32 {
        TIMING_ORDER - 1
    }

    async fn on_performing(&self, ctx: &PerformingContext<'_>) -> Result<(), FilterError> {
        info!(
            job_id = %ctx.job_id,
            correlation_id = %ctx.context().correlation_id(),
            attempt = ctx.record.attempt,
            "Job starting"
        );
        Ok(())
    }

    async fn on_performed(&self, ctx: &PerformedContext<'_>) -> Result<(), FilterError> {
        info!(
            job_id = %ctx.job_id,
            correlation_id = %ctx.context().correlation_id(),
            success = ctx.succeeded(),
            "Job done"
        );
        Ok(())
    }
}

/// Declare the sample policies, services and handlers.
pub fn register(builder: JobKitBuilder, flakiness: Arc<Flakiness>) -> JobKitBuilder {
    let reports = Arc::new(ReportService {
        flakiness: flakiness.clone(),
    });

    builder
        .policy::<SendEmail>(
            JobPolicy::new("Email Notification Job")
                .with_retry_attempts(3)
                .with_queue("emails")
                .with_log_events(true),
        )
        .policy::<GenerateDailyReport>(
            JobPolicy::new("Daily Report Job").with_retry_attempts(4),
        )
        .scoped(move |_scope| Mailer {
            flakiness: flakiness.clone(),
        })
        .delayed_handler_scoped::<SendEmail, _, _>(|scope: &ExecutionScope| SendEmailHandler {
            mailer: scope.resolve::<Mailer>(),
        })
        .recurring_handler::<GenerateDailyReport, _>(DailyReportHandler { reports })
        .filter(Arc::new(AuditLogFilter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobkit_protocols::JobState;
    use jobkit_runtime::JobKit;

    fn kit(flaky: bool) -> jobkit_runtime::JobKit<jobkit_runtime::MemoryJobEngine> {
        register(JobKit::builder(), Arc::new(Flakiness::new(flaky)))
            .build()
            .unwrap()
    }

    fn email(address: &str) -> SendEmail {
        SendEmail {
            email: address.to_string(),
            subject: "Welcome".to_string(),
            body: "Hello".to_string(),
        }
    }

    #[test]
    fn test_flakiness_every_third_call() {
        let flakiness = Flakiness::new(true);
        let results: Vec<_> = (0..6).map(|_| flakiness.should_fail()).collect();
        assert_eq!(results, vec![false, false, true, false, false, true]);
        assert!(!Flakiness::new(false).should_fail());
    }

    #[tokio::test]
    async fn test_email_uses_configured_queue() {
        let kit = kit(false);
        let job_id = kit.manager().enqueue(&email("user@example.com"), None).await.unwrap();
        assert_eq!(kit.engine().queue_of(&job_id).await.as_deref(), Some("emails"));
        assert_eq!(kit.engine().perform(&job_id).await.unwrap(), JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_flaky_email_is_retried() {
        let kit = kit(true);
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(kit.manager().enqueue(&email("user@example.com"), None).await.unwrap());
        }
        kit.engine().drain(&[], 20).await.unwrap();

        for id in &ids {
            assert_eq!(kit.engine().state(id).await, Some(JobState::Succeeded));
        }
        let retried = kit.engine().history(&ids[2]).await;
        assert!(retried.iter().any(|s| s.name() == "Scheduled"));
    }

    #[tokio::test]
    async fn test_daily_report_recurring() {
        let kit = kit(false);
        let job = GenerateDailyReport {
            report_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        };
        kit.manager()
            .submit_recurring(DAILY_REPORT_ID, &job, jobkit_runtime::RecurringOptions::new(DAILY_REPORT_CRON))
            .await
            .unwrap();
        let job_id = kit.engine().trigger_recurring(DAILY_REPORT_ID).await.unwrap();
        assert_eq!(kit.engine().perform(&job_id).await.unwrap(), JobState::Succeeded);
        assert_eq!(kit.policies().display_name("daily_report"), "Daily Report Job");
    }
}
