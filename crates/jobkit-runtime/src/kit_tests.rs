use super::*;
use crate::filters::{ERROR_LOGGING_ORDER, RETRY_POLICY_ORDER};
use async_trait::async_trait;
use jobkit_config::ConfigLoader;
use jobkit_core::{handler_fn, RegistryError};
use jobkit_protocols::{
    ExecutionContext, FilterError, Invocation, Job, JobError, JobId, JobKind, JobState,
    PerformingContext,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Notify {
    user: u64,
}

impl Job for Notify {
    const JOB_TYPE: &'static str = "notify";
}

impl DelayedJob for Notify {}

struct Audit {
    order: i32,
}

#[async_trait]
impl JobFilter for Audit {
    fn name(&self) -> &str {
        "audit"
    }

    fn execution_order(&self) -> i32 {
        self.order
    }

    async fn on_performing(&self, _ctx: &PerformingContext<'_>) -> Result<(), FilterError> {
        Ok(())
    }
}

fn notify_handler() -> impl JobHandler<Notify> {
    handler_fn(|_job: Notify, _ctx: ExecutionContext| async { Ok::<(), JobError>(()) })
}

#[test]
fn test_builtin_filters_are_installed() {
    let kit = JobKit::builder()
        .filter(Arc::new(Audit { order: 10 }))
        .build()
        .unwrap();

    let orders: Vec<_> = kit
        .pipeline()
        .filters()
        .iter()
        .map(|f| (f.name().to_string(), f.execution_order()))
        .collect();
    assert_eq!(
        orders,
        vec![
            ("retry_policy".to_string(), RETRY_POLICY_ORDER),
            ("error_logging".to_string(), ERROR_LOGGING_ORDER),
            ("audit".to_string(), 10),
        ]
    );
}

#[test]
fn test_without_error_logging() {
    let kit = JobKit::builder().without_error_logging().build().unwrap();
    let names: Vec<_> = kit.pipeline().filters().iter().map(|f| f.name().to_string()).collect();
    assert_eq!(names, vec!["retry_policy".to_string()]);
}

#[test]
fn test_negative_custom_order_is_kept() {
    let kit = JobKit::builder()
        .filter(Arc::new(Audit { order: -5000 }))
        .build()
        .unwrap();
    assert_eq!(kit.pipeline().filters()[0].name(), "audit");
}

#[test]
fn test_duplicate_handler_is_reported_at_build() {
    let result = JobKit::builder()
        .delayed_handler::<Notify, _>(notify_handler())
        .delayed_handler::<Notify, _>(notify_handler())
        .build();
    assert!(matches!(
        result,
        Err(JobKitError::Registry(RegistryError::AlreadyRegistered(_)))
    ));
}

#[test]
fn test_duplicate_policy_is_reported_at_build() {
    let result = JobKit::builder()
        .policy::<Notify>(JobPolicy::new("Notify"))
        .policy::<Notify>(JobPolicy::new("Notify again"))
        .build();
    assert!(matches!(result, Err(JobKitError::Registry(_))));
}

#[test]
fn test_configured_policy_takes_precedence() {
    let config = ConfigLoader::load_str(
        r#"
[defaults]
queue = "general"

[jobs.notify]
display_name = "Configured Notify"
retry_attempts = 7
"#,
    )
    .unwrap();

    let kit = JobKit::builder()
        .with_config(config)
        .policy::<Notify>(JobPolicy::new("Code Notify").with_retry_attempts(1))
        .build()
        .unwrap();

    let policy = kit.policies().resolve("notify");
    assert_eq!(policy.display_name, "Configured Notify");
    assert_eq!(policy.retry_attempts, 7);
    assert_eq!(kit.policies().default_queue(), "general");
}

#[test]
fn test_explicit_default_queue() {
    let kit = JobKit::builder().default_queue("bulk").build().unwrap();
    assert_eq!(kit.policies().queue("anything"), "bulk");
    assert_eq!(kit.manager().resolve_queue("anything", None), "bulk");
}

struct Tenant(String);

#[tokio::test]
async fn test_scoped_service_reaches_handler() {
    struct TenantHandler {
        tenant: Option<Arc<Tenant>>,
    }

    #[async_trait]
    impl JobHandler<Notify> for TenantHandler {
        async fn execute(&self, _job: Notify, _context: ExecutionContext) -> Result<(), JobError> {
            match &self.tenant {
                Some(tenant) if tenant.0 == "acme" => Ok(()),
                _ => Err(JobError::new("tenant_missing", "no tenant in scope")),
            }
        }
    }

    let kit = JobKit::builder()
        .scoped(|_scope| Tenant("acme".to_string()))
        .delayed_handler_scoped::<Notify, _, _>(|scope: &ExecutionScope| TenantHandler {
            tenant: scope.resolve::<Tenant>(),
        })
        .build()
        .unwrap();

    let job_id = kit.manager().enqueue(&Notify { user: 1 }, None).await.unwrap();
    assert_eq!(kit.engine().perform(&job_id).await.unwrap(), JobState::Succeeded);
}

#[tokio::test]
async fn test_build_with_custom_engine() {
    struct NullEngine;

    #[async_trait]
    impl JobEngine for NullEngine {
        async fn enqueue(
            &self,
            _queue: &str,
            _invocation: Invocation,
        ) -> Result<JobId, jobkit_protocols::EngineError> {
            Ok(JobId::from("null"))
        }

        async fn schedule(
            &self,
            _queue: &str,
            _invocation: Invocation,
            _delay: std::time::Duration,
        ) -> Result<JobId, jobkit_protocols::EngineError> {
            Ok(JobId::from("null"))
        }

        async fn add_or_update_recurring(
            &self,
            _recurring_id: &str,
            _queue: &str,
            _invocation: Invocation,
            _cron: &str,
            _options: jobkit_protocols::RecurringJobOptions,
        ) -> Result<(), jobkit_protocols::EngineError> {
            Ok(())
        }

        async fn remove_recurring(
            &self,
            _recurring_id: &str,
        ) -> Result<bool, jobkit_protocols::EngineError> {
            Ok(false)
        }
    }

    let kit = JobKit::builder()
        .delayed_handler::<Notify, _>(notify_handler())
        .build_with(|_performer| NullEngine)
        .unwrap();

    let job_id = kit.manager().enqueue(&Notify { user: 1 }, None).await.unwrap();
    assert_eq!(job_id, JobId::from("null"));
    assert!(kit.handlers().contains("notify", JobKind::OneShot));
}
