//! `run` subcommand: submit the sample jobs and drain them with the configured servers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jobkit_config::{Config, ServerConfig};
use jobkit_protocols::{ExecutionContext, MisfireHandling};
use jobkit_runtime::{
    JobKit, MemoryJobEngine, RecurringOptions, SubmitOptions, TimingFilter, TimingStats,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::sample::{self, Flakiness, GenerateDailyReport, SendEmail, DAILY_REPORT_CRON, DAILY_REPORT_ID};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub(crate) struct RunOptions {
    pub emails: usize,
    pub flaky: bool,
    pub delay_secs: Option<u64>,
    pub duration_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            emails: 5,
            flaky: false,
            delay_secs: None,
            duration_secs: 15,
        }
    }
}

pub(crate) async fn run(config: Config, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting jobkit v{}", env!("CARGO_PKG_VERSION"));

    let servers = servers(&config);
    let flakiness = Arc::new(Flakiness::new(options.flaky));
    let timing = Arc::new(TimingFilter::new());
    let kit = sample::register(JobKit::builder().with_config(config), flakiness)
        .filter(timing.clone())
        .build()?;

    submit_samples(&kit, &options).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    for (name, server) in servers {
        info!(server = %name, queues = ?server.queues, workers = server.workers, "Starting server");
        for worker in 0..server.workers.max(1) {
            let engine = kit.engine().clone();
            let queues = server.queues.clone();
            let name = name.clone();
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                run_worker(engine, name, worker, queues, shutdown).await
            }));
        }
    }

    let engine = kit.engine().clone();
    let shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move { run_scheduler(engine, shutdown).await }));

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(options.duration_secs)) => {
            info!("Run duration elapsed, stopping servers");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping servers");
        }
    }
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Worker task ended abnormally: {}", e);
        }
    }

    print_summary(kit.engine(), timing.stats()).await;
    Ok(())
}

/// Configured servers, or one server draining every queue.
fn servers(config: &Config) -> Vec<(String, ServerConfig)> {
    if config.servers.is_empty() {
        return vec![(
            "main".to_string(),
            ServerConfig {
                queues: Vec::new(),
                workers: 1,
            },
        )];
    }
    config
        .servers
        .iter()
        .map(|(name, server)| (name.clone(), server.clone()))
        .collect()
}

async fn submit_samples(
    kit: &JobKit<MemoryJobEngine>,
    options: &RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = kit.manager();

    for i in 0..options.emails {
        let job = SendEmail {
            email: format!("user{}@example.com", i + 1),
            subject: "Welcome".to_string(),
            body: "Thanks for signing up.".to_string(),
        };
        let context = ExecutionContext::new().with_header("source", "demo");
        manager
            .submit(&job, SubmitOptions::new().with_context(context))
            .await?;
    }

    // Rejected by the handler; excluded kinds fail without retrying.
    let invalid = SendEmail {
        email: "not-an-address".to_string(),
        subject: "Welcome".to_string(),
        body: String::new(),
    };
    manager.enqueue(&invalid, None).await?;

    if let Some(delay) = options.delay_secs {
        let job = SendEmail {
            email: "later@example.com".to_string(),
            subject: "Reminder".to_string(),
            body: "Scheduled message.".to_string(),
        };
        manager
            .schedule(&job, Duration::from_secs(delay), None)
            .await?;
    }

    let report = GenerateDailyReport {
        report_date: Utc::now().date_naive(),
    };
    manager
        .submit_recurring(
            DAILY_REPORT_ID,
            &report,
            RecurringOptions::new(DAILY_REPORT_CRON)
                .with_context(ExecutionContext::with_correlation_id("system"))
                .with_misfire_handling(MisfireHandling::Relaxed),
        )
        .await?;
    // Run the report once now instead of waiting for the first occurrence.
    kit.engine().trigger_recurring(DAILY_REPORT_ID).await?;

    info!(
        emails = options.emails,
        pending = kit.engine().pending_count().await,
        "Sample jobs submitted"
    );
    Ok(())
}

async fn run_worker(
    engine: Arc<MemoryJobEngine>,
    server: String,
    worker: usize,
    queues: Vec<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        match engine.process_next(&queues, Utc::now()).await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => error!(server = %server, worker, "Worker failed to process job: {}", e),
        }
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// Enqueue recurring jobs as their occurrences come due.
async fn run_scheduler(engine: Arc<MemoryJobEngine>, mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if let Err(e) = engine.trigger_due_recurring(Utc::now()).await {
            error!("Recurring trigger failed: {}", e);
        }
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
    }
}

async fn print_summary(engine: &MemoryJobEngine, stats: TimingStats) {
    println!();
    println!("{:<12} {}", "STATE", "JOBS");
    println!("{}", "-".repeat(20));
    for state in ["Enqueued", "Scheduled", "Processing", "Succeeded", "Failed", "Deleted"] {
        println!("{:<12} {}", state, engine.jobs_in_state(state).await.len());
    }

    println!();
    println!(
        "{} executions, {} failed, total {} ms, slowest {} ms",
        stats.executions,
        stats.failures,
        stats.total.as_millis(),
        stats.max.as_millis()
    );
}
