//! `policies` and `validate` subcommand handlers.

use std::sync::Arc;

use jobkit_config::{Config, ConfigValidator};
use jobkit_runtime::JobKit;
use serde::Serialize;

use crate::sample::{self, Flakiness, GenerateDailyReport, SendEmail};

#[derive(Serialize)]
struct PolicyRow {
    job_type: String,
    display_name: String,
    queue: String,
    retry_attempts: u32,
    retry_delays_secs: Vec<u64>,
    on_attempts_exceeded: jobkit_protocols::AttemptsExceededAction,
    except_on: Vec<String>,
    log_events: bool,
}

/// Print the policies the sample jobs resolve to under `config`.
pub(crate) fn policies(config: Config, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let kit = sample::register(JobKit::builder().with_config(config), Arc::new(Flakiness::default()))
        .build()?;

    // Freeze the sample types so they are listed even without configuration.
    kit.policies().resolve(<SendEmail as jobkit_protocols::Job>::JOB_TYPE);
    kit.policies().resolve(<GenerateDailyReport as jobkit_protocols::Job>::JOB_TYPE);

    let rows: Vec<PolicyRow> = kit
        .policies()
        .list()
        .into_iter()
        .map(|(job_type, policy)| PolicyRow {
            job_type,
            display_name: policy.display_name.clone(),
            queue: policy.queue.clone(),
            retry_attempts: policy.retry_attempts,
            retry_delays_secs: policy.retry_delays_secs(),
            on_attempts_exceeded: policy.on_attempts_exceeded,
            except_on: policy.except_on.iter().cloned().collect(),
            log_events: policy.log_events,
        })
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            println!(
                "{:<16} {:<26} {:<10} {:<8} {:<14} {}",
                "TYPE", "NAME", "QUEUE", "RETRIES", "DELAYS", "EXCEPT ON"
            );
            println!("{}", "-".repeat(90));
            for row in rows {
                let delays: Vec<String> = row.retry_delays_secs.iter().map(|d| format!("{}s", d)).collect();
                let except_on = if row.except_on.is_empty() {
                    "-".to_string()
                } else {
                    row.except_on.join(", ")
                };
                println!(
                    "{:<16} {:<26} {:<10} {:<8} {:<14} {}",
                    row.job_type,
                    row.display_name,
                    row.queue,
                    row.retry_attempts,
                    delays.join(","),
                    except_on
                );
            }
        }
    }
    Ok(())
}

/// Validate `config`, printing errors and warnings.
pub(crate) fn validate(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config)?;

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if result.is_valid() {
        println!(
            "Configuration is valid ({} job policies, {} servers)",
            config.jobs.len(),
            config.servers.len()
        );
        Ok(())
    } else {
        Err(format!("configuration has {} error(s)", result.errors.len()).into())
    }
}
