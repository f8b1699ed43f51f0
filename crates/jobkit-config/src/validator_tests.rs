use super::*;
use crate::schema::{JobConfig, ServerConfig};

fn job(configure: impl FnOnce(&mut JobConfig)) -> JobConfig {
    let mut job = JobConfig::default();
    configure(&mut job);
    job
}

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_validate_empty_default_queue() {
    let mut config = Config::default();
    config.defaults.queue = String::new();

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "defaults.queue"));
}

#[test]
fn test_validate_empty_job_queue() {
    let mut config = Config::default();
    config.jobs.insert(
        "send_email".to_string(),
        job(|j| j.queue = Some(" ".to_string())),
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "jobs.send_email.queue"));
}

#[test]
fn test_validate_server_without_queues() {
    let mut config = Config::default();
    config.servers.insert(
        "email-worker".to_string(),
        ServerConfig {
            queues: Vec::new(),
            workers: 1,
        },
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "servers.email-worker.queues"));
}

#[test]
fn test_validate_zero_workers() {
    let mut config = Config::default();
    config.servers.insert(
        "main".to_string(),
        ServerConfig {
            queues: vec!["default".to_string()],
            workers: 0,
        },
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "servers.main.workers"));
}

#[test]
fn test_validate_delays_without_retries_warning() {
    let mut config = Config::default();
    config.jobs.insert(
        "send_email".to_string(),
        job(|j| {
            j.retry_attempts = 0;
            j.retry_delays_secs = vec![10];
        }),
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.path == "jobs.send_email.retry_delays_secs"));
}

#[test]
fn test_validate_high_retry_warning() {
    let mut config = Config::default();
    config
        .jobs
        .insert("send_email".to_string(), job(|j| j.retry_attempts = 5000));

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.path == "jobs.send_email.retry_attempts"));
}

#[test]
fn test_validate_long_delay_warning() {
    let mut config = Config::default();
    config.jobs.insert(
        "daily_report".to_string(),
        job(|j| j.retry_delays_secs = vec![60, 172_800]),
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(!result.warnings.is_empty());
}

#[test]
fn test_validate_unserved_queue_warning() {
    let mut config = Config::default();
    config
        .servers
        .insert("main".to_string(), ServerConfig::default());
    config.jobs.insert(
        "send_email".to_string(),
        job(|j| j.queue = Some("emails".to_string())),
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("emails")));
}

#[test]
fn test_validate_served_queue_no_warning() {
    let mut config = Config::default();
    config.servers.insert(
        "email-worker".to_string(),
        ServerConfig {
            queues: vec!["emails".to_string()],
            workers: 2,
        },
    );
    config.jobs.insert(
        "send_email".to_string(),
        job(|j| j.queue = Some("emails".to_string())),
    );

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}
