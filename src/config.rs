use std::path::PathBuf;
use std::time::Duration;

use crate::stage::StageEndpoints;

/// Retry budget for one stage call. Backoff is linear with no jitter:
/// the delay before attempt N+1 is `base_delay * N`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per stage call.
    pub max_attempts: u32,
    /// Base unit for the linear backoff.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub host: String,
    pub port: u16,
    pub endpoints: StageEndpoints,
    pub retry: RetryConfig,
    /// Per-attempt timeout for stage calls.
    pub stage_timeout: Duration,
    /// Timeout for best-effort callback notification delivery.
    pub notify_timeout: Duration,
    /// Dump full request/response payloads per stage call at debug level.
    pub verbose_payloads: bool,
    /// Log file fed by the tee sink and served back by `/debug/logs`.
    pub log_file: PathBuf,
}

impl OrchestratorConfig {
    pub fn from_env(host: String, port: u16) -> Self {
        OrchestratorConfig {
            host,
            port,
            endpoints: StageEndpoints::from_env(),
            retry: RetryConfig::default(),
            stage_timeout: Duration::from_secs(120),
            notify_timeout: Duration::from_secs(2),
            verbose_payloads: verbose_from_env(),
            log_file: PathBuf::from("orchestrator.log"),
        }
    }
}

fn verbose_from_env() -> bool {
    match std::env::var("VERBOSE_API_LOG") {
        Ok(v) => v.to_lowercase() == "true",
        Err(_) => true,
    }
}
