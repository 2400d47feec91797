use std::str::FromStr;
use std::time::Duration;

use swarmsim_db::DEFAULT_MAX_CONNECTIONS;
use swarmsim_pipeline::ProcessorConfig;

/// A required variable is missing or a value does not parse.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// Delay between polls of an empty queue (default: 1 s).
    pub poll_interval: Duration,
    /// How long a received message stays invisible to other workers
    /// (default: 60 s). Renewed every third of this while a job runs.
    pub lease: Duration,
    /// Simulated run time of the placeholder workload (default: 2 s).
    pub workload_duration: Duration,
    /// Upper bound on waiting for an in-flight job at shutdown (default: 30 s).
    pub shutdown_timeout: Duration,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `DATABASE_URL`            | required |
    /// | `DB_MAX_CONNECTIONS`      | `10`    |
    /// | `WORKER_POLL_INTERVAL_MS` | `1000`  |
    /// | `WORKER_LEASE_SECS`       | `60`    |
    /// | `WORKLOAD_DURATION_MS`    | `2000`  |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`    |
    /// | `LOG_FORMAT`              | `text`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let lease_secs: u64 = parse_nonzero_or(&lookup, "WORKER_LEASE_SECS", 60)?;
        let poll_ms: u64 = parse_nonzero_or(&lookup, "WORKER_POLL_INTERVAL_MS", 1000)?;

        Ok(Self {
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            poll_interval: Duration::from_millis(poll_ms),
            lease: Duration::from_secs(lease_secs),
            workload_duration: Duration::from_millis(parse_or(&lookup, "WORKLOAD_DURATION_MS", 2000)?),
            shutdown_timeout: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }

    /// Processor settings derived from this configuration.
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            poll_interval: self.poll_interval,
            lease_renewal: self.lease / 3,
            ..Default::default()
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Like [`parse_or`], for periods that drive a timer and so cannot be zero.
fn parse_nonzero_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse_or(lookup, var, default)? {
        0 => Err(ConfigError::Invalid { var, value: "0".into() }),
        value => Ok(value),
    }
}
