//! Pipeline configuration.
//!
//! Settings are read from `DIRGRAPH_*` environment variables. Callers that
//! keep settings in a `.env` file load it with `dotenvy` before calling
//! [`IngestConfig::from_env`].

use std::env::VarError;
use std::str::FromStr;
use std::time::Duration;

use dirgraph_connector::resilience::RetryConfig;
use dirgraph_db::DbConfig;
use uuid::Uuid;

/// Tuning for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Principals per committed batch.
    pub batch_size: usize,

    /// Upper bound on rows (principals plus edges) pending in one batch.
    pub max_batch_rows: usize,

    /// Principals resolved concurrently within a stage.
    pub workers: usize,

    /// Upper bound on a single directory query attempt.
    pub query_timeout: Duration,

    /// Retries after the first attempt for transient query failures.
    pub max_retries: u32,

    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,

    /// Run to resume instead of starting a new one.
    pub resume_run_id: Option<Uuid>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_batch_rows: 20_000,
            workers: 8,
            query_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_initial_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(10),
            resume_run_id: None,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Unset variables take their defaults. Set but unparsable values, and
    /// zero for any size or count, are rejected.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let defaults = Self::default();

        let batch_size = read_positive(&reader, "DIRGRAPH_BATCH_SIZE", defaults.batch_size)?;
        let max_batch_rows =
            read_positive(&reader, "DIRGRAPH_MAX_BATCH_ROWS", defaults.max_batch_rows)?;
        let workers = read_positive(&reader, "DIRGRAPH_WORKERS", defaults.workers)?;

        let query_timeout = Duration::from_millis(read_positive(
            &reader,
            "DIRGRAPH_QUERY_TIMEOUT_MS",
            defaults.query_timeout.as_millis() as u64,
        )?);

        // Zero retries is a valid choice: fail on the first transient error.
        let max_retries = read_or(&reader, "DIRGRAPH_QUERY_RETRIES", defaults.max_retries)?;

        let retry_initial_delay = Duration::from_millis(read_positive(
            &reader,
            "DIRGRAPH_RETRY_INITIAL_DELAY_MS",
            defaults.retry_initial_delay.as_millis() as u64,
        )?);
        let retry_max_delay = Duration::from_millis(read_positive(
            &reader,
            "DIRGRAPH_RETRY_MAX_DELAY_MS",
            defaults.retry_max_delay.as_millis() as u64,
        )?);
        if retry_max_delay < retry_initial_delay {
            return Err(ConfigError::InvalidValue(
                "DIRGRAPH_RETRY_MAX_DELAY_MS".into(),
                "must not be below DIRGRAPH_RETRY_INITIAL_DELAY_MS".into(),
            ));
        }

        let resume_run_id = match reader("DIRGRAPH_RESUME_RUN_ID") {
            Ok(raw) if !raw.trim().is_empty() => Some(Uuid::parse_str(raw.trim()).map_err(|e| {
                ConfigError::InvalidValue("DIRGRAPH_RESUME_RUN_ID".into(), e.to_string())
            })?),
            _ => None,
        };

        Ok(Self {
            batch_size,
            max_batch_rows,
            workers,
            query_timeout,
            max_retries,
            retry_initial_delay,
            retry_max_delay,
            resume_run_id,
        })
    }

    /// Retry policy for directory queries.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: self.retry_initial_delay,
            max_delay: self.retry_max_delay,
            attempt_timeout: self.query_timeout,
            ..RetryConfig::default()
        }
    }
}

/// Load PostgreSQL sink settings: `DATABASE_URL` (required) and
/// `DIRGRAPH_DB_MAX_CONNECTIONS`.
pub fn db_config_from_env() -> Result<DbConfig, ConfigError> {
    db_config_from_reader(|key| std::env::var(key))
}

pub fn db_config_from_reader<F>(reader: F) -> Result<DbConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let url = reader("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL".into()))?;
    let config = DbConfig::new(url);
    let max_connections =
        read_positive(&reader, "DIRGRAPH_DB_MAX_CONNECTIONS", config.max_connections)?;
    Ok(config.with_max_connections(max_connections))
}

fn read_or<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn read_positive<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let value = read_or(reader, key, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue(
            key.into(),
            "must be greater than zero".into(),
        ));
    }
    Ok(value)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
