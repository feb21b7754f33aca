//! Poller Configuration
//!
//! Settings come from process environment variables, optionally seeded
//! from a `.env` file in `ENV_FILES_DIR` (or the working directory).
//! Empty values count as unset.

use crate::backoff::BackoffPolicy;
use ::config::{Config, Environment};
use poll_scheduler::{AssemblerConfig, DEFAULT_FULL_REFRESH_ITERATIONS};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use telemetry_bus::PublishTarget;
use thiserror::Error;
use vehicle_api::DEFAULT_API_BASE_URL;
use vehicle_auth::{AccessToken, Credentials, DEFAULT_AUTH_URL};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Need to provide {0} environment variable")]
    Missing(&'static str),

    #[error("Need to provide TESLA_TOKEN, TESLA_REFRESH_TOKEN or TESLA_USERNAME and TESLA_PASSWORD")]
    MissingCredentials,

    #[error("Invalid configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Broker connection settings
#[derive(Clone)]
pub struct BusSettings {
    /// AMQP URI, may embed a password
    pub connection_string: String,
    pub target: PublishTarget,
}

impl fmt::Debug for BusSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSettings")
            .field("connection_string", &"<redacted>")
            .field("target", &self.target)
            .finish()
    }
}

/// Fully validated poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub credentials: Credentials,
    pub bus: BusSettings,
    /// Debug-level logging
    pub verbose: bool,
    pub log_format: LogFormat,
    /// Delay between successful ticks
    pub tick_interval: Duration,
    /// Delay policy after a failed tick
    pub backoff: BackoffPolicy,
    pub assembler: AssemblerConfig,
    pub api_base_url: String,
    pub auth_url: String,
    /// Which vehicle of the account to poll
    pub vehicle_index: usize,
}

/// Raw environment values, keys lowercased by the `config` crate
#[derive(Deserialize)]
struct RawSettings {
    tesla_username: Option<String>,
    tesla_password: Option<String>,
    tesla_token: Option<String>,
    tesla_refresh_token: Option<String>,
    amqp_conn: Option<String>,
    amqp_exchange: Option<String>,
    amqp_exchange_type: Option<String>,
    amqp_routing_key: Option<String>,
    verbose_mode: Option<String>,
    log_format: Option<String>,
    poll_tick_interval_secs: u64,
    poll_backoff_secs: u64,
    poll_backoff_factor: f64,
    poll_backoff_max_secs: u64,
    poll_fetch_timeout_secs: u64,
    poll_full_refresh_iterations: u32,
    poll_max_concurrency: usize,
    tesla_api_base_url: String,
    tesla_auth_url: String,
    tesla_vehicle_index: usize,
}

/// Load `.env` from `ENV_FILES_DIR` or the working directory.
///
/// Variables already set in the process win; a missing file is ignored.
fn load_dotenv() {
    let dir = std::env::var_os("ENV_FILES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = dotenvy::from_path(dir.join(".env"));
}

impl PollerConfig {
    /// Load from `.env` and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_environment(Environment::default())
    }

    /// Load from an explicit environment source
    pub fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let raw: RawSettings = Config::builder()
            .set_default("poll_tick_interval_secs", 30_i64)?
            .set_default("poll_backoff_secs", 60_i64)?
            .set_default("poll_backoff_factor", 1.0_f64)?
            .set_default("poll_backoff_max_secs", 600_i64)?
            .set_default("poll_fetch_timeout_secs", 30_i64)?
            .set_default(
                "poll_full_refresh_iterations",
                i64::from(DEFAULT_FULL_REFRESH_ITERATIONS),
            )?
            .set_default("poll_max_concurrency", 1_i64)?
            .set_default("tesla_api_base_url", DEFAULT_API_BASE_URL)?
            .set_default("tesla_auth_url", DEFAULT_AUTH_URL)?
            .set_default("tesla_vehicle_index", 0_i64)?
            .add_source(env)
            .build()?
            .try_deserialize()?;

        raw.validate()
    }
}

impl RawSettings {
    fn validate(self) -> Result<PollerConfig, ConfigError> {
        let credentials = select_credentials(
            non_empty(self.tesla_refresh_token),
            non_empty(self.tesla_token),
            non_empty(self.tesla_username),
            non_empty(self.tesla_password),
        )?;

        let bus = BusSettings {
            connection_string: required(self.amqp_conn, "AMQP_CONN")?,
            target: PublishTarget {
                exchange: required(self.amqp_exchange, "AMQP_EXCHANGE")?,
                exchange_type: required(self.amqp_exchange_type, "AMQP_EXCHANGE_TYPE")?,
                routing_key: required(self.amqp_routing_key, "AMQP_ROUTING_KEY")?,
            },
        };

        let fetch_timeout = match self.poll_fetch_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(PollerConfig {
            credentials,
            bus,
            verbose: is_truthy(self.verbose_mode.as_deref()),
            log_format: LogFormat::parse(self.log_format.as_deref()),
            tick_interval: Duration::from_secs(self.poll_tick_interval_secs),
            backoff: BackoffPolicy {
                first: Duration::from_secs(self.poll_backoff_secs),
                max: Duration::from_secs(self.poll_backoff_max_secs),
                factor: self.poll_backoff_factor,
            },
            assembler: AssemblerConfig {
                max_concurrency: self.poll_max_concurrency,
                fetch_timeout,
                full_refresh_iterations: self.poll_full_refresh_iterations,
            },
            api_base_url: self.tesla_api_base_url,
            auth_url: self.tesla_auth_url,
            vehicle_index: self.tesla_vehicle_index,
        })
    }
}

/// Refresh token first, then a long-lived token, then password login
fn select_credentials(
    refresh_token: Option<String>,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<Credentials, ConfigError> {
    if let Some(refresh) = refresh_token {
        return Ok(Credentials::RefreshToken(refresh));
    }
    if let Some(token) = token {
        return Ok(Credentials::Token(AccessToken::new(token)));
    }
    match (username, password) {
        (Some(username), Some(password)) => Ok(Credentials::Password { username, password }),
        _ => Err(ConfigError::MissingCredentials),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing(name))
}

/// Any non-empty value except `0`, `false`, `no` and `off`
fn is_truthy(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !["0", "false", "no", "off"]
            .iter()
            .any(|f| v.eq_ignore_ascii_case(f)),
    }
}
