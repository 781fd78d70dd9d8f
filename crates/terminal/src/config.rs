//! Terminal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BALCAO_REMOTE_DATABASE_URL` - `PostgreSQL` connection string for the
//!   remote store (falls back to `DATABASE_URL`)
//! - `BALCAO_IDENTITY_API_KEY` - Identity provider API key (high entropy)
//!
//! ## Optional
//! - `BALCAO_REPLICA_URL` - `SQLite` replica (default: `sqlite://balcao-replica.db`)
//! - `BALCAO_RUN_MIGRATIONS` - Apply remote migrations at startup when `true` or `1`
//! - `BALCAO_IDENTITY_ENDPOINT` - Password sign-in URL
//! - `BALCAO_PROBE_ENDPOINTS` - Comma-separated reachability probe URLs
//! - `BALCAO_PROBE_TIMEOUT_MS` - Probe timeout (default: 4000)
//! - `BALCAO_PROBE_INTERVAL_SECS` - Probe interval (default: 10)
//! - `BALCAO_LOGIN_TIMEOUT_SECS` - Remote login timeout (default: 10)
//! - `BALCAO_BOOT_TIMEOUT_SECS` - Boot hydration timeout (default: 8)
//! - `BALCAO_COMMIT_MAX_ATTEMPTS` - Sale commit attempts (default: 5)
//! - `BALCAO_PLANS_FILE` - JSON plan table replacing the built-in plans
//! - `BALCAO_LOG_JSON` - Emit JSON logs when `true` or `1`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::telemetry::TelemetryConfig;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_REPLICA_URL: &str = "sqlite://balcao-replica.db";
const DEFAULT_IDENTITY_ENDPOINT: &str =
    "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";
const DEFAULT_PROBE_ENDPOINTS: &str = "https://www.google.com/generate_204,\
     https://1.1.1.1/cdn-cgi/trace,\
     https://captive.apple.com/hotspot-detect.html";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Terminal configuration.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Remote store connection URL (contains password)
    pub remote_database_url: SecretString,
    /// Apply the embedded remote migrations at startup
    pub run_migrations: bool,
    /// Local replica connection URL
    pub replica_url: String,
    /// Identity provider settings
    pub identity: IdentityConfig,
    /// Reachability probing
    pub network: NetworkConfig,
    /// Bound on the boot hydration gate
    pub boot_timeout: Duration,
    /// Bound on a remote sign-in plus profile fetch
    pub login_timeout: Duration,
    /// Sale commit attempts before reporting a conflict
    pub commit_max_attempts: u32,
    /// Plan table override
    pub plans_file: Option<PathBuf>,
    /// Logging and error tracking
    pub telemetry: TelemetryConfig,
}

/// Identity provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct IdentityConfig {
    pub endpoint: Url,
    pub api_key: SecretString,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Reachability probe configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub probe_endpoints: Vec<Url>,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
}

impl TerminalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let remote_database_url = get_database_url("BALCAO_REMOTE_DATABASE_URL")?;
        let run_migrations =
            get_optional_env("BALCAO_RUN_MIGRATIONS").is_some_and(|v| parse_flag(&v));
        let replica_url = get_env_or_default("BALCAO_REPLICA_URL", DEFAULT_REPLICA_URL);

        let identity = IdentityConfig::from_env()?;
        let network = NetworkConfig::from_env()?;

        let boot_timeout = Duration::from_secs(parse_env("BALCAO_BOOT_TIMEOUT_SECS", 8)?);
        let login_timeout = Duration::from_secs(parse_env("BALCAO_LOGIN_TIMEOUT_SECS", 10)?);
        let commit_max_attempts: u32 = parse_env("BALCAO_COMMIT_MAX_ATTEMPTS", 5)?;
        if commit_max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BALCAO_COMMIT_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let plans_file = get_optional_env("BALCAO_PLANS_FILE").map(PathBuf::from);

        let telemetry = TelemetryConfig {
            log_json: get_optional_env("BALCAO_LOG_JSON").is_some_and(|v| parse_flag(&v)),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        };

        Ok(Self {
            remote_database_url,
            run_migrations,
            replica_url,
            identity,
            network,
            boot_timeout,
            login_timeout,
            commit_max_attempts,
            plans_file,
            telemetry,
        })
    }
}

impl IdentityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw = get_env_or_default("BALCAO_IDENTITY_ENDPOINT", DEFAULT_IDENTITY_ENDPOINT);
        let endpoint = Url::parse(&raw).map_err(|e| {
            ConfigError::InvalidEnvVar("BALCAO_IDENTITY_ENDPOINT".to_string(), e.to_string())
        })?;
        Ok(Self {
            endpoint,
            api_key: get_validated_secret("BALCAO_IDENTITY_API_KEY")?,
        })
    }
}

impl NetworkConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw = get_env_or_default("BALCAO_PROBE_ENDPOINTS", DEFAULT_PROBE_ENDPOINTS);
        let probe_endpoints = parse_endpoints(&raw).map_err(|reason| {
            ConfigError::InvalidEnvVar("BALCAO_PROBE_ENDPOINTS".to_string(), reason)
        })?;

        Ok(Self {
            probe_endpoints,
            probe_timeout: Duration::from_millis(parse_env("BALCAO_PROBE_TIMEOUT_MS", 4000)?),
            poll_interval: Duration::from_secs(parse_env("BALCAO_PROBE_INTERVAL_SECS", 10)?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a comma-separated list of probe URLs.
fn parse_endpoints(raw: &str) -> Result<Vec<Url>, String> {
    let endpoints = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Url::parse(s).map_err(|e| format!("{s}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    if endpoints.is_empty() {
        return Err("at least one endpoint is required".to_string());
    }
    Ok(endpoints)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
