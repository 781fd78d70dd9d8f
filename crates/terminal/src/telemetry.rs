//! Logging and error tracking setup.
//!
//! Call [`init`] once at startup, before anything logs, and keep the
//! returned guard alive for the life of the process so buffered Sentry
//! events are flushed on exit.

use sentry::integrations::tracing as sentry_tracing;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "balcao_terminal=info";

/// Logging and error tracking settings.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Emit one JSON object per log line instead of human-readable text.
    pub log_json: bool,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &TelemetryConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the global tracing subscriber, with Sentry when a DSN is set.
///
/// # Errors
///
/// Returns `TelemetryError::AlreadyInitialized` if a global subscriber was
/// installed earlier in this process.
pub fn init(config: &TelemetryConfig) -> Result<Option<sentry::ClientInitGuard>, TelemetryError> {
    // Sentry must be initialized before the subscriber
    let guard = init_sentry(config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let json = config.log_json.then(|| tracing_subscriber::fmt::layer().json());
    let text = (!config.log_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(text)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .try_init()?;

    if guard.is_some() {
        tracing::info!("Sentry initialized");
    }
    Ok(guard)
}
