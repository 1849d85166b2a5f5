//! Tracing subscriber setup for binaries and local runs embedding the engine.
//!
//! The filter comes from `RUST_LOG`, defaulting to `info`.

use hybridpay_types::{HybridPayError, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log shipping.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = HybridPayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(HybridPayError::Configuration(format!(
                "unknown log format {other:?}, expected \"pretty\" or \"json\""
            ))),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
/// `Configuration` if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_thread_ids(true),
            )
            .try_init(),
    };
    installed
        .map_err(|e| HybridPayError::Configuration(format!("tracing already initialised: {e}")))
}
