//! Structured logging setup.
//!
//! Every batch runs inside a `batch` span carrying `batch_id` and `size`,
//! so with JSON output each event of a batch names the batch it belongs to:
//!
//! ```json
//! {"timestamp":"2024-01-15T10:30:00.000Z","level":"WARN","fields":{"message":"batch failed","kind":"shape","status":"Some(502)","error":"Invalid response: <html>bad gateway</html>"},"target":"gqlbatch_core::coalescer::engine","span":{"batch_id":0,"size":3,"name":"batch"}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use gqlbatch_client::observability::{init_logging, LoggingConfig};
//!
//! let config = ClientConfig::load("gqlbatch.yaml")?;
//! init_logging(LoggingConfig::from_settings(&config.logging));
//! ```

use tracing::Level;
use tracing_subscriber::fmt::{self, format::FmtSpan, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub json_format: bool,
    /// Level used when `RUST_LOG` is not set.
    pub default_level: Level,
    /// Emit an event when a span opens and when it closes.
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_settings(&LoggingSettings::default())
    }
}

impl LoggingConfig {
    /// Resolves the `logging` section of the client configuration.
    ///
    /// An unparseable level falls back to INFO; [`ClientConfig::validate`]
    /// rejects such levels before this point.
    ///
    /// [`ClientConfig::validate`]: crate::config::ClientConfig::validate
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            json_format: settings.json,
            default_level: settings.level.parse().unwrap_or(Level::INFO),
            include_spans: settings.spans,
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false`
/// when a global subscriber was already installed.
pub fn init_logging(config: LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    if config.json_format {
        json_with_filter(&config, filter, std::io::stdout)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_span_events(config.span_events()),
            )
            .try_init()
            .is_ok()
    }
}

/// JSON subscriber writing to `writer` at exactly the configured level.
///
/// Ignores `RUST_LOG`; meant for embedding in a host's own dispatch or for
/// capturing output.
pub fn json_subscriber<W>(
    config: &LoggingConfig,
    writer: W,
) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    json_with_filter(config, EnvFilter::new(config.default_level.to_string()), writer)
}

fn json_with_filter<W>(
    config: &LoggingConfig,
    filter: EnvFilter,
    writer: W,
) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(config.span_events()),
    )
}
