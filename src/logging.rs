//! # Process-wide tracing setup.
//!
//! [`init_tracing`] installs a `tracing-subscriber` fmt layer filtered by
//! `RUST_LOG` (default `info`). Set `ACTION_HUB_LOG_FORMAT=json` for one JSON
//! object per line. Calling it again, or after another global subscriber was
//! installed, is a no-op.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format of the global subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// Newline-delimited JSON.
    Json,
}

impl LogFormat {
    /// Reads `ACTION_HUB_LOG_FORMAT` (`json` or anything else for text).
    pub fn from_env() -> Self {
        Self::parse(std::env::var("ACTION_HUB_LOG_FORMAT").ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Installs the global tracing subscriber once.
pub fn init_tracing() {
    INITIALIZED.get_or_init(|| {
        let format = LogFormat::from_env();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_target(true).with_current_span(false))
                .try_init(),
            LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
        };

        match installed {
            Ok(()) => tracing::debug!(?format, "tracing initialized"),
            Err(_) => tracing::debug!("global tracing subscriber already set; keeping it"),
        }
    });
}
