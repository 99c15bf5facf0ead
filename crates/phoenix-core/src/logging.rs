//! Structured logging setup.
//!
//! Mirrors `alloy_runtime::logging`'s shape: a small builder over
//! `tracing-subscriber`'s env filter and fmt layer, rather than a bare
//! `tracing_subscriber::fmt::init()`, so a host application can fold socket
//! and channel spans into its own subscriber instead of fighting it.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Which span lifecycle events get logged, mirroring
/// `tracing_subscriber::fmt::format::FmtSpan` without forcing callers to
/// depend on `tracing-subscriber` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanEvents {
    /// Log nothing beyond the events explicitly recorded inside a span.
    None,
    /// Log when a span closes, with its recorded fields.
    Close,
    /// Log both span entry and close.
    Full,
}

impl SpanEvents {
    fn into_fmt_span(self) -> FmtSpan {
        match self {
            SpanEvents::None => FmtSpan::NONE,
            SpanEvents::Close => FmtSpan::CLOSE,
            SpanEvents::Full => FmtSpan::NEW | FmtSpan::CLOSE,
        }
    }
}

/// Builds a `tracing` subscriber tuned for the socket/channel/push
/// components and installs it as the global default.
///
/// `filter` follows `EnvFilter` syntax, e.g. `"phoenix_core=debug,warn"`.
/// Safe to call once per process; a second call is a no-op rather than a
/// panic, since libraries frequently end up linked into a binary that has
/// already installed its own subscriber.
pub fn init_with_filter(filter: &str, span_events: SpanEvents) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_span_events(span_events.into_fmt_span())
        .with_target(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Builds the subscriber from `RUST_LOG` (falling back to `"info"`) with no
/// span lifecycle logging.
pub fn init() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    init_with_filter(&filter, SpanEvents::None);
}
