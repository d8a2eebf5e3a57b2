use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LogLevel};

/// Install the global tracing subscriber, writing to stdout.
///
/// JSON output flattens event fields at the top level so aggregators
/// can index `hazard`, `identifier`, and the cycle counters directly;
/// text output is the colored development format. A `RUST_LOG` env var
/// overrides the configured `level`. Calling this twice panics (global
/// subscriber already set), so it belongs in `main` and nowhere else.
pub fn init_logging(level: LogLevel, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let base = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_ansi(false),
            )
            .init(),
        LogFormat::Text => base.with(fmt::layer().pretty().with_target(true)).init(),
    }
}
