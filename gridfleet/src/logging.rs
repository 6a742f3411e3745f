use gridfleet_strategy::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise process logging according to `LOG_FORMAT` (§4.9, §4.11): `text` for a human
/// reading a terminal, `json` for a log aggregator.
pub fn init_logging(format: LogFormat) {
    match format {
        LogFormat::Text => init_text_logging(),
        LogFormat::Json => init_json_logging(),
    }
}

fn init_text_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}
