use thiserror::Error;

/// Errors raised while fetching historical klines, running the grid-search backtest, or loading
/// fleet configuration. Gateway-level failures are `gridfleet_execution::ExecutionError`; this
/// type only covers the strategy-and-configuration layer above it.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("historical kline fetch failed: {0}")]
    KlineFetch(String),

    #[error("backtest aborted: {0}")]
    Backtest(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("decimal conversion error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("integration error: {0}")]
    Integration(#[from] gridfleet_integration::error::IntegrationError),
}

pub type Result<T> = std::result::Result<T, StrategyError>;