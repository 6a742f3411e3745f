use gridfleet_instrument::Symbol;
use thiserror::Error;

/// Errors surfaced by [`crate::gateway::ExchangeGateway`] implementations.
///
/// Per the transient-network taxonomy, connection-level failures are retried internally by the
/// gateway and never reach this type; what does reach callers is either an explicit order
/// rejection or an unrecoverable configuration problem.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: Symbol, reason: String },

    #[error("instrument discovery failed: {0}")]
    InstrumentDiscovery(#[from] gridfleet_integration::error::IntegrationError),

    #[error("wallet balance query failed: {0}")]
    WalletBalance(String),

    #[error("missing API credentials for LIVE mode")]
    MissingCredentials,
}
