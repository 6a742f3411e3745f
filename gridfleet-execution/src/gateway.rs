use crate::error::ExecutionError;
use crate::order::{Order, PlaceOrderOutcome};
use async_trait::async_trait;
use gridfleet_instrument::Symbol;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt::Debug;

/// A single inbound trade tick, tagged by the symbol it belongs to so the Market Data Router
/// can demultiplex a single stream across every subscribed agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: Symbol,
    pub price: Decimal,
    pub ts: chrono::DateTime<chrono::Utc>,
}

/// Instrument categories exposed by `get_instruments`. The fleet trades linear perpetuals only;
/// the enum exists so the trait is not hard-coded to a single exchange's naming.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum InstrumentCategory {
    Linear,
}

/// The abstract surface every exchange integration (or the simulator) must provide.
///
/// Every component above this trait - Router, Portfolio, Executor, Orchestrator - is written
/// against it and is oblivious to whether the process is running LIVE or SIMULATION; that
/// choice is made once, at process wiring time, per §4.1.
#[async_trait]
pub trait ExchangeGateway: Debug + Send + Sync {
    /// Idempotent: subscribing to an already-subscribed symbol is a no-op.
    async fn subscribe(&self, symbol: Symbol) -> Result<(), ExecutionError>;

    /// Idempotent: unsubscribing from a symbol that isn't subscribed is a no-op.
    async fn unsubscribe(&self, symbol: Symbol) -> Result<(), ExecutionError>;

    /// Submits an order. Network/transport failures are an `Err`; an exchange-level rejection
    /// is `Ok(PlaceOrderOutcome::Rejected)` - the caller must not treat the two the same way,
    /// since only the latter means "the exchange received and refused this order".
    async fn place_order(&self, order: Order) -> Result<PlaceOrderOutcome, ExecutionError>;

    /// The tradable universe for a category, refreshed by the Orchestrator once per cycle.
    async fn get_instruments(
        &self,
        category: InstrumentCategory,
    ) -> Result<HashSet<Symbol>, ExecutionError>;

    async fn get_wallet_balance(&self) -> Result<Decimal, ExecutionError>;
}
