#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Gridfleet-Execution
//! The order model and the [`gateway::ExchangeGateway`] abstraction that every other Gridfleet
//! component is written against, plus the two concrete gateways: [`simulated::SimulatedGateway`]
//! (`SIMULATION` mode) and [`live::LiveGateway`] (`LIVE` mode).

pub mod error;
pub mod gateway;
pub mod live;
pub mod order;
pub mod simulated;

pub use error::ExecutionError;
pub use gateway::{ExchangeGateway, InstrumentCategory, Trade};
pub use order::{ClientOrderId, FillConfirmation, Order, OrderId, OrderKind, PlaceOrderOutcome};
