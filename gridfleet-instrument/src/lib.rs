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

//! # Gridfleet-Instrument
//! Core data model shared by every Gridfleet crate: the opaque [`Symbol`] identifier, the
//! [`Side`] of an order, the [`OrderTag`] used to mark grid/exit intent, and the
//! [`StrategyParams`]/[`Timeframe`]/[`TradeMode`] triple the Orchestrator selects per symbol.
//!
//! Nothing in this crate depends on channels, gateways or persistence — it is the leaf of the
//! dependency graph, same role `barter-instrument` plays for the teacher lineage.

/// [`Symbol`] and [`Side`] - the identifiers every other crate keys its state by.
pub mod asset;

/// [`StrategyParams`], [`Timeframe`] and [`TradeMode`] - the parameters an Orchestrator cycle
/// selects for a symbol and hands to the Bot Manager.
pub mod params;

pub use asset::{OrderTag, Side, Symbol};
pub use params::{StrategyParams, Timeframe, TradeMode};
