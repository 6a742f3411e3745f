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

//! # Gridfleet
//! A multi-symbol algorithmic trading fleet: one [`orchestrator::Orchestrator`] periodically
//! selects which symbols to trade by grid-searching a SuperTrend strategy over recent history,
//! and one [`bot_manager::BotManager`] starts and stops a per-symbol agent (Signal Generator,
//! Portfolio/Grid Manager, Order Executor) for each selected symbol, fed by a single
//! [`router::MarketDataRouter`] demultiplexing one [`gridfleet_execution::ExchangeGateway`]
//! trade stream. A thin [`http`] control plane exposes the Bot Manager's API externally.

/// Per-symbol agent components: the Portfolio/Grid Manager and the Order Executor.
pub mod agent;

/// Starts and stops the per-symbol agent task set (§4.6).
pub mod bot_manager;

/// Defines all possible top-level errors in Gridfleet.
pub mod error;

/// Thin `axum` control plane over the [`bot_manager::BotManager`] (§4.12).
pub mod http;

/// Provides Gridfleet's tracing logging initialisers.
pub mod logging;

/// Shared channel-carried types and per-agent persisted state.
pub mod model;

/// Periodic universe refresh, backtest-driven symbol selection, and reconciliation (§4.7).
pub mod orchestrator;

/// Demultiplexes the gateway's trade stream across registered agents and resamples to OHLCV.
pub mod router;
