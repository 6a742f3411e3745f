#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Gridfleet-Strategy
//! The SuperTrend indicator ([`supertrend`]), the pure signal generator ([`signal`]), fixed
//! fractional risk sizing ([`risk`]), the vectorized grid-search backtester ([`backtest`]) and
//! process-wide environment configuration ([`config`]).

pub mod backtest;
pub mod config;
pub mod error;
pub mod risk;
pub mod signal;
pub mod supertrend;

pub use config::{FleetConfig, LogFormat, RunMode};
pub use error::{Result, StrategyError};
pub use signal::{PositionStatus, SignalGenerator, SignalKind, TradeSignal};
pub use supertrend::{SuperTrend, Trend};
