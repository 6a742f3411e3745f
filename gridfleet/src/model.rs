use chrono::{DateTime, Utc};
use gridfleet_execution::{FillConfirmation, Order};
use gridfleet_instrument::Symbol;
use gridfleet_integration::channel::{DropOldestRx, DropOldestTx, UnboundedRx, UnboundedTx};
use gridfleet_strategy::{SuperTrend, Trend, TradeSignal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// One closed OHLCV candle, resampled by the Market Data Router from the raw trade stream
/// (§3). `ts` is the close-of-bar timestamp; within one symbol's rolling history, timestamps
/// are strictly increasing and spaced by the bar period - the Router is solely responsible for
/// upholding that invariant.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OHLCVBar {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single inbound trade tick, demultiplexed to one agent's price channel (§3).
#[derive(Clone, PartialEq, Debug)]
pub struct PriceUpdate {
    pub symbol: Symbol,
    pub price: Decimal,
}

/// History plus the freshly-computed SuperTrend direction, pushed to an agent's strategy
/// channel once its rolling history exceeds the configured warmup period (§4.2 step 3).
#[derive(Clone, Debug)]
pub struct EnrichedHistory {
    pub symbol: Symbol,
    /// Direction of the second-to-last closed bar - the Signal Generator evaluates off this
    /// one, not the freshest bar, to avoid intrabar flip-flop (§4.3).
    pub prior_trend: Trend,
}

/// Per-symbol rolling tick buffer and OHLCV history owned by the Market Data Router (§4.2).
/// Bounded to the last 500 bars; the in-progress minute's ticks live in `tick_buffer` until the
/// next 60-second resample drains them.
#[derive(Debug)]
pub struct SymbolHistory {
    pub tick_buffer: Vec<Decimal>,
    pub bars: VecDeque<OHLCVBar>,
    pub supertrend: SuperTrend,
    last_trend: Option<Trend>,
    prior_trend: Option<Trend>,
}

pub const MAX_HISTORY_BARS: usize = 500;

impl SymbolHistory {
    pub fn new(supertrend_period: usize, supertrend_multiplier: Decimal) -> Self {
        Self {
            tick_buffer: Vec::new(),
            bars: VecDeque::with_capacity(MAX_HISTORY_BARS),
            supertrend: SuperTrend::new(supertrend_period, supertrend_multiplier),
            last_trend: None,
            prior_trend: None,
        }
    }

    pub fn push_tick(&mut self, price: Decimal) {
        self.tick_buffer.push(price);
    }

    /// Resamples the buffered ticks into one OHLC bar using first/max/min/last, per §4.2 step 1.
    /// Returns `None` if no ticks arrived during the window (nothing to resample).
    pub fn resample(&mut self, ts: DateTime<Utc>) -> Option<OHLCVBar> {
        if self.tick_buffer.is_empty() {
            return None;
        }

        let open = self.tick_buffer.first().copied().unwrap_or_default();
        let close = self.tick_buffer.last().copied().unwrap_or_default();
        let high = self.tick_buffer.iter().copied().fold(open, Decimal::max);
        let low = self.tick_buffer.iter().copied().fold(open, Decimal::min);

        let bar = OHLCVBar {
            ts,
            open: to_f64(open),
            high: to_f64(high),
            low: to_f64(low),
            close: to_f64(close),
            volume: self.tick_buffer.len() as f64,
        };

        self.tick_buffer.clear();
        self.bars.push_back(bar);
        if self.bars.len() > MAX_HISTORY_BARS {
            self.bars.pop_front();
        }

        let value = self.supertrend.next(bar.high, bar.low, bar.close);
        self.prior_trend = self.last_trend;
        self.last_trend = Some(value.trend);

        Some(bar)
    }

    /// `Some` once at least one full trend transition has been observed, i.e. the bar
    /// immediately before the latest one has a known direction.
    pub fn prior_trend(&self) -> Option<Trend> {
        if self.bars.len() > self.supertrend.warmup_bars() {
            self.prior_trend
        } else {
            None
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}

/// Persisted per-symbol state (§3). The Portfolio/Grid Manager is its sole mutator.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct AgentState {
    pub balance_real: Decimal,
    pub position_size: Decimal,
    pub avg_entry_price: Decimal,
    pub n_entries: u8,
    pub long_grid_prices: Vec<Decimal>,
    pub short_grid_prices: Vec<Decimal>,
}

impl AgentState {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            balance_real: initial_capital,
            position_size: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            n_entries: 0,
            long_grid_prices: Vec::new(),
            short_grid_prices: Vec::new(),
        }
    }
}

/// In-memory Orchestrator state (§3). `current_selection` survives across cycles;
/// `tradable_universe` is refreshed every cycle.
#[derive(Clone, Default, Debug)]
pub struct FleetState {
    pub current_selection: HashSet<Symbol>,
    pub tradable_universe: HashSet<Symbol>,
}

/// Shared last-trade price cell, written by the Market Data Router and read by the Order
/// Executor's "last-trade lookup" fallback for a market fill with no reported average price
/// (§4.5). One per agent.
pub type LastPrice = Arc<Mutex<Option<Decimal>>>;

pub type PriceTx = DropOldestTx<PriceUpdate>;
pub type PriceRx = DropOldestRx<PriceUpdate>;
pub type StrategyTx = UnboundedTx<EnrichedHistory, tokio::sync::mpsc::error::SendError<EnrichedHistory>>;
pub type StrategyRx = UnboundedRx<EnrichedHistory>;
pub type SignalTx = UnboundedTx<TradeSignal, tokio::sync::mpsc::error::SendError<TradeSignal>>;
pub type SignalRx = UnboundedRx<TradeSignal>;
pub type OrderTx = UnboundedTx<Order, tokio::sync::mpsc::error::SendError<Order>>;
pub type OrderRx = UnboundedRx<Order>;
pub type FillTx = UnboundedTx<FillConfirmation, tokio::sync::mpsc::error::SendError<FillConfirmation>>;
pub type FillRx = UnboundedRx<FillConfirmation>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn resample_uses_first_max_min_last() {
        let mut history = SymbolHistory::new(5, dec!(3.0));
        history.push_tick(dec!(100));
        history.push_tick(dec!(105));
        history.push_tick(dec!(95));
        history.push_tick(dec!(102));

        let bar = history.resample(Utc::now()).unwrap();
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.low, 95.0);
        assert_eq!(bar.close, 102.0);
    }

    #[test]
    fn resample_with_no_ticks_is_none() {
        let mut history = SymbolHistory::new(5, dec!(3.0));
        assert!(history.resample(Utc::now()).is_none());
    }

    #[test]
    fn history_is_bounded_to_max_bars() {
        let mut history = SymbolHistory::new(5, dec!(3.0));
        for i in 0..(MAX_HISTORY_BARS + 10) {
            history.push_tick(Decimal::from(100 + i));
            history.resample(Utc::now());
        }
        assert_eq!(history.bars.len(), MAX_HISTORY_BARS);
    }

    #[test]
    fn new_agent_state_is_flat() {
        let state = AgentState::new(dec!(10000));
        assert_eq!(state.position_size, Decimal::ZERO);
        assert_eq!(state.n_entries, 0);
        assert_eq!(state.avg_entry_price, Decimal::ZERO);
    }
}
