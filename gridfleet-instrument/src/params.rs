use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Candle resolution a symbol's strategy operates on.
///
/// Modelled as a closed enum rather than a bare integer-of-minutes because only three
/// resolutions are ever valid grid-search/orchestrator inputs (§3).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M1, Timeframe::M5, Timeframe::M15];

    pub fn minutes(self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.minutes()))
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.minutes())
    }
}

/// Which side(s) of the market an agent is permitted to trade.
///
/// Selected fleet-wide via the `TRADE_MODE` environment variable (§6) and applied by every
/// agent's `SignalGenerator`: a `LongOnly`/`ShortOnly` agent ignores SuperTrend flips into the
/// disallowed direction rather than opening a position.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize)]
pub enum TradeMode {
    #[default]
    DualSide,
    LongOnly,
    ShortOnly,
}

impl std::str::FromStr for TradeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dual" | "dual_side" | "both" => Ok(TradeMode::DualSide),
            "long" | "long_only" => Ok(TradeMode::LongOnly),
            "short" | "short_only" => Ok(TradeMode::ShortOnly),
            other => Err(format!("unrecognised trade mode: {other}")),
        }
    }
}

/// The SuperTrend grid parameters selected for one symbol in one Orchestrator cycle.
///
/// `supertrend_period` and `supertrend_multiplier` are validated against the grid-search
/// candidate sets by the caller (`gridfleet-strategy::backtest`); this type itself just carries
/// the chosen values through to the live agent.
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
pub struct StrategyParams {
    pub timeframe: Timeframe,
    pub supertrend_period: usize,
    pub supertrend_multiplier: Decimal,
}

impl StrategyParams {
    /// `ATR` period candidates considered by the grid-search backtester (§4.8).
    pub const PERIOD_CANDIDATES: [usize; 3] = [20, 30, 40];

    /// `ATR` multiplier candidates considered by the grid-search backtester (§4.8).
    pub const MULTIPLIER_CANDIDATES: [&'static str; 5] = ["2.0", "2.5", "3.0", "3.5", "4.0"];

    pub fn new(timeframe: Timeframe, supertrend_period: usize, supertrend_multiplier: Decimal) -> Self {
        Self {
            timeframe,
            supertrend_period,
            supertrend_multiplier,
        }
    }
}
