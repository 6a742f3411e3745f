use gridfleet_instrument::StrategyParams;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use ta::indicators::AverageTrueRange;
use ta::{DataItem, Next};

/// Trend direction implied by the SuperTrend band the close most recently crossed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    /// `+1`/`-1` position-series encoding used by the backtester (§4.8).
    pub fn as_position(self) -> i8 {
        match self {
            Trend::Up => 1,
            Trend::Down => -1,
        }
    }
}

/// One bar's worth of SuperTrend output: the flip-resistant upper/lower bands and the direction
/// implied by which one the close is riding.
#[derive(Copy, Clone, Debug)]
pub struct SuperTrendValue {
    pub upper_band: f64,
    pub lower_band: f64,
    pub trend: Trend,
}

/// Incremental SuperTrend indicator. ATR-smoothed bands ratchet monotonically in the direction
/// of the prevailing trend and only reset on a flip, which is what gives SuperTrend its
/// characteristic resistance to whipsaw relative to a raw ATR channel.
#[derive(Debug)]
pub struct SuperTrend {
    period: usize,
    multiplier: f64,
    atr: AverageTrueRange,
    upper_band: f64,
    lower_band: f64,
    prev_close: Option<f64>,
    prev_trend: Option<Trend>,
    bars_seen: usize,
}

impl SuperTrend {
    pub fn new(period: usize, multiplier: Decimal) -> Self {
        Self {
            period,
            multiplier: multiplier.to_f64().unwrap_or(3.0),
            atr: AverageTrueRange::new(period).expect("supertrend ATR period must be >= 1"),
            upper_band: 0.0,
            lower_band: 0.0,
            prev_close: None,
            prev_trend: None,
            bars_seen: 0,
        }
    }

    pub fn from_params(params: &StrategyParams) -> Self {
        Self::new(params.supertrend_period, params.supertrend_multiplier)
    }

    /// Number of closed bars required before `next` produces a meaningful trend (§4.2: "If
    /// history length > supertrend_period").
    pub fn warmup_bars(&self) -> usize {
        self.period
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    /// Feeds one closed OHLC bar, returning the updated bands/trend. The first call establishes
    /// direction from the close-vs-upper-band comparison with no prior state to ratchet against.
    pub fn next(&mut self, high: f64, low: f64, close: f64) -> SuperTrendValue {
        self.bars_seen += 1;

        let atr = self.atr.next(&DataItem::builder()
            .high(high)
            .low(low)
            .close(close)
            .open(close)
            .volume(0.0)
            .build()
            .expect("well-formed OHLC bar"));

        let hl2 = (high + low) / 2.0;
        let basic_upper = hl2 + self.multiplier * atr;
        let basic_lower = hl2 - self.multiplier * atr;

        let prev_close = self.prev_close.unwrap_or(close);

        let final_upper = if basic_upper < self.upper_band || prev_close > self.upper_band {
            basic_upper
        } else {
            self.upper_band
        };
        let final_lower = if basic_lower > self.lower_band || prev_close < self.lower_band {
            basic_lower
        } else {
            self.lower_band
        };

        let trend = match self.prev_trend {
            None => {
                if close <= final_upper {
                    Trend::Down
                } else {
                    Trend::Up
                }
            }
            Some(Trend::Up) => {
                if close < final_lower {
                    Trend::Down
                } else {
                    Trend::Up
                }
            }
            Some(Trend::Down) => {
                if close > final_upper {
                    Trend::Up
                } else {
                    Trend::Down
                }
            }
        };

        self.upper_band = final_upper;
        self.lower_band = final_lower;
        self.prev_close = Some(close);
        self.prev_trend = Some(trend);

        SuperTrendValue {
            upper_band: final_upper,
            lower_band: final_lower,
            trend,
        }
    }
}
