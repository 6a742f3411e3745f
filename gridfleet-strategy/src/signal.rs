use crate::supertrend::Trend;
use gridfleet_instrument::{Symbol, TradeMode};
use serde::{Deserialize, Serialize};

/// Current position status as published by the Portfolio/Grid Manager over the status watch
/// channel (§9: the cyclic Strategy→Portfolio reference is replaced by this one-way publish).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub enum PositionStatus {
    #[default]
    Flat,
    Long,
    Short,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub enum SignalKind {
    EntryLong,
    EntryShort,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct TradeSignal {
    pub symbol: Symbol,
    pub kind: SignalKind,
    pub reason: String,
}

/// Pure SuperTrend-flip signal generator (§4.3).
///
/// Stateless aside from the last-emitted-signal memo used to suppress consecutive duplicates;
/// everything it needs - the prior bar's trend and the agent's current status - is passed in by
/// the caller rather than fetched through a back-reference.
#[derive(Debug, Default)]
pub struct SignalGenerator {
    trade_mode: TradeMode,
    last_emitted: Option<(SignalKind, PositionStatus)>,
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts emitted signals to the configured side of the market (§6): a `LongOnly`
    /// generator never emits `EntryShort`, and a `ShortOnly` generator never emits `EntryLong`,
    /// regardless of what SuperTrend does.
    pub fn with_trade_mode(trade_mode: TradeMode) -> Self {
        Self {
            trade_mode,
            ..Self::default()
        }
    }

    /// `prior_trend` is the SuperTrend direction of the second-to-last closed bar - using the
    /// latest still-forming bar would flip-flop intrabar, so the Market Data Router always hands
    /// this generator the trend one bar behind the freshest close (§4.3 rationale).
    ///
    /// The duplicate-suppression memo is keyed on `(kind, status)`, not `kind` alone: a reversal
    /// signal that flattened the agent changes `status` back to `Flat` on the very next call even
    /// though `prior_trend` hasn't moved again, and that status change is what lets the opposing
    /// entry fire once the flattening fill has actually landed, instead of getting stuck behind
    /// the memo of the reversal signal that triggered it.
    pub fn evaluate(
        &mut self,
        symbol: &Symbol,
        prior_trend: Trend,
        status: PositionStatus,
    ) -> Option<TradeSignal> {
        let kind = match (prior_trend, status) {
            (Trend::Up, status)
                if status != PositionStatus::Long && self.trade_mode != TradeMode::ShortOnly =>
            {
                SignalKind::EntryLong
            }
            (Trend::Down, status)
                if status != PositionStatus::Short && self.trade_mode != TradeMode::LongOnly =>
            {
                SignalKind::EntryShort
            }
            _ => return None,
        };

        if self.last_emitted == Some((kind, status)) {
            return None;
        }
        self.last_emitted = Some((kind, status));

        Some(TradeSignal {
            symbol: symbol.clone(),
            kind,
            reason: format!("supertrend flip to {prior_trend:?}"),
        })
    }
}
