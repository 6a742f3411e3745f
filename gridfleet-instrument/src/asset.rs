use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display as _, Formatter};

/// An opaque exchange instrument identifier (eg/ `"BTCUSDT"`). Equality is by value.
///
/// Backed by a [`SmolStr`] so short tickers never allocate, matching the teacher lineage's
/// choice for every other short exchange-facing identifier (`ClientOrderId`, `OrderId`).
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct Symbol(pub SmolStr);

impl Symbol {
    pub fn new<S: Into<SmolStr>>(symbol: S) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// [`Side`] of an order or position - Buy or Sell.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
        )
    }
}

impl Side {
    /// The opposing [`Side`] - used when flattening a position.
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Intent tag carried by an [`Order`](crate) / [`FillConfirmation`](crate), replacing the
/// source's free-string tags (`"GRID_ENTRY_1"`, `"EXIT_FLATTEN"`) with a closed enum, since every
/// tag value used by this system is one of these two shapes (§3).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum OrderTag {
    /// The `i`-th grid entry level, 1-indexed (`GRID_ENTRY_1` is the initial entry).
    GridEntry(u8),
    /// A market order that flattens the current position, either from a trend reversal or a
    /// drop-out decommission.
    ExitFlatten,
}

impl std::fmt::Display for OrderTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderTag::GridEntry(level) => write!(f, "GRID_ENTRY_{level}"),
            OrderTag::ExitFlatten => f.write_str("EXIT_FLATTEN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_equality_is_by_value() {
        assert_eq!(Symbol::new("BTCUSDT"), Symbol::from("BTCUSDT"));
        assert_ne!(Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT"));
    }

    #[test]
    fn side_opposite_round_trips() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite().opposite(), Side::Sell);
    }

    #[test]
    fn order_tag_display() {
        assert_eq!(OrderTag::GridEntry(1).to_string(), "GRID_ENTRY_1");
        assert_eq!(OrderTag::ExitFlatten.to_string(), "EXIT_FLATTEN");
    }
}
