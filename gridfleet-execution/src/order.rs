use gridfleet_instrument::{OrderTag, Side, Symbol};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::Formatter;

/// Client-generated identifier attached to every outbound [`Order`].
///
/// Random rather than sequential, same choice the teacher lineage makes for its
/// `ClientOrderId` - the agent never needs to correlate this against anything but its own
/// echoed fill, so there is no ordering requirement to preserve.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct ClientOrderId(pub SmolStr);

impl ClientOrderId {
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let value: u64 = rng.random();
        Self(SmolStr::new(format!("cid_{value:016x}")))
    }
}

impl std::fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exchange-assigned identifier returned once an order is accepted.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct OrderId(pub SmolStr);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// An outbound order, as enqueued by the Portfolio/Grid Manager and consumed by the Order
/// Executor. `price` is required iff `kind == Limit`, checked by [`Order::new_limit`] /
/// [`Order::new_market`] rather than at every call site.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub client_order_id: ClientOrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub tag: Option<OrderTag>,
}

impl Order {
    pub fn new_market(symbol: Symbol, side: Side, qty: Decimal, tag: Option<OrderTag>) -> Self {
        Self {
            client_order_id: ClientOrderId::random(),
            symbol,
            side,
            kind: OrderKind::Market,
            qty,
            price: None,
            tag,
        }
    }

    pub fn new_limit(
        symbol: Symbol,
        side: Side,
        qty: Decimal,
        price: Decimal,
        tag: Option<OrderTag>,
    ) -> Self {
        Self {
            client_order_id: ClientOrderId::random(),
            symbol,
            side,
            kind: OrderKind::Limit,
            qty,
            price: Some(price),
            tag,
        }
    }
}

/// Result of submitting an [`Order`] to an [`crate::gateway::ExchangeGateway`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum PlaceOrderOutcome {
    Accepted {
        order_id: OrderId,
        /// Average fill price reported immediately by the exchange, when available (typical
        /// for a simulated or market-order fill). `None` forces the executor to fall back to
        /// the order's own price (LIMIT) or a last-trade lookup (MARKET).
        avg_price: Option<Decimal>,
    },
    Rejected {
        reason: String,
    },
}

/// Confirms that an [`Order`] (or part of one) has been filled at the exchange.
///
/// Pushed by the Order Executor into the owning agent's fill channel; the Portfolio/Grid
/// Manager is the sole consumer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FillConfirmation {
    pub symbol: Symbol,
    pub order_id: OrderId,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub tag: Option<OrderTag>,
}
