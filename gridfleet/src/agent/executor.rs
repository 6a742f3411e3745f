use crate::model::{FillTx, LastPrice, OrderRx};
use gridfleet_execution::{ExchangeGateway, FillConfirmation, OrderKind, PlaceOrderOutcome};
use gridfleet_instrument::Symbol;
use gridfleet_integration::channel::Tx;
use std::sync::Arc;
use tracing::{info, warn};

/// Consumes Orders from one agent's order channel and turns accepted ones into
/// [`FillConfirmation`]s (§4.5). Single-threaded per agent: orders are processed one at a time
/// in submission order, so a slow fill never reorders relative to a later order.
#[derive(Debug)]
pub struct Executor {
    symbol: Symbol,
    gateway: Arc<dyn ExchangeGateway>,
    last_price: LastPrice,
}

impl Executor {
    pub fn new(symbol: Symbol, gateway: Arc<dyn ExchangeGateway>, last_price: LastPrice) -> Self {
        Self {
            symbol,
            gateway,
            last_price,
        }
    }

    /// Drains `order_rx` until the channel closes, pushing a fill (or nothing, on rejection)
    /// into `fill_tx` for each order.
    pub async fn run(&self, mut order_rx: OrderRx, mut fill_tx: FillTx) {
        while let Some(order) = order_rx.rx.recv().await {
            self.handle_order(order, &mut fill_tx).await;
        }
        warn!(symbol = %self.symbol, "order channel closed, Executor stopping");
    }

    async fn handle_order(&self, order: gridfleet_execution::Order, fill_tx: &mut FillTx) {
        let kind = order.kind;
        let limit_price = order.price;
        let tag = order.tag;
        let side = order.side;
        let qty = order.qty;
        let symbol = order.symbol.clone();

        match self.gateway.place_order(order).await {
            Ok(PlaceOrderOutcome::Accepted { order_id, avg_price }) => {
                let price = match kind {
                    OrderKind::Limit => limit_price.or(avg_price),
                    OrderKind::Market => avg_price.or_else(|| self.last_trade_price()),
                };

                let Some(price) = price else {
                    warn!(%symbol, "accepted order has no resolvable fill price, dropping");
                    return;
                };

                if fill_tx
                    .send(FillConfirmation {
                        symbol,
                        order_id,
                        side,
                        qty,
                        price,
                        tag,
                    })
                    .is_err()
                {
                    warn!(symbol = %self.symbol, "fill channel receiver dropped");
                }
            }
            Ok(PlaceOrderOutcome::Rejected { reason }) => {
                info!(%symbol, %reason, "order rejected, dropping (no retry)");
            }
            Err(error) => {
                warn!(%symbol, %error, "gateway error placing order, dropping (no retry)");
            }
        }
    }

    fn last_trade_price(&self) -> Option<rust_decimal::Decimal> {
        *self.last_price.lock().expect("last price poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridfleet_execution::{ExecutionError, InstrumentCategory, Order, OrderId};
    use gridfleet_instrument::Side;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct StubGateway {
        outcome: PlaceOrderOutcome,
    }

    #[async_trait::async_trait]
    impl ExchangeGateway for StubGateway {
        async fn subscribe(&self, _symbol: Symbol) -> Result<(), ExecutionError> {
            Ok(())
        }
        async fn unsubscribe(&self, _symbol: Symbol) -> Result<(), ExecutionError> {
            Ok(())
        }
        async fn place_order(&self, _order: Order) -> Result<PlaceOrderOutcome, ExecutionError> {
            Ok(self.outcome.clone())
        }
        async fn get_instruments(
            &self,
            _category: InstrumentCategory,
        ) -> Result<HashSet<Symbol>, ExecutionError> {
            Ok(HashSet::new())
        }
        async fn get_wallet_balance(&self) -> Result<Decimal, ExecutionError> {
            Ok(Decimal::ZERO)
        }
    }

    #[tokio::test]
    async fn market_order_falls_back_to_last_trade_price_when_avg_price_absent() {
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(StubGateway {
            outcome: PlaceOrderOutcome::Accepted {
                order_id: OrderId(smol_str::SmolStr::new("o1")),
                avg_price: None,
            },
        });
        let last_price: LastPrice = Arc::new(StdMutex::new(Some(dec!(30000))));
        let executor = Executor::new(Symbol::new("BTCUSDT"), gateway, last_price);

        let (mut fill_tx, mut fill_rx) = gridfleet_integration::channel::mpsc_unbounded();
        executor
            .handle_order(
                gridfleet_execution::Order::new_market(
                    Symbol::new("BTCUSDT"),
                    Side::Buy,
                    dec!(1),
                    None,
                ),
                &mut fill_tx,
            )
            .await;

        let fill = fill_rx.rx.try_recv().unwrap();
        assert_eq!(fill.price, dec!(30000));
    }

    #[tokio::test]
    async fn rejected_order_produces_no_fill() {
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(StubGateway {
            outcome: PlaceOrderOutcome::Rejected {
                reason: "insufficient margin".to_string(),
            },
        });
        let last_price: LastPrice = Arc::new(StdMutex::new(None));
        let executor = Executor::new(Symbol::new("BTCUSDT"), gateway, last_price);

        let (mut fill_tx, mut fill_rx) = gridfleet_integration::channel::mpsc_unbounded();
        executor
            .handle_order(
                gridfleet_execution::Order::new_market(
                    Symbol::new("BTCUSDT"),
                    Side::Buy,
                    dec!(1),
                    None,
                ),
                &mut fill_tx,
            )
            .await;

        assert!(fill_rx.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn limit_order_fills_at_its_own_price() {
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(StubGateway {
            outcome: PlaceOrderOutcome::Accepted {
                order_id: OrderId(smol_str::SmolStr::new("o2")),
                avg_price: None,
            },
        });
        let last_price: LastPrice = Arc::new(StdMutex::new(None));
        let executor = Executor::new(Symbol::new("BTCUSDT"), gateway, last_price);

        let (mut fill_tx, mut fill_rx) = gridfleet_integration::channel::mpsc_unbounded();
        executor
            .handle_order(
                gridfleet_execution::Order::new_limit(
                    Symbol::new("BTCUSDT"),
                    Side::Sell,
                    dec!(1),
                    dec!(29700),
                    None,
                ),
                &mut fill_tx,
            )
            .await;

        let fill = fill_rx.rx.try_recv().unwrap();
        assert_eq!(fill.price, dec!(29700));
    }
}
