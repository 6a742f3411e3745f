use crate::model::{EnrichedHistory, LastPrice, PriceTx, PriceUpdate, StrategyTx, SymbolHistory};
use gridfleet_execution::Trade;
use gridfleet_instrument::Symbol;
use gridfleet_integration::channel::Tx;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const RESAMPLE_INTERVAL: Duration = Duration::from_secs(60);

struct Registration {
    strategy_tx: StrategyTx,
    price_tx: PriceTx,
    /// Shared with this agent's Order Executor, for the "last-trade lookup" fallback a market
    /// fill with no reported average price needs (§4.5).
    last_price: LastPrice,
    history: SymbolHistory,
}

/// Demultiplexes the gateway's single trade stream across every registered agent and resamples
/// each symbol's ticks into OHLCV bars once a minute (§4.2).
///
/// Registration is the sole authority for which symbols are "managed" - a trade for an
/// unregistered symbol is simply dropped, same as the spec's §4.2 step 2 requires.
#[derive(Default)]
pub struct MarketDataRouter {
    registrations: Mutex<HashMap<Symbol, Registration>>,
}

impl MarketDataRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `symbol` with this Router, replacing any prior registration for the same
    /// symbol. Used by the Bot Manager when starting a bot (§4.2, §4.6).
    pub fn register(
        &self,
        symbol: Symbol,
        strategy_tx: StrategyTx,
        price_tx: PriceTx,
        last_price: LastPrice,
        supertrend_period: usize,
        supertrend_multiplier: Decimal,
    ) {
        let mut registrations = self.registrations.lock().expect("router registrations poisoned");
        registrations.insert(
            symbol,
            Registration {
                strategy_tx,
                price_tx,
                last_price,
                history: SymbolHistory::new(supertrend_period, supertrend_multiplier),
            },
        );
    }

    /// Idempotent: deregistering an unregistered symbol is a no-op.
    pub fn deregister(&self, symbol: &Symbol) {
        self.registrations
            .lock()
            .expect("router registrations poisoned")
            .remove(symbol);
    }

    pub fn is_registered(&self, symbol: &Symbol) -> bool {
        self.registrations
            .lock()
            .expect("router registrations poisoned")
            .contains_key(symbol)
    }

    /// Handles one inbound trade (§4.2 steps 1-2): pushes a [`PriceUpdate`] into the owning
    /// agent's price channel (dropping the oldest on overflow) and buffers the tick for the
    /// next resample.
    pub fn on_trade(&self, trade: Trade) {
        let mut registrations = self.registrations.lock().expect("router registrations poisoned");
        let Some(registration) = registrations.get_mut(&trade.symbol) else {
            return;
        };

        registration.price_tx.send(PriceUpdate {
            symbol: trade.symbol.clone(),
            price: trade.price,
        });
        *registration.last_price.lock().expect("last price poisoned") = Some(trade.price);
        registration.history.push_tick(trade.price);
    }

    /// Drains every registered symbol's tick buffer into one OHLC bar and, once enough history
    /// has accumulated, pushes an [`EnrichedHistory`] update (§4.2 steps 3-4). Intended to be
    /// called once every [`RESAMPLE_INTERVAL`].
    pub fn resample_all(&self) {
        let mut registrations = self.registrations.lock().expect("router registrations poisoned");
        let now = chrono::Utc::now();

        for (symbol, registration) in registrations.iter_mut() {
            let Some(_bar) = registration.history.resample(now) else {
                continue;
            };

            if let Some(prior_trend) = registration.history.prior_trend() {
                registration.strategy_tx.send(EnrichedHistory {
                    symbol: symbol.clone(),
                    prior_trend,
                }).ok();
            } else {
                debug!(%symbol, "history below supertrend warmup, skipping strategy push");
            }
        }
    }

    /// Long-running task body: consumes the gateway's trade stream and resamples on a 60-second
    /// wall-clock tick, independent of trade arrival rate (§4.2, §5).
    pub async fn run(&self, mut trades: gridfleet_integration::channel::UnboundedRx<Trade>) {
        let mut interval = tokio::time::interval(RESAMPLE_INTERVAL);
        loop {
            tokio::select! {
                trade = trades.rx.recv() => {
                    match trade {
                        Some(trade) => self.on_trade(trade),
                        None => {
                            warn!("gateway trade stream ended, Market Data Router stopping");
                            return;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.resample_all();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridfleet_integration::channel::{drop_oldest, mpsc_unbounded};
    use rust_decimal_macros::dec;

    #[test]
    fn trade_for_unregistered_symbol_is_dropped() {
        let router = MarketDataRouter::new();
        router.on_trade(Trade {
            symbol: Symbol::new("BTCUSDT"),
            price: dec!(30000),
            ts: chrono::Utc::now(),
        });
    }

    #[test]
    fn register_then_trade_forwards_price_update() {
        let router = MarketDataRouter::new();
        let symbol = Symbol::new("BTCUSDT");
        let (strategy_tx, _strategy_rx) = mpsc_unbounded();
        let (price_tx, mut price_rx) = drop_oldest(16);
        let last_price = std::sync::Arc::new(Mutex::new(None));

        router.register(symbol.clone(), strategy_tx, price_tx, last_price, 10, dec!(3.0));
        router.on_trade(Trade { symbol: symbol.clone(), price: dec!(30000), ts: chrono::Utc::now() });

        let update = price_rx.try_recv_now();
        assert_eq!(update.map(|u| u.price), Some(dec!(30000)));
    }

    #[test]
    fn deregister_unknown_symbol_is_noop() {
        let router = MarketDataRouter::new();
        router.deregister(&Symbol::new("ETHUSDT"));
    }

    trait TryRecvNow<T> {
        fn try_recv_now(&mut self) -> Option<T>;
    }

    impl<T> TryRecvNow<T> for gridfleet_integration::channel::DropOldestRx<T> {
        fn try_recv_now(&mut self) -> Option<T> {
            futures::executor::block_on(self.recv())
        }
    }
}
