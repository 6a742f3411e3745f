use crate::error::ExecutionError;
use crate::gateway::{ExchangeGateway, InstrumentCategory, Trade};
use crate::order::{Order, OrderId, OrderKind, PlaceOrderOutcome};
use async_trait::async_trait;
use gridfleet_instrument::Symbol;
use gridfleet_integration::channel::{mpsc_unbounded, Tx, UnboundedRx, UnboundedTx};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// `SIMULATION` mode gateway (§4.1): synthesizes a random-walk trade stream at roughly 2 Hz per
/// subscribed symbol, acknowledges every order unconditionally, and reports fills at the
/// requested price. No network I/O occurs.
#[derive(Debug)]
pub struct SimulatedGateway {
    trade_tx: UnboundedTx<Trade, tokio::sync::mpsc::error::SendError<Trade>>,
    tasks: Mutex<HashMap<Symbol, JoinHandle<()>>>,
    last_price: Arc<AsyncMutex<HashMap<Symbol, Decimal>>>,
    universe: HashSet<Symbol>,
    balance: AsyncMutex<Decimal>,
}

impl SimulatedGateway {
    /// `universe` is the fixed set of symbols `get_instruments` reports as tradable; a real
    /// exchange would answer this from its own instrument list, so the simulator is seeded with
    /// one up front.
    pub fn new(
        universe: HashSet<Symbol>,
        initial_balance: Decimal,
    ) -> (Self, UnboundedRx<Trade>) {
        let (trade_tx, trade_rx) = mpsc_unbounded();
        (
            Self {
                trade_tx,
                tasks: Mutex::new(HashMap::new()),
                last_price: Arc::new(AsyncMutex::new(HashMap::new())),
                universe,
                balance: AsyncMutex::new(initial_balance),
            },
            trade_rx,
        )
    }

    fn seed_price(symbol: &Symbol) -> Decimal {
        // Deterministic-ish seed derived from the symbol so repeated runs of the same fleet
        // configuration produce a plausible but non-identical starting price per symbol.
        let seed: u64 = symbol.as_str().bytes().map(u64::from).sum::<u64>() * 37 + 1000;
        Decimal::from(seed % 50_000 + 100)
    }
}

#[async_trait]
impl ExchangeGateway for SimulatedGateway {
    async fn subscribe(&self, symbol: Symbol) -> Result<(), ExecutionError> {
        let mut tasks = self.tasks.lock().expect("simulated gateway tasks poisoned");
        if tasks.contains_key(&symbol) {
            return Ok(());
        }

        let tx = self.trade_tx.clone();
        let sym = symbol.clone();
        let start_price = Self::seed_price(&symbol);
        let last_price = self.last_price.clone();
        last_price
            .try_lock()
            .map(|mut guard| guard.insert(symbol.clone(), start_price))
            .ok();

        let handle = tokio::spawn(async move {
            let mut price = start_price;
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;

                let drift: f64 = rand::rng().random_range(-0.0015..0.0015);
                let price_f64 = price.to_f64().unwrap_or(1.0) * (1.0 + drift);
                price = Decimal::try_from(price_f64).unwrap_or(price);

                last_price.lock().await.insert(sym.clone(), price);

                if tx
                    .send(Trade {
                        symbol: sym.clone(),
                        price,
                        ts: chrono::Utc::now(),
                    })
                    .is_err()
                {
                    debug!(symbol = %sym, "simulated trade stream receiver dropped, stopping tick task");
                    break;
                }
            }
        });

        tasks.insert(symbol, handle);
        Ok(())
    }

    async fn unsubscribe(&self, symbol: Symbol) -> Result<(), ExecutionError> {
        let handle = self
            .tasks
            .lock()
            .expect("simulated gateway tasks poisoned")
            .remove(&symbol);
        if let Some(handle) = handle {
            handle.abort();
        }
        Ok(())
    }

    async fn place_order(&self, order: Order) -> Result<PlaceOrderOutcome, ExecutionError> {
        let avg_price = match order.kind {
            OrderKind::Limit => order.price,
            OrderKind::Market => {
                let guard = self.last_price.lock().await;
                guard.get(&order.symbol).copied().or(order.price)
            }
        };

        Ok(PlaceOrderOutcome::Accepted {
            order_id: OrderId(smol_str::SmolStr::new(format!(
                "sim_{}",
                crate::order::ClientOrderId::random()
            ))),
            avg_price,
        })
    }

    async fn get_instruments(
        &self,
        _category: InstrumentCategory,
    ) -> Result<HashSet<Symbol>, ExecutionError> {
        Ok(self.universe.clone())
    }

    async fn get_wallet_balance(&self) -> Result<Decimal, ExecutionError> {
        Ok(*self.balance.lock().await)
    }
}
