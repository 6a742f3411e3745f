use crate::agent::executor::Executor;
use crate::agent::portfolio::{run_signal_loop, Portfolio, PortfolioConfig};
use crate::router::MarketDataRouter;
use gridfleet_execution::ExchangeGateway;
use gridfleet_instrument::{StrategyParams, Symbol, TradeMode};
use gridfleet_integration::channel::{drop_oldest, mpsc_unbounded};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Price-update channel capacity (§5): generous enough that a brief Portfolio stall doesn't
/// discard more than a few seconds of ticks, but bounded so a stuck agent can never grow memory
/// unbounded from trade volume alone.
const PRICE_CHANNEL_CAPACITY: usize = 64;

/// Everything the Bot Manager owns for one running agent (§4.6).
///
/// The Signal and Executor tasks hold no state worth persisting, so `stop_bot` aborts them
/// outright. The Portfolio task is different: it owns the durable [`crate::model::AgentState`],
/// so it is asked to shut down gracefully over `shutdown_tx` (carrying `manage_position`) and
/// joined rather than aborted, letting it run drop-out handling and its final persist first.
struct Agent {
    signal_task: JoinHandle<()>,
    portfolio_task: JoinHandle<()>,
    executor_task: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<bool>,
    persist_requested: Arc<tokio::sync::Notify>,
}

/// Process-wide static configuration every agent is built from - the parts of
/// [`gridfleet_strategy::FleetConfig`] that do not vary per symbol.
#[derive(Clone)]
pub struct AgentTemplate {
    pub grid_width_pct: Decimal,
    pub trade_mode: TradeMode,
    pub risk_pct_per_trade: Decimal,
    pub max_entries: u8,
    pub initial_capital: Decimal,
    pub state_dir: String,
}

/// Maintains `active: map<Symbol, Agent>` (§4.6): starts and stops the per-symbol task set and
/// coordinates the shutdown sequence the Orchestrator and `main` drive.
pub struct BotManager {
    active: Mutex<HashMap<Symbol, Agent>>,
    router: Arc<MarketDataRouter>,
    gateway: Arc<dyn ExchangeGateway>,
    template: AgentTemplate,
}

impl BotManager {
    pub fn new(
        router: Arc<MarketDataRouter>,
        gateway: Arc<dyn ExchangeGateway>,
        template: AgentTemplate,
    ) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            router,
            gateway,
            template,
        }
    }

    pub fn is_active(&self, symbol: &Symbol) -> bool {
        self.active
            .lock()
            .expect("bot manager poisoned")
            .contains_key(symbol)
    }

    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.active
            .lock()
            .expect("bot manager poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Idempotent: a no-op if `symbol` is already active (§4.6). Wires up the four channels,
    /// registers with the Router, subscribes on the gateway, and spawns the Signal, Portfolio
    /// and Executor tasks.
    pub async fn start_bot(&self, symbol: Symbol, params: StrategyParams) {
        if self.is_active(&symbol) {
            return;
        }

        if let Err(error) = self.gateway.subscribe(symbol.clone()).await {
            warn!(%symbol, %error, "failed to subscribe on gateway, not starting bot");
            return;
        }

        let (strategy_tx, strategy_rx) = mpsc_unbounded();
        let (signal_tx, signal_rx) = mpsc_unbounded();
        let (order_tx, order_rx) = mpsc_unbounded();
        let (fill_tx, fill_rx) = mpsc_unbounded();
        let (price_tx, price_rx) = drop_oldest(PRICE_CHANNEL_CAPACITY);
        let last_price = Arc::new(Mutex::new(None));
        let (status_tx, status_rx) = watch::channel(gridfleet_strategy::PositionStatus::Flat);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let persist_requested = Arc::new(tokio::sync::Notify::new());

        self.router.register(
            symbol.clone(),
            strategy_tx,
            price_tx,
            last_price.clone(),
            params.supertrend_period,
            params.supertrend_multiplier,
        );

        let portfolio_config = PortfolioConfig {
            grid_width_pct: self.template.grid_width_pct,
            risk_pct_per_trade: self.template.risk_pct_per_trade,
            max_entries: self.template.max_entries,
        };
        let mut portfolio = Portfolio::new(
            symbol.clone(),
            portfolio_config,
            &self.template.state_dir,
            self.template.initial_capital,
            status_tx,
            persist_requested.clone(),
        );

        let signal_task = tokio::spawn(run_signal_loop(
            strategy_rx,
            status_rx,
            signal_tx,
            self.template.trade_mode,
        ));

        let portfolio_task = tokio::spawn(async move {
            portfolio
                .run(signal_rx, fill_rx, price_rx, order_tx, shutdown_rx)
                .await;
        });

        let executor = Executor::new(symbol.clone(), self.gateway.clone(), last_price);
        let executor_task = tokio::spawn(async move {
            executor.run(order_rx, fill_tx).await;
        });

        self.active.lock().expect("bot manager poisoned").insert(
            symbol.clone(),
            Agent {
                signal_task,
                portfolio_task,
                executor_task,
                shutdown_tx,
                persist_requested,
            },
        );

        info!(%symbol, "bot started");
    }

    /// Removes `symbol` from `active` (§4.6): asks its Portfolio task to shut down gracefully
    /// (running drop-out handling first when `manage_position` and not flat, per §4.4.6), joins
    /// it, then aborts the now-redundant Signal and Executor tasks and unwinds the Router
    /// registration and gateway subscription.
    pub async fn stop_bot(&self, symbol: &Symbol, manage_position: bool) {
        let Some(agent) = self.active.lock().expect("bot manager poisoned").remove(symbol) else {
            return;
        };

        let _ = agent.shutdown_tx.send(manage_position);
        if agent.portfolio_task.await.is_err() {
            warn!(%symbol, "portfolio task panicked during shutdown");
        }

        agent.signal_task.abort();
        agent.executor_task.abort();

        self.router.deregister(symbol);
        if let Err(error) = self.gateway.unsubscribe(symbol.clone()).await {
            warn!(%symbol, %error, "failed to unsubscribe on gateway during stop_bot");
        }

        info!(%symbol, "bot stopped");
    }

    /// Used on process shutdown (§4.6), after [`BotManager::save_all_states`]: stops every
    /// active agent without managing its position, since the fleet is exiting rather than
    /// reconciling its selection.
    pub async fn stop_all(&self) {
        let symbols = self.active_symbols();
        for symbol in symbols {
            self.stop_bot(&symbol, false).await;
        }
    }

    /// Persists every active agent's state in place, without stopping it (§4.6, §4.7's
    /// shutdown sequencing: "signal handler -> save_all_states -> cancel all agent tasks").
    /// Wakes each Portfolio task's persist-request notifier rather than going through the
    /// shutdown path, since shutdown would also stop the task before the next step cancels it.
    pub fn save_all_states(&self) {
        let active = self.active.lock().expect("bot manager poisoned");
        for agent in active.values() {
            agent.persist_requested.notify_one();
        }
    }
}
