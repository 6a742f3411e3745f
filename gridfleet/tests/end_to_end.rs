//! Black-box scenarios from the fleet's testable-properties list, driven only through the
//! public `gridfleet` API - no access to private Portfolio fields or methods.

use gridfleet::agent::portfolio::{Portfolio, PortfolioConfig};
use gridfleet::bot_manager::{AgentTemplate, BotManager};
use gridfleet::model::{AgentState, FillTx, OrderRx, PriceTx, SignalTx};
use gridfleet::router::MarketDataRouter;
use gridfleet_execution::simulated::SimulatedGateway;
use gridfleet_execution::{FillConfirmation, OrderKind};
use gridfleet_instrument::{OrderTag, Side, StrategyParams, Symbol, Timeframe};
use gridfleet_integration::channel::{drop_oldest, mpsc_unbounded, Tx};
use gridfleet_integration::snapshot::Snapshot;
use gridfleet_strategy::{PositionStatus, SignalKind, TradeSignal};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

fn temp_state_dir(name: &str) -> String {
    let dir = std::env::temp_dir().join(format!(
        "gridfleet-e2e-{name}-{}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir.to_string_lossy().into_owned()
}

fn portfolio_config() -> PortfolioConfig {
    PortfolioConfig {
        grid_width_pct: dec!(1.0),
        risk_pct_per_trade: dec!(1.0),
        max_entries: 2,
    }
}

/// Wires a [`Portfolio`] to fresh channels and runs it as a background task, exposing only the
/// handles a real caller (the Bot Manager) would have: the input sides of the signal, fill and
/// price channels, the output side of the order channel, a shutdown sender and the status
/// watch receiver.
struct Harness {
    signal_tx: SignalTx,
    fill_tx: FillTx,
    price_tx: PriceTx,
    order_rx: OrderRx,
    status_rx: watch::Receiver<PositionStatus>,
    shutdown_tx: Option<oneshot::Sender<bool>>,
    state_path: PathBuf,
    task: tokio::task::JoinHandle<()>,
}

fn spawn_harness(name: &str) -> Harness {
    let symbol = Symbol::new("BTCUSDT");
    let state_dir = temp_state_dir(name);
    let state_path = PathBuf::from(&state_dir).join(format!("{}.json", symbol.as_str()));

    let (signal_tx, signal_rx) = mpsc_unbounded();
    let (fill_tx, fill_rx) = mpsc_unbounded();
    let (price_tx, price_rx) = drop_oldest(16);
    let (order_tx, order_rx) = mpsc_unbounded();
    let (status_tx, status_rx) = watch::channel(PositionStatus::Flat);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let mut portfolio = Portfolio::new(
        symbol,
        portfolio_config(),
        &state_dir,
        dec!(10000),
        status_tx,
        Arc::new(tokio::sync::Notify::new()),
    );

    let task = tokio::spawn(async move {
        portfolio
            .run(signal_rx, fill_rx, price_rx, order_tx, shutdown_rx)
            .await;
    });

    Harness {
        signal_tx,
        fill_tx,
        price_tx,
        order_rx,
        status_rx,
        shutdown_tx: Some(shutdown_tx),
        state_path,
        task,
    }
}

impl Harness {
    async fn next_order(&mut self) -> gridfleet_execution::Order {
        tokio::time::timeout(Duration::from_secs(1), self.order_rx.rx.recv())
            .await
            .expect("order expected within timeout")
            .expect("order channel still open")
    }

    async fn no_further_order(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(100), self.order_rx.rx.recv()).await;
        assert!(result.is_err(), "expected no further order, but one arrived");
    }

    async fn settle(&mut self, side: Side, qty: rust_decimal::Decimal, price: rust_decimal::Decimal, tag: OrderTag) {
        self.fill_tx
            .send(FillConfirmation {
                symbol: Symbol::new("BTCUSDT"),
                order_id: gridfleet_execution::OrderId(smol_str::SmolStr::new("fill")),
                side,
                qty,
                price,
                tag: Some(tag),
            })
            .unwrap();
        // let the Portfolio task's select! loop process the fill before the test continues.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    /// Polls `status_rx` first (in case the transition already happened) before falling back to
    /// `changed()`, so this never misses an update that occurred before the caller looked.
    async fn wait_status(&mut self, expected: PositionStatus) {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if *self.status_rx.borrow() == expected {
                    return;
                }
                self.status_rx.changed().await.ok();
            }
        })
        .await
        .expect("status did not reach expected value in time");
    }

    async fn shutdown(mut self, manage_position: bool) -> AgentState {
        self.shutdown_tx.take().unwrap().send(manage_position).ok();
        self.task.await.unwrap();
        let bytes = std::fs::read(&self.state_path).expect("state file should exist after shutdown");
        let snapshot: Snapshot<AgentState> = serde_json::from_slice(&bytes).unwrap();
        snapshot.0
    }
}

/// §8 scenario 1: Flat → Long.
#[tokio::test]
async fn flat_to_long_sizes_and_fills_the_initial_entry() {
    let mut harness = spawn_harness("flat-to-long");

    harness
        .price_tx
        .send(gridfleet::model::PriceUpdate {
            symbol: Symbol::new("BTCUSDT"),
            price: dec!(30000),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness
        .signal_tx
        .send(TradeSignal {
            symbol: Symbol::new("BTCUSDT"),
            kind: SignalKind::EntryLong,
            reason: "supertrend flip".to_string(),
        })
        .unwrap();

    let entry = harness.next_order().await;
    assert_eq!(entry.side, Side::Buy);
    assert_eq!(entry.kind, OrderKind::Market);
    // `risk::position_size` returns full decimal precision; compare at the scenario's 4dp.
    assert_eq!(entry.qty.round_dp(4), dec!(0.3333));
    assert_eq!(entry.tag, Some(OrderTag::GridEntry(1)));

    harness
        .settle(Side::Buy, dec!(0.3333), dec!(30000), OrderTag::GridEntry(1))
        .await;

    let resting = harness.next_order().await;
    assert_eq!(resting.kind, OrderKind::Limit);
    assert_eq!(resting.price, Some(dec!(29700)));

    harness.wait_status(PositionStatus::Long).await;

    let state = harness.shutdown(false).await;
    assert_eq!(state.position_size, dec!(0.3333));
    assert_eq!(state.avg_entry_price, dec!(30000));
    assert_eq!(state.n_entries, 1);
}

/// §8 scenario 2: Scale-in. A second fill against the resting grid LIMIT reaches MAX_ENTRIES,
/// so no further grid staging should occur (§4.4.4's "remaining" count hits zero).
#[tokio::test]
async fn scale_in_reaches_max_entries_with_no_further_grid_orders() {
    let mut harness = spawn_harness("scale-in");

    harness
        .price_tx
        .send(gridfleet::model::PriceUpdate {
            symbol: Symbol::new("BTCUSDT"),
            price: dec!(30000),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness
        .signal_tx
        .send(TradeSignal {
            symbol: Symbol::new("BTCUSDT"),
            kind: SignalKind::EntryLong,
            reason: "supertrend flip".to_string(),
        })
        .unwrap();
    harness.next_order().await; // initial market entry
    harness
        .settle(Side::Buy, dec!(0.3333), dec!(30000), OrderTag::GridEntry(1))
        .await;
    harness.next_order().await; // level-2 resting LIMIT staged by the opening fill

    harness
        .settle(Side::Buy, dec!(0.3333), dec!(29700), OrderTag::GridEntry(2))
        .await;
    harness.no_further_order().await;

    let state = harness.shutdown(false).await;
    assert_eq!(state.position_size, dec!(0.6666));
    assert_eq!(state.avg_entry_price, dec!(29850));
    assert_eq!(state.n_entries, 2);
    assert!(state.long_grid_prices.is_empty());
}

/// §8 scenario 3: Trend reversal flattens without opening the opposite side immediately, then
/// realizes P&L and resets state once the flattening fill confirms.
#[tokio::test]
async fn trend_reversal_flattens_before_opening_opposite_side() {
    let mut harness = spawn_harness("trend-reversal");

    harness
        .price_tx
        .send(gridfleet::model::PriceUpdate {
            symbol: Symbol::new("BTCUSDT"),
            price: dec!(30000),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness
        .signal_tx
        .send(TradeSignal {
            symbol: Symbol::new("BTCUSDT"),
            kind: SignalKind::EntryLong,
            reason: "supertrend flip".to_string(),
        })
        .unwrap();
    harness.next_order().await;
    harness
        .settle(Side::Buy, dec!(0.3333), dec!(30000), OrderTag::GridEntry(1))
        .await;
    harness.next_order().await; // drain the staged resting LIMIT

    harness
        .signal_tx
        .send(TradeSignal {
            symbol: Symbol::new("BTCUSDT"),
            kind: SignalKind::EntryShort,
            reason: "supertrend flip".to_string(),
        })
        .unwrap();
    let flatten_order = harness.next_order().await;
    assert_eq!(flatten_order.side, Side::Sell);
    assert_eq!(flatten_order.kind, OrderKind::Market);
    assert_eq!(flatten_order.qty, dec!(0.3333));
    assert_eq!(flatten_order.tag, Some(OrderTag::ExitFlatten));
    harness.no_further_order().await; // opposing side is not opened yet

    harness
        .settle(Side::Sell, dec!(0.3333), dec!(30300), OrderTag::ExitFlatten)
        .await;

    harness.wait_status(PositionStatus::Flat).await;

    let state = harness.shutdown(false).await;
    assert_eq!(state.position_size, rust_decimal::Decimal::ZERO);
    assert_eq!(state.balance_real, dec!(10099.99));
}

/// §8 scenario 6: Dropped-token exit. A non-flat agent being decommissioned with
/// `manage_position = true` emits exactly one flattening order and ends up flat.
#[tokio::test]
async fn dropped_token_exit_flattens_before_stopping() {
    let mut harness = spawn_harness("dropped-token");

    harness
        .price_tx
        .send(gridfleet::model::PriceUpdate {
            symbol: Symbol::new("BTCUSDT"),
            price: dec!(30000),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness
        .signal_tx
        .send(TradeSignal {
            symbol: Symbol::new("BTCUSDT"),
            kind: SignalKind::EntryLong,
            reason: "supertrend flip".to_string(),
        })
        .unwrap();
    harness.next_order().await;
    harness
        .settle(Side::Buy, dec!(0.5), dec!(30000), OrderTag::GridEntry(1))
        .await;
    harness.next_order().await; // drain the staged resting LIMIT

    harness.shutdown_tx.take().unwrap().send(true).ok();
    let exit_order = harness.next_order().await;
    assert_eq!(exit_order.side, Side::Sell);
    assert_eq!(exit_order.kind, OrderKind::Market);
    assert_eq!(exit_order.qty, dec!(0.5));
    assert_eq!(exit_order.tag, Some(OrderTag::ExitFlatten));

    harness
        .fill_tx
        .send(FillConfirmation {
            symbol: Symbol::new("BTCUSDT"),
            order_id: gridfleet_execution::OrderId(smol_str::SmolStr::new("exit-fill")),
            side: Side::Sell,
            qty: dec!(0.5),
            price: dec!(30000),
            tag: Some(OrderTag::ExitFlatten),
        })
        .unwrap();

    harness.task.await.unwrap();
    let bytes = std::fs::read(&harness.state_path).unwrap();
    let snapshot: Snapshot<AgentState> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(snapshot.0.position_size, rust_decimal::Decimal::ZERO);
}

fn test_bot_manager() -> (Arc<BotManager>, String) {
    let universe: HashSet<Symbol> = [Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")].into();
    let (gateway, _trades) = SimulatedGateway::new(universe, dec!(10000));
    let router = Arc::new(MarketDataRouter::new());
    let state_dir = temp_state_dir("bot-manager");
    let template = AgentTemplate {
        grid_width_pct: dec!(1.0),
        trade_mode: gridfleet_instrument::TradeMode::DualSide,
        risk_pct_per_trade: dec!(1.0),
        max_entries: 2,
        initial_capital: dec!(10000),
        state_dir: state_dir.clone(),
    };
    (Arc::new(BotManager::new(router, Arc::new(gateway), template)), state_dir)
}

fn default_params() -> StrategyParams {
    StrategyParams::new(Timeframe::M1, 20, dec!(3.0))
}

/// §8 round-trip property: `start_bot(s, p)` called twice is equivalent to once.
#[tokio::test]
async fn start_bot_is_idempotent() {
    let (bot_manager, _state_dir) = test_bot_manager();
    let symbol = Symbol::new("BTCUSDT");

    bot_manager.start_bot(symbol.clone(), default_params()).await;
    bot_manager.start_bot(symbol.clone(), default_params()).await;

    assert_eq!(bot_manager.active_symbols(), vec![symbol.clone()]);
    bot_manager.stop_bot(&symbol, false).await;
}

/// §8 round-trip property: `stop_bot(s)` on a non-active symbol is a no-op.
#[tokio::test]
async fn stop_bot_on_inactive_symbol_is_a_noop() {
    let (bot_manager, _state_dir) = test_bot_manager();
    let symbol = Symbol::new("ETHUSDT");

    bot_manager.stop_bot(&symbol, false).await;
    assert!(bot_manager.active_symbols().is_empty());
}

/// `save_all_states` persists without removing the agent from `active`.
#[tokio::test]
async fn save_all_states_persists_without_stopping_agents() {
    let (bot_manager, _state_dir) = test_bot_manager();
    let symbol = Symbol::new("BTCUSDT");

    bot_manager.start_bot(symbol.clone(), default_params()).await;
    bot_manager.save_all_states();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(bot_manager.is_active(&symbol));
    bot_manager.stop_bot(&symbol, false).await;
}
