use crate::model::{AgentState, FillRx, OrderTx, PriceRx, SignalRx, StrategyRx};
use gridfleet_execution::{FillConfirmation, Order};
use gridfleet_instrument::{OrderTag, Side, Symbol};
use gridfleet_integration::channel::Tx;
use gridfleet_integration::snapshot::Snapshot;
use gridfleet_strategy::{risk, PositionStatus, SignalGenerator, SignalKind, TradeSignal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// A fill whose signed size change crosses through zero within this tolerance is treated as
/// closing the position exactly, matching the source's floating-point-origin comparison (§4.4.4).
const FLATTEN_TOLERANCE: Decimal = dec!(0.000000001);

/// How long [`Portfolio::drop_out`] waits for the flattening fill before giving up (§4.4.6).
const DROP_OUT_TIMEOUT: Duration = Duration::from_secs(30);

/// The subset of [`gridfleet_strategy::FleetConfig`] the Portfolio/Grid Manager needs per agent.
#[derive(Clone, Copy, Debug)]
pub struct PortfolioConfig {
    pub grid_width_pct: Decimal,
    pub risk_pct_per_trade: Decimal,
    pub max_entries: u8,
}

/// The state machine described in §4.4: inputs from the signal, fill and price channels, output
/// to the order channel. One instance per agent; processing is single-threaded within it, with
/// the three input channels interleaved cooperatively by [`Portfolio::run`]'s `select!` loop.
#[derive(Debug)]
pub struct Portfolio {
    symbol: Symbol,
    config: PortfolioConfig,
    state: AgentState,
    status: PositionStatus,
    last_known_price: Option<Decimal>,
    state_path: PathBuf,
    status_tx: watch::Sender<PositionStatus>,
    /// Grid-level LIMIT prices already issued for the current staged grid, so a repeated
    /// call to [`Portfolio::issue_resting_grid_orders`] does not double-issue (§4.4.5).
    issued_grid_prices: HashSet<Decimal>,
    /// Woken by [`crate::bot_manager::BotManager::save_all_states`] to persist in place without
    /// otherwise disturbing the running agent, distinct from the shutdown path's persist.
    persist_requested: std::sync::Arc<tokio::sync::Notify>,
}

impl Portfolio {
    /// Loads persisted state for `symbol` from `state_dir` (§4.4.7), falling back to a fresh
    /// flat [`AgentState`] seeded with `initial_capital` if no snapshot exists or it fails to
    /// parse. `status_tx` is published immediately so the Signal Generator task sees the
    /// restored status before the first signal tick.
    pub fn new(
        symbol: Symbol,
        config: PortfolioConfig,
        state_dir: &str,
        initial_capital: Decimal,
        status_tx: watch::Sender<PositionStatus>,
        persist_requested: std::sync::Arc<tokio::sync::Notify>,
    ) -> Self {
        let state_path = state_path_for(state_dir, &symbol);
        let state = load_state(&state_path).unwrap_or_else(|| AgentState::new(initial_capital));
        let status = derive_status(state.position_size);
        status_tx.send_replace(status);

        Self {
            symbol,
            config,
            state,
            status,
            last_known_price: None,
            state_path,
            status_tx,
            issued_grid_prices: HashSet::new(),
            persist_requested,
        }
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Main cooperative loop (§4.4, §5): interleaves signal, fill and price channel handling.
    /// Returns once every input channel has closed (the agent is being torn down).
    /// Returns once a channel closes or `shutdown_rx` fires. The shutdown signal carries
    /// `manage_position`: when set and the agent is not flat, drop-out handling (§4.4.6) runs
    /// before the final persist, matching the Bot Manager's `stop_bot` contract (§4.6).
    pub async fn run(
        &mut self,
        mut signal_rx: SignalRx,
        mut fill_rx: FillRx,
        mut price_rx: PriceRx,
        mut order_tx: OrderTx,
        mut shutdown_rx: tokio::sync::oneshot::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                signal = signal_rx.rx.recv() => {
                    match signal {
                        Some(signal) => self.handle_signal(signal, &mut order_tx),
                        None => {
                            warn!(symbol = %self.symbol, "signal channel closed, Portfolio stopping");
                            break;
                        }
                    }
                }
                fill = fill_rx.rx.recv() => {
                    match fill {
                        Some(fill) => self.handle_fill(fill, &mut order_tx),
                        None => {
                            warn!(symbol = %self.symbol, "fill channel closed, Portfolio stopping");
                            break;
                        }
                    }
                }
                price = price_rx.recv() => {
                    match price {
                        Some(update) => self.last_known_price = Some(update.price),
                        None => {
                            warn!(symbol = %self.symbol, "price channel closed, Portfolio stopping");
                            break;
                        }
                    }
                }
                manage_position = &mut shutdown_rx => {
                    if manage_position.unwrap_or(false) {
                        self.drop_out(&mut order_tx, &mut fill_rx).await;
                    }
                    break;
                }
                _ = self.persist_requested.notified() => {
                    self.persist();
                }
            }
        }
        self.persist();
    }

    /// §4.4.3: reversal flattens without opening the opposing side; flat-to-entry sizes and
    /// submits a market order; everything else is ignored.
    fn handle_signal(&mut self, signal: TradeSignal, order_tx: &mut OrderTx) {
        match (signal.kind, self.status) {
            (SignalKind::EntryLong, PositionStatus::Short)
            | (SignalKind::EntryShort, PositionStatus::Long) => {
                let side = flattening_side(self.state.position_size);
                let qty = self.state.position_size.abs();
                order_tx
                    .send(Order::new_market(
                        self.symbol.clone(),
                        side,
                        qty,
                        Some(OrderTag::ExitFlatten),
                    ))
                    .ok();
            }
            (SignalKind::EntryLong, PositionStatus::Flat)
            | (SignalKind::EntryShort, PositionStatus::Flat) => {
                let Some(price) = self.last_known_price else {
                    warn!(symbol = %self.symbol, "entry signal with no known price yet, skipping");
                    return;
                };
                let qty = risk::position_size(
                    self.state.balance_real,
                    self.config.risk_pct_per_trade,
                    self.config.grid_width_pct,
                    price,
                );
                if qty <= Decimal::ZERO {
                    return;
                }
                let side = match signal.kind {
                    SignalKind::EntryLong => Side::Buy,
                    SignalKind::EntryShort => Side::Sell,
                };
                order_tx
                    .send(Order::new_market(
                        self.symbol.clone(),
                        side,
                        qty,
                        Some(OrderTag::GridEntry(1)),
                    ))
                    .ok();
            }
            _ => {}
        }
    }

    /// §4.4.4: distinguishes a flattening fill (realize P&L, reset state, persist) from an
    /// entry/add fill (volume-weighted average, stage the remaining grid levels).
    fn handle_fill(&mut self, fill: FillConfirmation, order_tx: &mut OrderTx) {
        let signed_delta = match fill.side {
            Side::Buy => fill.qty,
            Side::Sell => -fill.qty,
        };
        let new_position = self.state.position_size + signed_delta;

        if new_position.abs() <= FLATTEN_TOLERANCE {
            let pnl = match fill.side {
                Side::Sell => (fill.price - self.state.avg_entry_price) * fill.qty,
                Side::Buy => (self.state.avg_entry_price - fill.price) * fill.qty,
            };
            self.state.balance_real += pnl;
            self.state.position_size = Decimal::ZERO;
            self.state.avg_entry_price = Decimal::ZERO;
            self.state.n_entries = 0;
            self.state.long_grid_prices.clear();
            self.state.short_grid_prices.clear();
            self.issued_grid_prices.clear();
            self.status = PositionStatus::Flat;
            self.publish_status();
            self.persist();
            info!(symbol = %self.symbol, %pnl, "position flattened");
            return;
        }

        let prior_exposure = self.state.position_size.abs() * self.state.avg_entry_price;
        let new_exposure = fill.qty * fill.price;
        let total_qty = self.state.position_size.abs() + fill.qty;
        if total_qty > Decimal::ZERO {
            self.state.avg_entry_price = (prior_exposure + new_exposure) / total_qty;
        }
        self.state.position_size = new_position;
        self.state.n_entries = self.state.n_entries.saturating_add(1);
        self.status = derive_status(self.state.position_size);
        self.publish_status();

        self.stage_grid(fill.price, fill.side);
        self.issue_resting_grid_orders(order_tx);
    }

    /// §4.4.4/§4.4.5: replaces the stored grid-price list for the side of `base`, the fill that
    /// just opened or added to the position, with exactly the *remaining* `MAX_ENTRIES -
    /// n_entries` levels - once `n_entries` reaches `MAX_ENTRIES` this stages nothing, so a
    /// later fill can never push `n_entries` past its cap. Clears the issued-orders memo since
    /// the old list's prices no longer apply.
    fn stage_grid(&mut self, base: Decimal, side: Side) {
        let g = self.config.grid_width_pct / dec!(100);
        let remaining = self.config.max_entries.saturating_sub(self.state.n_entries);
        let levels = 1..=remaining;

        match side {
            Side::Buy => {
                self.state.long_grid_prices = levels
                    .map(|i| base * (Decimal::ONE - Decimal::from(i) * g))
                    .collect();
            }
            Side::Sell => {
                self.state.short_grid_prices = levels
                    .map(|i| base * (Decimal::ONE + Decimal::from(i) * g))
                    .collect();
            }
        }
        self.issued_grid_prices.clear();
    }

    /// Issues a LIMIT order for every staged grid price not already covered by a live order
    /// (§4.4.5). Level numbering starts at 2 since level 1 is the initial market entry.
    fn issue_resting_grid_orders(&mut self, order_tx: &mut OrderTx) {
        let side = if self.state.position_size > Decimal::ZERO {
            Side::Buy
        } else {
            Side::Sell
        };
        let prices = match side {
            Side::Buy => self.state.long_grid_prices.clone(),
            Side::Sell => self.state.short_grid_prices.clone(),
        };

        for (i, price) in prices.into_iter().enumerate() {
            if self.issued_grid_prices.contains(&price) {
                continue;
            }
            let qty = risk::position_size(
                self.state.balance_real,
                self.config.risk_pct_per_trade,
                self.config.grid_width_pct,
                price,
            );
            if qty <= Decimal::ZERO {
                continue;
            }
            let level = i as u8 + 2;
            order_tx
                .send(Order::new_limit(
                    self.symbol.clone(),
                    side,
                    qty,
                    price,
                    Some(OrderTag::GridEntry(level)),
                ))
                .ok();
            self.issued_grid_prices.insert(price);
        }
    }

    /// §4.4.6: called by the Bot Manager when decommissioning this agent. A no-op while flat;
    /// otherwise flattens and waits up to [`DROP_OUT_TIMEOUT`] for the confirming fill.
    pub async fn drop_out(&mut self, order_tx: &mut OrderTx, fill_rx: &mut FillRx) {
        if self.status == PositionStatus::Flat {
            return;
        }

        let side = flattening_side(self.state.position_size);
        let qty = self.state.position_size.abs();
        order_tx
            .send(Order::new_market(
                self.symbol.clone(),
                side,
                qty,
                Some(OrderTag::ExitFlatten),
            ))
            .ok();

        let outcome = tokio::time::timeout(DROP_OUT_TIMEOUT, async {
            loop {
                match fill_rx.rx.recv().await {
                    Some(fill) => {
                        self.handle_fill(fill, order_tx);
                        if self.status == PositionStatus::Flat {
                            return;
                        }
                    }
                    None => return,
                }
            }
        })
        .await;

        if outcome.is_err() {
            warn!(symbol = %self.symbol, "drop-out flatten fill not confirmed within timeout");
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status);
    }

    /// Persists current state unconditionally; used on shutdown (§4.4.7: "on agent shutdown").
    /// Best-effort - a write failure is logged, never returned, and never aborts the agent.
    pub fn persist(&self) {
        if let Err(error) = persist_state(&self.state_path, &self.state) {
            warn!(symbol = %self.symbol, %error, "failed to persist agent state");
        }
    }
}

fn flattening_side(position_size: Decimal) -> Side {
    if position_size > Decimal::ZERO {
        Side::Sell
    } else {
        Side::Buy
    }
}

fn derive_status(position_size: Decimal) -> PositionStatus {
    if position_size > Decimal::ZERO {
        PositionStatus::Long
    } else if position_size < Decimal::ZERO {
        PositionStatus::Short
    } else {
        PositionStatus::Flat
    }
}

fn state_path_for(state_dir: &str, symbol: &Symbol) -> PathBuf {
    Path::new(state_dir).join(format!("{}.json", symbol.as_str()))
}

fn load_state(path: &Path) -> Option<AgentState> {
    Snapshot::load(path)
}

fn persist_state(path: &Path, state: &AgentState) -> Result<(), String> {
    Snapshot::persist(path, state)
}

/// The Signal task (§4.3, §5): drives [`SignalGenerator::evaluate`] off the Router's enriched
/// history updates and the Portfolio's published status, pushing any emitted [`TradeSignal`]
/// into the agent's signal channel.
pub async fn run_signal_loop(
    mut strategy_rx: StrategyRx,
    mut status_rx: watch::Receiver<PositionStatus>,
    signal_tx: crate::model::SignalTx,
    trade_mode: gridfleet_instrument::TradeMode,
) {
    let mut generator = SignalGenerator::with_trade_mode(trade_mode);

    while let Some(history) = strategy_rx.rx.recv().await {
        let status = *status_rx.borrow_and_update();
        if let Some(signal) = generator.evaluate(&history.symbol, history.prior_trend, status) {
            signal_tx.send(signal).ok();
        }
    }
}
