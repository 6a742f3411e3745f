use crate::bot_manager::BotManager;
use gridfleet_execution::{ExchangeGateway, InstrumentCategory};
use gridfleet_instrument::{StrategyParams, Symbol, Timeframe};
use gridfleet_strategy::backtest::{self, KlineCache, KlineSource};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

const CYCLE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DISCOVERY_CANDIDATES: usize = 25;
const TOP_N: usize = 5;

/// Fetches the Orchestrator's external candidate list (§4.7 step 2). A trait so a cycle can be
/// exercised without a network dependency, mirroring `gridfleet_strategy::backtest::KlineSource`.
#[async_trait::async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Symbol>, String>;
}

#[derive(Deserialize)]
struct DiscoveryTicker {
    s: String,
}

#[derive(Deserialize)]
struct DiscoveryResponse {
    d: Vec<DiscoveryTicker>,
}

/// Default [`DiscoverySource`]: a plain GET against the configured discovery endpoint (§6).
#[derive(Debug)]
pub struct HttpDiscoverySource {
    http: reqwest::Client,
    url: String,
}

impl HttpDiscoverySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl DiscoverySource for HttpDiscoverySource {
    async fn fetch(&self) -> Result<Vec<Symbol>, String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|error| error.to_string())?;
        let body: DiscoveryResponse = response.json().await.map_err(|error| error.to_string())?;
        Ok(body
            .d
            .into_iter()
            .take(DISCOVERY_CANDIDATES)
            .map(|ticker| Symbol::new(ticker.s))
            .collect())
    }
}

#[derive(Deserialize)]
struct WireKline {
    ts: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

/// Default [`KlineSource`]: fetches historical candles from the exchange REST API (§4.8 step 1).
/// Kept here rather than in `gridfleet-execution` since it is a backtester concern, not part of
/// the live-trading [`ExchangeGateway`] surface.
#[derive(Debug)]
pub struct RestKlineSource {
    http: reqwest::Client,
    rest_base: String,
}

impl RestKlineSource {
    pub fn new(rest_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_base: rest_base.into(),
        }
    }
}

#[async_trait::async_trait]
impl KlineSource for RestKlineSource {
    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: gridfleet_instrument::Timeframe,
        after: Option<chrono::DateTime<chrono::Utc>>,
        limit: usize,
    ) -> gridfleet_strategy::error::Result<Vec<backtest::Kline>> {
        let mut url = format!(
            "{}/klines?symbol={}&interval={}&limit={}",
            self.rest_base,
            symbol.as_str(),
            timeframe,
            limit
        );
        if let Some(after) = after {
            url.push_str(&format!("&start={}", after.timestamp_millis()));
        }

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;
        let body: Vec<WireKline> = response
            .json()
            .await
            .map_err(gridfleet_integration::error::IntegrationError::from)?;

        Ok(body
            .into_iter()
            .filter_map(|wire| {
                chrono::DateTime::from_timestamp_millis(wire.ts).map(|ts| backtest::Kline {
                    ts,
                    open: wire.open,
                    high: wire.high,
                    low: wire.low,
                    close: wire.close,
                })
            })
            .collect())
    }
}

/// Drives the periodic refresh-and-reconcile cycle (§4.7). Owns no trading state itself beyond
/// `tradable_universe`/`current_selection`; agent lifecycle is entirely delegated to the
/// [`BotManager`], making reconciliation a pure set-diff against whatever is already running.
pub struct Orchestrator {
    gateway: Arc<dyn ExchangeGateway>,
    bot_manager: Arc<BotManager>,
    discovery: Arc<dyn DiscoverySource>,
    kline_source: Arc<dyn KlineSource>,
    cache: Arc<AsyncMutex<KlineCache>>,
    tradable_universe: AsyncMutex<HashSet<Symbol>>,
    current_selection: AsyncMutex<HashSet<Symbol>>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        bot_manager: Arc<BotManager>,
        discovery: Arc<dyn DiscoverySource>,
        kline_source: Arc<dyn KlineSource>,
    ) -> Self {
        Self {
            gateway,
            bot_manager,
            discovery,
            kline_source,
            cache: Arc::new(AsyncMutex::new(KlineCache::new())),
            tradable_universe: AsyncMutex::new(HashSet::new()),
            current_selection: AsyncMutex::new(HashSet::new()),
        }
    }

    /// Long-running task body: waits a full [`CYCLE_INTERVAL`] before the first cycle, same as
    /// `tokio::time::interval`'s default behaviour, then repeats every interval thereafter.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(CYCLE_INTERVAL);
        loop {
            interval.tick().await;
            self.run_cycle().await;
        }
    }

    /// One reconciliation cycle (§4.7 steps 1-9).
    pub async fn run_cycle(&self) {
        let universe = match self.refresh_universe().await {
            Some(universe) => universe,
            None => return,
        };

        let candidates = match self.discovery.fetch().await {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(%error, "discovery endpoint fetch failed, aborting cycle");
                return;
            }
        };

        let valid: Vec<Symbol> = candidates
            .into_iter()
            .filter(|symbol| universe.contains(symbol))
            .collect();
        if valid.is_empty() {
            warn!("no discovery candidates intersect the tradable universe, aborting cycle");
            return;
        }

        let results = self.optimize_all(&valid).await;
        let new_selection = rank_top_n(results, TOP_N);

        let current = self.current_selection.lock().await.clone();
        let new_symbols: HashSet<Symbol> = new_selection.keys().cloned().collect();
        let to_stop: Vec<Symbol> = current.difference(&new_symbols).cloned().collect();
        let to_start: Vec<Symbol> = new_symbols.difference(&current).cloned().collect();

        for symbol in &to_stop {
            self.bot_manager.stop_bot(symbol, true).await;
        }
        for symbol in &to_start {
            let params = new_selection[symbol];
            self.bot_manager.start_bot(symbol.clone(), params).await;
        }

        info!(
            started = to_start.len(),
            stopped = to_stop.len(),
            selected = new_symbols.len(),
            "orchestrator cycle complete"
        );
        *self.current_selection.lock().await = new_symbols;
    }

    /// §4.7 step 1: refreshes `tradable_universe` from the gateway, reusing the previous value
    /// on failure. Aborts the cycle (returns `None`) only if the universe is empty either way.
    async fn refresh_universe(&self) -> Option<HashSet<Symbol>> {
        let mut universe = self.tradable_universe.lock().await;
        match self.gateway.get_instruments(InstrumentCategory::Linear).await {
            Ok(fresh) => *universe = fresh,
            Err(error) => {
                warn!(%error, "failed to refresh tradable universe, reusing previous");
            }
        }
        if universe.is_empty() {
            warn!("tradable universe empty, aborting cycle");
            return None;
        }
        Some(universe.clone())
    }

    /// §4.7 step 4 / §5: runs one real `tokio::task::spawn` per valid ticker so every ticker's
    /// kline fetches and grid search genuinely overlap, sharing one kline cache across the whole
    /// cycle (so a symbol already-optimized this process only ever has to fetch bars after its
    /// last cached timestamp, per §4.8 step 1) without serializing on it: each ticker task takes
    /// the cache lock only for the brief synchronous `last_timestamp`/`merge` steps, never across
    /// a network fetch or the grid search.
    async fn optimize_all(
        &self,
        valid: &[Symbol],
    ) -> Vec<(Symbol, backtest::OptimizeResult)> {
        let handles: Vec<_> = valid
            .iter()
            .cloned()
            .map(|symbol| {
                tokio::spawn(Self::optimize_one(
                    self.kline_source.clone(),
                    self.cache.clone(),
                    symbol,
                ))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((symbol, Some(result))) => results.push((symbol, result)),
                Ok((symbol, None)) => info!(%symbol, "no profitable combination found in grid search"),
                Err(join_error) => warn!(%join_error, "optimize task panicked"),
            }
        }
        results
    }

    /// One ticker's share of `optimize_all`: for each timeframe, fetches fresh klines with no
    /// cache lock held, merges them under a short lock, then hands the CPU-bound grid search off
    /// to `spawn_blocking` so it cannot starve the runtime's async worker threads (§5).
    async fn optimize_one(
        kline_source: Arc<dyn KlineSource>,
        cache: Arc<AsyncMutex<KlineCache>>,
        symbol: Symbol,
    ) -> (Symbol, Option<backtest::OptimizeResult>) {
        let mut best: Option<backtest::OptimizeResult> = None;

        for &timeframe in &Timeframe::ALL {
            let last_ts = cache.lock().await.last_timestamp(&symbol, timeframe);
            let limit = KlineCache::fetch_limit(timeframe, last_ts);

            let fetched = match kline_source.fetch(&symbol, timeframe, last_ts, limit).await {
                Ok(fetched) => fetched,
                Err(error) => {
                    warn!(%symbol, ?timeframe, %error, "kline fetch failed, skipping timeframe");
                    continue;
                }
            };
            let klines = cache.lock().await.merge(&symbol, timeframe, fetched);

            let candidate = match tokio::task::spawn_blocking(move || backtest::grid_search(&klines, timeframe)).await {
                Ok(Ok(candidate)) => candidate,
                Ok(Err(error)) => {
                    warn!(%symbol, ?timeframe, %error, "grid search failed");
                    continue;
                }
                Err(join_error) => {
                    warn!(%symbol, ?timeframe, %join_error, "grid search task panicked");
                    continue;
                }
            };

            if let Some(candidate) = candidate {
                let is_better = best
                    .as_ref()
                    .map(|b| candidate.performance.net_profit > b.performance.net_profit)
                    .unwrap_or(true);
                if is_better {
                    best = Some(candidate);
                }
            }
        }

        (symbol, best)
    }
}

/// §4.7 steps 5-6: sorts by `net_profit` descending and keeps the top `n`, keyed by symbol so
/// the reconciliation step can set-diff against `current_selection`.
fn rank_top_n(
    mut results: Vec<(Symbol, backtest::OptimizeResult)>,
    n: usize,
) -> HashMap<Symbol, StrategyParams> {
    results.sort_by(|a, b| {
        b.1.performance
            .net_profit
            .cmp(&a.1.performance.net_profit)
    });
    results
        .into_iter()
        .take(n)
        .map(|(symbol, result)| (symbol, result.params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_top_n_keeps_best_net_profit_per_symbol() {
        use gridfleet_instrument::Timeframe;
        use rust_decimal_macros::dec;

        let make = |symbol: &str, net_profit: rust_decimal::Decimal| {
            (
                Symbol::new(symbol),
                backtest::OptimizeResult {
                    params: StrategyParams::new(Timeframe::M5, 30, dec!(3.0)),
                    performance: backtest::BacktestPerformance {
                        net_profit,
                        win_rate: dec!(50),
                    },
                },
            )
        };

        let results = vec![
            make("AAAUSDT", dec!(5)),
            make("BBBUSDT", dec!(20)),
            make("CCCUSDT", dec!(10)),
        ];

        let top = rank_top_n(results, 2);
        assert_eq!(top.len(), 2);
        assert!(top.contains_key(&Symbol::new("BBBUSDT")));
        assert!(top.contains_key(&Symbol::new("CCCUSDT")));
        assert!(!top.contains_key(&Symbol::new("AAAUSDT")));
    }

    #[tokio::test]
    async fn discovery_response_reads_symbol_field_only() {
        #[derive(Clone)]
        struct StubDiscovery;

        #[async_trait::async_trait]
        impl DiscoverySource for StubDiscovery {
            async fn fetch(&self) -> Result<Vec<Symbol>, String> {
                let raw = r#"{"d":[{"s":"BTCUSDT","other":1},{"s":"ETHUSDT"}]}"#;
                let parsed: DiscoveryResponse = serde_json::from_str(raw).unwrap();
                Ok(parsed.d.into_iter().map(|t| Symbol::new(t.s)).collect())
            }
        }

        let symbols = StubDiscovery.fetch().await.unwrap();
        assert_eq!(symbols, vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")]);
    }
}
