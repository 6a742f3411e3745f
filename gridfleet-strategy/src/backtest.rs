use crate::error::{Result, StrategyError};
use crate::supertrend::SuperTrend;
use chrono::{DateTime, Utc};
use gridfleet_instrument::{StrategyParams, Symbol, Timeframe};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, warn};

/// Sentinel net-profit returned for combinations too short on history to evaluate, or when
/// nothing in the grid is profitable (§4.8).
pub const UNPROFITABLE_SENTINEL: Decimal = dec!(-100);

/// One closed candle, as fetched from the exchange REST kline endpoint.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Kline {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Fetches historical klines for a `(symbol, timeframe)`. Implemented by a thin REST adapter in
/// the binary crate; kept as a trait here so the incremental-cache and grid-search logic is
/// testable without a network dependency.
#[async_trait::async_trait]
pub trait KlineSource: Send + Sync {
    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Kline>>;
}

/// 48-hour rolling kline cache keyed by `(symbol, timeframe)` (§4.8 step 1).
#[derive(Default)]
pub struct KlineCache {
    series: HashMap<(Symbol, Timeframe), Vec<Kline>>,
}

impl KlineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches and merges fresh klines for `(symbol, timeframe)`: 48 hours on a cold cache, or
    /// bars strictly after the last cached timestamp otherwise (capped at 200 per request).
    /// Deduplicates by timestamp (last write wins) and trims back to the 48-hour window.
    pub async fn refresh(
        &mut self,
        source: &dyn KlineSource,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<()> {
        let key = (symbol.clone(), timeframe);
        let bars_per_48h = (48 * 60) / timeframe.minutes() as usize;

        let last_ts = self.series.get(&key).and_then(|bars| bars.last()).map(|b| b.ts);

        let fetched = match last_ts {
            None => source.fetch(symbol, timeframe, None, bars_per_48h).await?,
            Some(ts) => source.fetch(symbol, timeframe, Some(ts), 200).await?,
        };

        let entry = self.series.entry(key).or_default();
        entry.extend(fetched);
        entry.sort_by_key(|bar| bar.ts);
        entry.dedup_by_key(|bar| bar.ts);

        let cutoff = Utc::now() - chrono::Duration::hours(48);
        entry.retain(|bar| bar.ts >= cutoff);

        Ok(())
    }

    pub fn get(&self, symbol: &Symbol, timeframe: Timeframe) -> &[Kline] {
        self.series
            .get(&(symbol.clone(), timeframe))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The timestamp `refresh`/`merge` would resume from for `(symbol, timeframe)` - `None` on a
    /// cold cache. Exposed standalone (rather than folded into a combined fetch-and-merge call)
    /// so a caller can run the fetch concurrently with other tickers and only take the cache lock
    /// for the brief synchronous merge afterwards.
    pub fn last_timestamp(&self, symbol: &Symbol, timeframe: Timeframe) -> Option<DateTime<Utc>> {
        self.series
            .get(&(symbol.clone(), timeframe))
            .and_then(|bars| bars.last())
            .map(|bar| bar.ts)
    }

    /// The `limit` a `KlineSource::fetch` call should request for `(timeframe, last_ts)`: a full
    /// 48-hour window on a cold cache, or up to 200 bars since `last_ts` otherwise.
    pub fn fetch_limit(timeframe: Timeframe, last_ts: Option<DateTime<Utc>>) -> usize {
        match last_ts {
            None => (48 * 60) / timeframe.minutes() as usize,
            Some(_) => 200,
        }
    }

    /// Merges already-fetched bars into `(symbol, timeframe)`'s series and returns the resulting
    /// slice as an owned `Vec` - the counterpart to `last_timestamp`/`fetch_limit` that takes the
    /// lock only for this synchronous step, never across the network fetch that produced `fetched`.
    pub fn merge(&mut self, symbol: &Symbol, timeframe: Timeframe, fetched: Vec<Kline>) -> Vec<Kline> {
        let entry = self.series.entry((symbol.clone(), timeframe)).or_default();
        entry.extend(fetched);
        entry.sort_by_key(|bar| bar.ts);
        entry.dedup_by_key(|bar| bar.ts);

        let cutoff = Utc::now() - chrono::Duration::hours(48);
        entry.retain(|bar| bar.ts >= cutoff);
        entry.clone()
    }
}

/// Result of one `(timeframe, period, multiplier)` backtest run.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BacktestPerformance {
    pub net_profit: Decimal,
    pub win_rate: Decimal,
}

/// Best combination found across the full grid for one symbol (§4.8 step 3).
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct OptimizeResult {
    pub params: StrategyParams,
    pub performance: BacktestPerformance,
}

/// Runs SuperTrend over `klines` with the given `(period, multiplier)` and scores the resulting
/// position series against next-bar returns (§4.8 step 2).
pub fn backtest_one(klines: &[Kline], period: usize, multiplier: Decimal) -> BacktestPerformance {
    if klines.len() <= period {
        return BacktestPerformance {
            net_profit: UNPROFITABLE_SENTINEL,
            win_rate: Decimal::ZERO,
        };
    }

    let mut supertrend = SuperTrend::new(period, multiplier);
    let mut positions = Vec::with_capacity(klines.len());
    for bar in klines {
        let value = supertrend.next(bar.high, bar.low, bar.close);
        positions.push(value.trend.as_position());
    }

    let mut wins = 0u32;
    let mut losses = 0u32;
    let mut growth = 1.0_f64;
    let mut any_return = false;

    for t in 1..klines.len() {
        let prev_close = klines[t - 1].close;
        if prev_close == 0.0 {
            continue;
        }
        let pct_change = (klines[t].close - prev_close) / prev_close;
        let position = positions[t - 1] as f64;
        let r = pct_change * position;

        if r.is_nan() {
            continue;
        }
        any_return = true;
        growth *= 1.0 + r;
        if r > 0.0 {
            wins += 1;
        } else if r < 0.0 {
            losses += 1;
        }
    }

    if !any_return {
        return BacktestPerformance {
            net_profit: Decimal::ZERO,
            win_rate: Decimal::ZERO,
        };
    }

    let net_profit = Decimal::from_str(&format!("{:.8}", (growth - 1.0) * 100.0))
        .unwrap_or(UNPROFITABLE_SENTINEL);
    let win_rate = if wins + losses == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(wins) / Decimal::from(wins + losses) * dec!(100)
    };

    BacktestPerformance { net_profit, win_rate }
}

/// Grid-searches the `3 periods × 5 multipliers = 15` combinations for one already-fetched
/// `klines` slice at `timeframe` and returns the best by `net_profit`, or `None` if every
/// combination is at the unprofitable sentinel (§4.8 steps 2-3). Pure and CPU-bound - touches no
/// shared state, so it is safe to run inside `tokio::task::spawn_blocking`.
pub fn grid_search(klines: &[Kline], timeframe: Timeframe) -> Result<Option<OptimizeResult>> {
    let mut best: Option<OptimizeResult> = None;

    for &period in &StrategyParams::PERIOD_CANDIDATES {
        for multiplier_str in StrategyParams::MULTIPLIER_CANDIDATES {
            let multiplier = Decimal::from_str(multiplier_str)
                .map_err(|e| StrategyError::Backtest(e.to_string()))?;
            let performance = backtest_one(klines, period, multiplier);

            let is_better = best
                .as_ref()
                .map(|b| performance.net_profit > b.performance.net_profit)
                .unwrap_or(true);

            if is_better && performance.net_profit > UNPROFITABLE_SENTINEL {
                best = Some(OptimizeResult {
                    params: StrategyParams::new(timeframe, period, multiplier),
                    performance,
                });
            }
        }
    }

    Ok(best)
}

/// Grid-searches all `3 timeframes × 3 periods × 5 multipliers = 45` combinations for `symbol`
/// and returns the best by `net_profit`, or `None` if every combination is at the unprofitable
/// sentinel (§4.8 step 3). Sequential: fetches and searches one timeframe at a time under one
/// `&mut KlineCache` borrow. The Orchestrator does not call this directly for exactly that reason
/// - searching many tickers this way would serialize their network fetches against each other -
/// and instead drives `KlineCache::last_timestamp`/`merge` and `grid_search` itself per ticker
/// task, locking its shared cache only for the short synchronous merge step.
pub async fn optimize(
    source: &dyn KlineSource,
    cache: &mut KlineCache,
    symbol: &Symbol,
) -> Result<Option<OptimizeResult>> {
    let mut best: Option<OptimizeResult> = None;

    for &timeframe in &Timeframe::ALL {
        if let Err(error) = cache.refresh(source, symbol, timeframe).await {
            warn!(%symbol, ?timeframe, %error, "kline refresh failed, skipping timeframe");
            continue;
        }
        let klines = cache.get(symbol, timeframe);
        if let Some(candidate) = grid_search(klines, timeframe)? {
            let is_better = best
                .as_ref()
                .map(|b| candidate.performance.net_profit > b.performance.net_profit)
                .unwrap_or(true);
            if is_better {
                best = Some(candidate);
            }
        }
    }

    if best.is_none() {
        info!(%symbol, "no profitable combination found in grid search");
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_klines(n: usize, step: f64) -> Vec<Kline> {
        (0..n)
            .map(|i| {
                let close = 100.0 + step * i as f64;
                Kline {
                    ts: DateTime::from_timestamp(i as i64 * 60, 0).unwrap(),
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                }
            })
            .collect()
    }

    #[test]
    fn too_few_bars_is_sentinel() {
        let klines = trending_klines(5, 1.0);
        let result = backtest_one(&klines, 30, dec!(3.0));
        assert_eq!(result.net_profit, UNPROFITABLE_SENTINEL);
    }

    #[test]
    fn sustained_uptrend_backtest_is_profitable() {
        let klines = trending_klines(60, 1.0);
        let result = backtest_one(&klines, 20, dec!(2.0));
        assert!(result.net_profit > Decimal::ZERO);
    }

    #[tokio::test]
    async fn cache_has_no_duplicate_timestamps_after_two_refreshes() {
        struct FixedSource;

        #[async_trait::async_trait]
        impl KlineSource for FixedSource {
            async fn fetch(
                &self,
                _symbol: &Symbol,
                timeframe: Timeframe,
                after: Option<DateTime<Utc>>,
                limit: usize,
            ) -> Result<Vec<Kline>> {
                let start = after.unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap());
                Ok((1..=limit.min(10))
                    .map(|i| {
                        let ts = start + chrono::Duration::minutes(i as i64 * timeframe.minutes() as i64);
                        Kline { ts, open: 1.0, high: 1.0, low: 1.0, close: 1.0 }
                    })
                    .collect())
            }
        }

        let mut cache = KlineCache::new();
        let symbol = Symbol::new("BTCUSDT");
        cache.refresh(&FixedSource, &symbol, Timeframe::M1).await.unwrap();
        cache.refresh(&FixedSource, &symbol, Timeframe::M1).await.unwrap();

        let bars = cache.get(&symbol, Timeframe::M1);
        let mut timestamps: Vec<_> = bars.iter().map(|b| b.ts).collect();
        let before_dedup = timestamps.len();
        timestamps.dedup();
        assert_eq!(timestamps.len(), before_dedup);
    }

    #[tokio::test]
    async fn optimize_picks_a_profitable_combination_from_a_trending_series() {
        struct TrendingSource;

        #[async_trait::async_trait]
        impl KlineSource for TrendingSource {
            async fn fetch(
                &self,
                _symbol: &Symbol,
                timeframe: Timeframe,
                after: Option<DateTime<Utc>>,
                limit: usize,
            ) -> Result<Vec<Kline>> {
                let start = after.unwrap_or_else(|| Utc::now() - chrono::Duration::hours(47));
                Ok((1..=limit.min(60))
                    .map(|i| {
                        let ts = start + chrono::Duration::minutes(i as i64 * timeframe.minutes() as i64);
                        let close = 100.0 + i as f64;
                        Kline { ts, open: close, high: close + 0.5, low: close - 0.5, close }
                    })
                    .collect())
            }
        }

        let mut cache = KlineCache::new();
        let symbol = Symbol::new("ETHUSDT");
        let result = optimize(&TrendingSource, &mut cache, &symbol).await.unwrap();
        let result = result.expect("a sustained uptrend should find a profitable combination");
        assert!(result.performance.net_profit > Decimal::ZERO);
    }

    #[test]
    fn grid_search_rejects_an_all_unprofitable_series() {
        let klines = trending_klines(5, 1.0);
        assert!(grid_search(&klines, Timeframe::M1).unwrap().is_none());
    }

    #[test]
    fn merge_deduplicates_and_trims_to_the_48_hour_window() {
        let mut cache = KlineCache::new();
        let symbol = Symbol::new("BTCUSDT");
        let now = Utc::now();

        let stale = Kline { ts: now - chrono::Duration::hours(49), open: 1.0, high: 1.0, low: 1.0, close: 1.0 };
        let fresh = Kline { ts: now - chrono::Duration::minutes(5), open: 2.0, high: 2.0, low: 2.0, close: 2.0 };

        let merged = cache.merge(&symbol, Timeframe::M1, vec![stale, fresh, fresh]);
        assert_eq!(merged, vec![fresh]);
        assert_eq!(cache.last_timestamp(&symbol, Timeframe::M1), Some(fresh.ts));
    }

    #[test]
    fn fetch_limit_is_a_full_window_only_on_a_cold_cache() {
        assert_eq!(KlineCache::fetch_limit(Timeframe::M1, None), 2880);
        assert_eq!(KlineCache::fetch_limit(Timeframe::M1, Some(Utc::now())), 200);
    }
}
