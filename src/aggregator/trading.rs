use super::liquidity::LiquidityEstimator;
use super::price::percent_change;
use super::{Outcome, TickReport};
use crate::models::{TradeEvent, TradingSnapshot};
use crate::scheduler::PeriodicTask;
use crate::store::EventStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on trades read per 24h window.
const MAX_WINDOW_TRADES: i64 = 100_000;

pub struct TradingAggregator {
    store: Arc<dyn EventStore>,
    estimator: Arc<dyn LiquidityEstimator>,
}

impl TradingAggregator {
    pub fn new(store: Arc<dyn EventStore>, estimator: Arc<dyn LiquidityEstimator>) -> Self {
        Self { store, estimator }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let tokens = self
            .store
            .active_tokens()
            .await
            .context("loading active tokens")?;

        let mut report = TickReport::default();
        for token in &tokens {
            if let Some(e) = report.record(self.aggregate_token(&token.address, now).await) {
                warn!(mint = %token.address, error = %e, "Trading aggregation failed");
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            estimator = self.estimator.name(),
            "📊 Trading snapshots written"
        );
        Ok(report)
    }

    async fn aggregate_token(&self, address: &str, now: DateTime<Utc>) -> Result<Outcome> {
        let day_ago = now - Duration::hours(24);
        let current = self
            .store
            .trades_between(address, day_ago, now, MAX_WINDOW_TRADES)
            .await
            .with_context(|| format!("loading 24h trades for {address}"))?;

        if current.is_empty() {
            debug!(mint = %address, "No trades in 24h, trading snapshot skipped");
            return Ok(Outcome::NoTrades);
        }

        let prior = self
            .store
            .trades_between(address, day_ago - Duration::hours(24), day_ago, MAX_WINDOW_TRADES)
            .await
            .with_context(|| format!("loading prior 24h trades for {address}"))?;

        let previous = self
            .store
            .latest_trading_snapshot(address)
            .await
            .with_context(|| format!("loading previous trading snapshot for {address}"))?;

        let snapshot = build_snapshot(
            address,
            &current,
            &prior,
            previous.as_ref(),
            self.estimator.as_ref(),
            now,
        );

        self.store
            .append_trading_snapshot(&snapshot)
            .await
            .with_context(|| format!("writing trading snapshot for {address}"))?;
        Ok(Outcome::Written)
    }
}

#[async_trait]
impl PeriodicTask for TradingAggregator {
    fn name(&self) -> &'static str {
        "trading_aggregator"
    }

    async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        self.run_once(now).await.map(|_| ())
    }
}

pub fn volume(trades: &[TradeEvent]) -> f64 {
    trades.iter().map(|t| t.sol_amount).sum()
}

pub fn build_snapshot(
    address: &str,
    current: &[TradeEvent],
    prior: &[TradeEvent],
    previous: Option<&TradingSnapshot>,
    estimator: &dyn LiquidityEstimator,
    now: DateTime<Utc>,
) -> TradingSnapshot {
    let volume_24h = volume(current);
    let traders: HashSet<&str> = current.iter().map(|t| t.trader.as_str()).collect();
    let liquidity = estimator.estimate(current);

    TradingSnapshot {
        token_address: address.to_string(),
        volume_24h,
        volume_change: percent_change(volume_24h, volume(prior)).unwrap_or(0.0),
        tx_count_24h: current.len() as i64,
        active_traders: traders.len() as i64,
        liquidity,
        liquidity_change: previous
            .and_then(|p| percent_change(liquidity, p.liquidity))
            .unwrap_or(0.0),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AverageTradeSizeEstimator;
    use crate::models::{Token, TradeDirection};
    use crate::store::MemoryEventStore;
    use crate::store::testing::FlakyStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn trade(mint: &str, signature: &str, trader: &str, sol: f64, hours_ago: i64) -> TradeEvent {
        TradeEvent {
            signature: signature.to_string(),
            token_address: mint.to_string(),
            trader: trader.to_string(),
            direction: TradeDirection::Buy,
            sol_amount: sol,
            token_amount: 1_000.0,
            price: sol / 1_000.0,
            timestamp: now() - Duration::hours(hours_ago),
        }
    }

    fn token(mint: &str) -> Token {
        Token {
            address: mint.to_string(),
            name: mint.to_string(),
            symbol: "TKN".to_string(),
            decimals: 6,
            total_supply: "1000000000000000".to_string(),
            creator: "creator".to_string(),
            uri: None,
            bonding_curve: None,
            initial_liquidity: 0.0,
            social_links: None,
            is_active: true,
            created_at: now() - Duration::days(3),
        }
    }

    fn aggregator(store: Arc<dyn EventStore>) -> TradingAggregator {
        TradingAggregator::new(store, Arc::new(AverageTradeSizeEstimator::new(10.0)))
    }

    #[test]
    fn test_volume_traders_and_changes() {
        let current = vec![
            trade("M", "a", "alice", 2.0, 1),
            trade("M", "b", "bob", 4.0, 2),
            trade("M", "c", "alice", 6.0, 3),
        ];
        let prior = vec![trade("M", "d", "carol", 4.0, 30)];
        let previous = TradingSnapshot {
            token_address: "M".to_string(),
            volume_24h: 1.0,
            volume_change: 0.0,
            tx_count_24h: 1,
            active_traders: 1,
            liquidity: 20.0,
            liquidity_change: 0.0,
            timestamp: now() - Duration::minutes(1),
        };

        let snapshot = build_snapshot(
            "M",
            &current,
            &prior,
            Some(&previous),
            &AverageTradeSizeEstimator::new(10.0),
            now(),
        );

        assert_eq!(snapshot.volume_24h, 12.0);
        assert_eq!(snapshot.tx_count_24h, 3);
        assert_eq!(snapshot.active_traders, 2);
        assert_eq!(snapshot.volume_change, 200.0);
        assert_eq!(snapshot.liquidity, 40.0);
        assert_eq!(snapshot.liquidity_change, 100.0);
    }

    #[test]
    fn test_no_prior_volume_means_zero_change() {
        let current = vec![trade("M", "a", "alice", 2.0, 1)];
        let snapshot = build_snapshot(
            "M",
            &current,
            &[],
            None,
            &AverageTradeSizeEstimator::default(),
            now(),
        );
        assert_eq!(snapshot.volume_change, 0.0);
        assert_eq!(snapshot.liquidity_change, 0.0);
    }

    #[tokio::test]
    async fn test_windows_are_read_from_the_store() {
        let store = Arc::new(MemoryEventStore::new());
        store.upsert_token(&token("M")).await.unwrap();
        for t in [
            trade("M", "a", "alice", 3.0, 1),
            trade("M", "b", "bob", 1.0, 23),
            trade("M", "c", "carol", 2.0, 25),
            trade("M", "d", "dave", 9.0, 60),
        ] {
            store.insert_trade_if_absent(&t).await.unwrap();
        }

        let report = aggregator(store.clone()).run_once(now()).await.unwrap();
        assert_eq!(report.processed, 1);

        let snapshot = store.latest_trading_snapshot("M").await.unwrap().unwrap();
        assert_eq!(snapshot.volume_24h, 4.0);
        assert_eq!(snapshot.volume_change, 100.0);
        assert_eq!(snapshot.active_traders, 2);
    }

    #[tokio::test]
    async fn test_stale_token_is_skipped() {
        let store = Arc::new(MemoryEventStore::new());
        store.upsert_token(&token("M")).await.unwrap();
        store
            .insert_trade_if_absent(&trade("M", "old", "alice", 3.0, 30))
            .await
            .unwrap();

        let report = aggregator(store.clone()).run_once(now()).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(store.trading_snapshots("M").is_empty());
    }

    #[tokio::test]
    async fn test_failing_token_does_not_stop_the_batch() {
        let store = Arc::new(FlakyStore::new(&["broken"]));
        for mint in ["broken", "healthy", "also-healthy"] {
            store.upsert_token(&token(mint)).await.unwrap();
            store
                .insert_trade_if_absent(&trade(mint, &format!("{mint}-1"), "alice", 1.0, 1))
                .await
                .unwrap();
        }

        let report = aggregator(store.clone()).run_once(now()).await.unwrap();

        assert_eq!(report, TickReport { processed: 2, skipped: 0, failed: 1 });
        assert_eq!(store.inner.trading_snapshots("healthy").len(), 1);
        assert_eq!(store.inner.trading_snapshots("also-healthy").len(), 1);
        assert!(store.inner.trading_snapshots("broken").is_empty());
    }
}
