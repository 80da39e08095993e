use super::{Outcome, TickReport};
use crate::models::{PriceSnapshot, Token, TradeEvent};
use crate::scheduler::PeriodicTask;
use crate::store::EventStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lookback windows in seconds, in the column order of `price_snapshots`.
pub const WINDOW_SECS: [i64; 5] = [60, 5 * 60, 15 * 60, 60 * 60, 24 * 60 * 60];

pub const DEFAULT_INACTIVE_AFTER_HOURS: i64 = 24;

pub struct PriceAggregator {
    store: Arc<dyn EventStore>,
    history_limit: i64,
    inactive_after: Duration,
}

impl PriceAggregator {
    pub fn new(store: Arc<dyn EventStore>, history_limit: i64) -> Self {
        Self {
            store,
            history_limit,
            inactive_after: Duration::hours(DEFAULT_INACTIVE_AFTER_HOURS),
        }
    }

    /// Tokens with no trade (or, without trades, no creation) within this
    /// window are deactivated and drop out of every periodic task.
    pub fn with_inactive_after(mut self, inactive_after: Duration) -> Self {
        self.inactive_after = inactive_after;
        self
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let tokens = self
            .store
            .active_tokens()
            .await
            .context("loading active tokens")?;

        let mut report = TickReport::default();
        for token in &tokens {
            if let Some(e) = report.record(self.aggregate_token(token, now).await) {
                warn!(mint = %token.address, error = %e, "Price aggregation failed");
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "📈 Price snapshots written"
        );
        Ok(report)
    }

    async fn aggregate_token(&self, token: &Token, now: DateTime<Utc>) -> Result<Outcome> {
        let address = token.address.as_str();
        let trades = self
            .store
            .recent_trades(address, self.history_limit)
            .await
            .with_context(|| format!("loading trades for {address}"))?;

        let last_activity = trades.first().map_or(token.created_at, |t| t.timestamp);
        if now - last_activity > self.inactive_after {
            self.store
                .deactivate_token(address)
                .await
                .with_context(|| format!("deactivating {address}"))?;
            info!(mint = %address, %last_activity, "💤 Token inactive, deactivated");
            return Ok(Outcome::Deactivated);
        }

        let Some(snapshot) = build_snapshot(address, &trades, now) else {
            debug!(mint = %address, "No trades, price snapshot skipped");
            return Ok(Outcome::NoTrades);
        };

        self.store
            .append_price_snapshot(&snapshot)
            .await
            .with_context(|| format!("writing price snapshot for {address}"))?;
        Ok(Outcome::Written)
    }
}

#[async_trait]
impl PeriodicTask for PriceAggregator {
    fn name(&self) -> &'static str {
        "price_aggregator"
    }

    async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        self.run_once(now).await.map(|_| ())
    }
}

/// `trades` must be newest first. Returns `None` when there are no trades
/// at or before `now`.
pub fn build_snapshot(address: &str, trades: &[TradeEvent], now: DateTime<Utc>) -> Option<PriceSnapshot> {
    let current = trades.iter().find(|t| t.timestamp <= now)?.price;
    let [m1, m5, m15, h1, h24] = WINDOW_SECS.map(|secs| {
        price_at_or_before(trades, now - Duration::seconds(secs))
            .and_then(|past| percent_change(current, past))
    });

    Some(PriceSnapshot {
        token_address: address.to_string(),
        price: current,
        price_change_1m: m1,
        price_change_5m: m5,
        price_change_15m: m15,
        price_change_1h: h1,
        price_change_24h: h24,
        timestamp: now,
    })
}

/// Price of the latest trade whose timestamp does not exceed `target`.
fn price_at_or_before(trades: &[TradeEvent], target: DateTime<Utc>) -> Option<f64> {
    trades
        .iter()
        .filter(|t| t.timestamp <= target)
        .max_by_key(|t| t.timestamp)
        .map(|t| t.price)
}

/// Undefined against a zero (or non-finite) base price.
pub fn percent_change(current: f64, past: f64) -> Option<f64> {
    if past == 0.0 || !past.is_finite() || !current.is_finite() {
        return None;
    }
    Some((current - past) / past * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Token, TradeDirection};
    use crate::store::MemoryEventStore;
    use crate::store::testing::{self, FlakyStore};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn trade(mint: &str, signature: &str, at: DateTime<Utc>, price: f64) -> TradeEvent {
        TradeEvent {
            signature: signature.to_string(),
            token_address: mint.to_string(),
            trader: "trader".to_string(),
            direction: TradeDirection::Buy,
            sol_amount: price * 1000.0,
            token_amount: 1000.0,
            price,
            timestamp: at,
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
            created_at: now() - Duration::hours(2),
        }
    }

    #[test]
    fn test_five_minute_change() {
        let trades = vec![
            trade("M", "a", now(), 1.0),
            trade("M", "b", now() - Duration::minutes(5), 0.8),
        ];

        let snapshot = build_snapshot("M", &trades, now()).unwrap();
        assert_eq!(snapshot.price, 1.0);
        assert!((snapshot.price_change_5m.unwrap() - 25.0).abs() < 1e-9);
        // The 5m trade is also the latest one at or before now-1m.
        assert!((snapshot.price_change_1m.unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(snapshot.price_change_15m, None);
        assert_eq!(snapshot.price_change_24h, None);
    }

    #[test]
    fn test_window_uses_latest_trade_not_after_target() {
        let trades = vec![
            trade("M", "a", now(), 2.0),
            trade("M", "b", now() - Duration::minutes(4), 1.5),
            trade("M", "c", now() - Duration::minutes(6), 1.0),
            trade("M", "d", now() - Duration::minutes(9), 0.5),
        ];

        let snapshot = build_snapshot("M", &trades, now()).unwrap();
        assert!((snapshot.price_change_5m.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_window_price_yields_null_change() {
        let trades = vec![
            trade("M", "a", now(), 1.0),
            trade("M", "b", now() - Duration::hours(1), 0.0),
        ];

        let snapshot = build_snapshot("M", &trades, now()).unwrap();
        assert_eq!(snapshot.price_change_1h, None);
        assert_eq!(snapshot.price_change_5m, None);
    }

    #[test]
    fn test_no_trades_no_snapshot() {
        assert!(build_snapshot("M", &[], now()).is_none());
    }

    #[tokio::test]
    async fn test_tokens_without_trades_are_skipped() {
        let store = Arc::new(MemoryEventStore::new());
        store.upsert_token(&token("quiet")).await.unwrap();
        store.upsert_token(&token("busy")).await.unwrap();
        store
            .insert_trade_if_absent(&trade("busy", "s1", now() - Duration::seconds(5), 1.0))
            .await
            .unwrap();

        let aggregator = PriceAggregator::new(store.clone(), 1_000);
        let report = aggregator.run_once(now()).await.unwrap();

        assert_eq!(report, TickReport { processed: 1, skipped: 1, failed: 0 });
        assert!(store.price_snapshots("quiet").is_empty());
        assert_eq!(store.price_snapshots("busy").len(), 1);
    }

    #[tokio::test]
    async fn test_failing_token_does_not_stop_the_batch() {
        let store = Arc::new(FlakyStore::new(&["broken"]));
        for mint in ["broken", "healthy"] {
            store.upsert_token(&token(mint)).await.unwrap();
            store
                .insert_trade_if_absent(&trade(mint, &format!("{mint}-1"), now(), 1.0))
                .await
                .unwrap();
        }

        let aggregator = PriceAggregator::new(store.clone(), 1_000);
        let report = aggregator.run_once(now()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(store.inner.price_snapshots("healthy").len(), 1);
    }

    #[tokio::test]
    async fn test_idle_tokens_are_deactivated() {
        let store = Arc::new(MemoryEventStore::new());
        store.upsert_token(&token("live")).await.unwrap();
        store.upsert_token(&token("stale")).await.unwrap();
        store
            .upsert_token(&testing::token("never-traded", now() - Duration::hours(30)))
            .await
            .unwrap();
        store
            .insert_trade_if_absent(&trade("live", "l1", now() - Duration::minutes(1), 1.0))
            .await
            .unwrap();
        store
            .insert_trade_if_absent(&trade("stale", "s1", now() - Duration::hours(25), 1.0))
            .await
            .unwrap();

        let aggregator = PriceAggregator::new(store.clone(), 1_000);
        let report = aggregator.run_once(now()).await.unwrap();

        assert_eq!(report, TickReport { processed: 1, skipped: 2, failed: 0 });
        let active: Vec<String> = store
            .active_tokens()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.address)
            .collect();
        assert_eq!(active, vec!["live"]);
        assert!(store.price_snapshots("stale").is_empty());
    }
}
