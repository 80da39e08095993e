use super::{EventStore, MemoryEventStore};
use crate::models::{
    AlertFilter, AlertRecord, MarketView, PriceSnapshot, Token, TradeEvent, TradingSnapshot,
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Active token fixture.
pub fn token(mint: &str, created_at: DateTime<Utc>) -> Token {
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
        created_at,
    }
}

/// Memory store whose trade reads fail for selected tokens, and whose first
/// `n` token upserts can be made to fail.
pub struct FlakyStore {
    pub inner: MemoryEventStore,
    failing: HashSet<String>,
    upsert_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failing: &[&str]) -> Self {
        Self {
            inner: MemoryEventStore::new(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
            upsert_failures: AtomicUsize::new(0),
        }
    }

    pub fn failing_upserts(n: usize) -> Self {
        let store = Self::new(&[]);
        store.upsert_failures.store(n, Ordering::SeqCst);
        store
    }

    fn check(&self, address: &str) -> Result<()> {
        if self.failing.contains(address) {
            bail!("simulated read failure for {address}");
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn upsert_token(&self, token: &Token) -> Result<()> {
        let failed = self
            .upsert_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            bail!("simulated write failure for {}", token.address);
        }
        self.inner.upsert_token(token).await
    }

    async fn get_token(&self, address: &str) -> Result<Option<Token>> {
        self.inner.get_token(address).await
    }

    async fn active_tokens(&self) -> Result<Vec<Token>> {
        self.inner.active_tokens().await
    }

    async fn deactivate_token(&self, address: &str) -> Result<bool> {
        self.inner.deactivate_token(address).await
    }

    async fn insert_trade_if_absent(&self, trade: &TradeEvent) -> Result<bool> {
        self.inner.insert_trade_if_absent(trade).await
    }

    async fn recent_trades(&self, address: &str, limit: i64) -> Result<Vec<TradeEvent>> {
        self.check(address)?;
        self.inner.recent_trades(address, limit).await
    }

    async fn trades_between(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TradeEvent>> {
        self.check(address)?;
        self.inner.trades_between(address, from, to, limit).await
    }

    async fn append_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        self.inner.append_price_snapshot(snapshot).await
    }

    async fn append_trading_snapshot(&self, snapshot: &TradingSnapshot) -> Result<()> {
        self.inner.append_trading_snapshot(snapshot).await
    }

    async fn latest_price_snapshot(&self, address: &str) -> Result<Option<PriceSnapshot>> {
        self.inner.latest_price_snapshot(address).await
    }

    async fn latest_trading_snapshot(&self, address: &str) -> Result<Option<TradingSnapshot>> {
        self.inner.latest_trading_snapshot(address).await
    }

    async fn market_views_since(&self, since: DateTime<Utc>) -> Result<Vec<MarketView>> {
        self.inner.market_views_since(since).await
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        self.check(&alert.token_address)?;
        self.inner.insert_alert(alert).await
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>> {
        self.inner.list_alerts(filter).await
    }

    async fn mark_alert_read(&self, id: Uuid) -> Result<bool> {
        self.inner.mark_alert_read(id).await
    }
}
