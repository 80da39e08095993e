use super::EventStore;
use crate::models::queries;
use crate::models::{
    AlertFilter, AlertRecord, MarketView, PriceSnapshot, Token, TradeEvent, TradingSnapshot,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed store. Each call maps to one statement in `models::queries`.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn upsert_token(&self, token: &Token) -> Result<()> {
        queries::upsert_token(&self.pool, token).await
    }

    async fn get_token(&self, address: &str) -> Result<Option<Token>> {
        queries::get_token(&self.pool, address).await
    }

    async fn active_tokens(&self) -> Result<Vec<Token>> {
        queries::get_active_tokens(&self.pool).await
    }

    async fn deactivate_token(&self, address: &str) -> Result<bool> {
        queries::deactivate_token(&self.pool, address).await
    }

    async fn insert_trade_if_absent(&self, trade: &TradeEvent) -> Result<bool> {
        queries::insert_trade_if_absent(&self.pool, trade).await
    }

    async fn recent_trades(&self, address: &str, limit: i64) -> Result<Vec<TradeEvent>> {
        queries::get_recent_trades(&self.pool, address, limit).await
    }

    async fn trades_between(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TradeEvent>> {
        queries::get_trades_between(&self.pool, address, from, to, limit).await
    }

    async fn append_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        queries::insert_price_snapshot(&self.pool, snapshot).await
    }

    async fn append_trading_snapshot(&self, snapshot: &TradingSnapshot) -> Result<()> {
        queries::insert_trading_snapshot(&self.pool, snapshot).await
    }

    async fn latest_price_snapshot(&self, address: &str) -> Result<Option<PriceSnapshot>> {
        queries::get_latest_price_snapshot(&self.pool, address).await
    }

    async fn latest_trading_snapshot(&self, address: &str) -> Result<Option<TradingSnapshot>> {
        queries::get_latest_trading_snapshot(&self.pool, address).await
    }

    async fn market_views_since(&self, since: DateTime<Utc>) -> Result<Vec<MarketView>> {
        queries::get_market_views_since(&self.pool, since).await
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        queries::insert_alert(&self.pool, alert).await
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>> {
        queries::list_alerts(&self.pool, filter).await
    }

    async fn mark_alert_read(&self, id: Uuid) -> Result<bool> {
        queries::mark_alert_read(&self.pool, id).await
    }
}
