//! Event Store: the single source of truth for tokens, trades, snapshots and
//! alerts. Every operation is a single atomic statement; no caller holds a
//! lock across a store call.

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub mod testing;

use crate::models::{
    AlertFilter, AlertRecord, MarketView, PriceSnapshot, Token, TradeEvent, TradingSnapshot,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn upsert_token(&self, token: &Token) -> Result<()>;

    async fn get_token(&self, address: &str) -> Result<Option<Token>>;

    async fn active_tokens(&self) -> Result<Vec<Token>>;

    async fn deactivate_token(&self, address: &str) -> Result<bool>;

    /// Idempotent on signature. Returns `true` only when a new row was written.
    async fn insert_trade_if_absent(&self, trade: &TradeEvent) -> Result<bool>;

    /// Most recent trades for a token, newest first.
    async fn recent_trades(&self, address: &str, limit: i64) -> Result<Vec<TradeEvent>>;

    /// Trades with `from < timestamp <= to`, newest first.
    async fn trades_between(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TradeEvent>>;

    async fn append_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()>;

    async fn append_trading_snapshot(&self, snapshot: &TradingSnapshot) -> Result<()>;

    async fn latest_price_snapshot(&self, address: &str) -> Result<Option<PriceSnapshot>>;

    async fn latest_trading_snapshot(&self, address: &str) -> Result<Option<TradingSnapshot>>;

    /// Latest price and trading snapshot per token, both taken at or after `since`.
    async fn market_views_since(&self, since: DateTime<Utc>) -> Result<Vec<MarketView>>;

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<()>;

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>>;

    async fn mark_alert_read(&self, id: Uuid) -> Result<bool>;
}
