use super::EventStore;
use crate::models::{
    AlertFilter, AlertRecord, MarketView, PriceSnapshot, Token, TradeEvent, TradingSnapshot,
};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    tokens: HashMap<String, Token>,
    signatures: HashSet<String>,
    trades: HashMap<String, Vec<TradeEvent>>,
    price_snapshots: Vec<PriceSnapshot>,
    trading_snapshots: Vec<TradingSnapshot>,
    alerts: Vec<AlertRecord>,
}

/// In-process store with the same semantics as the Postgres one.
/// Backs the test suite and embedders that run without a database.
#[derive(Default)]
pub struct MemoryEventStore {
    tables: RwLock<Tables>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    pub fn trade_count(&self) -> usize {
        self.read().map(|t| t.signatures.len()).unwrap_or(0)
    }

    pub fn price_snapshots(&self, address: &str) -> Vec<PriceSnapshot> {
        self.read()
            .map(|t| {
                t.price_snapshots
                    .iter()
                    .filter(|s| s.token_address == address)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn trading_snapshots(&self, address: &str) -> Vec<TradingSnapshot> {
        self.read()
            .map(|t| {
                t.trading_snapshots
                    .iter()
                    .filter(|s| s.token_address == address)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn newest_first(mut trades: Vec<TradeEvent>, limit: i64) -> Vec<TradeEvent> {
    trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    trades.truncate(limit.max(0) as usize);
    trades
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn upsert_token(&self, token: &Token) -> Result<()> {
        let mut tables = self.write()?;
        match tables.tokens.get_mut(&token.address) {
            Some(existing) => {
                let created_at = existing.created_at;
                let uri = token.uri.clone().or_else(|| existing.uri.take());
                let bonding_curve = token
                    .bonding_curve
                    .clone()
                    .or_else(|| existing.bonding_curve.take());
                let social_links = token
                    .social_links
                    .clone()
                    .or_else(|| existing.social_links.take());
                *existing = Token {
                    created_at,
                    uri,
                    bonding_curve,
                    social_links,
                    creator: existing.creator.clone(),
                    initial_liquidity: existing.initial_liquidity,
                    ..token.clone()
                };
            }
            None => {
                tables.tokens.insert(token.address.clone(), token.clone());
            }
        }
        Ok(())
    }

    async fn get_token(&self, address: &str) -> Result<Option<Token>> {
        Ok(self.read()?.tokens.get(address).cloned())
    }

    async fn active_tokens(&self) -> Result<Vec<Token>> {
        let mut tokens: Vec<Token> = self
            .read()?
            .tokens
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn deactivate_token(&self, address: &str) -> Result<bool> {
        let mut tables = self.write()?;
        match tables.tokens.get_mut(address) {
            Some(token) if token.is_active => {
                token.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_trade_if_absent(&self, trade: &TradeEvent) -> Result<bool> {
        let mut tables = self.write()?;
        // Mirrors the foreign key from trades to tokens.
        if !tables.tokens.contains_key(&trade.token_address) {
            bail!("trade {} references unknown token {}", trade.signature, trade.token_address);
        }
        if !tables.signatures.insert(trade.signature.clone()) {
            return Ok(false);
        }
        tables
            .trades
            .entry(trade.token_address.clone())
            .or_default()
            .push(trade.clone());
        Ok(true)
    }

    async fn recent_trades(&self, address: &str, limit: i64) -> Result<Vec<TradeEvent>> {
        let trades = self.read()?.trades.get(address).cloned().unwrap_or_default();
        Ok(newest_first(trades, limit))
    }

    async fn trades_between(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TradeEvent>> {
        let trades = self
            .read()?
            .trades
            .get(address)
            .map(|trades| {
                trades
                    .iter()
                    .filter(|t| t.timestamp > from && t.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(newest_first(trades, limit))
    }

    async fn append_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        self.write()?.price_snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn append_trading_snapshot(&self, snapshot: &TradingSnapshot) -> Result<()> {
        self.write()?.trading_snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn latest_price_snapshot(&self, address: &str) -> Result<Option<PriceSnapshot>> {
        Ok(self
            .read()?
            .price_snapshots
            .iter()
            .filter(|s| s.token_address == address)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn latest_trading_snapshot(&self, address: &str) -> Result<Option<TradingSnapshot>> {
        Ok(self
            .read()?
            .trading_snapshots
            .iter()
            .filter(|s| s.token_address == address)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn market_views_since(&self, since: DateTime<Utc>) -> Result<Vec<MarketView>> {
        let tables = self.read()?;

        let mut prices: HashMap<&str, &PriceSnapshot> = HashMap::new();
        for snapshot in tables.price_snapshots.iter().filter(|s| s.timestamp >= since) {
            let entry = prices.entry(snapshot.token_address.as_str()).or_insert(snapshot);
            if snapshot.timestamp >= entry.timestamp {
                *entry = snapshot;
            }
        }

        let mut trading: HashMap<&str, &TradingSnapshot> = HashMap::new();
        for snapshot in tables.trading_snapshots.iter().filter(|s| s.timestamp >= since) {
            let entry = trading.entry(snapshot.token_address.as_str()).or_insert(snapshot);
            if snapshot.timestamp >= entry.timestamp {
                *entry = snapshot;
            }
        }

        let mut views: Vec<MarketView> = prices
            .into_iter()
            .filter_map(|(address, price)| {
                trading.get(address).map(|trading| MarketView {
                    token_address: address.to_string(),
                    price: price.clone(),
                    trading: (*trading).clone(),
                })
            })
            .collect();
        views.sort_by(|a, b| a.token_address.cmp(&b.token_address));
        Ok(views)
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        self.write()?.alerts.push(alert.clone());
        Ok(())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>> {
        let mut alerts: Vec<AlertRecord> = self
            .read()?
            .alerts
            .iter()
            .filter(|a| {
                filter
                    .token_address
                    .as_ref()
                    .is_none_or(|address| &a.token_address == address)
            })
            .filter(|a| filter.alert_type.is_none_or(|t| a.alert_type == t))
            .filter(|a| !filter.unread_only || !a.is_read)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let (limit, offset) = filter.page();
        Ok(alerts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn mark_alert_read(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.write()?;
        match tables.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
