//! Read-only accessors for the REST/query layer.

use crate::models::{AlertFilter, AlertRecord, PriceSnapshot, TradingSnapshot};
use crate::redis::RedisClient;
use crate::store::EventStore;
use crate::stream::{ConnectivityStatus, StreamClient};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenMetrics {
    pub token_address: String,
    pub price: Option<PriceSnapshot>,
    pub trading: Option<TradingSnapshot>,
}

pub struct QueryService {
    store: Arc<dyn EventStore>,
    stream: Option<Arc<StreamClient>>,
    analysis_cache: Option<RedisClient>,
}

impl QueryService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            stream: None,
            analysis_cache: None,
        }
    }

    pub fn with_stream(mut self, stream: Arc<StreamClient>) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_analysis_cache(mut self, redis: RedisClient) -> Self {
        self.analysis_cache = Some(redis);
        self
    }

    pub async fn latest_metrics(&self, token_address: &str) -> Result<TokenMetrics> {
        Ok(TokenMetrics {
            token_address: token_address.to_string(),
            price: self.store.latest_price_snapshot(token_address).await?,
            trading: self.store.latest_trading_snapshot(token_address).await?,
        })
    }

    pub async fn alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>> {
        self.store.list_alerts(filter).await
    }

    pub async fn mark_alert_read(&self, id: Uuid) -> Result<bool> {
        self.store.mark_alert_read(id).await
    }

    /// Latest cached analysis, if a Redis cache is attached and the entry is live.
    pub async fn latest_analysis(&self, token_address: &str) -> Result<Option<serde_json::Value>> {
        match &self.analysis_cache {
            Some(redis) => redis.get_json(&redis.analysis_key(token_address)).await,
            None => Ok(None),
        }
    }

    /// Reports disconnected while the stream is backing off, and when this
    /// process runs no stream at all.
    pub fn connectivity_status(&self) -> ConnectivityStatus {
        match &self.stream {
            Some(stream) => stream.status(),
            None => ConnectivityStatus {
                current_source: "none".to_string(),
                connected: false,
            },
        }
    }
}
