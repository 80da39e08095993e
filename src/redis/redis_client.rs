use crate::broadcast::{BroadcastEvent, BroadcastSink};
use crate::scoring::SmartAnalysis;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

/// Latest analysis per token stays readable for this long.
const ANALYSIS_TTL_SECONDS: u64 = 30 * 60;

#[derive(Clone)]
pub struct RedisClient {
    pub connection: ConnectionManager,
    prefix: String,
}

impl RedisClient {
    pub async fn new(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let connection = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection")?;

        info!("Successfully connected to Redis");

        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    pub fn channel_for(&self, event: &BroadcastEvent) -> String {
        channel_name(&self.prefix, event)
    }

    pub fn analysis_key(&self, token_address: &str) -> String {
        analysis_key(&self.prefix, token_address)
    }

    /// Publishes a JSON message and returns how many subscribers received it.
    pub async fn publish_json<T: serde::Serialize>(&self, channel: &str, message: &T) -> Result<usize> {
        let json = serde_json::to_string(message).context("Failed to serialize message")?;
        let mut connection = self.connection.clone();

        match connection.publish::<_, _, usize>(channel, json).await {
            Ok(receivers) => Ok(receivers),
            Err(e) => {
                warn!("  Redis publish error: {}", e);

                if e.is_connection_dropped() || e.is_io_error() {
                    warn!("  Redis connection lost, the manager will reconnect on next use");
                }

                Err(e.into())
            }
        }
    }

    pub async fn set<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        expiry_seconds: Option<u64>,
    ) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize value")?;
        let mut connection = self.connection.clone();

        if let Some(seconds) = expiry_seconds {
            connection
                .set_ex::<_, _, ()>(key, json, seconds)
                .await
                .context("Failed to set key with expiry")?;
        } else {
            connection
                .set::<_, _, ()>(key, json)
                .await
                .context("Failed to set key")?;
        }

        Ok(())
    }

    pub async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(key).await.context("Failed to get key")?;
        raw.map(|json| serde_json::from_str(&json).context("Failed to deserialize value"))
            .transpose()
    }

    pub async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}

#[async_trait]
impl BroadcastSink for RedisClient {
    async fn publish(&self, event: &BroadcastEvent) -> Result<()> {
        let channel = self.channel_for(event);
        let receivers = self.publish_json(&channel, event).await?;
        if receivers == 0 {
            debug!(channel = %channel, "Published with no subscribers attached");
        }
        Ok(())
    }

    async fn cache_analysis(&self, analysis: &SmartAnalysis) -> Result<()> {
        let key = self.analysis_key(&analysis.token_address);
        self.set(&key, analysis, Some(ANALYSIS_TTL_SECONDS)).await
    }
}

pub fn channel_name(prefix: &str, event: &BroadcastEvent) -> String {
    format!("{prefix}:{}", event.name())
}

pub fn analysis_key(prefix: &str, token_address: &str) -> String {
    format!("{prefix}:analysis:{token_address}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertRecord, AlertType};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_channel_and_key_naming() {
        let event = BroadcastEvent::NewAlert(AlertRecord {
            id: Uuid::new_v4(),
            token_address: "Mint111".to_string(),
            alert_type: AlertType::GoldenDog,
            title: "t".to_string(),
            message: "m".to_string(),
            score: 60,
            conditions: Vec::new(),
            timestamp: Utc::now(),
            is_read: false,
        });

        assert_eq!(channel_name("golden_dog", &event), "golden_dog:new_alert");
        assert_eq!(analysis_key("golden_dog", "Mint111"), "golden_dog:analysis:Mint111");
    }
}
