//! Outbound broadcast events for the pub/sub layer.

use crate::models::AlertRecord;
use crate::scoring::SmartAnalysis;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Serialized as `{"type": "new_alert", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BroadcastEvent {
    NewAlert(AlertRecord),
    SmartAnalysis(SmartAnalysis),
}

impl BroadcastEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BroadcastEvent::NewAlert(_) => "new_alert",
            BroadcastEvent::SmartAnalysis(_) => "smart_analysis",
        }
    }
}

#[async_trait]
pub trait BroadcastSink: Send + Sync {
    /// Having no subscriber attached is not an error.
    async fn publish(&self, event: &BroadcastEvent) -> Result<()>;

    /// Keep the latest analysis per token readable by the query layer.
    async fn cache_analysis(&self, _analysis: &SmartAnalysis) -> Result<()> {
        Ok(())
    }
}

/// In-process sink backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(1_024)
    }
}

#[async_trait]
impl BroadcastSink for ChannelBroadcaster {
    async fn publish(&self, event: &BroadcastEvent) -> Result<()> {
        if self.sender.send(event.clone()).is_err() {
            debug!(event = event.name(), "No broadcast subscribers attached");
        }
        Ok(())
    }
}
