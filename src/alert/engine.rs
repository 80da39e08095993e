use super::rules::AlertRule;
use crate::broadcast::{BroadcastEvent, BroadcastSink};
use crate::models::{AlertRecord, MarketView};
use crate::scheduler::PeriodicTask;
use crate::store::EventStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Only snapshots this recent are considered.
const SNAPSHOT_LOOKBACK_MINUTES: i64 = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlertTickReport {
    pub evaluated: usize,
    pub fired: usize,
    pub suppressed: usize,
    pub failed: usize,
}

pub struct AlertEngine {
    store: Arc<dyn EventStore>,
    sink: Arc<dyn BroadcastSink>,
    rules: Vec<Box<dyn AlertRule>>,
    // (rule id, token) -> last successful trigger. Never held across an await.
    last_triggered: Mutex<HashMap<(&'static str, String), DateTime<Utc>>>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn EventStore>, sink: Arc<dyn BroadcastSink>, rules: Vec<Box<dyn AlertRule>>) -> Self {
        Self {
            store,
            sink,
            rules,
            last_triggered: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<AlertTickReport> {
        let since = now - Duration::minutes(SNAPSHOT_LOOKBACK_MINUTES);
        let views = self
            .store
            .market_views_since(since)
            .await
            .context("loading market views")?;

        let mut report = AlertTickReport {
            evaluated: views.len(),
            ..AlertTickReport::default()
        };

        for view in &views {
            for rule in &self.rules {
                self.apply(rule.as_ref(), view, now, &mut report).await;
            }
        }

        if report.fired > 0 || report.failed > 0 {
            info!(
                evaluated = report.evaluated,
                fired = report.fired,
                suppressed = report.suppressed,
                failed = report.failed,
                "🚨 Alert tick complete"
            );
        } else {
            debug!(evaluated = report.evaluated, suppressed = report.suppressed, "Alert tick complete");
        }
        Ok(report)
    }

    async fn apply(&self, rule: &dyn AlertRule, view: &MarketView, now: DateTime<Utc>, report: &mut AlertTickReport) {
        let Some(hit) = rule.evaluate(view) else {
            return;
        };

        let key = (rule.id(), view.token_address.clone());
        if self.in_cooldown(&key, rule.cooldown(), now) {
            report.suppressed += 1;
            debug!(rule = rule.id(), mint = %view.token_address, "Alert suppressed by cooldown");
            return;
        }

        let alert = AlertRecord {
            id: Uuid::new_v4(),
            token_address: view.token_address.clone(),
            alert_type: rule.alert_type(),
            title: hit.title,
            message: hit.message,
            score: hit.score,
            conditions: hit.conditions,
            timestamp: now,
            is_read: false,
        };

        if let Err(e) = self.store.insert_alert(&alert).await {
            report.failed += 1;
            warn!(rule = rule.id(), mint = %alert.token_address, error = %e, "Failed to persist alert");
            return;
        }

        self.last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, now);
        report.fired += 1;
        info!(
            rule = rule.id(),
            mint = %alert.token_address,
            score = alert.score,
            "🐕 {}",
            alert.title
        );

        if let Err(e) = self.sink.publish(&BroadcastEvent::NewAlert(alert)).await {
            warn!(rule = rule.id(), error = %e, "Failed to broadcast alert");
        }
    }

    fn in_cooldown(&self, key: &(&'static str, String), cooldown: Duration, now: DateTime<Utc>) -> bool {
        self.last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|last| now - *last < cooldown)
    }
}

#[async_trait]
impl PeriodicTask for AlertEngine {
    fn name(&self) -> &'static str {
        "alert_engine"
    }

    async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        self.run_once(now).await.map(|_| ())
    }
}
