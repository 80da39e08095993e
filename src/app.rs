//! Composition root: builds every component from configuration, wires them
//! together and owns their lifecycle.

use crate::aggregator::{AverageTradeSizeEstimator, PriceAggregator, TradingAggregator};
use crate::alert::{AlertEngine, default_rules};
use crate::broadcast::{BroadcastSink, ChannelBroadcaster};
use crate::config::AppConfig;
use crate::db;
use crate::query::QueryService;
use crate::redis::RedisClient;
use crate::scheduler::Scheduler;
use crate::scoring::{HttpScoreProvider, NeutralScoreProvider, ScoringEngine, SubScoreProvider};
use crate::store::{EventStore, PgEventStore};
use crate::stream::StreamClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Which components this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Feed ingestion plus every periodic task.
    Full,
    /// Periodic tasks only, against a database another process ingests into.
    Worker,
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn score_provider(name: &'static str, url: Option<&str>) -> Result<Arc<dyn SubScoreProvider>> {
    match url {
        Some(url) => {
            info!(provider = name, %url, "Using HTTP score provider");
            Ok(Arc::new(HttpScoreProvider::new(name, url, PROVIDER_TIMEOUT)?))
        }
        None => Ok(Arc::new(NeutralScoreProvider)),
    }
}

/// Runs until Ctrl-C, then stops the stream and lets in-flight ticks finish.
pub async fn run(config: AppConfig, mode: Mode) -> Result<()> {
    let pool = db::get_db_pool(&config.database_url).await?;
    if config.run_migrations {
        db::run_migrations(&pool).await?;
    }
    let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool));

    let redis = match &config.redis_url {
        Some(url) => {
            let redis = RedisClient::new(url, &config.broadcast_prefix).await?;
            redis.ping().await?;
            Some(redis)
        }
        None => None,
    };
    let sink: Arc<dyn BroadcastSink> = match &redis {
        Some(redis) => Arc::new(redis.clone()),
        None => {
            info!("REDIS_URL not set, broadcasting in-process only");
            Arc::new(ChannelBroadcaster::default())
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut query = QueryService::new(store.clone());
    if let Some(redis) = &redis {
        query = query.with_analysis_cache(redis.clone());
    }

    let stream = match mode {
        Mode::Full => {
            let client = Arc::new(StreamClient::new(config.stream.clone(), store.clone()));
            let handle = client.start(shutdown_rx.clone());
            query = query.with_stream(client.clone());
            Some((client, handle))
        }
        Mode::Worker => None,
    };

    let estimator = Arc::new(AverageTradeSizeEstimator::new(config.liquidity_multiplier));
    let schedule = &config.schedule;
    let mut scheduler = Scheduler::new(shutdown_rx);
    scheduler.spawn(
        Arc::new(
            PriceAggregator::new(store.clone(), config.price_history_limit)
                .with_inactive_after(config.token_inactive_after()),
        ),
        schedule.price_interval,
    );
    scheduler.spawn(
        Arc::new(TradingAggregator::new(store.clone(), estimator)),
        schedule.trading_interval,
    );
    scheduler.spawn(
        Arc::new(AlertEngine::new(
            store.clone(),
            sink.clone(),
            default_rules(&config.golden_dog, config.risk_cooldown_minutes),
        )),
        schedule.alert_interval,
    );
    scheduler.spawn(
        Arc::new(ScoringEngine::new(
            store.clone(),
            sink.clone(),
            score_provider("sentiment", config.sentiment_api_url.as_deref())?,
            score_provider("kol", config.kol_api_url.as_deref())?,
        )),
        schedule.scoring_interval,
    );

    info!(?mode, tasks = scheduler.len(), "🚀 Pipeline running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("🛑 Shutdown requested");

    if shutdown_tx.send(true).is_err() {
        warn!("No component was listening for shutdown");
    }

    if let Some((client, handle)) = stream {
        if let Err(e) = handle.await {
            warn!(error = %e, "Stream task ended abnormally");
        }
        let stats = client.stats();
        info!(
            messages = stats.messages,
            tokens = stats.tokens,
            trades = stats.trades,
            dropped = stats.dropped,
            "Stream client stopped"
        );
    }
    scheduler.join().await;

    let status = query.connectivity_status();
    info!(source = %status.current_source, connected = status.connected, "👋 Shutdown complete");
    Ok(())
}
