use chrono::{DateTime, Duration, Utc};
use dogwatch::aggregator::{AverageTradeSizeEstimator, PriceAggregator, TradingAggregator};
use dogwatch::alert::{AlertEngine, default_rules};
use dogwatch::broadcast::{BroadcastEvent, ChannelBroadcaster};
use dogwatch::config::{GoldenDogConfig, StreamConfig};
use dogwatch::models::{AlertFilter, AlertType};
use dogwatch::query::QueryService;
use dogwatch::scoring::{NeutralScoreProvider, ScoringEngine};
use dogwatch::store::{EventStore, MemoryEventStore};
use dogwatch::stream::StreamClient;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::sync::Arc;

const MINT: &str = "DogMint111";

fn trade(signature: &str, at: DateTime<Utc>, sol: f64, tokens: f64) -> String {
    json!({
        "signature": signature,
        "mint": MINT,
        "traderPublicKey": format!("trader-{signature}"),
        "txType": "buy",
        "solAmount": sol,
        "tokenAmount": tokens,
        "timestamp": at.timestamp_millis()
    })
    .to_string()
}

/// Feeds a pumping token through the stream client into the store.
async fn ingest_pump(client: &StreamClient, now: DateTime<Utc>) {
    client
        .ingest_message(
            &json!({
                "signature": "create",
                "mint": MINT,
                "traderPublicKey": "creator",
                "txType": "create",
                "name": "Golden Dog",
                "symbol": "GDOG",
                "timestamp": (now - Duration::hours(40)).timestamp_millis()
            })
            .to_string(),
        )
        .await;

    for message in [
        trade("prior", now - Duration::hours(30), 1.0, 1_000.0),
        trade("early", now - Duration::minutes(10), 2.0, 2_000.0),
        trade("mid", now - Duration::minutes(2), 4.0, 2_000.0),
        trade("late", now - Duration::seconds(30), 5.0, 2_000.0),
    ] {
        client.ingest_message(&message).await;
    }
}

#[tokio::test]
async fn test_pumping_token_raises_golden_dog_alert_and_analysis() {
    let now = Utc::now();
    let store = Arc::new(MemoryEventStore::new());
    let sink = Arc::new(ChannelBroadcaster::new(64));
    let mut events = sink.subscribe();

    let client = StreamClient::new(StreamConfig::default(), store.clone());
    ingest_pump(&client, now).await;
    assert_eq!(store.trade_count(), 4);

    let price = PriceAggregator::new(store.clone(), 1_000);
    assert_eq!(price.run_once(now).await.unwrap().processed, 1);
    let snapshot = store.latest_price_snapshot(MINT).await.unwrap().unwrap();
    assert_eq!(snapshot.price, 0.0025);
    // 0.001 ten minutes ago -> 0.0025 now
    assert!((snapshot.price_change_5m.unwrap() - 150.0).abs() < 1e-6);

    let trading = TradingAggregator::new(store.clone(), Arc::new(AverageTradeSizeEstimator::new(10.0)));
    assert_eq!(trading.run_once(now).await.unwrap().processed, 1);
    let snapshot = store.latest_trading_snapshot(MINT).await.unwrap().unwrap();
    assert_eq!(snapshot.volume_24h, 11.0);
    assert_eq!(snapshot.tx_count_24h, 3);
    assert_eq!(snapshot.active_traders, 3);
    assert!((snapshot.volume_change - 1_000.0).abs() < 1e-6);

    let alerts = AlertEngine::new(
        store.clone(),
        sink.clone(),
        default_rules(&GoldenDogConfig::default(), 30),
    );
    assert_eq!(alerts.run_once(now).await.unwrap().fired, 1);
    // Condition still holds, but the rule is cooling down.
    assert_eq!(alerts.run_once(now + Duration::minutes(1)).await.unwrap().fired, 0);

    let BroadcastEvent::NewAlert(alert) = events.recv().await.unwrap() else {
        panic!("expected new_alert first");
    };
    assert_eq!(alert.alert_type, AlertType::GoldenDog);
    // price >100% -> 40, volume >500% -> 30, liquidity ~36.7 -> 20
    assert_eq!(alert.score, 90);

    let query = QueryService::new(store.clone());
    let listed = query.alerts(&AlertFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, alert.id);
    let metrics = query.latest_metrics(MINT).await.unwrap();
    assert!(metrics.price.is_some() && metrics.trading.is_some());

    let scoring = ScoringEngine::with_rng(
        store.clone(),
        sink.clone(),
        Arc::new(NeutralScoreProvider),
        Arc::new(NeutralScoreProvider),
        StdRng::seed_from_u64(3),
    );
    assert_eq!(scoring.run_once(now).await.unwrap().processed, 1);

    let BroadcastEvent::SmartAnalysis(analysis) = events.recv().await.unwrap() else {
        panic!("expected smart_analysis");
    };
    assert_eq!(analysis.token_address, MINT);
    assert_eq!(analysis.predictions.len(), 3);
    assert!(analysis.risk_score <= 100 && analysis.potential_score <= 100);

    let json = serde_json::to_value(BroadcastEvent::SmartAnalysis(analysis)).unwrap();
    assert_eq!(json["type"], "smart_analysis");
    assert!(json["data"]["recommendation"].is_string());
}

#[tokio::test]
async fn test_replayed_feed_is_idempotent() {
    let now = Utc::now();
    let store = Arc::new(MemoryEventStore::new());
    let client = StreamClient::new(StreamConfig::default(), store.clone());

    ingest_pump(&client, now).await;
    ingest_pump(&client, now).await;

    assert_eq!(store.trade_count(), 4);
    assert_eq!(client.stats().trades, 4);
    assert_eq!(client.token_trades(MINT, 100).len(), 4);
}
