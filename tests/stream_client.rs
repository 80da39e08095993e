use dogwatch::config::StreamConfig;
use dogwatch::store::MemoryEventStore;
use dogwatch::stream::{ConnectionState, StreamClient};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const WAIT: Duration = Duration::from_secs(5);

fn config(url: String, max_attempts: u32, base_delay: Duration) -> StreamConfig {
    StreamConfig {
        ws_url: url,
        max_reconnect_attempts: max_attempts,
        reconnect_base_delay: base_delay,
        token_cache_size: 100,
        trade_cache_size: 100,
    }
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    accept_async(socket).await.unwrap()
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match timeout(WAIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

fn create(mint: &str) -> Value {
    json!({
        "signature": format!("create-{mint}"),
        "mint": mint,
        "traderPublicKey": "creator",
        "txType": "create",
        "name": "Golden Dog",
        "symbol": "GDOG",
        "vSolInBondingCurve": 30.0
    })
}

#[tokio::test]
async fn test_token_and_trade_flow_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let store = Arc::new(MemoryEventStore::new());
    let client = Arc::new(StreamClient::new(
        config(url, 3, Duration::from_millis(50)),
        store.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = client.start(shutdown_rx);

    let mut server = accept(&listener).await;
    assert_eq!(next_json(&mut server).await["method"], "subscribeNewToken");

    send(&mut server, json!({"message": "Successfully subscribed to token creation events."})).await;
    send(&mut server, create("Mint111")).await;

    let trade_sub = next_json(&mut server).await;
    assert_eq!(trade_sub["method"], "subscribeTokenTrade");
    assert_eq!(trade_sub["keys"], json!(["Mint111"]));
    assert!(client.is_connected());

    send(
        &mut server,
        json!({
            "signature": "sig-1",
            "mint": "Mint111",
            "traderPublicKey": "trader",
            "txType": "buy",
            "solAmount": 2.0,
            "tokenAmount": 1000.0
        }),
    )
    .await;

    wait_until(|| client.token_trades("Mint111", 10).len() == 1).await;
    assert_eq!(client.token_info("Mint111").unwrap().symbol, "GDOG");
    assert_eq!(store.trade_count(), 1);
    assert_eq!(client.stats().dropped, 1);

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_reconnect_resubscribes_tracked_tokens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let client = Arc::new(StreamClient::new(
        config(url, 3, Duration::from_millis(20)),
        Arc::new(MemoryEventStore::new()),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = client.start(shutdown_rx);

    let mut first = accept(&listener).await;
    next_json(&mut first).await;
    send(&mut first, create("Mint111")).await;
    next_json(&mut first).await;
    first.close(None).await.unwrap();

    let mut second = accept(&listener).await;
    assert_eq!(next_json(&mut second).await["method"], "subscribeNewToken");
    let resubscribe = next_json(&mut second).await;
    assert_eq!(resubscribe["method"], "subscribeTokenTrade");
    assert_eq!(resubscribe["keys"], json!(["Mint111"]));

    wait_until(|| client.is_connected()).await;
    shutdown_tx.send(true).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_exhausted_reconnects_end_in_permanent_disconnect() {
    // Reserve a port, then free it so every connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = StreamClient::new(
        config(url, 2, Duration::from_millis(10)),
        Arc::new(MemoryEventStore::new()),
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    timeout(WAIT, client.run(shutdown_rx)).await.unwrap();
    assert_eq!(client.state(), ConnectionState::PermanentlyDisconnected);
    assert!(!client.status().connected);
}

#[tokio::test]
async fn test_shutdown_interrupts_backoff_sleep() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = Arc::new(StreamClient::new(
        config(url, 5, Duration::from_secs(60)),
        Arc::new(MemoryEventStore::new()),
    ));
    let mut states = client.watch_state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = client.start(shutdown_rx);

    timeout(WAIT, states.wait_for(|s| *s == ConnectionState::Reconnecting))
        .await
        .unwrap()
        .unwrap();
    assert!(!client.is_connected());

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
