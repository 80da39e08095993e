use super::backoff::ReconnectPolicy;
use super::bus::EventBus;
use super::cache::RingBuffer;
use super::classifier::{FeedEvent, classify};
use crate::config::StreamConfig;
use crate::error::IndexerError;
use crate::models::{SubscriptionRequest, Token, TradeEvent};
use crate::scheduler::{ShutdownSignal, wait_for_shutdown};
use crate::store::EventStore;
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Reconnecting,
    /// Reconnect attempts exhausted; only an external restart leaves this state.
    PermanentlyDisconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityStatus {
    pub current_source: String,
    pub connected: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub messages: u64,
    pub tokens: u64,
    pub trades: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    messages: AtomicU64,
    tokens: AtomicU64,
    trades: AtomicU64,
    dropped: AtomicU64,
}

/// Aborts the socket writer task when the connection scope ends, including
/// when the connection future is cancelled by shutdown.
struct WriterGuard(JoinHandle<()>);

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owns the single feed connection, its reconnect state, and the bounded
/// in-memory caches. Consumers observe events through the listener buses.
pub struct StreamClient {
    config: StreamConfig,
    store: Arc<dyn EventStore>,
    tokens: RwLock<RingBuffer<Token>>,
    trades: RwLock<HashMap<String, RingBuffer<TradeEvent>>>,
    /// Tokens the store rejected; retried on the next sighting or trade.
    pending: Mutex<HashMap<String, Token>>,
    token_listeners: EventBus<Token>,
    trade_listeners: EventBus<TradeEvent>,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<SubscriptionRequest>>>,
    counters: Counters,
}

impl StreamClient {
    pub fn new(config: StreamConfig, store: Arc<dyn EventStore>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            tokens: RwLock::new(RingBuffer::new(config.token_cache_size)),
            trades: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            token_listeners: EventBus::new("tokens"),
            trade_listeners: EventBus::new("trades"),
            state,
            outbound: Mutex::new(None),
            counters: Counters::default(),
            config,
            store,
        }
    }

    /// Spawns the connection loop. Stop it by signalling `shutdown`.
    pub fn start(self: &Arc<Self>, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.run(shutdown).await })
    }

    pub fn token_listeners(&self) -> &EventBus<Token> {
        &self.token_listeners
    }

    pub fn trade_listeners(&self) -> &EventBus<TradeEvent> {
        &self.trade_listeners
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Subscribed
    }

    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            current_source: self.config.ws_url.clone(),
            connected: self.is_connected(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            messages: self.counters.messages.load(Ordering::Relaxed),
            tokens: self.counters.tokens.load(Ordering::Relaxed),
            trades: self.counters.trades.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    // ==========================================
    // CACHE ACCESSORS (bounded, most recent first)
    // ==========================================

    pub fn new_tokens(&self, limit: usize, offset: usize) -> Vec<Token> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn token_info(&self, address: &str) -> Option<Token> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .find(|t| t.address == address)
            .cloned()
    }

    pub fn token_trades(&self, address: &str, limit: usize) -> Vec<TradeEvent> {
        self.trades
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .map(|trades| trades.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Cached mints plus those still waiting to be persisted.
    fn tracked_mints(&self) -> Vec<String> {
        let mut mints: Vec<String> = self
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|t| t.address.clone())
            .collect();
        mints.extend(self.pending_tokens().keys().cloned());
        mints
    }

    fn pending_tokens(&self) -> MutexGuard<'_, HashMap<String, Token>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cached(&self, address: &str) -> bool {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_by(|t| t.address == address)
    }

    // ==========================================
    // CONNECTION LOOP
    // ==========================================

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "Stream state changed");
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        let mut policy = ReconnectPolicy::new(
            self.config.reconnect_base_delay,
            self.config.max_reconnect_attempts,
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let outcome = tokio::select! {
                outcome = self.connect_and_stream(&mut policy) => outcome,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };

            self.set_state(ConnectionState::Disconnected);
            self.clear_outbound();
            match outcome {
                Ok(()) => info!("Feed connection closed"),
                Err(e) => warn!(error = %e, "⚠️ Feed disconnected"),
            }

            let Some(delay) = policy.next_delay() else {
                self.set_state(ConnectionState::PermanentlyDisconnected);
                error!(
                    attempts = self.config.max_reconnect_attempts,
                    "Reconnect attempts exhausted, feed ingestion stopped until restart"
                );
                return;
            };

            self.set_state(ConnectionState::Reconnecting);
            warn!(
                attempt = policy.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to feed"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        self.clear_outbound();
        self.set_state(ConnectionState::Disconnected);
        info!("Stream client stopped");
    }

    async fn connect_and_stream(&self, policy: &mut ReconnectPolicy) -> Result<(), IndexerError> {
        info!(url = %self.config.ws_url, "🔌 Connecting to feed WebSocket...");

        let (ws_stream, _) = connect_async(self.config.ws_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        send_request(&mut write, &SubscriptionRequest::new_tokens()).await?;
        let tracked = self.tracked_mints();
        if !tracked.is_empty() {
            info!(tokens = tracked.len(), "Re-subscribing to tracked token trades");
            send_request(&mut write, &SubscriptionRequest::token_trades(tracked)).await?;
        }

        self.set_state(ConnectionState::Subscribed);
        policy.reset();
        info!("✅ Subscribed to feed");

        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        let _writer = WriterGuard(tokio::spawn(write_loop(write, rx)));

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => self.ingest_message(text.as_str()).await,
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(IndexerError::ConnectionClosed(reason));
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(IndexerError::ConnectionClosed("stream ended".to_string()))
    }

    fn clear_outbound(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn request_trade_subscription(&self, mint: &str) {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(tx) => {
                if tx
                    .send(SubscriptionRequest::token_trades(vec![mint.to_string()]))
                    .is_err()
                {
                    debug!(mint, "Writer gone, subscription deferred to reconnect");
                }
            }
            // Picked up by the re-subscribe on the next connect.
            None => debug!(mint, "Not connected, subscription deferred to reconnect"),
        }
    }

    // ==========================================
    // INGESTION
    // ==========================================

    /// Classify one raw feed payload and apply it.
    pub async fn ingest_message(&self, text: &str) {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);

        match classify(text, Utc::now()) {
            FeedEvent::TokenCreated(token) => self.ingest_token(token).await,
            FeedEvent::Trade(trade) => self.ingest_trade(trade).await,
            FeedEvent::Unrecognized(reason) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(%reason, "Dropping unrecognized feed message");
            }
        }
    }

    async fn ingest_token(&self, token: Token) {
        if self.is_cached(&token.address) {
            debug!(mint = %token.address, "Token already tracked");
            return;
        }
        // Subscribe even if persisting fails: the first trade retries it.
        self.request_trade_subscription(&token.address);
        self.track_token(token).await;
    }

    /// Persists the token, then caches and announces it. Trades reference
    /// the token row, so a token the store rejects is never cached; it stays
    /// pending until a later sighting or trade persists it.
    async fn track_token(&self, token: Token) {
        if let Err(e) = self.store.upsert_token(&token).await {
            warn!(mint = %token.address, error = %e, "Failed to persist token, will retry");
            let mut pending = self.pending_tokens();
            if pending.len() < self.config.token_cache_size || pending.contains_key(&token.address) {
                pending.insert(token.address.clone(), token);
            } else {
                warn!(mint = %token.address, "Too many unpersisted tokens, dropping");
            }
            return;
        }
        self.pending_tokens().remove(&token.address);

        if !self.cache_token(&token) {
            return;
        }
        self.counters.tokens.fetch_add(1, Ordering::Relaxed);
        info!(mint = %token.address, symbol = %token.symbol, "🆕 New token");
        self.token_listeners.publish(&token);
    }

    async fn ingest_trade(&self, trade: TradeEvent) {
        let pending = self.pending_tokens().remove(&trade.token_address);
        if let Some(token) = pending {
            self.track_token(token).await;
        }

        let mut first_sighting = self.cache_trade(&trade);

        match self.store.insert_trade_if_absent(&trade).await {
            Ok(true) => debug!(signature = %trade.signature, "📥 Trade stored"),
            Ok(false) => {
                first_sighting = false;
                debug!(signature = %trade.signature, "Duplicate trade ignored");
            }
            Err(e) => warn!(signature = %trade.signature, error = %e, "Failed to persist trade"),
        }

        if first_sighting {
            self.counters.trades.fetch_add(1, Ordering::Relaxed);
            self.trade_listeners.publish(&trade);
        }
    }

    /// Returns false when the token was already cached.
    fn cache_token(&self, token: &Token) -> bool {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        if tokens.contains_by(|t| t.address == token.address) {
            return false;
        }
        if let Some(evicted) = tokens.push(token.clone()) {
            self.trades
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&evicted.address);
        }
        true
    }

    /// Returns false when the signature was already cached. Trades are cached
    /// only for tokens held in the token cache.
    fn cache_trade(&self, trade: &TradeEvent) -> bool {
        let tracked = self
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_by(|t| t.address == trade.token_address);

        let mut trades = self.trades.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = trades.get(&trade.token_address) {
            if cached.contains_by(|t| t.signature == trade.signature) {
                return false;
            }
        }
        if tracked {
            trades
                .entry(trade.token_address.clone())
                .or_insert_with(|| RingBuffer::new(self.config.trade_cache_size))
                .push(trade.clone());
        }
        true
    }
}

async fn send_request(write: &mut WsSink, request: &SubscriptionRequest) -> Result<(), IndexerError> {
    let payload = serde_json::to_string(request)?;
    write.send(Message::Text(payload.into())).await?;
    debug!(method = request.method, keys = request.keys.len(), "📤 Sent subscription");
    Ok(())
}

/// Owns the socket sink: forwards queued subscription requests and keeps the
/// connection alive with pings.
async fn write_loop(mut write: WsSink, mut requests: mpsc::UnboundedReceiver<SubscriptionRequest>) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else { break };
                if let Err(e) = send_request(&mut write, &request).await {
                    warn!(error = %e, "Failed to send subscription");
                    break;
                }
            }
            _ = ping.tick() => {
                if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
