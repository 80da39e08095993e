use super::prediction::{PredictionInput, PricePrediction, predict};
use super::providers::{NEUTRAL_SCORE, SubScoreProvider};
use crate::aggregator::TickReport;
use crate::broadcast::{BroadcastEvent, BroadcastSink};
use crate::models::{PriceSnapshot, TradingSnapshot};
use crate::scheduler::PeriodicTask;
use crate::store::EventStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

pub const TECHNICAL_WEIGHT: f64 = 0.30;
pub const SENTIMENT_WEIGHT: f64 = 0.25;
pub const KOL_WEIGHT: f64 = 0.20;
pub const MARKET_WEIGHT: f64 = 0.25;

/// Trend threshold on the 1h price change, in percent.
const TREND_THRESHOLD: f64 = 5.0;
const LOW_CONFIDENCE: u8 = 40;
const HIGH_VOLATILITY: f64 = 50.0;
/// 24h volume below this many SOL counts as thin trading.
const LOW_VOLUME_SOL: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Neutral,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub technical: f64,
    pub sentiment: f64,
    pub kol: f64,
    pub market: f64,
}

impl SubScores {
    pub fn overall(&self) -> u8 {
        let weighted = self.technical * TECHNICAL_WEIGHT
            + self.sentiment * SENTIMENT_WEIGHT
            + self.kol * KOL_WEIGHT
            + self.market * MARKET_WEIGHT;
        weighted.round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmartAnalysis {
    pub token_address: String,
    pub price: f64,
    pub overall_score: u8,
    pub risk_score: u8,
    pub potential_score: u8,
    pub recommendation: Recommendation,
    pub trend: Trend,
    pub confidence: u8,
    pub volatility: f64,
    pub sub_scores: SubScores,
    pub predictions: Vec<PricePrediction>,
    pub timestamp: DateTime<Utc>,
}

/// First match wins, in this order. The strong-sell row sits after the
/// broader sell row and so never matches.
pub fn recommend(overall: u8, risk: u8) -> Recommendation {
    if overall >= 80 && risk <= 40 {
        Recommendation::StrongBuy
    } else if overall >= 65 && risk <= 60 {
        Recommendation::Buy
    } else if overall <= 35 || risk >= 80 {
        Recommendation::Sell
    } else if overall <= 20 || risk >= 90 {
        Recommendation::StrongSell
    } else {
        Recommendation::Hold
    }
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Signals derived from the latest snapshots alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSignals {
    pub trend: Trend,
    pub trend_strength: f64,
    pub volatility: f64,
    pub confidence: u8,
}

impl MarketSignals {
    pub fn from_snapshots(price: &PriceSnapshot, trading: &TradingSnapshot) -> Self {
        let changes: Vec<f64> = [
            price.price_change_1m,
            price.price_change_5m,
            price.price_change_15m,
            price.price_change_1h,
            price.price_change_24h,
        ]
        .into_iter()
        .flatten()
        .filter(|c| c.is_finite())
        .collect();

        let reference = price.price_change_1h.or(price.price_change_15m).or(price.price_change_5m);
        let trend = match reference {
            Some(c) if c > TREND_THRESHOLD => Trend::Bullish,
            Some(c) if c < -TREND_THRESHOLD => Trend::Bearish,
            _ => Trend::Neutral,
        };
        let trend_strength = reference.map(|c| (c / 50.0).clamp(-1.0, 1.0)).unwrap_or(0.0);

        let volatility = match (
            changes.iter().copied().reduce(f64::max),
            changes.iter().copied().reduce(f64::min),
        ) {
            (Some(max), Some(min)) => max - min,
            _ => 0.0,
        };

        // Coverage of the price windows plus depth of trading activity.
        let mut confidence = changes.len() as f64 / 5.0 * 60.0;
        if trading.tx_count_24h >= 20 {
            confidence += 20.0;
        }
        if trading.active_traders >= 10 {
            confidence += 20.0;
        }

        Self {
            trend,
            trend_strength,
            volatility,
            confidence: clamp_score(confidence).round() as u8,
        }
    }
}

pub fn technical_score(price: &PriceSnapshot) -> f64 {
    let mut score = 50.0;
    if let Some(c) = price.price_change_1h {
        score += (c / 2.0).clamp(-25.0, 25.0);
    }
    if let Some(c) = price.price_change_24h {
        score += (c / 4.0).clamp(-20.0, 20.0);
    }
    match price.price_change_5m {
        Some(c) if c > 0.0 => score += 5.0,
        Some(c) if c < 0.0 => score -= 5.0,
        _ => {}
    }
    clamp_score(score)
}

pub fn market_score(trading: &TradingSnapshot) -> f64 {
    let mut score = 50.0 + (trading.volume_change / 10.0).clamp(-20.0, 20.0);

    score += if trading.liquidity > 50.0 {
        15.0
    } else if trading.liquidity > 20.0 {
        10.0
    } else if trading.liquidity > 10.0 {
        5.0
    } else if trading.liquidity < 5.0 {
        -10.0
    } else {
        0.0
    };

    score += if trading.active_traders >= 50 {
        10.0
    } else if trading.active_traders >= 10 {
        5.0
    } else if trading.active_traders < 3 {
        -10.0
    } else {
        0.0
    };

    clamp_score(score)
}

pub fn risk_score(price: &PriceSnapshot, trading: &TradingSnapshot, signals: &MarketSignals) -> u8 {
    let mut risk = 50.0;
    if signals.trend == Trend::Bearish {
        risk += 15.0;
    }
    if signals.confidence < LOW_CONFIDENCE {
        risk += 10.0;
    }
    if signals.volatility > HIGH_VOLATILITY {
        risk += 15.0;
    }
    if trading.volume_24h < LOW_VOLUME_SOL {
        risk += 10.0;
    }
    if price.price_change_24h.is_some_and(|c| c < -30.0) {
        risk += 20.0;
    }
    clamp_score(risk) as u8
}

pub fn potential_score(
    price: &PriceSnapshot,
    trading: &TradingSnapshot,
    signals: &MarketSignals,
    sub_scores: &SubScores,
) -> u8 {
    let mut potential = 50.0;
    if signals.trend == Trend::Bullish {
        potential += 15.0;
    }
    if sub_scores.sentiment > 60.0 {
        potential += 10.0;
    }
    if sub_scores.kol > 60.0 {
        potential += 10.0;
    }
    if trading.volume_change > 100.0 {
        potential += 10.0;
    }
    if price.price_change_1h.is_some_and(|c| c > 20.0) {
        potential += 10.0;
    }
    clamp_score(potential) as u8
}

pub struct ScoringEngine {
    store: Arc<dyn EventStore>,
    sink: Arc<dyn BroadcastSink>,
    sentiment: Arc<dyn SubScoreProvider>,
    kol: Arc<dyn SubScoreProvider>,
    rng: Mutex<StdRng>,
}

impl ScoringEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        sink: Arc<dyn BroadcastSink>,
        sentiment: Arc<dyn SubScoreProvider>,
        kol: Arc<dyn SubScoreProvider>,
    ) -> Self {
        Self::with_rng(store, sink, sentiment, kol, StdRng::from_entropy())
    }

    pub fn with_rng(
        store: Arc<dyn EventStore>,
        sink: Arc<dyn BroadcastSink>,
        sentiment: Arc<dyn SubScoreProvider>,
        kol: Arc<dyn SubScoreProvider>,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            sink,
            sentiment,
            kol,
            rng: Mutex::new(rng),
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let tokens = self
            .store
            .active_tokens()
            .await
            .context("loading active tokens")?;

        let mut report = TickReport::default();
        for token in &tokens {
            match self.analyze_token(&token.address, now).await {
                Ok(Some(analysis)) => {
                    report.processed += 1;
                    self.emit(analysis).await;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(mint = %token.address, error = %e, "Scoring failed");
                }
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "🧠 Scoring cycle complete"
        );
        Ok(report)
    }

    /// `None` when the token has no price or trading snapshot yet.
    pub async fn analyze_token(&self, address: &str, now: DateTime<Utc>) -> Result<Option<SmartAnalysis>> {
        let price = self
            .store
            .latest_price_snapshot(address)
            .await
            .with_context(|| format!("loading price snapshot for {address}"))?;
        let trading = self
            .store
            .latest_trading_snapshot(address)
            .await
            .with_context(|| format!("loading trading snapshot for {address}"))?;
        let (Some(price), Some(trading)) = (price, trading) else {
            return Ok(None);
        };

        let sub_scores = SubScores {
            technical: technical_score(&price),
            sentiment: self.external_score(self.sentiment.as_ref(), address).await,
            kol: self.external_score(self.kol.as_ref(), address).await,
            market: market_score(&trading),
        };

        Ok(Some(self.compose(address, &price, &trading, sub_scores, now)))
    }

    async fn external_score(&self, provider: &dyn SubScoreProvider, address: &str) -> f64 {
        match provider.score(address).await {
            Ok(score) => clamp_score(score),
            Err(e) => {
                debug!(provider = provider.name(), mint = %address, error = %e, "Provider unavailable, using neutral score");
                NEUTRAL_SCORE
            }
        }
    }

    fn compose(
        &self,
        address: &str,
        price: &PriceSnapshot,
        trading: &TradingSnapshot,
        sub_scores: SubScores,
        now: DateTime<Utc>,
    ) -> SmartAnalysis {
        let signals = MarketSignals::from_snapshots(price, trading);
        let overall = sub_scores.overall();
        let risk = risk_score(price, trading, &signals);
        let potential = potential_score(price, trading, &signals, &sub_scores);

        let input = PredictionInput {
            price: price.price,
            trend: signals.trend_strength,
            sentiment: sub_scores.sentiment,
            market: sub_scores.market,
            volatility: signals.volatility,
            confidence: signals.confidence,
        };
        let predictions = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            predict(&input, &mut *rng)
        };

        SmartAnalysis {
            token_address: address.to_string(),
            price: price.price,
            overall_score: overall,
            risk_score: risk,
            potential_score: potential,
            recommendation: recommend(overall, risk),
            trend: signals.trend,
            confidence: signals.confidence,
            volatility: signals.volatility,
            sub_scores,
            predictions,
            timestamp: now,
        }
    }

    async fn emit(&self, analysis: SmartAnalysis) {
        if let Err(e) = self.sink.cache_analysis(&analysis).await {
            warn!(mint = %analysis.token_address, error = %e, "Failed to cache analysis");
        }
        if let Err(e) = self.sink.publish(&BroadcastEvent::SmartAnalysis(analysis)).await {
            warn!(error = %e, "Failed to broadcast analysis");
        }
    }
}

#[async_trait]
impl PeriodicTask for ScoringEngine {
    fn name(&self) -> &'static str {
        "scoring_engine"
    }

    async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        self.run_once(now).await.map(|_| ())
    }
}
