use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use std::fmt;
use uuid::Uuid;

// ==========================================
// 1. DATABASE MODELS (Postgres)
// ==========================================

/// Optional social links attached to a token at creation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub website: Option<String>,
}

impl SocialLinks {
    pub fn is_empty(&self) -> bool {
        self.twitter.is_none() && self.telegram.is_none() && self.website.is_none()
    }
}

/// Represents a Token metadata entry in the 'tokens' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: i16,
    /// Arbitrary precision, kept as the feed reported it.
    pub total_supply: String,
    pub creator: String,
    pub uri: Option<String>,
    pub bonding_curve: Option<String>,
    pub initial_liquidity: f64,
    pub social_links: Option<SocialLinks>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }
}

impl TryFrom<String> for TradeDirection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeDirection::Buy),
            "sell" => Ok(TradeDirection::Sell),
            other => Err(format!("unknown trade direction '{other}'")),
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a Trade event in the 'trades' table. Immutable once written.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TradeEvent {
    pub signature: String,
    pub token_address: String,
    pub trader: String,
    #[sqlx(try_from = "String")]
    pub direction: TradeDirection,
    pub sol_amount: f64,
    pub token_amount: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradeEvent {
    /// Price per token in SOL. Zero when the token amount is zero.
    pub fn price_per_token(sol_amount: f64, token_amount: f64) -> f64 {
        if token_amount == 0.0 || !token_amount.is_finite() || !sol_amount.is_finite() {
            return 0.0;
        }
        sol_amount / token_amount
    }
}

/// One row per (token, computation time) in 'price_snapshots'.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub token_address: String,
    pub price: f64,
    pub price_change_1m: Option<f64>,
    pub price_change_5m: Option<f64>,
    pub price_change_15m: Option<f64>,
    pub price_change_1h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// One row per (token, computation time) in 'trading_snapshots'.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TradingSnapshot {
    pub token_address: String,
    pub volume_24h: f64,
    pub volume_change: f64,
    pub tx_count_24h: i64,
    pub active_traders: i64,
    pub liquidity: f64,
    pub liquidity_change: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    GoldenDog,
    Risk,
    AbnormalTrading,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::GoldenDog => "golden_dog",
            AlertType::Risk => "risk",
            AlertType::AbnormalTrading => "abnormal_trading",
        }
    }
}

impl TryFrom<String> for AlertType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "golden_dog" => Ok(AlertType::GoldenDog),
            "risk" => Ok(AlertType::Risk),
            "abnormal_trading" => Ok(AlertType::AbnormalTrading),
            other => Err(format!("unknown alert type '{other}'")),
        }
    }
}

/// A single predicate that held when an alert fired, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub metric: String,
    pub operator: String,
    pub threshold: f64,
    pub actual: f64,
}

impl AlertCondition {
    pub fn greater_than(metric: &str, threshold: f64, actual: f64) -> Self {
        Self {
            metric: metric.to_string(),
            operator: ">".to_string(),
            threshold,
            actual,
        }
    }

    pub fn less_than(metric: &str, threshold: f64, actual: f64) -> Self {
        Self {
            metric: metric.to_string(),
            operator: "<".to_string(),
            threshold,
            actual,
        }
    }
}

/// Represents a fired alert in the 'alerts' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub token_address: String,
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub score: u8,
    pub conditions: Vec<AlertCondition>,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

/// Latest price and trading snapshot for a token, joined for rule evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketView {
    pub token_address: String,
    pub price: PriceSnapshot,
    pub trading: TradingSnapshot,
}

/// Filter and pagination for alert listing.
#[derive(Debug, Clone)]
pub struct AlertFilter {
    pub token_address: Option<String>,
    pub alert_type: Option<AlertType>,
    pub unread_only: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            token_address: None,
            alert_type: None,
            unread_only: false,
            limit: 50,
            offset: 0,
        }
    }
}

impl AlertFilter {
    /// `(limit, offset)` with negatives clamped to 0, as every store applies them.
    pub fn page(&self) -> (i64, i64) {
        (self.limit.max(0), self.offset.max(0))
    }
}
