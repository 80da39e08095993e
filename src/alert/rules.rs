use crate::config::GoldenDogConfig;
use crate::models::{AlertCondition, AlertType, MarketView};
use chrono::Duration;

/// A rule that fired: score plus the predicates that held.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub score: u8,
    pub title: String,
    pub message: String,
    pub conditions: Vec<AlertCondition>,
}

/// Pure predicate and scoring over one token's market view. Cooldown,
/// persistence and broadcast are owned by the engine.
pub trait AlertRule: Send + Sync {
    fn id(&self) -> &'static str;

    fn alert_type(&self) -> AlertType;

    fn cooldown(&self) -> Duration;

    fn evaluate(&self, view: &MarketView) -> Option<RuleHit>;
}

/// Saturates instead of panicking on values chrono cannot represent.
fn cooldown_from_minutes(minutes: i64) -> Duration {
    Duration::try_minutes(minutes.max(0)).unwrap_or(Duration::MAX)
}

pub fn default_rules(golden_dog: &GoldenDogConfig, risk_cooldown_minutes: i64) -> Vec<Box<dyn AlertRule>> {
    vec![
        Box::new(GoldenDogRule::new(golden_dog.clone())),
        Box::new(RiskRule::new(risk_cooldown_minutes)),
        Box::new(AbnormalTradingRule),
    ]
}

fn clamp_score(points: i32) -> u8 {
    points.clamp(0, 100) as u8
}

// ==========================================
// GOLDEN DOG
// ==========================================

pub struct GoldenDogRule {
    config: GoldenDogConfig,
    cooldown: Duration,
}

impl GoldenDogRule {
    pub fn new(config: GoldenDogConfig) -> Self {
        Self {
            cooldown: cooldown_from_minutes(config.cooldown_minutes),
            config,
        }
    }

    /// Additive bands; only meaningful once all three thresholds have passed.
    pub fn score(price_change: f64, volume_change: f64, liquidity: f64) -> u8 {
        let price_points = if price_change > 100.0 {
            40
        } else if price_change > 50.0 {
            30
        } else {
            20
        };

        let volume_points = if volume_change > 500.0 {
            30
        } else if volume_change > 300.0 {
            20
        } else {
            10
        };

        let liquidity_points = if liquidity > 50.0 {
            30
        } else if liquidity > 20.0 {
            20
        } else if liquidity > 10.0 {
            10
        } else {
            0
        };

        clamp_score(price_points + volume_points + liquidity_points)
    }
}

impl AlertRule for GoldenDogRule {
    fn id(&self) -> &'static str {
        "golden_dog"
    }

    fn alert_type(&self) -> AlertType {
        AlertType::GoldenDog
    }

    fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn evaluate(&self, view: &MarketView) -> Option<RuleHit> {
        let price_change = view.price.price_change_5m?;
        let volume_change = view.trading.volume_change;
        let liquidity = view.trading.liquidity;

        if price_change <= self.config.min_price_change
            || volume_change <= self.config.min_volume_change
            || liquidity <= self.config.min_liquidity
        {
            return None;
        }

        let score = Self::score(price_change, volume_change, liquidity);
        if score < self.config.min_score {
            return None;
        }

        Some(RuleHit {
            score,
            title: format!("Golden dog candidate {}", view.token_address),
            message: format!(
                "5m price {price_change:+.1}%, volume {volume_change:+.1}%, liquidity {liquidity:.2} SOL"
            ),
            conditions: vec![
                AlertCondition::greater_than("price_change_5m", self.config.min_price_change, price_change),
                AlertCondition::greater_than("volume_change", self.config.min_volume_change, volume_change),
                AlertCondition::greater_than("liquidity", self.config.min_liquidity, liquidity),
            ],
        })
    }
}

// ==========================================
// RISK
// ==========================================

/// Sharp 5m price drop while estimated liquidity drains.
pub struct RiskRule {
    pub max_price_drop: f64,
    pub max_liquidity_drain: f64,
    cooldown: Duration,
}

impl RiskRule {
    pub fn new(cooldown_minutes: i64) -> Self {
        Self {
            max_price_drop: -30.0,
            max_liquidity_drain: -50.0,
            cooldown: cooldown_from_minutes(cooldown_minutes),
        }
    }

    pub fn score(price_change: f64, liquidity_change: f64) -> u8 {
        let price_points = if price_change < -70.0 {
            50
        } else if price_change < -50.0 {
            40
        } else {
            30
        };

        let liquidity_points = if liquidity_change < -80.0 {
            50
        } else if liquidity_change < -65.0 {
            40
        } else {
            30
        };

        clamp_score(price_points + liquidity_points)
    }
}

impl AlertRule for RiskRule {
    fn id(&self) -> &'static str {
        "risk"
    }

    fn alert_type(&self) -> AlertType {
        AlertType::Risk
    }

    fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn evaluate(&self, view: &MarketView) -> Option<RuleHit> {
        let price_change = view.price.price_change_5m?;
        let liquidity_change = view.trading.liquidity_change;

        if price_change >= self.max_price_drop || liquidity_change >= self.max_liquidity_drain {
            return None;
        }

        Some(RuleHit {
            score: Self::score(price_change, liquidity_change),
            title: format!("Risk: {} is dumping", view.token_address),
            message: format!("5m price {price_change:+.1}%, liquidity {liquidity_change:+.1}%"),
            conditions: vec![
                AlertCondition::less_than("price_change_5m", self.max_price_drop, price_change),
                AlertCondition::less_than("liquidity_change", self.max_liquidity_drain, liquidity_change),
            ],
        })
    }
}

// ==========================================
// ABNORMAL TRADING
// ==========================================

/// Not implemented: never fires.
pub struct AbnormalTradingRule;

impl AlertRule for AbnormalTradingRule {
    fn id(&self) -> &'static str {
        "abnormal_trading"
    }

    fn alert_type(&self) -> AlertType {
        AlertType::AbnormalTrading
    }

    fn cooldown(&self) -> Duration {
        Duration::zero()
    }

    fn evaluate(&self, _view: &MarketView) -> Option<RuleHit> {
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{PriceSnapshot, TradingSnapshot};
    use chrono::{DateTime, Utc};

    pub(crate) fn view(
        address: &str,
        price_change_5m: Option<f64>,
        volume_change: f64,
        liquidity: f64,
        liquidity_change: f64,
        at: DateTime<Utc>,
    ) -> MarketView {
        MarketView {
            token_address: address.to_string(),
            price: PriceSnapshot {
                token_address: address.to_string(),
                price: 0.001,
                price_change_1m: None,
                price_change_5m,
                price_change_15m: None,
                price_change_1h: None,
                price_change_24h: None,
                timestamp: at,
            },
            trading: TradingSnapshot {
                token_address: address.to_string(),
                volume_24h: 100.0,
                volume_change,
                tx_count_24h: 50,
                active_traders: 20,
                liquidity,
                liquidity_change,
                timestamp: at,
            },
        }
    }

    #[test]
    fn test_golden_dog_score_bands() {
        assert_eq!(GoldenDogRule::score(120.0, 600.0, 60.0), 100);
        assert_eq!(GoldenDogRule::score(60.0, 350.0, 15.0), 60);
        assert_eq!(GoldenDogRule::score(11.0, 51.0, 6.0), 30);
    }

    #[test]
    fn test_golden_dog_fires_only_when_all_thresholds_pass() {
        let rule = GoldenDogRule::new(GoldenDogConfig::default());
        let now = Utc::now();

        let hit = rule.evaluate(&view("M", Some(120.0), 600.0, 60.0, 0.0, now)).unwrap();
        assert_eq!(hit.score, 100);
        assert_eq!(hit.conditions.len(), 3);

        assert!(rule.evaluate(&view("M", Some(10.0), 600.0, 60.0, 0.0, now)).is_none());
        assert!(rule.evaluate(&view("M", Some(120.0), 50.0, 60.0, 0.0, now)).is_none());
        assert!(rule.evaluate(&view("M", Some(120.0), 600.0, 5.0, 0.0, now)).is_none());
        assert!(rule.evaluate(&view("M", None, 600.0, 60.0, 0.0, now)).is_none());
    }

    #[test]
    fn test_min_score_filters_weak_candidates() {
        let rule = GoldenDogRule::new(GoldenDogConfig {
            min_score: 70,
            ..GoldenDogConfig::default()
        });
        let now = Utc::now();

        assert!(rule.evaluate(&view("M", Some(60.0), 350.0, 15.0, 0.0, now)).is_none());
        assert!(rule.evaluate(&view("M", Some(120.0), 600.0, 60.0, 0.0, now)).is_some());
    }

    #[test]
    fn test_risk_rule_needs_drop_and_drain() {
        let rule = RiskRule::new(30);
        let now = Utc::now();

        let hit = rule.evaluate(&view("M", Some(-60.0), 0.0, 5.0, -90.0, now)).unwrap();
        assert_eq!(hit.score, 90);
        assert!(rule.evaluate(&view("M", Some(-60.0), 0.0, 5.0, -10.0, now)).is_none());
        assert!(rule.evaluate(&view("M", Some(-10.0), 0.0, 5.0, -90.0, now)).is_none());
    }

    #[test]
    fn test_cooldown_is_built_once_and_saturates() {
        assert_eq!(RiskRule::new(30).cooldown(), Duration::minutes(30));
        let rule = GoldenDogRule::new(GoldenDogConfig {
            cooldown_minutes: 9_000_000_000_000_000,
            ..GoldenDogConfig::default()
        });
        assert_eq!(rule.cooldown(), Duration::MAX);
        assert_eq!(RiskRule::new(-1).cooldown(), Duration::zero());
    }

    #[test]
    fn test_abnormal_trading_never_fires() {
        let view = view("M", Some(500.0), 5_000.0, 500.0, -99.0, Utc::now());
        assert!(AbnormalTradingRule.evaluate(&view).is_none());
    }
}
