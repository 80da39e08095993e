//! Rule evaluation over the latest market snapshots.

pub mod engine;
pub mod rules;

pub use engine::{AlertEngine, AlertTickReport};
pub use rules::{AbnormalTradingRule, AlertRule, GoldenDogRule, RiskRule, RuleHit, default_rules};
