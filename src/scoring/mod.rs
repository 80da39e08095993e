//! Weighted token scoring, recommendations and heuristic price projections.

pub mod engine;
pub mod prediction;
pub mod providers;

pub use engine::{Recommendation, ScoringEngine, SmartAnalysis, SubScores, Trend, recommend};
pub use prediction::{Horizon, PredictionInput, PricePrediction};
pub use providers::{HttpScoreProvider, NEUTRAL_SCORE, NeutralScoreProvider, SubScoreProvider};
