//! Heuristic price projections: a deterministic expected change from trend,
//! sentiment and market signals plus bounded volatility noise. Not a fitted
//! model.

use rand::Rng;
use serde::Serialize;

/// Floor for any projected change; keeps the projected price positive.
pub const MIN_CHANGE: f64 = -95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Horizon {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneHour, Horizon::OneDay, Horizon::OneWeek];

    /// Upper clamp on the projected change, in percent.
    pub fn max_change(self) -> f64 {
        match self {
            Horizon::OneHour => 30.0,
            Horizon::OneDay => 80.0,
            Horizon::OneWeek => 150.0,
        }
    }

    fn scale(self) -> f64 {
        match self {
            Horizon::OneHour => 1.0,
            Horizon::OneDay => 2.5,
            Horizon::OneWeek => 5.0,
        }
    }

    fn confidence_decay(self) -> f64 {
        match self {
            Horizon::OneHour => 1.0,
            Horizon::OneDay => 0.8,
            Horizon::OneWeek => 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionInput {
    pub price: f64,
    /// -1 (bearish) ..= 1 (bullish).
    pub trend: f64,
    pub sentiment: f64,
    pub market: f64,
    /// Spread of recent price changes, in percent.
    pub volatility: f64,
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePrediction {
    pub horizon: Horizon,
    pub predicted_price: f64,
    pub expected_change: f64,
    pub confidence: u8,
}

pub fn expected_change(input: &PredictionInput, horizon: Horizon) -> f64 {
    let trend = input.trend.clamp(-1.0, 1.0) * 10.0;
    let sentiment = (input.sentiment.clamp(0.0, 100.0) - 50.0) / 5.0;
    let market = (input.market.clamp(0.0, 100.0) - 50.0) / 5.0;
    (trend + sentiment + market) * horizon.scale()
}

/// Noise amplitude never exceeds a quarter of the horizon's range.
fn noise_amplitude(volatility: f64, horizon: Horizon) -> f64 {
    let volatility = if volatility.is_finite() { volatility.abs() } else { 0.0 };
    (volatility * 0.1 * horizon.scale()).min(horizon.max_change() / 4.0)
}

pub fn predict<R: Rng>(input: &PredictionInput, rng: &mut R) -> Vec<PricePrediction> {
    Horizon::ALL
        .iter()
        .map(|&horizon| {
            let amplitude = noise_amplitude(input.volatility, horizon);
            let noise = if amplitude > 0.0 {
                rng.gen_range(-amplitude..=amplitude)
            } else {
                0.0
            };
            let change = (expected_change(input, horizon) + noise).clamp(MIN_CHANGE, horizon.max_change());

            PricePrediction {
                horizon,
                predicted_price: (input.price * (1.0 + change / 100.0)).max(0.0),
                expected_change: change,
                confidence: (f64::from(input.confidence) * horizon.confidence_decay()).round() as u8,
            }
        })
        .collect()
}
