use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw PumpPortal payload. Every field is optional because the feed is not
/// versioned; classification decides which shape a message has.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFeedMessage {
    pub signature: Option<String>,
    pub mint: Option<String>,
    pub trader_public_key: Option<String>,
    pub tx_type: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub uri: Option<String>,
    pub sol_amount: Option<f64>,
    pub token_amount: Option<f64>,
    pub initial_buy: Option<f64>,
    pub bonding_curve_key: Option<String>,
    pub v_tokens_in_bonding_curve: Option<f64>,
    pub v_sol_in_bonding_curve: Option<f64>,
    pub market_cap_sol: Option<f64>,
    pub decimals: Option<u8>,
    /// Either a JSON number or a decimal string.
    pub total_supply: Option<Value>,
    /// Seconds or milliseconds since the epoch, number or numeric string.
    pub timestamp: Option<Value>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub website: Option<String>,
    /// Present on subscription acknowledgements.
    pub message: Option<String>,
}

/// Outbound subscription request understood by the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    pub method: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

impl SubscriptionRequest {
    pub fn new_tokens() -> Self {
        Self {
            method: "subscribeNewToken",
            keys: Vec::new(),
        }
    }

    pub fn token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "subscribeTokenTrade",
            keys: mints,
        }
    }
}
