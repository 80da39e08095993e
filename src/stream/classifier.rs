//! Ingestion-boundary decoding: every raw feed payload is classified exactly
//! once into a closed set of variants.

use crate::models::{RawFeedMessage, SocialLinks, Token, TradeDirection, TradeEvent};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Pump.fun mints use 6 decimals.
pub const DEFAULT_DECIMALS: i16 = 6;
/// Standard pump.fun supply: 1B tokens at 6 decimals.
pub const DEFAULT_TOTAL_SUPPLY: &str = "1000000000000000";
/// Epoch values at or above this are treated as milliseconds.
const MILLIS_THRESHOLD: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    TokenCreated(Token),
    Trade(TradeEvent),
    Unrecognized(String),
}

pub fn classify(text: &str, received_at: DateTime<Utc>) -> FeedEvent {
    let raw: RawFeedMessage = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => return FeedEvent::Unrecognized(format!("not a feed object: {e}")),
    };

    if let Some(token) = token_from_raw(&raw, received_at) {
        return FeedEvent::TokenCreated(token);
    }

    match trade_from_raw(&raw, received_at) {
        Ok(Some(trade)) => FeedEvent::Trade(trade),
        Ok(None) => match raw.message {
            Some(message) => FeedEvent::Unrecognized(format!("feed notice: {message}")),
            None => FeedEvent::Unrecognized("unknown payload shape".to_string()),
        },
        Err(reason) => FeedEvent::Unrecognized(reason),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A token-creation message carries a mint plus name and symbol.
fn token_from_raw(raw: &RawFeedMessage, received_at: DateTime<Utc>) -> Option<Token> {
    let address = non_empty(&raw.mint)?;
    let name = non_empty(&raw.name)?;
    let symbol = non_empty(&raw.symbol)?;

    let social_links = SocialLinks {
        twitter: raw.twitter.clone(),
        telegram: raw.telegram.clone(),
        website: raw.website.clone(),
    };

    let initial_liquidity = raw
        .v_sol_in_bonding_curve
        .or(raw.sol_amount)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0);

    Some(Token {
        address: address.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals: raw.decimals.map(i16::from).unwrap_or(DEFAULT_DECIMALS),
        total_supply: total_supply(raw.total_supply.as_ref()),
        creator: raw.trader_public_key.clone().unwrap_or_default(),
        uri: raw.uri.clone(),
        bonding_curve: raw.bonding_curve_key.clone(),
        initial_liquidity,
        social_links: (!social_links.is_empty()).then_some(social_links),
        is_active: true,
        created_at: normalize_timestamp(raw.timestamp.as_ref(), received_at),
    })
}

/// A trade carries a mint, SOL amount, token amount and a buy/sell discriminator.
fn trade_from_raw(
    raw: &RawFeedMessage,
    received_at: DateTime<Utc>,
) -> Result<Option<TradeEvent>, String> {
    let (Some(address), Some(sol_amount), Some(token_amount), Some(tx_type)) = (
        non_empty(&raw.mint),
        raw.sol_amount,
        raw.token_amount,
        non_empty(&raw.tx_type),
    ) else {
        return Ok(None);
    };

    let Ok(direction) = TradeDirection::try_from(tx_type.to_string()) else {
        return Ok(None);
    };

    let signature = non_empty(&raw.signature)
        .ok_or_else(|| format!("trade on {address} without signature"))?;

    if !sol_amount.is_finite() || !token_amount.is_finite() || sol_amount < 0.0 || token_amount < 0.0
    {
        return Err(format!("trade {signature} has invalid amounts"));
    }

    Ok(Some(TradeEvent {
        signature: signature.to_string(),
        token_address: address.to_string(),
        trader: raw.trader_public_key.clone().unwrap_or_default(),
        direction,
        sol_amount,
        token_amount,
        price: TradeEvent::price_per_token(sol_amount, token_amount),
        timestamp: normalize_timestamp(raw.timestamp.as_ref(), received_at),
    }))
}

fn total_supply(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => DEFAULT_TOTAL_SUPPLY.to_string(),
    }
}

/// Accepts second or millisecond epochs (number or numeric string). Missing,
/// non-finite, non-positive or out-of-range values fall back to `received_at`.
pub fn normalize_timestamp(value: Option<&Value>, received_at: DateTime<Utc>) -> DateTime<Utc> {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let Some(raw) = raw.filter(|v| v.is_finite() && *v > 0.0) else {
        return received_at;
    };

    let millis = if raw >= MILLIS_THRESHOLD {
        raw
    } else {
        raw * 1000.0
    };

    if millis > i64::MAX as f64 {
        return received_at;
    }

    DateTime::from_timestamp_millis(millis as i64).unwrap_or(received_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_token_creation_message() {
        let msg = json!({
            "signature": "5abc",
            "mint": "Mint111",
            "traderPublicKey": "Creator111",
            "txType": "create",
            "initialBuy": 1000.0,
            "solAmount": 0.5,
            "vSolInBondingCurve": 30.5,
            "name": "Golden Dog",
            "symbol": "GDOG",
            "uri": "https://ipfs.io/ipfs/xyz",
            "twitter": "https://x.com/gdog"
        });

        let FeedEvent::TokenCreated(token) = classify(&msg.to_string(), now()) else {
            panic!("expected token creation");
        };
        assert_eq!(token.address, "Mint111");
        assert_eq!(token.symbol, "GDOG");
        assert_eq!(token.decimals, DEFAULT_DECIMALS);
        assert_eq!(token.total_supply, DEFAULT_TOTAL_SUPPLY);
        assert_eq!(token.creator, "Creator111");
        assert_eq!(token.initial_liquidity, 30.5);
        assert_eq!(token.created_at, now());
        assert_eq!(
            token.social_links.unwrap().twitter.as_deref(),
            Some("https://x.com/gdog")
        );
    }

    #[test]
    fn test_trade_message() {
        let msg = json!({
            "signature": "sig-1",
            "mint": "Mint111",
            "traderPublicKey": "Trader111",
            "txType": "buy",
            "tokenAmount": 2000.0,
            "solAmount": 1.0,
            "timestamp": 1_717_243_200
        });

        let FeedEvent::Trade(trade) = classify(&msg.to_string(), now()) else {
            panic!("expected trade");
        };
        assert_eq!(trade.direction, TradeDirection::Buy);
        assert_eq!(trade.price, 0.0005);
        assert_eq!(trade.timestamp.timestamp(), 1_717_243_200);
    }

    #[test]
    fn test_trade_with_zero_token_amount_has_zero_price() {
        let msg = json!({
            "signature": "sig-2", "mint": "M", "txType": "sell",
            "tokenAmount": 0, "solAmount": 3.0
        });
        let FeedEvent::Trade(trade) = classify(&msg.to_string(), now()) else {
            panic!("expected trade");
        };
        assert_eq!(trade.price, 0.0);
        assert_eq!(trade.direction, TradeDirection::Sell);
    }

    #[test]
    fn test_unrecognized_shapes() {
        for text in [
            "not json at all".to_string(),
            json!({"message": "Successfully subscribed to token creation events."}).to_string(),
            json!({"mint": "M", "solAmount": 1.0}).to_string(),
            json!({"mint": "M", "name": "No symbol"}).to_string(),
            json!({"mint": "M", "solAmount": 1.0, "tokenAmount": 5.0, "txType": "migrate"})
                .to_string(),
            json!({"mint": "M", "solAmount": 1.0, "tokenAmount": 5.0, "txType": "buy"}).to_string(),
            json!([1, 2, 3]).to_string(),
        ] {
            assert!(
                matches!(classify(&text, now()), FeedEvent::Unrecognized(_)),
                "{text} should be unrecognized"
            );
        }
    }

    #[test]
    fn test_timestamp_normalization() {
        let received = now();
        let seconds = json!(1_700_000_000);
        let millis = json!(1_700_000_000_123i64);
        let text = json!("1700000000");

        assert_eq!(normalize_timestamp(Some(&seconds), received).timestamp(), 1_700_000_000);
        assert_eq!(
            normalize_timestamp(Some(&millis), received).timestamp_millis(),
            1_700_000_000_123
        );
        assert_eq!(normalize_timestamp(Some(&text), received).timestamp(), 1_700_000_000);

        for bad in [json!(0), json!(-5), json!("NaN"), json!("inf"), json!(1e300), json!(null)] {
            assert_eq!(normalize_timestamp(Some(&bad), received), received, "{bad}");
        }
        assert_eq!(normalize_timestamp(None, received), received);
    }
}
