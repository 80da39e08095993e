use super::{
    AlertCondition, AlertFilter, AlertRecord, AlertType, MarketView, PriceSnapshot, SocialLinks,
    Token, TradeEvent, TradingSnapshot,
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

// ==========================================
// TOKEN OPERATIONS
// ==========================================

/// Insert or update token metadata. `created_at` is kept from the first sighting.
pub async fn upsert_token(pool: &PgPool, token: &Token) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tokens (
            address, name, symbol, decimals, total_supply, creator, uri,
            bonding_curve, initial_liquidity, social_links, is_active, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (address)
        DO UPDATE SET
            name = EXCLUDED.name,
            symbol = EXCLUDED.symbol,
            decimals = EXCLUDED.decimals,
            total_supply = EXCLUDED.total_supply,
            uri = COALESCE(EXCLUDED.uri, tokens.uri),
            bonding_curve = COALESCE(EXCLUDED.bonding_curve, tokens.bonding_curve),
            social_links = COALESCE(EXCLUDED.social_links, tokens.social_links),
            is_active = EXCLUDED.is_active,
            updated_at = NOW()
        "#,
    )
    .bind(&token.address)
    .bind(&token.name)
    .bind(&token.symbol)
    .bind(token.decimals)
    .bind(&token.total_supply)
    .bind(&token.creator)
    .bind(&token.uri)
    .bind(&token.bonding_curve)
    .bind(token.initial_liquidity)
    .bind(token.social_links.clone().map(Json))
    .bind(token.is_active)
    .bind(token.created_at)
    .execute(pool)
    .await
    .context("Failed to upsert token")?;

    Ok(())
}

const TOKEN_COLUMNS: &str = r#"
    address, name, symbol, decimals, total_supply, creator, uri,
    bonding_curve, initial_liquidity, social_links, is_active, created_at
"#;

fn token_from_row(row: &PgRow) -> Result<Token> {
    let social_links: Option<Json<SocialLinks>> = row.try_get("social_links")?;
    Ok(Token {
        address: row.try_get("address")?,
        name: row.try_get("name")?,
        symbol: row.try_get("symbol")?,
        decimals: row.try_get("decimals")?,
        total_supply: row.try_get("total_supply")?,
        creator: row.try_get("creator")?,
        uri: row.try_get("uri")?,
        bonding_curve: row.try_get("bonding_curve")?,
        initial_liquidity: row.try_get("initial_liquidity")?,
        social_links: social_links.map(|json| json.0),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Get token by address
pub async fn get_token(pool: &PgPool, address: &str) -> Result<Option<Token>> {
    let row = sqlx::query(&format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE address = $1"))
        .bind(address)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch token")?;

    row.as_ref().map(token_from_row).transpose()
}

/// All tokens still flagged active
pub async fn get_active_tokens(pool: &PgPool) -> Result<Vec<Token>> {
    let rows = sqlx::query(&format!(
        "SELECT {TOKEN_COLUMNS} FROM tokens WHERE is_active = TRUE ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await
    .context("Failed to fetch active tokens")?;

    rows.iter().map(token_from_row).collect()
}

/// Flag a token inactive. Tokens are never deleted.
pub async fn deactivate_token(pool: &PgPool, address: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tokens SET is_active = FALSE, updated_at = NOW() WHERE address = $1 AND is_active",
    )
    .bind(address)
    .execute(pool)
    .await
    .context("Failed to deactivate token")?;

    Ok(result.rows_affected() == 1)
}

// ==========================================
// TRADE OPERATIONS
// ==========================================

/// Insert a trade keyed by signature. Returns false when the signature already exists.
pub async fn insert_trade_if_absent(pool: &PgPool, trade: &TradeEvent) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO trades (
            signature, token_address, trader, direction, sol_amount,
            token_amount, price, timestamp
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (signature) DO NOTHING
        "#,
    )
    .bind(&trade.signature)
    .bind(&trade.token_address)
    .bind(&trade.trader)
    .bind(trade.direction.as_str())
    .bind(trade.sol_amount)
    .bind(trade.token_amount)
    .bind(trade.price)
    .bind(trade.timestamp)
    .execute(pool)
    .await
    .context("Failed to insert trade")?;

    Ok(result.rows_affected() == 1)
}

/// Get recent trades for a token, newest first
pub async fn get_recent_trades(
    pool: &PgPool,
    address: &str,
    limit: i64,
) -> Result<Vec<TradeEvent>> {
    let trades = sqlx::query_as::<_, TradeEvent>(
        r#"
        SELECT
            signature,
            token_address,
            trader,
            direction,
            sol_amount,
            token_amount,
            price,
            timestamp
        FROM trades
        WHERE token_address = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(address)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch recent trades")?;

    Ok(trades)
}

/// Trades with `from < timestamp <= to`, newest first
pub async fn get_trades_between(
    pool: &PgPool,
    address: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<TradeEvent>> {
    let trades = sqlx::query_as::<_, TradeEvent>(
        r#"
        SELECT
            signature,
            token_address,
            trader,
            direction,
            sol_amount,
            token_amount,
            price,
            timestamp
        FROM trades
        WHERE token_address = $1
        AND timestamp > $2
        AND timestamp <= $3
        ORDER BY timestamp DESC
        LIMIT $4
        "#,
    )
    .bind(address)
    .bind(from)
    .bind(to)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch trades in range")?;

    Ok(trades)
}

// ==========================================
// SNAPSHOT OPERATIONS (append-only)
// ==========================================

pub async fn insert_price_snapshot(pool: &PgPool, snapshot: &PriceSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO price_snapshots (
            token_address, price, price_change_1m, price_change_5m,
            price_change_15m, price_change_1h, price_change_24h, timestamp
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&snapshot.token_address)
    .bind(snapshot.price)
    .bind(snapshot.price_change_1m)
    .bind(snapshot.price_change_5m)
    .bind(snapshot.price_change_15m)
    .bind(snapshot.price_change_1h)
    .bind(snapshot.price_change_24h)
    .bind(snapshot.timestamp)
    .execute(pool)
    .await
    .context("Failed to insert price snapshot")?;

    Ok(())
}

pub async fn insert_trading_snapshot(pool: &PgPool, snapshot: &TradingSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trading_snapshots (
            token_address, volume_24h, volume_change, tx_count_24h,
            active_traders, liquidity, liquidity_change, timestamp
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&snapshot.token_address)
    .bind(snapshot.volume_24h)
    .bind(snapshot.volume_change)
    .bind(snapshot.tx_count_24h)
    .bind(snapshot.active_traders)
    .bind(snapshot.liquidity)
    .bind(snapshot.liquidity_change)
    .bind(snapshot.timestamp)
    .execute(pool)
    .await
    .context("Failed to insert trading snapshot")?;

    Ok(())
}

pub async fn get_latest_price_snapshot(
    pool: &PgPool,
    address: &str,
) -> Result<Option<PriceSnapshot>> {
    let snapshot = sqlx::query_as::<_, PriceSnapshot>(
        r#"
        SELECT
            token_address,
            price,
            price_change_1m,
            price_change_5m,
            price_change_15m,
            price_change_1h,
            price_change_24h,
            timestamp
        FROM price_snapshots
        WHERE token_address = $1
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(address)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest price snapshot")?;

    Ok(snapshot)
}

pub async fn get_latest_trading_snapshot(
    pool: &PgPool,
    address: &str,
) -> Result<Option<TradingSnapshot>> {
    let snapshot = sqlx::query_as::<_, TradingSnapshot>(
        r#"
        SELECT
            token_address,
            volume_24h,
            volume_change,
            tx_count_24h,
            active_traders,
            liquidity,
            liquidity_change,
            timestamp
        FROM trading_snapshots
        WHERE token_address = $1
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(address)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest trading snapshot")?;

    Ok(snapshot)
}

/// Latest price and trading snapshot per token, both taken at or after `since`
pub async fn get_market_views_since(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<MarketView>> {
    let rows = sqlx::query(
        r#"
        SELECT
            p.token_address,
            p.price,
            p.price_change_1m,
            p.price_change_5m,
            p.price_change_15m,
            p.price_change_1h,
            p.price_change_24h,
            p.timestamp AS price_timestamp,
            t.volume_24h,
            t.volume_change,
            t.tx_count_24h,
            t.active_traders,
            t.liquidity,
            t.liquidity_change,
            t.timestamp AS trading_timestamp
        FROM (
            SELECT DISTINCT ON (token_address) *
            FROM price_snapshots
            WHERE timestamp >= $1
            ORDER BY token_address, timestamp DESC
        ) p
        JOIN (
            SELECT DISTINCT ON (token_address) *
            FROM trading_snapshots
            WHERE timestamp >= $1
            ORDER BY token_address, timestamp DESC
        ) t ON t.token_address = p.token_address
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("Failed to fetch market views")?;

    rows.iter()
        .map(|row| {
            let token_address: String = row.try_get("token_address")?;
            Ok(MarketView {
                price: PriceSnapshot {
                    token_address: token_address.clone(),
                    price: row.try_get("price")?,
                    price_change_1m: row.try_get("price_change_1m")?,
                    price_change_5m: row.try_get("price_change_5m")?,
                    price_change_15m: row.try_get("price_change_15m")?,
                    price_change_1h: row.try_get("price_change_1h")?,
                    price_change_24h: row.try_get("price_change_24h")?,
                    timestamp: row.try_get("price_timestamp")?,
                },
                trading: TradingSnapshot {
                    token_address: token_address.clone(),
                    volume_24h: row.try_get("volume_24h")?,
                    volume_change: row.try_get("volume_change")?,
                    tx_count_24h: row.try_get("tx_count_24h")?,
                    active_traders: row.try_get("active_traders")?,
                    liquidity: row.try_get("liquidity")?,
                    liquidity_change: row.try_get("liquidity_change")?,
                    timestamp: row.try_get("trading_timestamp")?,
                },
                token_address,
            })
        })
        .collect()
}

// ==========================================
// ALERT OPERATIONS
// ==========================================

pub async fn insert_alert(pool: &PgPool, alert: &AlertRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO alerts (
            id, token_address, alert_type, title, message, score,
            conditions, timestamp, is_read
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(alert.id)
    .bind(&alert.token_address)
    .bind(alert.alert_type.as_str())
    .bind(&alert.title)
    .bind(&alert.message)
    .bind(i16::from(alert.score))
    .bind(Json(&alert.conditions))
    .bind(alert.timestamp)
    .bind(alert.is_read)
    .execute(pool)
    .await
    .context("Failed to insert alert")?;

    Ok(())
}

fn alert_from_row(row: &PgRow) -> Result<AlertRecord> {
    let alert_type: String = row.try_get("alert_type")?;
    let score: i16 = row.try_get("score")?;
    let conditions: Json<Vec<AlertCondition>> = row.try_get("conditions")?;

    Ok(AlertRecord {
        id: row.try_get("id")?,
        token_address: row.try_get("token_address")?,
        alert_type: AlertType::try_from(alert_type).map_err(|e| anyhow!(e))?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        score: score.clamp(0, 100) as u8,
        conditions: conditions.0,
        timestamp: row.try_get("timestamp")?,
        is_read: row.try_get("is_read")?,
    })
}

/// Paginated alert listing, newest first
pub async fn list_alerts(pool: &PgPool, filter: &AlertFilter) -> Result<Vec<AlertRecord>> {
    let mut query = QueryBuilder::<Postgres>::new(
        r#"
        SELECT id, token_address, alert_type, title, message, score,
               conditions, timestamp, is_read
        FROM alerts
        WHERE TRUE
        "#,
    );

    if let Some(address) = &filter.token_address {
        query.push(" AND token_address = ").push_bind(address.clone());
    }
    if let Some(alert_type) = filter.alert_type {
        query.push(" AND alert_type = ").push_bind(alert_type.as_str());
    }
    if filter.unread_only {
        query.push(" AND is_read = FALSE");
    }
    let (limit, offset) = filter.page();
    query
        .push(" ORDER BY timestamp DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list alerts")?;

    rows.iter().map(alert_from_row).collect()
}

pub async fn mark_alert_read(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE alerts SET is_read = TRUE WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark alert read")?;

    Ok(result.rows_affected() == 1)
}
