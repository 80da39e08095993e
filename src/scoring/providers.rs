//! External sub-score collaborators (sentiment, KOL activity).

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

/// Used whenever a provider is absent or fails.
pub const NEUTRAL_SCORE: f64 = 50.0;

#[async_trait]
pub trait SubScoreProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// A score in `0..=100` for the token.
    async fn score(&self, token_address: &str) -> Result<f64>;
}

/// Always neutral. Stands in when no external source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralScoreProvider;

#[async_trait]
impl SubScoreProvider for NeutralScoreProvider {
    fn name(&self) -> &'static str {
        "neutral"
    }

    async fn score(&self, _token_address: &str) -> Result<f64> {
        Ok(NEUTRAL_SCORE)
    }
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f64,
}

/// `GET {base_url}/{token_address}` returning `{"score": <0..100>}`.
/// Rate limits and network errors are retried a few times.
pub struct HttpScoreProvider {
    name: &'static str,
    base_url: Url,
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpScoreProvider {
    pub fn new(name: &'static str, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).with_context(|| format!("invalid {name} provider URL"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            name,
            base_url,
            client,
            max_retries: 3,
        })
    }

    pub fn endpoint(&self, token_address: &str) -> Result<Url> {
        self.base_url
            .join(token_address)
            .with_context(|| format!("building {} URL for {token_address}", self.name))
    }
}

#[async_trait]
impl SubScoreProvider for HttpScoreProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn score(&self, token_address: &str) -> Result<f64> {
        let url = self.endpoint(token_address)?;
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.client.get(url.clone()).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= self.max_retries {
                        bail!("{} rate limited after {attempt} attempts", self.name);
                    }
                    debug!(provider = self.name, attempt, "Rate limited, cooling down");
                    sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
                Ok(resp) => {
                    let body: ScoreResponse = resp
                        .error_for_status()
                        .with_context(|| format!("{} returned an error status", self.name))?
                        .json()
                        .await
                        .with_context(|| format!("decoding {} response", self.name))?;
                    if !body.score.is_finite() {
                        bail!("{} returned a non-finite score", self.name);
                    }
                    return Ok(body.score.clamp(0.0, 100.0));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(e).with_context(|| format!("{} request failed", self.name));
                    }
                    debug!(provider = self.name, attempt, error = %e, "Network error, retrying");
                    sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }
}
