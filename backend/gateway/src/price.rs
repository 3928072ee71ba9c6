//! ETH → USD price cache.
//!
//! [`PriceOracle::eth_usd`] never fails: within the TTL it answers from the
//! cached quote, after the TTL it makes one bounded HTTP attempt, and on any
//! failure it falls back to the last good quote (or the configured bootstrap
//! price when nothing was ever fetched).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PriceConfig;
use crate::errors::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    /// USD per ETH, always > 0
    pub price: f64,
    pub fetched_at: Instant,
}

/// Somewhere an ETH/USD price can be fetched from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_eth_usd(&self) -> Result<f64>;
}

/// Ticker endpoint over HTTP.  Understands Binance (`{"price":"3500.1"}`)
/// and CoinGecko (`{"ethereum":{"usd":3500.1}}`) bodies.
pub struct HttpPriceSource {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpPriceSource {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_eth_usd(&self) -> Result<f64> {
        let body: Value = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_ticker(&body)
    }
}

fn parse_ticker(body: &Value) -> Result<f64> {
    let field = body
        .get("price")
        .or_else(|| body.get("ethereum").and_then(|e| e.get("usd")))
        .ok_or_else(|| GatewayError::Price("ticker body has no price field".to_string()))?;

    let price = match field {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };

    match price {
        Some(p) if p.is_finite() && p > 0.0 => Ok(p),
        _ => Err(GatewayError::Price(format!("unusable ticker price: {field}"))),
    }
}

pub struct PriceOracle {
    source: Arc<dyn PriceSource>,
    ttl: Duration,
    default_price: f64,
    quote: RwLock<Option<PriceQuote>>,
}

impl PriceOracle {
    pub fn new(source: Arc<dyn PriceSource>, ttl: Duration, default_price: f64) -> Self {
        Self {
            source,
            ttl,
            default_price,
            quote: RwLock::new(None),
        }
    }

    pub fn from_config(client: Client, config: &PriceConfig) -> Self {
        let source = HttpPriceSource::new(client, config.url.clone(), config.timeout);
        Self::new(Arc::new(source), config.ttl, config.default_price)
    }

    /// Current ETH price in USD.
    pub async fn eth_usd(&self) -> f64 {
        if let Some(q) = *self.quote.read().await {
            if q.fetched_at.elapsed() < self.ttl {
                return q.price;
            }
        }

        match self.source.fetch_eth_usd().await {
            Ok(price) => {
                debug!("ETH price refreshed: ${price:.2}");
                *self.quote.write().await = Some(PriceQuote {
                    price,
                    fetched_at: Instant::now(),
                });
                price
            }
            Err(e) => {
                let fallback = self.last_known().await;
                warn!("Failed to fetch ETH price, using ${fallback:.2}: {e}");
                fallback
            }
        }
    }

    /// Last successful quote, if any.
    pub async fn quote(&self) -> Option<PriceQuote> {
        *self.quote.read().await
    }

    async fn last_known(&self) -> f64 {
        self.quote
            .read()
            .await
            .map(|q| q.price)
            .unwrap_or(self.default_price)
    }
}
