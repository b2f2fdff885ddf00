// src/profit/coingecko.rs
//! CoinGecko market price source
//!
//! Fetches USD spot prices from the CoinGecko simple-price endpoint and
//! converts them to per-MH/s daily revenue using the configured
//! `revenue_per_mhs_day` yield for each coin. Responses are cached for a
//! few minutes so repeated profitability checks don't hammer the API.

use crate::config::Config;
use crate::profit::evaluator::PriceSource;
use crate::utils::error::RigError;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const API_BASE: &str = "https://api.coingecko.com/api/v3";
const CACHE_TTL: Duration = Duration::from_secs(300);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

struct PriceCache {
    fetched_at: Instant,
    /// USD spot price keyed by CoinGecko api id
    usd_by_api_id: HashMap<String, f64>,
}

/// Market price source backed by the CoinGecko public API
pub struct CoinGeckoSource {
    client: reqwest::Client,
    config: Arc<ArcSwap<Config>>,
    cache: Mutex<Option<PriceCache>>,
}

impl CoinGeckoSource {
    /// Creates a source that resolves api ids from the live configuration
    pub fn new(config: Arc<ArcSwap<Config>>) -> Self {
        CoinGeckoSource {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
            cache: Mutex::new(None),
        }
    }

    /// Returns cached USD prices, refreshing from the API when stale
    ///
    /// # Errors
    /// Returns `RigError::HttpError` when the request fails and no cache
    /// entry exists, or `RigError::NoPriceData` when no coin has an api id.
    async fn usd_prices(&self) -> Result<HashMap<String, f64>, RigError> {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref() {
            if entry.fetched_at.elapsed() < CACHE_TTL {
                return Ok(entry.usd_by_api_id.clone());
            }
        }

        let ids: Vec<String> = self
            .config
            .load()
            .coins
            .values()
            .filter_map(|c| c.api_id.clone())
            .collect();
        if ids.is_empty() {
            return Err(RigError::NoPriceData);
        }

        match self.fetch_usd_prices(&ids).await {
            Ok(prices) => {
                *cache = Some(PriceCache {
                    fetched_at: Instant::now(),
                    usd_by_api_id: prices.clone(),
                });
                Ok(prices)
            }
            // Serve the stale cache rather than nothing while the API
            // is unreachable.
            Err(e) => match cache.as_ref() {
                Some(entry) => {
                    log::warn!("Price refresh failed, using stale cache: {}", e);
                    Ok(entry.usd_by_api_id.clone())
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_usd_prices(&self, ids: &[String]) -> Result<HashMap<String, f64>, RigError> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            API_BASE,
            ids.join(",")
        );
        log::debug!("Fetching prices for {} coins from CoinGecko", ids.len());

        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut prices = HashMap::new();
        for id in ids {
            if let Some(usd) = body.get(id).and_then(|v| v.get("usd")).and_then(|v| v.as_f64()) {
                prices.insert(id.clone(), usd);
            }
        }
        Ok(prices)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn price_per_mhs_day(&self, coin: &str) -> Option<f64> {
        let cfg = self.config.load();
        let coin_cfg = cfg.coins.get(coin)?;
        let api_id = coin_cfg.api_id.as_ref()?;
        if coin_cfg.revenue_per_mhs_day <= 0.0 {
            return None;
        }

        let prices = match self.usd_prices().await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Price lookup for {} failed: {}", coin, e);
                return None;
            }
        };
        prices
            .get(api_id)
            .map(|usd| usd * coin_cfg.revenue_per_mhs_day)
    }
}
