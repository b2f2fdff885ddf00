// src/profit/evaluator.rs
//! Profitability evaluation
//!
//! A pure computation over price inputs and per-coin rig characteristics:
//! nothing here is persisted, every evaluation recomputes from scratch.
//! The price source is an opaque collaborator; the evaluator only needs
//! "USD earned per MH/s per day" for each coin.

use crate::config::Config;
use crate::utils::error::RigError;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// Market price collaborator
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD earned per MH/s per day for a coin, or `None` when the market
    /// data is unavailable
    async fn price_per_mhs_day(&self, coin: &str) -> Option<f64>;
}

/// Daily economics of mining one coin on this rig
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitabilityRecord {
    /// Coin symbol
    pub coin: String,
    /// Estimated revenue in USD per day
    pub daily_revenue_usd: f64,
    /// Electricity cost in USD per day at the given kWh price
    pub daily_electricity_cost_usd: f64,
    /// Revenue minus electricity cost
    pub daily_profit_usd: f64,
}

/// Ranks configured coins by daily profit
pub struct ProfitabilityEvaluator {
    config: Arc<ArcSwap<Config>>,
    prices: Arc<dyn PriceSource>,
}

impl ProfitabilityEvaluator {
    /// Creates an evaluator over the configured coins
    pub fn new(config: Arc<ArcSwap<Config>>, prices: Arc<dyn PriceSource>) -> Self {
        ProfitabilityEvaluator { config, prices }
    }

    /// Computes and ranks the profitability of every configured coin
    ///
    /// Coins without price data are skipped. The result is sorted by
    /// descending daily profit with ties broken by coin symbol ascending,
    /// so repeated evaluations over identical inputs rank identically.
    ///
    /// # Errors
    /// Returns `RigError::NoPriceData` when no coin has a usable price.
    pub async fn evaluate(
        &self,
        electricity_cost_per_kwh: f64,
    ) -> Result<Vec<ProfitabilityRecord>, RigError> {
        let cfg = self.config.load();
        let mut records = Vec::new();

        for (symbol, coin) in &cfg.coins {
            let Some(price) = self.prices.price_per_mhs_day(symbol).await else {
                log::debug!("No price for {}; skipping", symbol);
                continue;
            };
            records.push(compute_record(
                symbol,
                coin.expected_hashrate_mhs,
                price,
                coin.power_draw_w,
                electricity_cost_per_kwh,
            ));
        }

        if records.is_empty() {
            return Err(RigError::NoPriceData);
        }
        rank(&mut records);
        Ok(records)
    }

    /// The most profitable coin right now
    ///
    /// # Errors
    /// Returns `RigError::NoPriceData` when no price input is available.
    pub async fn best_coin(
        &self,
        electricity_cost_per_kwh: f64,
    ) -> Result<ProfitabilityRecord, RigError> {
        let ranked = self.evaluate(electricity_cost_per_kwh).await?;
        ranked.into_iter().next().ok_or(RigError::NoPriceData)
    }
}

/// Computes one coin's daily economics
///
/// daily_revenue = hashrate × price-per-MH/s-per-day;
/// daily_electricity_cost = power/1000 × 24 × cost-per-kWh.
pub fn compute_record(
    coin: &str,
    hashrate_mhs: f64,
    price_per_mhs_day: f64,
    power_draw_w: f64,
    electricity_cost_per_kwh: f64,
) -> ProfitabilityRecord {
    let daily_revenue_usd = hashrate_mhs * price_per_mhs_day;
    let daily_electricity_cost_usd = (power_draw_w / 1000.0) * 24.0 * electricity_cost_per_kwh;
    ProfitabilityRecord {
        coin: coin.to_string(),
        daily_revenue_usd,
        daily_electricity_cost_usd,
        daily_profit_usd: daily_revenue_usd - daily_electricity_cost_usd,
    }
}

/// Sorts records by descending profit, ties broken by symbol ascending
pub fn rank(records: &mut [ProfitabilityRecord]) {
    records.sort_by(|a, b| {
        b.daily_profit_usd
            .partial_cmp(&a.daily_profit_usd)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.coin.cmp(&b.coin))
    });
}


#[cfg(test)]
mod tests {
    use super::test_support::FixedPrices;
    use super::*;
    use crate::config::CoinConfig;

    fn coin(hashrate: f64, power: f64) -> CoinConfig {
        CoinConfig {
            algorithm: "x".into(),
            pool: "pool:1".into(),
            wallet: "w".into(),
            expected_hashrate_mhs: hashrate,
            power_draw_w: power,
            api_id: None,
            revenue_per_mhs_day: 0.0,
            overclock: None,
        }
    }

    fn config_with_coins(entries: &[(&str, f64, f64)]) -> Arc<ArcSwap<Config>> {
        let mut cfg = Config::default();
        for (sym, hashrate, power) in entries {
            cfg.coins.insert(sym.to_string(), coin(*hashrate, *power));
        }
        cfg.general.default_coin = entries
            .first()
            .map(|(s, _, _)| s.to_string())
            .unwrap_or_else(|| "RVN".into());
        Arc::new(ArcSwap::from_pointee(cfg))
    }

    #[tokio::test]
    async fn worked_scenario_matches_expected_profit() {
        // 15.5 MH/s at a price yielding 1.50 USD/day revenue, 90 W, 0.12 $/kWh
        let config = config_with_coins(&[("RVN", 15.5, 90.0)]);
        let prices = FixedPrices::new(&[("RVN", 1.50 / 15.5)]);
        let evaluator = ProfitabilityEvaluator::new(config, prices);

        let records = evaluator.evaluate(0.12).await.unwrap();
        assert_eq!(records.len(), 1);
        let rvn = &records[0];
        assert!((rvn.daily_revenue_usd - 1.50).abs() < 1e-9);
        assert!((rvn.daily_electricity_cost_usd - 0.2592).abs() < 1e-9);
        assert!((rvn.daily_profit_usd - 1.2408).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ranking_is_descending_by_profit() {
        let config = config_with_coins(&[("ERG", 90.0, 95.0), ("ETC", 28.0, 85.0)]);
        // ERG: 90*0.02 = 1.8 revenue; ETC: 28*0.1 = 2.8 revenue
        let prices = FixedPrices::new(&[("ERG", 0.02), ("ETC", 0.1)]);
        let evaluator = ProfitabilityEvaluator::new(config, prices);

        let records = evaluator.evaluate(0.12).await.unwrap();
        assert_eq!(records[0].coin, "ETC");
        assert_eq!(records[1].coin, "ERG");
    }

    #[tokio::test]
    async fn equal_profit_ties_break_alphabetically() {
        // Same hashrate/power/price for both coins: identical profit
        let config = config_with_coins(&[("RVN", 15.5, 90.0), ("ETC", 15.5, 90.0)]);
        let prices = FixedPrices::new(&[("RVN", 0.1), ("ETC", 0.1)]);
        let evaluator = ProfitabilityEvaluator::new(config, prices);

        for _ in 0..5 {
            let records = evaluator.evaluate(0.12).await.unwrap();
            assert_eq!(records[0].coin, "ETC");
            assert_eq!(records[1].coin, "RVN");
        }
    }

    #[tokio::test]
    async fn missing_prices_skip_coins_and_empty_result_is_no_data() {
        let config = config_with_coins(&[("RVN", 15.5, 90.0), ("ETC", 28.0, 85.0)]);
        let prices = FixedPrices::new(&[("ETC", 0.05)]);
        let evaluator = ProfitabilityEvaluator::new(Arc::clone(&config), prices);
        let records = evaluator.evaluate(0.12).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].coin, "ETC");

        let evaluator = ProfitabilityEvaluator::new(config, FixedPrices::empty());
        assert!(matches!(
            evaluator.evaluate(0.12).await.unwrap_err(),
            RigError::NoPriceData
        ));
    }

    #[tokio::test]
    async fn best_coin_returns_top_entry() {
        let config = config_with_coins(&[("RVN", 15.5, 90.0), ("ETC", 28.0, 85.0)]);
        let prices = FixedPrices::new(&[("RVN", 0.1), ("ETC", 0.1)]);
        let evaluator = ProfitabilityEvaluator::new(config, prices);
        let best = evaluator.best_coin(0.12).await.unwrap();
        assert_eq!(best.coin, "ETC");
    }
}
