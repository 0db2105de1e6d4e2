//! Balance queries and unit helpers
//!
//! A snapshot is a single read of the indexer's confirmed/unconfirmed totals.
//! Snapshots are never merged; each refresh replaces the last one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indexer::IndexerClient;
use crate::network::Network;
use crate::Result;

pub const BASE_UNITS_PER_COIN: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub network: Network,
    pub address: String,
    pub confirmed_base_units: u64,
    /// Mempool delta; negative while an outgoing spend is unconfirmed
    pub unconfirmed_base_units: i64,
    pub total_base_units: u64,
    pub fetched_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn confirmed_coins(&self) -> f64 {
        base_units_to_coins(self.confirmed_base_units)
    }

    pub fn total_coins(&self) -> f64 {
        base_units_to_coins(self.total_base_units)
    }
}

/// Body of `GET /address/{addr}/balance`; absent or null fields count as zero
#[derive(Debug, Default, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    confirmed: Option<i64>,
    #[serde(default)]
    unconfirmed: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct BalanceAggregator {
    indexer: IndexerClient,
}

impl BalanceAggregator {
    pub fn new(indexer: IndexerClient) -> Self {
        Self { indexer }
    }

    pub async fn fetch_balance(&self, network: Network, address: &str) -> Result<BalanceSnapshot> {
        let response: BalanceResponse = self
            .indexer
            .get_json(network, &format!("address/{}/balance", address))
            .await?;

        let confirmed = response.confirmed.unwrap_or(0).max(0) as u64;
        let unconfirmed = response.unconfirmed.unwrap_or(0);
        let total = (confirmed as i64).saturating_add(unconfirmed).max(0) as u64;

        log::debug!(
            "Balance for {}: confirmed={} unconfirmed={} total={}",
            address,
            confirmed,
            unconfirmed,
            total
        );

        Ok(BalanceSnapshot {
            network,
            address: address.to_string(),
            confirmed_base_units: confirmed,
            unconfirmed_base_units: unconfirmed,
            total_base_units: total,
            fetched_at: Utc::now(),
        })
    }
}

pub fn base_units_to_coins(base_units: u64) -> f64 {
    base_units as f64 / BASE_UNITS_PER_COIN as f64
}

/// Round to the nearest base unit; negative and non-finite input yields zero
pub fn coins_to_base_units(coins: f64) -> u64 {
    if !coins.is_finite() || coins <= 0.0 {
        return 0;
    }
    (coins * BASE_UNITS_PER_COIN as f64).round() as u64
}

/// Eight decimals with trailing zeros trimmed (`1.5`, `0.00000001`, `0`)
pub fn format_coins(base_units: u64) -> String {
    let whole = base_units / BASE_UNITS_PER_COIN;
    let frac = base_units % BASE_UNITS_PER_COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:08}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
