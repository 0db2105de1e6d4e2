//! UTXO retrieval and script enrichment
//!
//! Unspent outputs are listed once per transfer and then enriched with their
//! locking scripts. Script lookups go out in fixed-size batches with a pause
//! between batches to stay under the indexer's rate limit.

use std::time::Duration;

use bitcoin::transaction::OutPoint;
use bitcoin::{ScriptBuf, Txid};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::IndexerConfig;
use crate::error::TransferError;
use crate::indexer::IndexerClient;
use crate::network::Network;
use crate::Result;

/// An unspent output of the source address.
///
/// Identity is `(txid, vout)`. `locking_script_hex` is filled in by
/// [`UtxoProvider::enrich`] before the output is used as an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locking_script_hex: Option<String>,
}

impl Utxo {
    pub fn new(txid: impl Into<String>, vout: u32, value: u64) -> Self {
        Self {
            txid: txid.into(),
            vout,
            value,
            locking_script_hex: None,
        }
    }

    pub fn outpoint(&self) -> Result<OutPoint> {
        let txid: Txid = self.txid.parse().map_err(|e| {
            TransferError::InvalidRequest(format!("Invalid txid {}: {}", self.txid, e))
        })?;
        Ok(OutPoint::new(txid, self.vout))
    }

    /// Decoded locking script; fails if the UTXO was never enriched
    pub fn locking_script(&self) -> Result<ScriptBuf> {
        let hex = self.locking_script_hex.as_deref().ok_or_else(|| {
            TransferError::InvalidRequest(format!(
                "UTXO {}:{} has no locking script",
                self.txid, self.vout
            ))
        })?;
        ScriptBuf::from_hex(hex).map_err(|e| {
            TransferError::InvalidRequest(format!(
                "UTXO {}:{} has malformed locking script: {}",
                self.txid, self.vout, e
            ))
        })
    }

    pub fn is_enriched(&self) -> bool {
        self.locking_script_hex.is_some()
    }
}

pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos.iter().map(|u| u.value).sum()
}

/// Entry of `GET /address/{addr}/unspent`
#[derive(Debug, Deserialize)]
struct UnspentEntry {
    tx_hash: String,
    tx_pos: u32,
    value: u64,
}

#[derive(Clone, Debug)]
pub struct UtxoProvider {
    indexer: IndexerClient,
    batch_size: usize,
    batch_delay: Duration,
}

impl UtxoProvider {
    pub fn new(indexer: IndexerClient, config: &IndexerConfig) -> Self {
        Self {
            indexer,
            batch_size: config.enrichment_batch_size.max(1),
            batch_delay: config.enrichment_batch_delay,
        }
    }

    /// List the unspent outputs of `address`. An unfunded address yields an empty list.
    pub async fn list_unspent(&self, network: Network, address: &str) -> Result<Vec<Utxo>> {
        let entries: Vec<UnspentEntry> = self
            .indexer
            .get_json(network, &format!("address/{}/unspent", address))
            .await?;

        log::debug!("Found {} unspent outputs for {}", entries.len(), address);

        Ok(entries
            .into_iter()
            .map(|e| Utxo::new(e.tx_hash, e.tx_pos, e.value))
            .collect())
    }

    /// Fetch the locking script of a single output as hex
    pub async fn fetch_script(&self, network: Network, txid: &str, vout: u32) -> Result<String> {
        let script_hex = self
            .indexer
            .get_text(network, &format!("tx/{}/out/{}/hex", txid, vout))
            .await?;

        if script_hex.is_empty() || hex::decode(&script_hex).is_err() {
            return Err(TransferError::network(format!(
                "Indexer returned malformed script for {}:{}",
                txid, vout
            )));
        }

        Ok(script_hex)
    }

    /// Attach the locking script to every UTXO.
    ///
    /// Batches run strictly one after another; lookups inside a batch run
    /// concurrently. Any failed lookup aborts the whole enrichment before the
    /// next batch starts.
    pub async fn enrich(&self, network: Network, utxos: Vec<Utxo>) -> Result<Vec<Utxo>> {
        let batch_count = utxos.len().div_ceil(self.batch_size);
        let mut enriched = Vec::with_capacity(utxos.len());

        for (batch_index, batch) in utxos.chunks(self.batch_size).enumerate() {
            log::debug!(
                "Fetching scripts for batch {}/{} ({} outputs)",
                batch_index + 1,
                batch_count,
                batch.len()
            );

            let scripts = join_all(
                batch
                    .iter()
                    .map(|utxo| self.fetch_script(network, &utxo.txid, utxo.vout)),
            )
            .await;

            for (utxo, script) in batch.iter().zip(scripts) {
                let script_hex = script.map_err(|e| {
                    TransferError::network(format!(
                        "Script enrichment failed in batch {} at {}:{}: {}",
                        batch_index + 1,
                        utxo.txid,
                        utxo.vout,
                        e
                    ))
                })?;
                enriched.push(Utxo {
                    locking_script_hex: Some(script_hex),
                    ..utxo.clone()
                });
            }

            if batch_index + 1 < batch_count {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        Ok(enriched)
    }
}
