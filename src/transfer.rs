//! Transfer orchestration
//!
//! `transfer` runs one strictly sequential pipeline:
//! validate → list UTXOs → enrich → build → sign → broadcast.
//!
//! The UTXO set is fetched exactly once and the same snapshot feeds the fee
//! estimate, the build and the reported totals. Nothing is broadcast unless
//! every earlier stage succeeded, and the key is dropped as soon as signing
//! returns.

use serde::{Deserialize, Serialize};

use crate::broadcast::Broadcaster;
use crate::builder::{parse_address, TransactionBuilder, TransferMode, FEE_MODEL_OUTPUT_COUNT};
use crate::config::IndexerConfig;
use crate::error::TransferError;
use crate::fees::{estimate_fee, FeeRate};
use crate::indexer::IndexerClient;
use crate::keys::{KeyManager, ShareReconstructor, SourceKey};
use crate::network::Network;
use crate::utxo::{total_value, UtxoProvider};
use crate::Result;

#[derive(Debug)]
pub struct TransferRequest {
    pub source_key: SourceKey,
    pub destination: String,
    pub mode: TransferMode,
    pub network: Network,
    pub fee_rate: FeeRate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub txid: String,
    pub raw_tx_hex: String,
    pub fee: u64,
    /// Requested amount in fixed mode, computed sweep amount otherwise
    pub total_sent: u64,
}

/// Balance-time estimate of a transfer, computed without enrichment or signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferQuote {
    pub input_count: usize,
    pub available_base_units: u64,
    pub estimated_fee_base_units: u64,
    pub send_base_units: u64,
}

pub struct TransferOrchestrator<K: KeyManager> {
    utxos: UtxoProvider,
    broadcaster: Broadcaster,
    keys: K,
}

impl<K: KeyManager> TransferOrchestrator<K> {
    pub fn new(config: &IndexerConfig, keys: K) -> Result<Self> {
        let indexer = IndexerClient::new(config)?;
        Ok(Self::from_parts(
            UtxoProvider::new(indexer.clone(), config),
            Broadcaster::new(indexer),
            keys,
        ))
    }

    pub fn from_parts(utxos: UtxoProvider, broadcaster: Broadcaster, keys: K) -> Self {
        Self {
            utxos,
            broadcaster,
            keys,
        }
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferResult> {
        let TransferRequest {
            source_key,
            destination,
            mode,
            network,
            fee_rate,
        } = request;

        mode.validate()?;
        let destination = destination.trim().to_string();
        parse_address(&destination, network)?;

        let source_address = self.keys.derive_address(&source_key, network)?;
        log::info!(
            "Transfer from {} to {} on {} ({})",
            source_address,
            destination,
            network,
            match mode {
                TransferMode::Amount(amount) => format!("{} base units", amount),
                TransferMode::Sweep => "sweep".to_string(),
            }
        );

        let listed = self.utxos.list_unspent(network, &source_address).await?;
        if listed.is_empty() {
            return Err(TransferError::NoFunds(format!(
                "No UTXOs available to spend from {}",
                source_address
            )));
        }
        let utxos = self.utxos.enrich(network, listed).await?;

        let draft = TransactionBuilder::new(network, fee_rate).build(
            &utxos,
            &source_address,
            &destination,
            mode,
        )?;

        let signed = self.keys.sign(&source_key, &draft);
        drop(source_key);
        let signed = signed?;

        let txid = self.broadcaster.broadcast(network, &signed.raw_hex).await?;
        if txid != signed.txid {
            log::warn!(
                "Indexer reported txid {} but the signed transaction hashes to {}",
                txid,
                signed.txid
            );
        }

        log::info!(
            "Transfer broadcast: txid={}, sent={}, fee={}, inputs={}",
            txid,
            draft.amount_sent(),
            draft.fee,
            draft.inputs.len()
        );

        Ok(TransferResult {
            txid,
            raw_tx_hex: signed.raw_hex,
            fee: draft.fee,
            total_sent: draft.amount_sent(),
        })
    }

    /// Reconstruct the key from threshold shares just in time, then transfer
    #[allow(clippy::too_many_arguments)]
    pub async fn transfer_from_shares<R: ShareReconstructor + ?Sized>(
        &self,
        reconstructor: &R,
        shares: &[String],
        threshold: usize,
        destination: &str,
        mode: TransferMode,
        network: Network,
        fee_rate: FeeRate,
    ) -> Result<TransferResult> {
        let source_key = reconstructor.reconstruct(shares, threshold, network)?;
        self.transfer(TransferRequest {
            source_key,
            destination: destination.to_string(),
            mode,
            network,
            fee_rate,
        })
        .await
    }

    /// Predict fee and send amount from the current UTXO count.
    ///
    /// Uses the same two-output fee model as the builder, so a quote that
    /// passes here builds unless the UTXO set changes in between.
    pub async fn quote(
        &self,
        network: Network,
        source_address: &str,
        mode: TransferMode,
        fee_rate: FeeRate,
    ) -> Result<TransferQuote> {
        mode.validate()?;
        parse_address(source_address, network)?;

        let utxos = self.utxos.list_unspent(network, source_address).await?;
        if utxos.is_empty() {
            return Err(TransferError::NoFunds(format!(
                "No UTXOs available to spend from {}",
                source_address
            )));
        }

        let available = total_value(&utxos);
        let estimated_fee = estimate_fee(utxos.len(), FEE_MODEL_OUTPUT_COUNT, fee_rate);

        let send_base_units = match mode {
            TransferMode::Amount(amount) => {
                let needed = amount.saturating_add(estimated_fee);
                if needed > available {
                    return Err(TransferError::insufficient(needed, available));
                }
                amount
            }
            TransferMode::Sweep => {
                if available <= estimated_fee {
                    return Err(TransferError::insufficient(
                        estimated_fee.saturating_add(1),
                        available,
                    ));
                }
                available - estimated_fee
            }
        };

        Ok(TransferQuote {
            input_count: utxos.len(),
            available_base_units: available,
            estimated_fee_base_units: estimated_fee,
            send_base_units,
        })
    }
}
