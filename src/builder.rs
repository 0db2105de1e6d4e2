//! Transaction draft construction
//!
//! A draft always spends every UTXO of the source address; there is no coin
//! selection. Two shapes are produced:
//!
//! - **Fixed amount**: recipient output plus a change output back to the source
//! - **Sweep**: a single recipient output carrying everything minus the fee
//!
//! The fee is computed once here and stored on the draft. For every draft this
//! module returns, `input_total == output_total + fee` holds exactly.

use std::str::FromStr;

use bitcoin::address::{Address, AddressType, NetworkUnchecked};
use bitcoin::blockdata::transaction::{Transaction, TxIn, TxOut};
use bitcoin::blockdata::witness::Witness;
use bitcoin::transaction::{Sequence, Version};
use bitcoin::{absolute, Amount, ScriptBuf};
use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::fees::{estimate_fee, FeeRate};
use crate::network::Network;
use crate::utxo::{total_value, Utxo};
use crate::Result;

/// Output count fed to the fee model in both modes.
///
/// A sweep only has one output, but it is priced like a fixed-amount
/// transfer so the balance-time estimate and the built fee agree.
pub const FEE_MODEL_OUTPUT_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    /// Send exactly this many base units, change returns to the source
    Amount(u64),
    /// Send everything minus the fee
    Sweep,
}

impl TransferMode {
    /// Combine an optional amount and a sweep flag; exactly one must be set
    pub fn from_parts(amount: Option<u64>, sweep: bool) -> Result<Self> {
        match (amount, sweep) {
            (Some(_), true) => Err(TransferError::InvalidRequest(
                "Specify either an amount or sweep, not both".to_string(),
            )),
            (None, false) => Err(TransferError::InvalidRequest(
                "Amount is required when not sweeping".to_string(),
            )),
            (Some(amount), false) => {
                let mode = TransferMode::Amount(amount);
                mode.validate()?;
                Ok(mode)
            }
            (None, true) => Ok(TransferMode::Sweep),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let TransferMode::Amount(0) = self {
            return Err(TransferError::InvalidRequest(
                "Amount must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_sweep(&self) -> bool {
        matches!(self, TransferMode::Sweep)
    }
}

/// Parse a P2PKH address and check it belongs to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(TransferError::InvalidAddress(
            "Address must not be empty".to_string(),
        ));
    }

    let unchecked = Address::<NetworkUnchecked>::from_str(trimmed)
        .map_err(|e| TransferError::InvalidAddress(format!("{}: {}", trimmed, e)))?;
    let checked = unchecked.require_network(network.bitcoin_network()).map_err(|_| {
        TransferError::InvalidAddress(format!("{} is not a {} address", trimmed, network))
    })?;

    if checked.address_type() != Some(AddressType::P2pkh) {
        return Err(TransferError::InvalidAddress(format!(
            "{} is not a P2PKH address",
            trimmed
        )));
    }

    Ok(checked)
}

/// An input of the draft: the UTXO being spent plus the script that must be unlocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftInput {
    pub utxo: Utxo,
    pub locking_script: ScriptBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutput {
    pub script: ScriptBuf,
    pub value: u64,
    pub is_change: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub inputs: Vec<DraftInput>,
    pub outputs: Vec<DraftOutput>,
    pub fee: u64,
    pub mode: TransferMode,
}

impl TransactionDraft {
    pub fn input_total(&self) -> u64 {
        self.inputs.iter().map(|i| i.utxo.value).sum()
    }

    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Value delivered to the destination (everything except change)
    pub fn amount_sent(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|o| !o.is_change)
            .map(|o| o.value)
            .sum()
    }

    pub fn change(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.is_change)
            .map(|o| o.value)
            .sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.output_total().checked_add(self.fee) == Some(self.input_total())
    }

    /// The draft as an unsigned transaction: empty script_sigs, version 1, locktime 0
    pub fn to_unsigned_transaction(&self) -> Result<Transaction> {
        let input = self
            .inputs
            .iter()
            .map(|i| {
                Ok(TxIn {
                    previous_output: i.utxo.outpoint()?,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .outputs
            .iter()
            .map(|o| TxOut {
                value: Amount::from_sat(o.value),
                script_pubkey: o.script.clone(),
            })
            .collect();

        Ok(Transaction {
            version: Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input,
            output,
        })
    }
}

pub struct TransactionBuilder {
    network: Network,
    fee_rate: FeeRate,
}

impl TransactionBuilder {
    pub fn new(network: Network, fee_rate: FeeRate) -> Self {
        Self { network, fee_rate }
    }

    /// Build a draft spending all of `utxos`.
    ///
    /// `utxos` must already be enriched with their locking scripts.
    pub fn build(
        &self,
        utxos: &[Utxo],
        source_address: &str,
        destination: &str,
        mode: TransferMode,
    ) -> Result<TransactionDraft> {
        if utxos.is_empty() {
            return Err(TransferError::NoFunds(format!(
                "No UTXOs available to spend from {}",
                source_address
            )));
        }
        mode.validate()?;

        let destination = parse_address(destination, self.network)?;
        let source = parse_address(source_address, self.network)?;

        let inputs = utxos
            .iter()
            .map(|utxo| {
                Ok(DraftInput {
                    locking_script: utxo.locking_script()?,
                    utxo: utxo.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let total_input = total_value(utxos);
        let fee = estimate_fee(inputs.len(), FEE_MODEL_OUTPUT_COUNT, self.fee_rate);

        let outputs = match mode {
            TransferMode::Amount(amount) => {
                // Saturates, so an unpayable fee is still a shortfall
                let needed = amount.saturating_add(fee);
                if total_input < needed {
                    return Err(TransferError::insufficient(needed, total_input));
                }
                let change = total_input - needed;

                let mut outputs = vec![DraftOutput {
                    script: destination.script_pubkey(),
                    value: amount,
                    is_change: false,
                }];
                // An exact spend leaves nothing to return
                if change > 0 {
                    outputs.push(DraftOutput {
                        script: source.script_pubkey(),
                        value: change,
                        is_change: true,
                    });
                }
                outputs
            }
            TransferMode::Sweep => {
                if total_input <= fee {
                    return Err(TransferError::insufficient(fee.saturating_add(1), total_input));
                }
                vec![DraftOutput {
                    script: destination.script_pubkey(),
                    value: total_input - fee,
                    is_change: false,
                }]
            }
        };

        let draft = TransactionDraft {
            inputs,
            outputs,
            fee,
            mode,
        };

        log::debug!(
            "Built draft: {} inputs ({} base units), {} outputs, fee {} at {}",
            draft.inputs.len(),
            total_input,
            draft.outputs.len(),
            fee,
            self.fee_rate
        );

        Ok(draft)
    }
}
