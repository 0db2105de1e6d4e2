//! In-memory ledger backing the mock indexer
//!
//! Holds funded outputs per address plus knobs for injecting failures and
//! recorders that tests inspect after driving the transfer client.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::{Address, Transaction};
use thiserror::Error;

use crate::types::*;

/// Height reported for confirmed outputs
pub const MOCK_TIP_HEIGHT: u64 = 850_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("TX decode failed: {0}")]
    InvalidTransaction(String),

    #[error("Missing inputs: {0}")]
    MissingInputs(String),

    #[error("{0}")]
    Rejected(String),
}

/// Outcome of a script lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLookup {
    Found(String),
    Unknown,
    /// Injected via [`MockLedger::fail_script`]
    Failed,
}

#[derive(Debug, Clone)]
struct MockUtxo {
    txid: String,
    vout: u32,
    value: u64,
    confirmed: bool,
    spent: bool,
}

#[derive(Default)]
struct LedgerState {
    outputs: HashMap<String, Vec<MockUtxo>>,
    scripts: HashMap<(String, u32), String>,
    balance_overrides: HashMap<String, serde_json::Value>,
    failing_scripts: HashSet<(String, u32)>,
    failing_unspent: HashSet<String>,
    broadcast_rejection: Option<String>,
    broadcasts: Vec<String>,
    script_requests: Vec<ScriptRequest>,
    user_agents: Vec<String>,
    next_txid: u64,
}

impl LedgerState {
    fn generated_txid(&mut self) -> String {
        self.next_txid += 1;
        format!("{:064x}", self.next_txid)
    }
}

/// Shared handle to the ledger; clones see the same state
#[derive(Clone, Default)]
pub struct MockLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a confirmed output paying `address`
    pub fn fund(
        &self,
        address: &str,
        txid: &str,
        vout: u32,
        value: u64,
    ) -> Result<(), LedgerError> {
        let script_hex = script_hex_for(address)?;
        let mut state = self.state();
        state
            .scripts
            .insert((txid.to_string(), vout), script_hex);
        state
            .outputs
            .entry(address.to_string())
            .or_default()
            .push(MockUtxo {
                txid: txid.to_string(),
                vout,
                value,
                confirmed: true,
                spent: false,
            });
        Ok(())
    }

    /// Add a confirmed output with a generated txid; returns the txid
    pub fn fund_value(&self, address: &str, value: u64) -> Result<String, LedgerError> {
        let txid = self.state().generated_txid();
        self.fund(address, &txid, 0, value)?;
        Ok(txid)
    }

    pub fn load_fixture(&self, fixture: &Fixture) -> Result<(), LedgerError> {
        for entry in &fixture.addresses {
            for utxo in &entry.utxos {
                let txid = match &utxo.txid {
                    Some(txid) => txid.clone(),
                    None => self.state().generated_txid(),
                };
                self.fund(&entry.address, &txid, utxo.vout, utxo.value)?;
            }
            if let Some(balance) = entry.balance {
                self.set_balance(&entry.address, balance.confirmed, balance.unconfirmed);
            }
        }
        Ok(())
    }

    pub fn set_balance(&self, address: &str, confirmed: i64, unconfirmed: i64) {
        self.set_raw_balance(
            address,
            serde_json::json!({ "confirmed": confirmed, "unconfirmed": unconfirmed }),
        );
    }

    /// Serve `body` verbatim from the balance endpoint
    pub fn set_raw_balance(&self, address: &str, body: serde_json::Value) {
        self.state()
            .balance_overrides
            .insert(address.to_string(), body);
    }

    /// Serve `script_hex` for an outpoint instead of its real locking script
    pub fn override_script(&self, txid: &str, vout: u32, script_hex: &str) {
        self.state()
            .scripts
            .insert((txid.to_string(), vout), script_hex.to_string());
    }

    pub fn fail_script(&self, txid: &str, vout: u32) {
        self.state().failing_scripts.insert((txid.to_string(), vout));
    }

    pub fn fail_unspent(&self, address: &str) {
        self.state().failing_unspent.insert(address.to_string());
    }

    /// Reject every subsequent broadcast with `reason`
    pub fn reject_broadcasts(&self, reason: &str) {
        self.state().broadcast_rejection = Some(reason.to_string());
    }

    /// Confirm pending outputs and forget spent ones
    pub fn mine(&self) {
        let mut state = self.state();
        for utxos in state.outputs.values_mut() {
            utxos.retain(|u| !u.spent);
            for utxo in utxos.iter_mut() {
                utxo.confirmed = true;
            }
        }
    }

    pub fn balance(&self, address: &str) -> serde_json::Value {
        let state = self.state();
        if let Some(body) = state.balance_overrides.get(address) {
            return body.clone();
        }

        let mut confirmed: i64 = 0;
        let mut unconfirmed: i64 = 0;
        for utxo in state.outputs.get(address).into_iter().flatten() {
            match (utxo.confirmed, utxo.spent) {
                (true, false) => confirmed += utxo.value as i64,
                (true, true) => {
                    confirmed += utxo.value as i64;
                    unconfirmed -= utxo.value as i64;
                }
                (false, false) => unconfirmed += utxo.value as i64,
                (false, true) => {}
            }
        }

        serde_json::to_value(BalanceResponse {
            confirmed,
            unconfirmed,
        })
        .unwrap_or_default()
    }

    /// `None` when the address is configured to fail
    pub fn unspent(&self, address: &str) -> Option<Vec<UnspentEntry>> {
        let state = self.state();
        if state.failing_unspent.contains(address) {
            return None;
        }

        Some(
            state
                .outputs
                .get(address)
                .into_iter()
                .flatten()
                .filter(|u| !u.spent)
                .map(|u| UnspentEntry {
                    tx_hash: u.txid.clone(),
                    tx_pos: u.vout,
                    value: u.value,
                    height: if u.confirmed { MOCK_TIP_HEIGHT } else { 0 },
                })
                .collect(),
        )
    }

    /// Records the request before answering it
    pub fn script(&self, txid: &str, vout: u32) -> ScriptLookup {
        let mut state = self.state();
        state.script_requests.push(ScriptRequest {
            txid: txid.to_string(),
            vout,
            received_at: Instant::now(),
        });

        let key = (txid.to_string(), vout);
        if state.failing_scripts.contains(&key) {
            return ScriptLookup::Failed;
        }
        match state.scripts.get(&key) {
            Some(script) => ScriptLookup::Found(script.clone()),
            None => ScriptLookup::Unknown,
        }
    }

    /// Accept a raw transaction: spend its inputs and credit its outputs.
    ///
    /// Signatures are not checked.
    pub fn broadcast(
        &self,
        raw_hex: &str,
        network: bitcoin::Network,
    ) -> Result<String, LedgerError> {
        let tx: Transaction = deserialize_hex(raw_hex.trim())
            .map_err(|e| LedgerError::InvalidTransaction(e.to_string()))?;

        let mut state = self.state();
        if let Some(reason) = &state.broadcast_rejection {
            return Err(LedgerError::Rejected(reason.clone()));
        }

        let mut spending = Vec::with_capacity(tx.input.len());
        for input in &tx.input {
            let txid = input.previous_output.txid.to_string();
            let vout = input.previous_output.vout;
            let found = state.outputs.iter().find_map(|(address, utxos)| {
                utxos
                    .iter()
                    .position(|u| !u.spent && u.txid == txid && u.vout == vout)
                    .map(|idx| (address.clone(), idx))
            });
            match found {
                Some(location) => spending.push(location),
                None => {
                    return Err(LedgerError::MissingInputs(format!("{}:{}", txid, vout)));
                }
            }
        }

        for (address, idx) in spending {
            if let Some(utxo) = state.outputs.get_mut(&address).and_then(|u| u.get_mut(idx)) {
                utxo.spent = true;
            }
        }

        let txid = tx.compute_txid().to_string();
        for (vout, output) in tx.output.iter().enumerate() {
            let vout = vout as u32;
            state
                .scripts
                .insert((txid.clone(), vout), output.script_pubkey.to_hex_string());

            if let Ok(address) = Address::from_script(&output.script_pubkey, network) {
                state
                    .outputs
                    .entry(address.to_string())
                    .or_default()
                    .push(MockUtxo {
                        txid: txid.clone(),
                        vout,
                        value: output.value.to_sat(),
                        confirmed: false,
                        spent: false,
                    });
            }
        }

        state.broadcasts.push(raw_hex.trim().to_string());
        log::info!("Accepted transaction {} ({} inputs)", txid, tx.input.len());
        Ok(txid)
    }

    pub fn record_user_agent(&self, user_agent: &str) {
        self.state().user_agents.push(user_agent.to_string());
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state().broadcasts.clone()
    }

    pub fn script_requests(&self) -> Vec<ScriptRequest> {
        self.state().script_requests.clone()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.state().user_agents.clone()
    }

    /// Total requests of any kind seen so far
    pub fn request_count(&self) -> usize {
        self.state().user_agents.len()
    }
}

fn script_hex_for(address: &str) -> Result<String, LedgerError> {
    let address = Address::from_str(address)
        .map_err(|e| LedgerError::InvalidAddress(format!("{}: {}", address, e)))?
        .assume_checked();
    Ok(address.script_pubkey().to_hex_string())
}
