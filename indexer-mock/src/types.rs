//! Indexer API wire types
//!
//! Shapes match the public indexer so the transfer client consumes them unchanged.

use serde::{Deserialize, Serialize};

/// Body of GET /{network}/address/{address}/balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

/// Element of GET /{network}/address/{address}/unspent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentEntry {
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
    /// Zero while unconfirmed
    pub height: u64,
}

/// Body of POST /{network}/tx/raw
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub txhex: String,
}

/// A script lookup as seen by the server, in arrival order
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub txid: String,
    pub vout: u32,
    pub received_at: std::time::Instant,
}

/// Startup ledger contents loaded from `INDEXER_MOCK_FIXTURE`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub addresses: Vec<FixtureAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureAddress {
    pub address: String,
    #[serde(default)]
    pub utxos: Vec<FixtureUtxo>,
    /// Overrides the balance computed from `utxos`
    #[serde(default)]
    pub balance: Option<BalanceResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureUtxo {
    /// Generated when omitted
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: u32,
    pub value: u64,
}
