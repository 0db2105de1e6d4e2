//! Error types for transfer operations
//!
//! Every failure the engine can surface is classified locally into one of
//! these variants and handed to the caller verbatim. Nothing here is retried
//! automatically; re-fetching UTXOs after a stale-input rejection is the
//! caller's decision.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Destination (or derived source) address is not a P2PKH address for the network
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The source address holds no spendable outputs
    #[error("No funds: {0}")]
    NoFunds(String),

    #[error("Insufficient funds: need {needed} base units, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// Indexer unreachable, timed out, or answered with a non-success status
    #[error("Network error: {0}")]
    Network(String),

    #[error("Signing error: {0}")]
    Signing(String),

    /// The indexer rejected the raw transaction; carries its reason verbatim
    #[error("Broadcast rejected: {0}")]
    Broadcast(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key reconstruction failed: {0}")]
    Reconstruction(String),
}

impl TransferError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    pub fn insufficient(needed: u64, available: u64) -> Self {
        Self::InsufficientFunds { needed, available }
    }

    /// True for failures where re-running with a fresh UTXO snapshot may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Broadcast(_))
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}
