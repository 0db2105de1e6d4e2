//! Ledger network selection and explorer links

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TransferError;

/// The two ledgers the indexer serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Test,
}

impl Network {
    /// Path segment used by the indexer API (`main` / `test`)
    pub fn api_segment(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
        }
    }

    /// Address/WIF version family for the `bitcoin` crate.
    ///
    /// BSV P2PKH addresses share their version bytes with Bitcoin's
    /// mainnet (0x00) and testnet (0x6f).
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Main => bitcoin::Network::Bitcoin,
            Network::Test => bitcoin::Network::Testnet,
        }
    }

    pub fn explorer_base_url(&self) -> &'static str {
        match self {
            Network::Main => "https://whatsonchain.com",
            Network::Test => "https://test.whatsonchain.com",
        }
    }

    pub fn address_explorer_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer_base_url(), address)
    }

    pub fn tx_explorer_url(&self, txid: &str) -> String {
        format!("{}/tx/{}", self.explorer_base_url(), txid)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_segment())
    }
}

impl FromStr for Network {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            other => Err(TransferError::InvalidRequest(format!(
                "unknown network '{}', expected main or test",
                other
            ))),
        }
    }
}
