//! Keyshard Transfer: threshold-key custody transfers over a public UTXO indexer
//!
//! This crate builds, signs and broadcasts pay-to-public-key-hash transfers
//! for a single source address whose private key is reconstructed from
//! threshold shares immediately before signing.
//!
//! # Architecture
//!
//! - **Indexer client**: balance, unspent outputs, locking scripts and raw
//!   transaction submission over HTTP
//! - **UTXO enrichment**: rate-limited batches of script lookups
//! - **Transaction builder**: fixed-amount and sweep transfers with a
//!   size-based fee model
//! - **Key manager**: address derivation and FORKID signing behind a trait
//! - **Orchestrator**: the sequential validate → fetch → build → sign →
//!   broadcast pipeline
//!
//! # Example
//!
//! ```ignore
//! use keyshard_transfer::{
//!     FeeRate, IndexerConfig, Network, Secp256k1KeyManager, SourceKey, TransferMode,
//!     TransferOrchestrator, TransferRequest,
//! };
//!
//! let config = IndexerConfig::from_env();
//! let keys = Secp256k1KeyManager::with_rng(&mut rand::thread_rng());
//! let orchestrator = TransferOrchestrator::new(&config, keys)?;
//!
//! let result = orchestrator
//!     .transfer(TransferRequest {
//!         source_key: SourceKey::parse(&wif, Network::Main)?,
//!         destination: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_string(),
//!         mode: TransferMode::Amount(30_000),
//!         network: Network::Main,
//!         fee_rate: FeeRate::NORMAL,
//!     })
//!     .await?;
//! println!("{}", result.txid);
//! ```

// Public modules
pub mod balance;
pub mod broadcast;
pub mod builder;
pub mod config;
pub mod error;
pub mod fees;
pub mod indexer;
pub mod keys;
pub mod network;
pub mod poller;
pub mod signer;
pub mod transfer;
pub mod utxo;

// Re-exports for convenience
pub use balance::{
    base_units_to_coins, coins_to_base_units, format_coins, BalanceAggregator, BalanceSnapshot,
    BASE_UNITS_PER_COIN,
};
pub use broadcast::Broadcaster;
pub use builder::{
    parse_address, DraftInput, DraftOutput, TransactionBuilder, TransactionDraft, TransferMode,
    FEE_MODEL_OUTPUT_COUNT,
};
pub use config::IndexerConfig;
pub use error::TransferError;
pub use fees::{estimate_fee, estimate_size, FeeRate, FeeSpeed};
pub use indexer::IndexerClient;
pub use keys::{KeyManager, Secp256k1KeyManager, ShareReconstructor, SourceKey};
pub use network::Network;
pub use poller::{BalancePoller, PollHandle, DEFAULT_POLL_INTERVAL};
pub use signer::{verify_input, SignedTransaction, SIGHASH_ALL_FORKID};
pub use transfer::{TransferOrchestrator, TransferQuote, TransferRequest, TransferResult};
pub use utxo::{Utxo, UtxoProvider};

// Common result type
pub type Result<T> = std::result::Result<T, TransferError>;
