//! Common test utilities for transfer integration tests
//!
//! Every test gets its own in-process indexer mock on an ephemeral port and
//! a configuration pointing the client at it.

#![allow(dead_code)]

use std::time::Duration;

use indexer_mock::{MockLedger, MockServer};
use keyshard_transfer::{
    IndexerConfig, Network, Secp256k1KeyManager, SourceKey, TransferOrchestrator,
};

/// Private key 1 and its compressed mainnet P2PKH address
pub const SOURCE_WIF: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
pub const SOURCE_ADDRESS: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
pub const DESTINATION: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

pub const TEST_CLIENT_ID: &str = "keyshard-transfer-tests";

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// Running mock plus a config aimed at it
pub struct TestEnvironment {
    pub server: MockServer,
    pub config: IndexerConfig,
}

impl TestEnvironment {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_batch_delay(Duration::from_millis(10)).await
    }

    pub async fn with_batch_delay(delay: Duration) -> anyhow::Result<Self> {
        init_logging();

        let server = MockServer::spawn(MockLedger::new()).await?;
        log::info!("Mock indexer at {}", server.base_url);

        let mut config = IndexerConfig::default()
            .with_base_url(server.base_url.clone())
            .with_network(Network::Main)
            .with_batch_delay(delay);
        config.client_id = TEST_CLIENT_ID.to_string();
        config.request_timeout = Duration::from_secs(5);

        Ok(Self { server, config })
    }

    pub fn ledger(&self) -> &MockLedger {
        &self.server.ledger
    }

    pub fn orchestrator(&self) -> anyhow::Result<TransferOrchestrator<Secp256k1KeyManager>> {
        Ok(TransferOrchestrator::new(&self.config, key_manager())?)
    }
}

pub fn key_manager() -> Secp256k1KeyManager {
    Secp256k1KeyManager::with_rng(&mut bitcoin::secp256k1::rand::thread_rng())
}

pub fn source_key() -> SourceKey {
    SourceKey::parse(SOURCE_WIF, Network::Main).unwrap()
}
