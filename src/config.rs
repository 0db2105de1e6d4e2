//! Indexer configuration from environment variables
//!
//! Controls which ledger network is used, where the remote indexer lives and
//! how aggressively the engine talks to it. Defaults to mainnet against
//! WhatsOnChain.

use std::env;
use std::time::Duration;

use crate::network::Network;

pub const DEFAULT_INDEXER_URL: &str = "https://api.whatsonchain.com/v1/bsv";
pub const DEFAULT_CLIENT_ID: &str = "keyshard-transfer";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENRICHMENT_BATCH_SIZE: usize = 5;
pub const DEFAULT_ENRICHMENT_BATCH_DELAY: Duration = Duration::from_millis(120);

#[derive(Clone, Debug)]
pub struct IndexerConfig {
    pub network: Network,
    /// Indexer API root; the network segment is appended per request
    pub base_url: String,
    /// Sent as the `User-Agent` header on every request
    pub client_id: String,
    pub request_timeout: Duration,
    /// Script lookups issued per enrichment batch
    pub enrichment_batch_size: usize,
    /// Pause between enrichment batches
    pub enrichment_batch_delay: Duration,
}

impl IndexerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `INDEXER_NETWORK`: "main" (default) or "test"
    /// - `INDEXER_URL`: indexer API root (default: WhatsOnChain)
    /// - `INDEXER_CLIENT_ID`: client identifier header value
    /// - `INDEXER_TIMEOUT_SECS`: per-request timeout in seconds
    ///
    /// # Examples
    ///
    /// ```bash
    /// # Testnet against a local mock indexer
    /// INDEXER_NETWORK=test INDEXER_URL=http://localhost:3000 keyshard-cli balance --address mxyz...
    /// ```
    pub fn from_env() -> Self {
        let network = match env::var("INDEXER_NETWORK") {
            Ok(value) => match value.parse::<Network>() {
                Ok(network) => network,
                Err(_) => {
                    log::warn!("Unknown network '{}', defaulting to main", value);
                    Network::Main
                }
            },
            Err(_) => Network::Main,
        };
        log::info!("Using {} network", network);

        let base_url = env::var("INDEXER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_INDEXER_URL.to_string());
        log::info!("Indexer URL: {}", base_url);

        let client_id =
            env::var("INDEXER_CLIENT_ID").unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string());

        let timeout_secs = match env::var("INDEXER_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!(
                    "Invalid INDEXER_TIMEOUT_SECS '{}', using {}s",
                    raw,
                    DEFAULT_TIMEOUT_SECS
                );
                DEFAULT_TIMEOUT_SECS
            }),
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Self {
            network,
            base_url,
            client_id,
            request_timeout: Duration::from_secs(timeout_secs),
            ..Default::default()
        }
    }

    /// Same settings pointed at another indexer root (used by tests and the mock)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.enrichment_batch_delay = delay;
        self
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            network: Network::Main,
            base_url: DEFAULT_INDEXER_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            enrichment_batch_size: DEFAULT_ENRICHMENT_BATCH_SIZE,
            enrichment_batch_delay: DEFAULT_ENRICHMENT_BATCH_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_mainnet_whatsonchain() {
        let config = IndexerConfig::default();
        assert_eq!(config.network, Network::Main);
        assert_eq!(config.base_url, DEFAULT_INDEXER_URL);
        assert_eq!(config.enrichment_batch_size, 5);
        assert_eq!(config.enrichment_batch_delay, Duration::from_millis(120));
    }

    #[test]
    fn test_with_base_url_trims_trailing_slash() {
        let config = IndexerConfig::default()
            .with_base_url("http://127.0.0.1:3000/")
            .with_network(Network::Test);
        assert_eq!(config.base_url, "http://127.0.0.1:3000");
        assert_eq!(config.network, Network::Test);
    }
}
