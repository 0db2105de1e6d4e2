//! HTTP access to the remote ledger indexer
//!
//! Thin wrapper over `reqwest` shared by the UTXO provider, the balance
//! aggregator and the broadcaster. Every request carries the configured
//! client identifier as its `User-Agent` and is addressed as
//! `{base_url}/{main|test}/{path}`.

use serde::de::DeserializeOwned;

use crate::config::IndexerConfig;
use crate::error::TransferError;
use crate::network::Network;
use crate::Result;

#[derive(Clone, Debug)]
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerClient {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.client_id.clone())
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, network: Network, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            network.api_segment(),
            path.trim_start_matches('/')
        )
    }

    /// GET a JSON document; any non-success status is a `Network` error
    pub async fn get_json<T: DeserializeOwned>(&self, network: Network, path: &str) -> Result<T> {
        let response = self.get(network, path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TransferError::network(format!("Malformed response from {}: {}", path, e)))
    }

    /// GET a plain-text body (the script-hex endpoint is not JSON)
    pub async fn get_text(&self, network: Network, path: &str) -> Result<String> {
        let response = self.get(network, path).await?;
        let text = response.text().await?;
        Ok(text.trim().trim_matches('"').to_string())
    }

    /// POST a JSON body and hand back the raw response, whatever its status.
    ///
    /// Callers decide how to classify a rejection.
    pub async fn post_json(
        &self,
        network: Network,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let url = self.url(network, path);
        log::debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        Ok(response)
    }

    async fn get(&self, network: Network, path: &str) -> Result<reqwest::Response> {
        let url = self.url(network, path);
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::network(format!(
                "GET {} failed with status {}: {}",
                path,
                status,
                body.trim()
            )));
        }

        Ok(response)
    }
}
