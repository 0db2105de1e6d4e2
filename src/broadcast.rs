//! Raw transaction submission

use serde_json::{json, Value};

use crate::error::TransferError;
use crate::indexer::IndexerClient;
use crate::network::Network;
use crate::Result;

#[derive(Clone, Debug)]
pub struct Broadcaster {
    indexer: IndexerClient,
}

impl Broadcaster {
    pub fn new(indexer: IndexerClient) -> Self {
        Self { indexer }
    }

    /// Broadcast a signed transaction to the network and return the transaction ID.
    ///
    /// A non-success response becomes `Broadcast` carrying the indexer's
    /// rejection text (fee too low, double spend, malformed, ...).
    pub async fn broadcast(&self, network: Network, raw_tx_hex: &str) -> Result<String> {
        log::debug!("Broadcasting {} byte transaction", raw_tx_hex.len() / 2);

        let response = self
            .indexer
            .post_json(network, "tx/raw", &json!({ "txhex": raw_tx_hex }))
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = body.trim();
            return Err(TransferError::Broadcast(if reason.is_empty() {
                format!("indexer answered {}", status)
            } else {
                format!("{} ({})", reason.trim_matches('"'), status)
            }));
        }

        parse_txid(&body)
    }
}

/// The indexer answers either `{"txid": "..."}` or a bare (possibly quoted) id
fn parse_txid(body: &str) -> Result<String> {
    let txid = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("txid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                TransferError::network(format!("Broadcast response has no txid: {}", body))
            })?,
        Ok(Value::String(txid)) => txid,
        _ => body.trim().to_string(),
    };

    if txid.is_empty() {
        return Err(TransferError::network("Broadcast response was empty"));
    }
    Ok(txid)
}
