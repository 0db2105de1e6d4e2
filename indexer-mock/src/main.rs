//! Indexer Mock Server
//!
//! A lightweight stand-in for the public ledger indexer, serving balances,
//! unspent outputs, locking scripts and broadcasts from an in-memory ledger.
//! Designed for local testing and development.

use anyhow::{Context, Result};
use std::env;

use indexer_mock::{run_server, Fixture, MockLedger};

#[derive(Debug)]
struct Config {
    // Optional JSON ledger to preload
    fixture_path: Option<String>,

    // Server
    server_host: String,
    server_port: u16,
}

impl Config {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let fixture_path = env::var("INDEXER_MOCK_FIXTURE").ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("Invalid SERVER_PORT")?;

        Ok(Self {
            fixture_path,
            server_host,
            server_port,
        })
    }
}

fn load_fixture(ledger: &MockLedger, path: &str) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path))?;
    let fixture: Fixture = serde_json::from_str(&raw).context("Malformed fixture")?;
    ledger.load_fixture(&fixture)?;

    log::info!("Loaded {} funded addresses from {}", fixture.addresses.len(), path);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Indexer Mock Server...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    log::info!(
        "Server will listen on {}:{}",
        config.server_host,
        config.server_port
    );

    let ledger = MockLedger::new();
    if let Some(path) = &config.fixture_path {
        load_fixture(&ledger, path)?;
    }

    // Run server
    run_server(ledger, config.server_host, config.server_port)
        .await
        .context("Server error")?;

    Ok(())
}
