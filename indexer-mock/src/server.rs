//! Axum HTTP server setup and routing

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;
use crate::state::MockLedger;

pub fn create_router(ledger: MockLedger) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Address endpoints
        .route("/:network/address/:address/balance", get(get_address_balance))
        .route("/:network/address/:address/unspent", get(get_address_unspent))
        // Transaction endpoints
        .route("/:network/tx/:txid/out/:vout/hex", get(get_output_script))
        .route("/:network/tx/raw", post(broadcast_transaction))
        // Test helper endpoints
        .route("/:network/mine", post(mine))
        .layer(middleware::from_fn_with_state(ledger.clone(), record_user_agent))
        .with_state(ledger)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(ledger: MockLedger, host: String, port: u16) -> anyhow::Result<()> {
    let app = create_router(ledger);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Indexer mock listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// A mock bound to an ephemeral local port
pub struct MockServer {
    pub base_url: String,
    pub ledger: MockLedger,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Bind 127.0.0.1:0 and serve `ledger` in the background
    pub async fn spawn(ledger: MockLedger) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = create_router(ledger.clone());

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("Indexer mock stopped: {}", e);
            }
        });

        log::debug!("Indexer mock serving on {}", addr);

        Ok(Self {
            base_url: format!("http://{}", addr),
            ledger,
            task,
        })
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
