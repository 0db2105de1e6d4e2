//! Indexer Mock Server Library
//!
//! This crate provides both a standalone binary and library components
//! for mocking the ledger indexer API on top of an in-memory ledger.

pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use server::{create_router, run_server, MockServer};
pub use state::{LedgerError, MockLedger, ScriptLookup, MOCK_TIP_HEIGHT};
pub use types::*;
