//! # Market Engine
//!
//! Settlement core for a points-based collectibles marketplace: a ledger of
//! user points, a registry of numbered collectible instances, listings and
//! offers, and the settlement engine that moves ownership and funds between
//! buyer, seller, creator and platform.
//!
//! ## Quick Start
//! ```bash
//! cargo run --bin market-engine
//! ```
//!
//! ## Endpoints
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET|POST /listings`, `GET|DELETE /listings/{id}`
//! - `POST /listings/{id}/purchase` - Buy a listing
//! - `POST /offers`, `POST /offers/{id}/accept|reject|cancel`
//! - `GET /trades/{id}`, `GET /accounts/me`

pub mod clock;
pub mod config;
mod error;
pub mod events;
mod handlers;
pub mod jobs;
mod ledger;
mod listing;
pub mod lock;
mod market;
pub mod metrics;
pub mod middleware;
pub mod models;
mod offer;
mod persistence;
mod platform;
mod registry;
mod response;
mod router;
mod settlement;
mod state;
mod store;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::MarketError;
pub use ledger::AirdropBatch;
pub use market::{Market, MarketSettings};
pub use router::create as create_router;
pub use settlement::ReconcileReport;
pub use state::AppState;
pub use store::Store;
