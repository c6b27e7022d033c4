//! Response envelopes for the HTTP API.

use axum::Json;
use serde::Serialize;

/// Success envelope. Errors use the `MarketError` body instead.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub lock_backend: &'static str,
    pub uptime_secs: u64,
    pub requests: u64,
    pub pending_trades: usize,
}
