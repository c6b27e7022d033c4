//! Application state shared across handlers.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use crate::market::Market;

pub struct AppState {
    pub market: Arc<Market>,
    pub start_time: Instant,
    pub request_count: AtomicU64,
}

impl AppState {
    pub fn new(market: Arc<Market>) -> Self {
        Self {
            market,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }
}
