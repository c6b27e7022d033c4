//! Prometheus metrics (lock-free atomics).

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- Settlement ---
    pub trades_reserved: AtomicU64,
    pub trades_completed: AtomicU64,
    pub trades_stuck: AtomicU64,
    pub trade_conflicts: AtomicU64,

    // --- Locks ---
    pub locks_acquired: AtomicU64,
    pub locks_busy: AtomicU64,
    pub lock_release_failures: AtomicU64,

    // --- Offers ---
    pub offers_created: AtomicU64,
    pub offers_accepted: AtomicU64,
    pub offers_rejected: AtomicU64,
    pub offers_cancelled: AtomicU64,
    pub offers_expired: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            trades_reserved: AtomicU64::new(0),
            trades_completed: AtomicU64::new(0),
            trades_stuck: AtomicU64::new(0),
            trade_conflicts: AtomicU64::new(0),
            locks_acquired: AtomicU64::new(0),
            locks_busy: AtomicU64::new(0),
            lock_release_failures: AtomicU64::new(0),
            offers_created: AtomicU64::new(0),
            offers_accepted: AtomicU64::new(0),
            offers_rejected: AtomicU64::new(0),
            offers_cancelled: AtomicU64::new(0),
            offers_expired: AtomicU64::new(0),
        }
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self, uptime_secs: u64, pending_trades: usize) -> String {
        let counters: [(&str, &str, &AtomicU64); 12] = [
            ("market_trades_reserved_total", "Trades reserved under lock.", &self.trades_reserved),
            ("market_trades_completed_total", "Trades whose payment completed.", &self.trades_completed),
            ("market_trades_stuck_total", "Payment completion failures left pending.", &self.trades_stuck),
            ("market_trade_conflicts_total", "Purchases that lost the re-validation race.", &self.trade_conflicts),
            ("market_locks_acquired_total", "Instance locks acquired.", &self.locks_acquired),
            ("market_locks_busy_total", "Lock acquisitions that exhausted their retries.", &self.locks_busy),
            ("market_lock_release_failures_total", "Lock releases that failed or found a foreign token.", &self.lock_release_failures),
            ("market_offers_created_total", "Offers created.", &self.offers_created),
            ("market_offers_accepted_total", "Offers accepted.", &self.offers_accepted),
            ("market_offers_rejected_total", "Offers rejected by the owner.", &self.offers_rejected),
            ("market_offers_cancelled_total", "Offers cancelled by the buyer.", &self.offers_cancelled),
            ("market_offers_expired_total", "Offers expired.", &self.offers_expired),
        ];

        let mut out = String::new();
        for (name, help, counter) in counters {
            let value = counter.load(Ordering::Relaxed);
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "\
# HELP market_pending_trades Trades currently awaiting payment completion.\n\
# TYPE market_pending_trades gauge\n\
market_pending_trades {pending_trades}\n\
# HELP market_uptime_seconds Seconds since process start.\n\
# TYPE market_uptime_seconds gauge\n\
market_uptime_seconds {uptime_secs}\n"
        ));
        out
    }
}
