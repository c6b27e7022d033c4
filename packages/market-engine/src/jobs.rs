//! Periodic maintenance: offer expiry sweep and stuck-trade reconciliation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::market::Market;

pub fn spawn_background_jobs(
    market: Arc<Market>,
    config: &Config,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let sweep_every = Duration::from_secs(config.offer_sweep_interval_secs.max(1));
    let reconcile_every = Duration::from_secs(config.reconcile_interval_secs.max(1));

    let sweeper = {
        let market = Arc::clone(&market);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_every(sweep_every, cancel, "offer expiry sweep", move || {
                market.expire_offers();
            })
            .await
        })
    };

    let reconciler = tokio::spawn(async move {
        run_every(reconcile_every, cancel, "trade reconciliation", move || {
            market.reconcile_pending_trades();
        })
        .await
    });

    vec![sweeper, reconciler]
}

async fn run_every(
    period: Duration,
    cancel: CancellationToken,
    name: &'static str,
    mut job: impl FnMut() + Send,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(job = name, period_secs = period.as_secs(), "Background job started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(job = name, "Background job stopped");
                return;
            }
            _ = ticker.tick() => job(),
        }
    }
}
