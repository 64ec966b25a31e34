use std::sync::Arc;

use chrono::{Duration, Utc};
use gondola_booking::BookingDesk;
use gondola_core::Store;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Periodically release unpaid bookings older than `pending_hold` and drop
/// expired sessions. Runs until the process exits.
pub async fn start_expiry_worker(
    desk: Arc<BookingDesk>,
    store: Arc<dyn Store>,
    pending_hold: Duration,
    every: std::time::Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Expiry worker started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        run_sweep(&desk, store.as_ref(), pending_hold).await;
    }
}

/// One pass of the sweep; errors are logged and retried on the next tick.
pub async fn run_sweep(desk: &BookingDesk, store: &dyn Store, pending_hold: Duration) {
    let now = Utc::now();

    match desk.expire_stale(now - pending_hold).await {
        Ok(0) => {}
        Ok(released) => info!("Released {} stale pending bookings", released),
        Err(e) => error!("Pending booking sweep failed: {}", e),
    }

    match store.purge_expired_sessions(now).await {
        Ok(0) => {}
        Ok(purged) => info!("Purged {} expired sessions", purged),
        Err(e) => error!("Session purge failed: {}", e),
    }
}
