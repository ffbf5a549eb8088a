use std::sync::Arc;

use rapd_core::Record;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Registrar;

/// Register once, then refresh on `registrar.config().interval` until `token` is cancelled.
///
/// Store failures are logged and the next tick tries again; the entry simply lapses while the
/// store is away.
pub fn heartbeat(registrar: Arc<Registrar>, custom: Record, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = registrar.register(custom.clone()).await {
            warn!(target: "rapd.overwatch.heartbeat", error = %e, "register failed");
        }

        let period = registrar.config().interval;
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(target: "rapd.overwatch.heartbeat", id = %registrar.id(), "stopped");
                    break;
                }
                _ = ticks.tick() => {
                    if let Err(e) = registrar.update(custom.clone()).await {
                        warn!(target: "rapd.overwatch.heartbeat", error = %e, "update failed");
                    }
                }
            }
        }
    })
}
