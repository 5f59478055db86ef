//! Periodic health probe over the task registry.
//!
//! Runs while the coordinator is `Ready`. Each tick classifies every handle and
//! reports stale ones; nothing is cancelled from here.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::TaskRegistry;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Probes `registry` every `interval` until `shutdown` is cancelled.
pub async fn run(registry: Arc<TaskRegistry>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = time::interval(interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                registry.probe();
            }
        }
    }
    debug!("probe loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Bus, EventKind};

    #[tokio::test(start_paused = true)]
    async fn probes_on_every_interval_until_cancelled() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let reg = TaskRegistry::new(bus.clone(), Duration::from_secs(300));
        let token = CancellationToken::new();

        let join = tokio::spawn(run(Arc::clone(&reg), Duration::from_secs(60), token.clone()));

        tokio::time::sleep(Duration::from_secs(181)).await;
        token.cancel();
        join.await.unwrap();

        let mut probes = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ProbeCompleted {
                probes += 1;
            }
        }
        assert_eq!(probes, 3);
    }
}
