//! # LogWriter: renders runtime events through `tracing`
//!
//! A reference subscriber that forwards every [`Event`] to the `tracing`
//! pipeline with structured fields. Failures and stale tasks are emitted at
//! `warn`/`error`, routine lifecycle at `info`/`debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  module loaded module="moderation.ban" tier=10 duration_ms=12
//! WARN  slow module load module="levels.xp" duration_ms=1830
//! WARN  task stale module="levels.xp" task_id=4 category="decay" idle_ms=300000
//! ERROR module failed module="core.db" reason="setup failed: refused"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let module = e.module.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::StateChanged => {
                info!(state = ?e.state, "lifecycle state changed");
            }
            EventKind::PlanReady => {
                info!(modules = ?e.count, tiers = ?e.tier, "execution plan ready");
            }
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllRetiredWithin => info!("all tasks retired within timeout"),
            EventKind::ShutdownTimeout => {
                warn!(abandoned = ?e.count, timeout_ms = ?e.duration_ms, "shutdown timeout exceeded");
            }
            EventKind::ModuleLoading => debug!(module, tier = ?e.tier, "module loading"),
            EventKind::ModuleLoaded => {
                info!(module, tier = ?e.tier, duration_ms = ?e.duration_ms, "module loaded");
            }
            EventKind::ModuleSkipped => warn!(module, reason, "module skipped"),
            EventKind::ModuleFailed => error!(module, reason, "module failed"),
            EventKind::SlowLoad => warn!(module, duration_ms = ?e.duration_ms, "slow module load"),
            EventKind::ModuleUnloaded => info!(module, "module unloaded"),
            EventKind::TaskRegistered | EventKind::TaskRetired => {
                debug!(kind = ?e.kind, module, task_id = ?e.task_id, category = ?e.category, "task");
            }
            EventKind::TaskStale => {
                warn!(
                    module,
                    task_id = ?e.task_id,
                    category = ?e.category,
                    idle_ms = ?e.duration_ms,
                    "task stale"
                );
            }
            EventKind::TaskAbandoned => {
                warn!(module, task_id = ?e.task_id, category = ?e.category, "task abandoned");
            }
            EventKind::ProbeCompleted => {
                let counts = e.probe.unwrap_or_default();
                debug!(
                    healthy = counts.healthy,
                    stale = counts.stale,
                    unknown = counts.unknown,
                    "probe completed"
                );
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!(subscriber = module, reason, "subscriber problem");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
