//! # Runtime events emitted by the coordinator, loader, and task registry.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: coordinator state transitions and shutdown progress
//! - **Module events**: per-module load outcomes (loaded, skipped, failed, slow)
//! - **Task events**: background task registration, retirement, health probing
//! - **Subscriber events**: problems delivering events to subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, module name,
//! task id, reasons, and durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use modvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SlowLoad)
//!     .with_module("moderation.ban")
//!     .with_duration(Duration::from_millis(1500));
//!
//! assert_eq!(ev.kind, EventKind::SlowLoad);
//! assert_eq!(ev.module.as_deref(), Some("moderation.ban"));
//! assert_eq!(ev.duration_ms, Some(1500));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::LifecycleState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `module`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `module`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    // === Lifecycle events ===
    /// Coordinator moved to a new state.
    ///
    /// Sets:
    /// - `state`: the new state
    StateChanged,

    /// Discovery and planning finished.
    ///
    /// Sets:
    /// - `count`: number of descriptors discovered
    /// - `tier`: number of tiers in the plan
    PlanReady,

    /// Shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// Every registered task retired within the shutdown timeout.
    AllRetiredWithin,

    /// Shutdown timeout elapsed with tasks still registered.
    ///
    /// Sets:
    /// - `count`: number of abandoned tasks
    /// - `duration_ms`: the timeout
    ShutdownTimeout,

    // === Module events ===
    /// A module's entry point is about to run.
    ///
    /// Sets:
    /// - `module`: qualified name
    /// - `tier`: priority tier
    ModuleLoading,

    /// Entry point returned successfully.
    ///
    /// Sets:
    /// - `module`, `tier`
    /// - `duration_ms`: load time
    ModuleLoaded,

    /// Module declined to load (missing configuration) or was a duplicate.
    ///
    /// Sets:
    /// - `module`
    /// - `reason`: skip reason
    ModuleSkipped,

    /// Entry point failed unexpectedly; the loading pass is aborted.
    ///
    /// Sets:
    /// - `module`
    /// - `reason`: failure message with error chain
    ModuleFailed,

    /// Load completed but exceeded the slow-load threshold (advisory).
    ///
    /// Sets:
    /// - `module`
    /// - `duration_ms`: load time
    SlowLoad,

    /// Module was unloaded (teardown ran, tasks retired).
    ///
    /// Sets:
    /// - `module`
    ModuleUnloaded,

    // === Task events ===
    /// Background task registered.
    ///
    /// Sets:
    /// - `module`: owner
    /// - `task_id`, `category`
    TaskRegistered,

    /// Background task retired (completed, cancelled, or owner unloaded).
    ///
    /// Sets:
    /// - `module`, `task_id`, `category`
    TaskRetired,

    /// Task has not heartbeated within the stale window (advisory, never cancelled).
    ///
    /// Sets:
    /// - `module`, `task_id`, `category`
    /// - `duration_ms`: time since the last heartbeat (or start)
    TaskStale,

    /// Task did not retire before the cancellation deadline and was dropped from the registry.
    ///
    /// Sets:
    /// - `module`, `task_id`, `category`
    TaskAbandoned,

    /// Health probe finished.
    ///
    /// Sets:
    /// - `probe`: aggregated counts
    ProbeCompleted,
}

/// Aggregated health counts reported by one probe pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeCounts {
    /// Heartbeat seen within the stale window.
    pub healthy: usize,
    /// No heartbeat (or start) within the stale window.
    pub stale: usize,
    /// Never heartbeated, still inside the stale window.
    pub unknown: usize,
}

impl ProbeCounts {
    /// Total number of tasks probed.
    pub fn total(&self) -> usize {
        self.healthy + self.stale + self.unknown
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Qualified module name (or subscriber name for subscriber events).
    pub module: Option<Arc<str>>,
    /// Background task id, if applicable.
    pub task_id: Option<u64>,
    /// Background task category, if applicable.
    pub category: Option<Arc<str>>,
    /// Human-readable reason (errors, skip causes, overflow details).
    pub reason: Option<Arc<str>>,
    /// Duration in milliseconds (load time, staleness, timeout).
    pub duration_ms: Option<u32>,
    /// Priority tier (or tier count for `PlanReady`).
    pub tier: Option<i32>,
    /// Generic counter (descriptor count, abandoned tasks).
    pub count: Option<usize>,
    /// Coordinator state for `StateChanged`.
    pub state: Option<LifecycleState>,
    /// Aggregated counts for `ProbeCompleted`.
    pub probe: Option<ProbeCounts>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            module: None,
            task_id: None,
            category: None,
            reason: None,
            duration_ms: None,
            tier: None,
            count: None,
            state: None,
            probe: None,
        }
    }

    /// Attaches a module name.
    #[inline]
    pub fn with_module(mut self, module: impl Into<Arc<str>>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Attaches a task id and category.
    #[inline]
    pub fn with_task(mut self, id: u64, category: impl Into<Arc<str>>) -> Self {
        self.task_id = Some(id);
        self.category = Some(category.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.duration_ms = Some(ms);
        self
    }

    /// Attaches a priority tier.
    #[inline]
    pub fn with_tier(mut self, tier: i32) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Attaches a generic count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a lifecycle state.
    #[inline]
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches probe counts.
    #[inline]
    pub fn with_probe(mut self, counts: ProbeCounts) -> Self {
        self.probe = Some(counts);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_module(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_module(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::ModuleLoading);
        let b = Event::new(EventKind::ModuleLoaded);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn duration_saturates_at_u32() {
        let ev = Event::new(EventKind::SlowLoad).with_duration(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.duration_ms, Some(u32::MAX));
    }
}
