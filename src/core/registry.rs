//! # Task registry: background operations owned by loaded modules.
//!
//! Every long-lived operation a module starts is registered here and gets a
//! [`TaskHandle`]. The registry never runs or kills tasks itself; it tracks them,
//! classifies their health from heartbeats, and drives cooperative cancellation.
//!
//! ## Architecture
//! ```text
//! HostContext::spawn / register_task
//!         └─► TaskRegistry.register(owner, category, token) ─► TaskRegistered
//!
//! task completes ──► retire(handle) ─► TaskRetired ─► Notify waiters
//!
//! probe loop ──► probe() ─► snapshot ─► Healthy | Stale | Unknown
//!                               ├─► TaskStale (per stale handle, advisory)
//!                               └─► ProbeCompleted (counts)
//!
//! shutdown ──► cancel_all(timeout)
//!                 ├─► root token cancelled (late registrations are born cancelled)
//!                 ├─► every handle's token cancelled
//!                 ├─► wait for retirement until deadline
//!                 └─► leftovers removed and reported as TaskAbandoned
//! ```
//!
//! ## Rules
//! - Ids come from a monotonic counter and are never reused.
//! - A handle is *active* while present in the map and *retired* once removed;
//!   removal happens under the write lock, so no reader sees both.
//! - Readers take a point-in-time snapshot and never hold the lock across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, info, warn};

use crate::events::{Bus, Event, EventKind, ProbeCounts};
use crate::subscribers::panic_message;

/// Opaque, never-reused task identifier.
pub type TaskId = u64;

struct HandleInner {
    id: TaskId,
    owner: Arc<str>,
    category: Arc<str>,
    started_at: Instant,
    /// Micros since `started_at`, plus one; zero means "never".
    last_heartbeat: AtomicU64,
    cancel: CancellationToken,
}

/// Registry entry for one background operation.
///
/// Cheap to clone. Holding a handle does not keep the task registered; it is only
/// a reference for heartbeats and cancellation.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Qualified name of the owning module.
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn category(&self) -> &str {
        &self.inner.category
    }

    pub fn started_at(&self) -> Instant {
        self.inner.started_at
    }

    pub fn last_heartbeat_at(&self) -> Option<Instant> {
        match self.inner.last_heartbeat.load(Ordering::Acquire) {
            0 => None,
            v => Some(self.inner.started_at + Duration::from_micros(v - 1)),
        }
    }

    /// Records that the task is alive and making progress.
    pub fn heartbeat(&self) {
        let since = Instant::now().saturating_duration_since(self.inner.started_at);
        let micros = since.as_micros().min(u128::from(u64::MAX - 1)) as u64 + 1;
        self.inner.last_heartbeat.fetch_max(micros, Ordering::AcqRel);
    }

    /// Requests termination. Cooperative: the task must observe its token.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Completes once cancellation was requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.owner)
            .field("category", &self.inner.category)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Health verdict of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHealth {
    /// Heartbeat seen within the stale window.
    Healthy,
    /// Neither heartbeat nor start within the stale window.
    Stale,
    /// No heartbeat yet, but started within the stale window.
    Unknown,
}

/// One entry of a probe result.
#[derive(Debug, Clone)]
pub struct ProbedTask {
    pub handle: TaskHandle,
    pub health: TaskHealth,
    /// Time since the last heartbeat (or since start, if none).
    pub idle: Duration,
}

/// Outcome of [`TaskRegistry::cancel_all`].
#[derive(Debug, Clone, Default)]
pub struct CancellationReport {
    /// Handles that retired before the deadline.
    pub retired: usize,
    /// Handles still registered at the deadline; removed and reported.
    pub abandoned: Vec<TaskHandle>,
    pub elapsed: Duration,
}

impl CancellationReport {
    /// True if nothing had to be abandoned.
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty()
    }
}

/// Registry of active background tasks.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, TaskHandle>>,
    next_id: AtomicU64,
    retired: Notify,
    root: CancellationToken,
    bus: Bus,
    stale_window: Duration,
}

impl TaskRegistry {
    /// Creates a new registry. Tasks idle for `stale_window` are reported stale.
    pub fn new(bus: Bus, stale_window: Duration) -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            retired: Notify::new(),
            root: CancellationToken::new(),
            bus,
            stale_window,
        })
    }

    /// Registers an operation owned by `owner`; `cancel` is its termination capability.
    ///
    /// After [`TaskRegistry::cancel_all`] started, the token is cancelled immediately.
    pub fn register(&self, owner: &str, category: &str, cancel: CancellationToken) -> TaskHandle {
        let handle = TaskHandle {
            inner: Arc::new(HandleInner {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                owner: Arc::from(owner),
                category: Arc::from(category),
                started_at: Instant::now(),
                last_heartbeat: AtomicU64::new(0),
                cancel,
            }),
        };

        self.write().insert(handle.id(), handle.clone());
        if self.root.is_cancelled() {
            handle.cancel();
        }

        debug!(task_id = handle.id(), owner, category, "task registered");
        self.bus.publish(
            Event::new(EventKind::TaskRegistered)
                .with_module(owner)
                .with_task(handle.id(), category),
        );
        handle
    }

    /// Spawns `f` on the runtime and registers it; the handle retires when the
    /// future completes (or panics).
    pub fn spawn<F, Fut>(self: &Arc<Self>, owner: &str, category: &str, f: F) -> TaskHandle
    where
        F: FnOnce(TaskHandle) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.register(owner, category, self.root.child_token());
        let fut = f(handle.clone());
        let registry = Arc::clone(self);
        let own = handle.clone();

        tokio::spawn(async move {
            if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                error!(
                    task_id = own.id(),
                    owner = own.owner(),
                    category = own.category(),
                    panic = %panic_message(panic.as_ref()),
                    "background task panicked"
                );
            }
            registry.retire(&own);
        });
        handle
    }

    /// Removes `handle`. Returns `false` if it was already retired.
    pub fn retire(&self, handle: &TaskHandle) -> bool {
        let removed = self.write().remove(&handle.id()).is_some();
        if removed {
            self.publish_retired(handle);
            self.retired.notify_waiters();
        }
        removed
    }

    /// Cancels and retires every handle owned by `owner`, returning them.
    ///
    /// Used on unload: once this returns, no handle of `owner` is active, even if
    /// the underlying futures are still winding down.
    pub fn retire_owner(&self, owner: &str) -> Vec<TaskHandle> {
        let mut taken: Vec<TaskHandle> = {
            let mut tasks = self.write();
            let ids: Vec<TaskId> = tasks
                .values()
                .filter(|h| h.owner() == owner)
                .map(TaskHandle::id)
                .collect();
            ids.iter().filter_map(|id| tasks.remove(id)).collect()
        };
        taken.sort_unstable_by_key(TaskHandle::id);

        for handle in &taken {
            handle.cancel();
            self.publish_retired(handle);
        }
        if !taken.is_empty() {
            self.retired.notify_waiters();
        }
        taken
    }

    /// Active handles sorted by id.
    pub fn snapshot(&self) -> Vec<TaskHandle> {
        let mut all: Vec<TaskHandle> = self.read().values().cloned().collect();
        all.sort_unstable_by_key(TaskHandle::id);
        all
    }

    /// Active handles owned by `owner`, sorted by id.
    pub fn owned_by(&self, owner: &str) -> Vec<TaskHandle> {
        let mut owned: Vec<TaskHandle> = self
            .read()
            .values()
            .filter(|h| h.owner() == owner)
            .cloned()
            .collect();
        owned.sort_unstable_by_key(TaskHandle::id);
        owned
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Classifies every active handle and reports the result on the bus.
    ///
    /// Stale tasks are reported, never cancelled.
    pub fn probe(&self) -> Vec<ProbedTask> {
        let now = Instant::now();
        let probed: Vec<ProbedTask> = self
            .snapshot()
            .into_iter()
            .map(|handle| self.classify(handle, now))
            .collect();

        let mut counts = ProbeCounts::default();
        for p in &probed {
            match p.health {
                TaskHealth::Healthy => counts.healthy += 1,
                TaskHealth::Unknown => counts.unknown += 1,
                TaskHealth::Stale => {
                    counts.stale += 1;
                    warn!(
                        task_id = p.handle.id(),
                        owner = p.handle.owner(),
                        category = p.handle.category(),
                        idle_ms = p.idle.as_millis() as u64,
                        "task stale"
                    );
                    self.bus.publish(
                        Event::new(EventKind::TaskStale)
                            .with_module(p.handle.owner())
                            .with_task(p.handle.id(), p.handle.category())
                            .with_duration(p.idle),
                    );
                }
            }
        }

        debug!(
            healthy = counts.healthy,
            stale = counts.stale,
            unknown = counts.unknown,
            "task probe"
        );
        self.bus
            .publish(Event::new(EventKind::ProbeCompleted).with_probe(counts));
        probed
    }

    /// Cancels everything and waits up to `timeout` for retirement.
    ///
    /// Never blocks past `timeout`: handles still registered at the deadline are
    /// removed, reported as abandoned, and left running (cancellation is cooperative).
    pub async fn cancel_all(&self, timeout: Duration) -> CancellationReport {
        let started = Instant::now();
        let deadline = started + timeout;

        self.root.cancel();
        let initial = self.snapshot();
        for handle in &initial {
            handle.cancel();
        }

        loop {
            let notified = self.retired.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                break;
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        let mut abandoned: Vec<TaskHandle> = self.write().drain().map(|(_, h)| h).collect();
        abandoned.sort_unstable_by_key(TaskHandle::id);

        for handle in &abandoned {
            warn!(
                task_id = handle.id(),
                owner = handle.owner(),
                category = handle.category(),
                "task did not retire before deadline; abandoned"
            );
            self.bus.publish(
                Event::new(EventKind::TaskAbandoned)
                    .with_module(handle.owner())
                    .with_task(handle.id(), handle.category()),
            );
        }

        if abandoned.is_empty() {
            info!(tasks = initial.len(), "all tasks retired");
            self.bus.publish(Event::new(EventKind::AllRetiredWithin));
        } else {
            self.bus.publish(
                Event::new(EventKind::ShutdownTimeout)
                    .with_count(abandoned.len())
                    .with_duration(timeout),
            );
        }

        CancellationReport {
            retired: initial.len().saturating_sub(abandoned.len()),
            abandoned,
            elapsed: started.elapsed(),
        }
    }

    fn classify(&self, handle: TaskHandle, now: Instant) -> ProbedTask {
        let (last, seen) = match handle.last_heartbeat_at() {
            Some(at) => (at, true),
            None => (handle.started_at(), false),
        };
        let idle = now.saturating_duration_since(last);
        let health = match (idle >= self.stale_window, seen) {
            (true, _) => TaskHealth::Stale,
            (false, true) => TaskHealth::Healthy,
            (false, false) => TaskHealth::Unknown,
        };
        ProbedTask {
            handle,
            health,
            idle,
        }
    }

    fn publish_retired(&self, handle: &TaskHandle) {
        debug!(task_id = handle.id(), owner = handle.owner(), "task retired");
        self.bus.publish(
            Event::new(EventKind::TaskRetired)
                .with_module(handle.owner())
                .with_task(handle.id(), handle.category()),
        );
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TaskId, TaskHandle>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, TaskHandle>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }
}
