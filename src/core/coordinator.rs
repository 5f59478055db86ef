//! # Coordinator: drives discovery, tiered loading, reload, and shutdown.
//!
//! The [`Coordinator`] owns the descriptor store, the task registry, and the
//! lifecycle state. It is the only component that moves modules between states
//! outside a loading pass.
//!
//! ## Loading pass
//! ```text
//! start():
//!   Idle ─► Discovering
//!     discover_all(roots)            (blocking pool; unreadable root ─► Stopped, Err(Configuration))
//!     plan(descriptors)              (duplicates ─► Skipped)
//!   ─► Scheduled ─► Loading
//!     for tier in plan (highest first):
//!       load_tier(tier)              (concurrent inside the tier, joined)
//!       any Failed?  ─► cancel tasks, teardown loaded, Stopped, Err(LoadFailure)
//!   ─► Ready  ─► spawn probe loop
//! ```
//!
//! ## Shutdown path
//! ```text
//! shutdown():
//!   Ready ─► Draining ─► publish ShutdownRequested
//!     stop probe loop
//!     TaskRegistry::cancel_all(shutdown_timeout)   (bounded; leftovers abandoned)
//!     teardown loaded modules, reverse load order
//!   ─► Stopped
//! ```
//!
//! ## Rules
//! - Tiers are a barrier: no module of a lower tier starts before every module of
//!   the higher tier is terminal.
//! - A `Failed` module aborts the pass; later tiers are never invoked.
//! - Reload and unload retire the module's tasks before touching the module.
//! - Shutdown always cancels tasks before unloading modules.
//!
//! ## Example
//! ```rust
//! use modvisor::{Config, Coordinator, HostContext, ModuleError, ModuleFn, ModuleRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = std::env::temp_dir().join("modvisor-doc-coordinator");
//!     std::fs::create_dir_all(&dir)?;
//!     std::fs::write(dir.join("ping.rs"), "")?;
//!
//!     let ping: ModuleRef = ModuleFn::arc("ping", 10, |host: HostContext| async move {
//!         host.spawn("heartbeat", |task| async move { task.cancelled().await; });
//!         Ok::<_, ModuleError>(())
//!     });
//!
//!     let coordinator = Coordinator::builder(Config::default())
//!         .with_root(&dir)
//!         .with_module(ping)
//!         .build();
//!
//!     let summary = coordinator.start().await?;
//!     assert_eq!(summary.loaded(), 1);
//!
//!     let report = coordinator.shutdown().await?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::builder::CoordinatorBuilder;
use crate::core::loader::{LoadOutcome, Loader};
use crate::core::{
    Config, LifecycleState, LoadSummary, ShutdownReport, TaskRegistry, discovery, probe,
    scheduler, shutdown,
};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::modules::{
    DescriptorStore, FailureReason, Host, ModuleCatalog, ModuleDescriptor, ModuleRef, ModuleState,
};
use crate::subscribers::panic_message;

#[derive(Default)]
struct Inner {
    store: DescriptorStore,
    /// Loaded modules in load order; teardown walks it backwards.
    load_order: Vec<String>,
}

/// Lifecycle manager for a set of dynamically discovered modules.
pub struct Coordinator {
    cfg: Config,
    roots: Vec<PathBuf>,
    catalog: ModuleCatalog,
    bus: Bus,
    tasks: Arc<TaskRegistry>,
    loader: Loader,
    inner: Mutex<Inner>,
    state: watch::Sender<LifecycleState>,
    probe_token: CancellationToken,
    listener_token: CancellationToken,
}

impl Coordinator {
    /// Creates a builder.
    pub fn builder(cfg: Config) -> CoordinatorBuilder {
        CoordinatorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        roots: Vec<PathBuf>,
        catalog: ModuleCatalog,
        host: Arc<dyn Host>,
        bus: Bus,
        listener_token: CancellationToken,
    ) -> Self {
        let tasks = TaskRegistry::new(bus.clone(), cfg.stale_window());
        let loader = Loader::new(
            bus.clone(),
            host,
            Arc::clone(&tasks),
            cfg.slow_threshold(),
            cfg.concurrency_limit(),
        );
        let (state, _) = watch::channel(LifecycleState::Idle);

        Self {
            cfg,
            roots,
            catalog,
            bus,
            tasks,
            loader,
            inner: Mutex::new(Inner::default()),
            state,
            probe_token: CancellationToken::new(),
            listener_token,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Raw event stream (in addition to configured subscribers).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    /// Fails with [`RuntimeError::InvalidState`] unless the coordinator is `Ready`.
    ///
    /// Dispatch front ends call this before routing anything to modules.
    pub fn ensure_ready(&self) -> Result<(), RuntimeError> {
        match self.state() {
            LifecycleState::Ready => Ok(()),
            state => Err(RuntimeError::InvalidState {
                op: "dispatch",
                state,
            }),
        }
    }

    /// A loaded module, for dispatch. Requires `Ready`.
    pub async fn module(&self, name: &str) -> Result<ModuleRef, RuntimeError> {
        self.ensure_ready()?;
        let inner = self.inner.lock().await;
        match inner.store.get(name) {
            Some(desc) if desc.state() == ModuleState::Loaded => {}
            _ => return Err(not_found(name)),
        }
        self.catalog.get(name).cloned().ok_or_else(|| not_found(name))
    }

    /// Point-in-time copy of every descriptor, duplicates included.
    pub async fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.inner.lock().await.store.snapshot()
    }

    pub async fn descriptor(&self, name: &str) -> Option<ModuleDescriptor> {
        self.inner.lock().await.store.get(name).cloned()
    }

    /// Runs discovery and the tiered loading pass.
    ///
    /// Returns [`RuntimeError::LoadFailure`] (state `Stopped`) if any module failed.
    pub async fn start(&self) -> Result<LoadSummary, RuntimeError> {
        let mut inner = self.inner.lock().await;
        self.advance(LifecycleState::Idle, LifecycleState::Discovering, "start")?;
        let started = Instant::now();

        let discovered = match self.discover().await {
            Ok(found) => found,
            Err(err) => {
                error!(error = %err, "discovery failed");
                self.set_state(LifecycleState::Stopped);
                return Err(err);
            }
        };

        let plan = scheduler::plan(discovered);
        info!(
            modules = plan.module_count(),
            tiers = plan.tiers().len(),
            duplicates = plan.duplicates().len(),
            "execution plan ready"
        );
        self.bus.publish(
            Event::new(EventKind::PlanReady)
                .with_count(plan.module_count())
                .with_tier(plan.tiers().len() as i32),
        );
        self.set_state(LifecycleState::Scheduled);

        let (tiers, duplicates) = plan.into_parts();
        for tier in &tiers {
            for desc in tier.descriptors() {
                inner.store.insert(desc.clone());
            }
        }
        for desc in duplicates {
            if let Some(reason) = desc.failure_reason() {
                self.bus.publish(
                    Event::new(EventKind::ModuleSkipped)
                        .with_module(desc.qualified_name())
                        .with_reason(reason.to_string()),
                );
            }
            inner.store.insert(desc);
        }

        self.set_state(LifecycleState::Loading);
        for tier in tiers {
            let priority = tier.priority();
            let mut batch = tier.into_descriptors();
            debug!(tier = priority, modules = batch.len(), "loading tier");

            let outcomes = self.loader.load_tier(&mut batch, &self.catalog).await;

            let mut fatal = None;
            for (desc, outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    LoadOutcome::Loaded(_) => {
                        inner.load_order.push(desc.qualified_name().to_string());
                    }
                    LoadOutcome::Failed(reason) if fatal.is_none() => {
                        fatal = Some((desc.qualified_name().to_string(), reason));
                    }
                    _ => {}
                }
                inner.store.update(desc);
            }

            if let Some((module, reason)) = fatal {
                error!(module = %module, tier = priority, "loading pass aborted");
                let report = self.drain(&mut inner).await;
                if !report.is_clean() {
                    warn!(
                        abandoned = report.tasks.abandoned.len(),
                        teardown_failures = report.teardown_failures.len(),
                        "unclean unwind after load failure"
                    );
                }
                self.set_state(LifecycleState::Stopped);
                return Err(RuntimeError::LoadFailure {
                    module,
                    reason: reason.to_string(),
                });
            }
        }

        self.set_state(LifecycleState::Ready);
        tokio::spawn(probe::run(
            Arc::clone(&self.tasks),
            self.cfg.probe_interval,
            self.probe_token.clone(),
        ));

        let summary = LoadSummary::from_descriptors(inner.store.iter(), started.elapsed());
        info!(
            loaded = summary.loaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "coordinator ready"
        );
        Ok(summary)
    }

    /// Cancels every task (bounded by `shutdown_timeout`), then unloads modules.
    ///
    /// A timeout does not make this fail; see [`ShutdownReport::tasks`].
    pub async fn shutdown(&self) -> Result<ShutdownReport, RuntimeError> {
        let mut inner = self.inner.lock().await;
        self.advance(LifecycleState::Ready, LifecycleState::Draining, "shutdown")?;

        info!(timeout_ms = self.cfg.shutdown_timeout.as_millis() as u64, "shutdown requested");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        let report = self.drain(&mut inner).await;
        inner.store.clear();
        self.set_state(LifecycleState::Stopped);
        Ok(report)
    }

    /// Unloads `name` if loaded, then runs its entry point again.
    ///
    /// The module's tasks are retired before the new load begins. Returns the
    /// resulting module state, or [`RuntimeError::LoadFailure`] if it failed
    /// (the coordinator itself stays where it was).
    pub async fn reload(&self, name: &str) -> Result<ModuleState, RuntimeError> {
        self.permit("reload")?;
        let mut inner = self.inner.lock().await;
        self.permit("reload")?;

        let module = self.catalog.get(name).cloned().ok_or_else(|| not_found(name))?;
        let mut desc = inner.store.get(name).cloned().ok_or_else(|| not_found(name))?;

        if desc.state() == ModuleState::Loaded {
            if let Err(err) = self.unload_in_place(&mut inner, name).await {
                warn!(module = name, error = %err, "teardown failed; reloading anyway");
            }
        }
        if !desc.begin_reload() {
            return Err(RuntimeError::InvalidState {
                op: "reload",
                state: self.state(),
            });
        }

        info!(module = name, "reloading module");
        let outcome = self.loader.load_one(&mut desc, module.as_ref()).await;
        if let LoadOutcome::Loaded(_) = outcome {
            inner.load_order.push(name.to_string());
        }
        inner.store.update(desc);

        match outcome {
            LoadOutcome::Failed(reason) => Err(RuntimeError::LoadFailure {
                module: name.to_string(),
                reason: reason.to_string(),
            }),
            other => Ok(other.state()),
        }
    }

    /// Unloads `name` and forgets its descriptor.
    pub async fn unload(&self, name: &str) -> Result<ModuleDescriptor, RuntimeError> {
        self.permit("unload")?;
        let mut inner = self.inner.lock().await;
        self.permit("unload")?;

        let state = inner
            .store
            .get(name)
            .map(ModuleDescriptor::state)
            .ok_or_else(|| not_found(name))?;
        let teardown = match state {
            ModuleState::Loaded => self.unload_in_place(&mut inner, name).await,
            _ => {
                self.tasks.retire_owner(name);
                Ok(())
            }
        };
        let removed = inner.store.remove(name).ok_or_else(|| not_found(name))?;
        teardown?;
        Ok(removed)
    }

    /// Starts, waits for an OS termination signal, then shuts down.
    pub async fn run(&self) -> Result<ShutdownReport, RuntimeError> {
        self.run_until(async {
            if let Err(err) = shutdown::wait_for_shutdown_signal().await {
                warn!(error = %err, "cannot listen for signals; shutting down");
            }
        })
        .await
    }

    /// Starts, waits for `signal`, then shuts down.
    pub async fn run_until<F>(&self, signal: F) -> Result<ShutdownReport, RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let summary = self.start().await?;
        debug!(summary = %summary, "load summary");
        signal.await;
        self.shutdown().await
    }

    /// Walks the roots on the blocking pool; the walk is synchronous file I/O.
    async fn discover(&self) -> Result<Vec<ModuleDescriptor>, RuntimeError> {
        let roots = self.roots.clone();
        let catalog = self.catalog.clone();
        let cfg = self.cfg.clone();
        let walk =
            tokio::task::spawn_blocking(move || discovery::discover_all(&roots, &catalog, &cfg));
        match walk.await {
            Ok(found) => found,
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(join) => Err(RuntimeError::Configuration {
                path: self.roots.first().cloned().unwrap_or_default(),
                reason: join.to_string(),
            }),
        }
    }

    async fn unload_in_place(&self, inner: &mut Inner, name: &str) -> Result<(), RuntimeError> {
        let retired = self.tasks.retire_owner(name);
        debug!(module = name, tasks = retired.len(), "retired module tasks");
        inner.load_order.retain(|n| n != name);

        let result = self.teardown(name).await;
        self.bus
            .publish(Event::new(EventKind::ModuleUnloaded).with_module(name));
        result
    }

    async fn drain(&self, inner: &mut Inner) -> ShutdownReport {
        self.probe_token.cancel();
        let tasks = self.tasks.cancel_all(self.cfg.shutdown_timeout).await;

        let mut unloaded = Vec::with_capacity(inner.load_order.len());
        let mut teardown_failures = Vec::new();
        while let Some(name) = inner.load_order.pop() {
            if let Err(err) = self.teardown(&name).await {
                warn!(module = %name, error = %err, "teardown failed");
                teardown_failures.push(err);
            }
            self.bus
                .publish(Event::new(EventKind::ModuleUnloaded).with_module(name.as_str()));
            unloaded.push(name);
        }

        ShutdownReport {
            tasks,
            unloaded,
            teardown_failures,
        }
    }

    async fn teardown(&self, name: &str) -> Result<(), RuntimeError> {
        let Some(module) = self.catalog.get(name) else {
            return Ok(());
        };
        let ctx = self.loader.context_for(name);
        let reason = match std::panic::AssertUnwindSafe(module.teardown(&ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => FailureReason::from_module_error(&err).to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        Err(RuntimeError::TeardownFailed {
            module: name.to_string(),
            reason,
        })
    }

    fn permit(&self, op: &'static str) -> Result<(), RuntimeError> {
        let state = self.state();
        if state.permits_reload() {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState { op, state })
        }
    }

    fn advance(
        &self,
        from: LifecycleState,
        to: LifecycleState,
        op: &'static str,
    ) -> Result<(), RuntimeError> {
        let state = self.state();
        if state != from {
            return Err(RuntimeError::InvalidState { op, state });
        }
        self.set_state(to);
        Ok(())
    }

    fn set_state(&self, next: LifecycleState) {
        let prev = self.state.send_replace(next);
        debug_assert!(prev.can_transition_to(next), "illegal transition {prev} -> {next}");
        info!(from = %prev, to = %next, "coordinator state changed");
        self.bus
            .publish(Event::new(EventKind::StateChanged).with_state(next));
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.probe_token.cancel();
        self.listener_token.cancel();
    }
}

fn not_found(name: &str) -> RuntimeError {
    RuntimeError::ModuleNotFound {
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;
    use crate::modules::{HostContext, Loadable, ModuleFn};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    type Log = Arc<StdMutex<Vec<String>>>;

    fn tree(names: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            let rel = format!("{}.rs", name.replace('.', "/"));
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }
        dir
    }

    fn record(log: &Log, line: impl Into<String>) {
        log.lock().unwrap().push(line.into());
    }

    fn lines(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn pos(lines: &[String], line: &str) -> usize {
        lines
            .iter()
            .position(|l| l == line)
            .unwrap_or_else(|| panic!("`{line}` missing from {lines:?}"))
    }

    fn ok_module(name: &'static str, priority: i32) -> ModuleRef {
        ModuleFn::arc(name, priority, |_h: HostContext| async { Ok::<_, ModuleError>(()) })
    }

    fn coordinator(root: &Path, modules: Vec<ModuleRef>) -> Arc<Coordinator> {
        let mut builder = Coordinator::builder(Config::default()).with_root(root);
        for m in modules {
            builder = builder.with_module(m);
        }
        builder.build()
    }

    /// Records setup/teardown and keeps one background task alive.
    struct Recorder {
        name: &'static str,
        priority: i32,
        log: Log,
    }

    #[async_trait]
    impl Loadable for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn setup(&self, host: &HostContext) -> Result<(), ModuleError> {
            record(&self.log, format!("{}:setup tasks={}", self.name, host.tasks().len()));
            let log = Arc::clone(&self.log);
            let name = self.name;
            host.spawn("worker", move |task| async move {
                task.cancelled().await;
                record(&log, format!("{name}:task cancelled"));
            });
            Ok(())
        }

        async fn teardown(&self, host: &HostContext) -> Result<(), ModuleError> {
            record(&self.log, format!("{}:teardown tasks={}", self.name, host.tasks().len()));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn higher_tier_finishes_before_lower_tier_starts() {
        let dir = tree(&["a", "b", "c"]);
        let log: Log = Arc::default();

        let l = Arc::clone(&log);
        let a: ModuleRef = ModuleFn::arc("a", 10, move |_h: HostContext| {
            let l = Arc::clone(&l);
            async move {
                record(&l, "a:start");
                tokio::time::sleep(Duration::from_millis(50)).await;
                record(&l, "a:end");
                Ok::<_, ModuleError>(())
            }
        });
        let l = Arc::clone(&log);
        let c: ModuleRef = ModuleFn::arc("c", 10, move |_h: HostContext| {
            let l = Arc::clone(&l);
            async move {
                record(&l, "c:start");
                Ok::<_, ModuleError>(())
            }
        });
        let l = Arc::clone(&log);
        let b: ModuleRef = ModuleFn::arc("b", 5, move |_h: HostContext| {
            let l = Arc::clone(&l);
            async move {
                record(&l, "b:start");
                Ok::<_, ModuleError>(())
            }
        });

        let co = coordinator(dir.path(), vec![a, b, c]);
        let summary = co.start().await.unwrap();

        assert_eq!(summary.loaded(), 3);
        assert_eq!(co.state(), LifecycleState::Ready);
        let got = lines(&log);
        assert!(pos(&got, "a:end") < pos(&got, "b:start"));
        assert!(pos(&got, "c:start") < pos(&got, "a:end"));
    }

    #[tokio::test]
    async fn failure_aborts_pass_and_skips_lower_tiers() {
        let dir = tree(&["high", "low"]);
        let low_ran = Arc::new(AtomicBool::new(false));

        let high: ModuleRef = ModuleFn::arc("high", 10, |_h: HostContext| async {
            Err::<(), _>(ModuleError::fail("database unreachable"))
        });
        let flag = Arc::clone(&low_ran);
        let low: ModuleRef = ModuleFn::arc("low", 5, move |_h: HostContext| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ModuleError>(())
            }
        });

        let co = coordinator(dir.path(), vec![high, low]);
        let err = co.start().await.unwrap_err();

        assert!(matches!(&err, RuntimeError::LoadFailure { module, .. } if module == "high"));
        assert_eq!(err.exit_code(), 70);
        assert_eq!(co.state(), LifecycleState::Stopped);
        assert!(!low_ran.load(Ordering::SeqCst));
        let low = co.descriptor("low").await.unwrap();
        assert_eq!(low.state(), ModuleState::Discovered);
    }

    #[tokio::test]
    async fn configuration_skip_still_reaches_ready() {
        let dir = tree(&["needs_token", "plain"]);
        let needs: ModuleRef = ModuleFn::arc("needs_token", 3, |h: HostContext| async move {
            h.require_setting("MODVISOR_TEST_TOKEN_THAT_IS_NEVER_SET")?;
            Ok::<_, ModuleError>(())
        });

        let co = coordinator(dir.path(), vec![needs, ok_module("plain", 3)]);
        let summary = co.start().await.unwrap();

        assert_eq!(co.state(), LifecycleState::Ready);
        assert_eq!((summary.loaded(), summary.skipped()), (1, 1));
        let skipped = co.descriptor("needs_token").await.unwrap();
        assert_eq!(skipped.state(), ModuleState::Skipped);
        assert!(co.module("needs_token").await.is_err());
        assert!(co.module("plain").await.is_ok());
    }

    #[tokio::test]
    async fn unreadable_root_stops_with_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let co = coordinator(&dir.path().join("missing"), vec![]);
        let err = co.start().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Configuration { .. }));
        assert_eq!(err.exit_code(), 78);
        assert_eq!(co.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn dispatch_is_gated_on_ready() {
        let dir = tree(&["m"]);
        let co = coordinator(dir.path(), vec![ok_module("m", 0)]);

        assert!(matches!(
            co.ensure_ready(),
            Err(RuntimeError::InvalidState { state: LifecycleState::Idle, .. })
        ));
        co.start().await.unwrap();
        assert!(co.ensure_ready().is_ok());
        assert!(co.module("m").await.is_ok());

        co.shutdown().await.unwrap();
        assert!(co.ensure_ready().is_err());
    }

    #[tokio::test]
    async fn reload_retires_tasks_before_loading_again() {
        let dir = tree(&["rec"]);
        let log: Log = Arc::default();
        let rec: ModuleRef = Arc::new(Recorder {
            name: "rec",
            priority: 0,
            log: Arc::clone(&log),
        });

        let co = coordinator(dir.path(), vec![rec]);
        co.start().await.unwrap();
        assert_eq!(co.tasks().owned_by("rec").len(), 1);
        let first_id = co.tasks().owned_by("rec")[0].id();

        let state = co.reload("rec").await.unwrap();
        assert_eq!(state, ModuleState::Loaded);

        let got: Vec<String> = lines(&log)
            .into_iter()
            .filter(|l| !l.ends_with("task cancelled"))
            .collect();
        assert_eq!(
            &got[..],
            &[
                "rec:setup tasks=0".to_string(),
                "rec:teardown tasks=0".to_string(),
                "rec:setup tasks=0".to_string(),
            ]
        );
        let owned = co.tasks().owned_by("rec");
        assert_eq!(owned.len(), 1);
        assert_ne!(owned[0].id(), first_id);
    }

    #[tokio::test]
    async fn reload_recovers_a_skipped_module() {
        let dir = tree(&["flaky"]);
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&attempts);
        let flaky: ModuleRef = ModuleFn::arc("flaky", 0, move |_h: HostContext| {
            let n = a.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    return Err(ModuleError::missing_setting("FLAKY_URL"));
                }
                Ok(())
            }
        });

        let co = coordinator(dir.path(), vec![flaky]);
        co.start().await.unwrap();
        assert_eq!(co.descriptor("flaky").await.unwrap().state(), ModuleState::Skipped);

        assert_eq!(co.reload("flaky").await.unwrap(), ModuleState::Loaded);
        assert!(co.module("flaky").await.is_ok());
    }

    #[tokio::test]
    async fn rejected_modules_leave_no_tasks_behind() {
        let dir = tree(&["breaks", "half"]);
        let half: ModuleRef = ModuleFn::arc("half", 0, |h: HostContext| async move {
            h.spawn("worker", |task| async move {
                task.cancelled().await;
            });
            h.require_setting("MODVISOR_TEST_HALF_SETTING_NEVER_SET")?;
            Ok::<_, ModuleError>(())
        });
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&attempts);
        let breaks: ModuleRef = ModuleFn::arc("breaks", 0, move |h: HostContext| {
            let n = a.fetch_add(1, Ordering::SeqCst);
            async move {
                h.spawn("worker", |task| async move {
                    task.cancelled().await;
                });
                if n > 0 {
                    return Err(ModuleError::fail("second start refused"));
                }
                Ok(())
            }
        });

        let co = coordinator(dir.path(), vec![half, breaks]);
        co.start().await.unwrap();
        assert_eq!(co.descriptor("half").await.unwrap().state(), ModuleState::Skipped);
        assert!(co.tasks().owned_by("half").is_empty());
        assert_eq!(co.tasks().owned_by("breaks").len(), 1);

        let err = co.reload("breaks").await.unwrap_err();
        assert!(matches!(err, RuntimeError::LoadFailure { .. }));
        assert_eq!(co.state(), LifecycleState::Ready);
        assert!(co.tasks().owned_by("breaks").is_empty());

        let report = co.shutdown().await.unwrap();
        assert!(report.tasks.is_clean());
    }

    #[tokio::test]
    async fn reload_rejected_outside_permitted_states() {
        let dir = tree(&["m"]);
        let co = coordinator(dir.path(), vec![ok_module("m", 0)]);

        assert!(matches!(co.reload("m").await, Err(RuntimeError::ModuleNotFound { .. })));
        co.start().await.unwrap();
        assert!(matches!(co.reload("nope").await, Err(RuntimeError::ModuleNotFound { .. })));

        co.shutdown().await.unwrap();
        assert!(matches!(
            co.reload("m").await,
            Err(RuntimeError::InvalidState { op: "reload", state: LifecycleState::Stopped })
        ));
        assert!(matches!(co.unload("m").await, Err(RuntimeError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn unload_forgets_descriptor_and_retires_tasks() {
        let dir = tree(&["rec"]);
        let log: Log = Arc::default();
        let rec: ModuleRef = Arc::new(Recorder {
            name: "rec",
            priority: 0,
            log: Arc::clone(&log),
        });

        let co = coordinator(dir.path(), vec![rec]);
        co.start().await.unwrap();
        let removed = co.unload("rec").await.unwrap();

        assert_eq!(removed.qualified_name(), "rec");
        assert!(co.descriptor("rec").await.is_none());
        assert!(co.tasks().owned_by("rec").is_empty());
        assert!(matches!(co.module("rec").await, Err(RuntimeError::ModuleNotFound { .. })));

        let report = co.shutdown().await.unwrap();
        assert!(report.unloaded.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_tasks_before_teardown_in_reverse_order() {
        let dir = tree(&["first", "second"]);
        let log: Log = Arc::default();
        let first: ModuleRef = Arc::new(Recorder {
            name: "first",
            priority: 10,
            log: Arc::clone(&log),
        });
        let second: ModuleRef = Arc::new(Recorder {
            name: "second",
            priority: 1,
            log: Arc::clone(&log),
        });

        let co = coordinator(dir.path(), vec![first, second]);
        co.start().await.unwrap();
        let report = co.shutdown().await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.tasks.retired, 2);
        assert_eq!(report.unloaded, vec!["second".to_string(), "first".to_string()]);
        assert_eq!(co.state(), LifecycleState::Stopped);
        assert!(co.tasks().is_empty());

        let got = lines(&log);
        let teardown_second = pos(&got, "second:teardown tasks=0");
        let teardown_first = pos(&got, "first:teardown tasks=0");
        assert!(pos(&got, "first:task cancelled") < teardown_second);
        assert!(pos(&got, "second:task cancelled") < teardown_second);
        assert!(teardown_second < teardown_first);

        assert!(matches!(
            co.shutdown().await,
            Err(RuntimeError::InvalidState { op: "shutdown", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_bounded_by_timeout() {
        let dir = tree(&["stubborn"]);
        let stubborn: ModuleRef = ModuleFn::arc("stubborn", 0, |h: HostContext| async move {
            h.spawn("ignores-cancel", |_task| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            });
            Ok::<_, ModuleError>(())
        });

        let mut cfg = Config::default();
        cfg.shutdown_timeout = Duration::from_secs(2);
        let co = Coordinator::builder(cfg)
            .with_root(dir.path())
            .with_module(stubborn)
            .build();

        co.start().await.unwrap();
        let started = Instant::now();
        let report = co.shutdown().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(report.tasks.abandoned.len(), 1);
        assert!(!report.is_clean());
        assert_eq!(co.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn state_changes_are_observable() {
        let dir = tree(&["m"]);
        let co = coordinator(dir.path(), vec![ok_module("m", 0)]);
        let mut rx = co.subscribe();

        co.run_until(async {}).await.unwrap();

        let mut states = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::StateChanged {
                states.extend(ev.state);
            }
        }
        use LifecycleState::*;
        assert_eq!(states, vec![Discovering, Scheduled, Loading, Ready, Draining, Stopped]);
    }
}
