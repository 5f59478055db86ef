//! # Loader: run module entry points and classify the outcome.
//!
//! ## Event flow
//! ```text
//! load_one(desc):
//!   acquire permit (if limited)
//!   desc → Loading ─► publish ModuleLoading
//!   setup(host) (panics caught)
//!     ├─ Ok                         → Loaded  ─► ModuleLoaded (+ SlowLoad if over threshold)
//!     ├─ Err(Configuration)         → Skipped ─► ModuleSkipped   (pass continues)
//!     └─ Err(other) / panic         → Failed  ─► ModuleFailed    (pass aborts after the tier)
//!   not Loaded? retire every task the module spawned during setup
//!
//! load_tier(tier):
//!   fan-out load_one over every descriptor (optional semaphore)
//!   join: returns only after every descriptor is terminal
//! ```
//!
//! ## Rules
//! - Slow loads are reported, never treated as failures.
//! - The loader does not decide whether to continue; the coordinator reads the outcomes.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::TaskRegistry;
use crate::error::ModuleError;
use crate::events::{Bus, Event, EventKind};
use crate::modules::{
    FailureReason, Host, HostContext, Loadable, ModuleCatalog, ModuleDescriptor, ModuleState,
};
use crate::subscribers::panic_message;

/// Result of one load.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(Duration),
    Skipped(FailureReason),
    Failed(FailureReason),
}

impl LoadOutcome {
    /// True for `Failed`: the loading pass must stop after this tier.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadOutcome::Failed(_))
    }

    pub fn state(&self) -> ModuleState {
        match self {
            LoadOutcome::Loaded(_) => ModuleState::Loaded,
            LoadOutcome::Skipped(_) => ModuleState::Skipped,
            LoadOutcome::Failed(_) => ModuleState::Failed,
        }
    }
}

/// Executes the load protocol for modules.
pub struct Loader {
    bus: Bus,
    host: Arc<dyn Host>,
    tasks: Arc<TaskRegistry>,
    slow_threshold: Option<Duration>,
    semaphore: Option<Arc<Semaphore>>,
}

impl Loader {
    pub fn new(
        bus: Bus,
        host: Arc<dyn Host>,
        tasks: Arc<TaskRegistry>,
        slow_threshold: Option<Duration>,
        concurrency_limit: Option<usize>,
    ) -> Self {
        Self {
            bus,
            host,
            tasks,
            slow_threshold,
            semaphore: concurrency_limit.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Host reference scoped to `module`.
    pub fn context_for(&self, module: &str) -> HostContext {
        HostContext::new(Arc::from(module), Arc::clone(&self.host), Arc::clone(&self.tasks))
    }

    /// Loads one module and records the outcome on `desc`.
    ///
    /// `desc` must be `Discovered`, or already `Loading` (reload). A module that
    /// ends up `Skipped` or `Failed` has its tasks retired before this returns.
    pub async fn load_one(&self, desc: &mut ModuleDescriptor, module: &dyn Loadable) -> LoadOutcome {
        let _permit = match &self.semaphore {
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        };
        if desc.state() != ModuleState::Loading {
            desc.begin_loading();
        }

        let name = desc.qualified_name().to_string();
        self.bus.publish(
            Event::new(EventKind::ModuleLoading)
                .with_module(name.as_str())
                .with_tier(desc.priority_tier()),
        );

        let ctx = self.context_for(&name);
        let started = Instant::now();
        let result = match std::panic::AssertUnwindSafe(module.setup(&ctx))
            .catch_unwind()
            .await
        {
            Ok(res) => res,
            Err(panic) => Err(ModuleError::Panicked {
                message: panic_message(panic.as_ref()),
            }),
        };
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                desc.mark_loaded(elapsed);
                self.report_loaded(desc, elapsed);
                LoadOutcome::Loaded(elapsed)
            }
            Err(err) => {
                let reason = FailureReason::from_module_error(&err);
                desc.mark_rejected(reason.clone(), Some(elapsed));
                let orphans = self.tasks.retire_owner(&name);
                if !orphans.is_empty() {
                    debug!(module = %name, tasks = orphans.len(), "retired tasks of rejected module");
                }
                if err.is_configuration() {
                    warn!(module = %name, reason = %reason, "module skipped");
                    self.bus.publish(
                        Event::new(EventKind::ModuleSkipped)
                            .with_module(name.as_str())
                            .with_reason(reason.to_string()),
                    );
                    LoadOutcome::Skipped(reason)
                } else {
                    error!(module = %name, label = err.as_label(), reason = %reason, "module failed to load");
                    self.bus.publish(
                        Event::new(EventKind::ModuleFailed)
                            .with_module(name.as_str())
                            .with_reason(reason.to_string())
                            .with_duration(elapsed),
                    );
                    LoadOutcome::Failed(reason)
                }
            }
        }
    }

    /// Loads every descriptor of a tier concurrently and waits for all of them.
    ///
    /// Outcomes are returned in the same order as `tier`.
    pub async fn load_tier(
        &self,
        tier: &mut [ModuleDescriptor],
        catalog: &ModuleCatalog,
    ) -> Vec<LoadOutcome> {
        join_all(tier.iter_mut().map(|desc| self.load_registered(desc, catalog))).await
    }

    async fn load_registered(
        &self,
        desc: &mut ModuleDescriptor,
        catalog: &ModuleCatalog,
    ) -> LoadOutcome {
        match catalog.get(desc.qualified_name()) {
            Some(module) => self.load_one(desc, module.as_ref()).await,
            None => {
                let err = ModuleError::fail("module is no longer registered");
                let reason = FailureReason::from_module_error(&err);
                if desc.state() != ModuleState::Loading {
                    desc.begin_loading();
                }
                desc.mark_rejected(reason.clone(), None);
                error!(module = desc.qualified_name(), "module vanished from catalog");
                self.bus.publish(
                    Event::new(EventKind::ModuleFailed)
                        .with_module(desc.qualified_name())
                        .with_reason(reason.to_string()),
                );
                LoadOutcome::Failed(reason)
            }
        }
    }

    fn report_loaded(&self, desc: &ModuleDescriptor, elapsed: Duration) {
        let name = desc.qualified_name();
        info!(
            module = name,
            tier = desc.priority_tier(),
            duration_us = elapsed.as_micros() as u64,
            "module loaded"
        );
        self.bus.publish(
            Event::new(EventKind::ModuleLoaded)
                .with_module(name)
                .with_tier(desc.priority_tier())
                .with_duration(elapsed),
        );

        if let Some(threshold) = self.slow_threshold.filter(|t| elapsed > *t) {
            warn!(
                module = name,
                duration_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "slow module load"
            );
            self.bus.publish(
                Event::new(EventKind::SlowLoad)
                    .with_module(name)
                    .with_duration(elapsed),
            );
        }
    }
}
