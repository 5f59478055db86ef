//! # modvisor
//!
//! **Modvisor** is a lifecycle manager for dynamically discovered extension
//! modules in a long-running async host (a bot, a plugin server, an agent).
//!
//! It finds module files under one or more roots, orders them by priority tier,
//! runs their entry points with tier barriers, tracks the background tasks they
//! start, and tears everything down in a bounded, cancellation-first shutdown.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   roots/                      ModuleCatalog
//!   ├─ moderation/ban.rs   ◄──► "moderation.ban" → Arc<dyn Loadable>
//!   └─ levels/xp.rs        ◄──► "levels.xp"      → Arc<dyn Loadable>
//!            │
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Coordinator (lifecycle state machine)                            │
//! │  - discover()   → Vec<ModuleDescriptor>                           │
//! │  - plan()       → ExecutionPlan (tiers, highest first)            │
//! │  - Loader       → load_tier() per tier, concurrent inside a tier  │
//! │  - DescriptorStore (state of every module)                        │
//! │  - TaskRegistry    (background tasks, owned by modules)           │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ setup(host)  │   │ setup(host)  │   │ setup(host)  │   │
//!     │  tier 10     │   │  tier 10     │   │  tier 5      │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ host.spawn()     │                  │                 │
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                  (capacity: Config::bus_capacity)                 │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                          (per-sub queues)
//!                       ┌───────────┼───────────┐
//!                       ▼           ▼           ▼
//!                    worker1     worker2     workerN
//! ```
//!
//! ### Lifecycle
//! ```text
//! Idle ─► Discovering ─► Scheduled ─► Loading ─► Ready ─► Draining ─► Stopped
//!              │                         │
//!              └─ unreadable root ───────┴─ module Failed ─────────► Stopped
//!
//! per module:
//!   Discovered ─► Loading ─┬─► Loaded
//!                          ├─► Skipped   (missing configuration, duplicate)
//!                          └─► Failed    (any other error or panic; aborts the pass)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Modules**       | Entry points with optional teardown.                          | [`Loadable`], [`ModuleFn`], [`ModuleRef`]   |
//! | **Discovery**     | Root walking, typed catalog, tier overrides.                  | [`discover`], [`ModuleCatalog`]             |
//! | **Planning**      | Priority tiers, deterministic duplicate handling.             | [`plan`], [`ExecutionPlan`]                 |
//! | **Lifecycle**     | Load, reload, unload, bounded shutdown.                       | [`Coordinator`], [`LifecycleState`]         |
//! | **Tasks**         | Module-owned background tasks, heartbeats, health probe.      | [`TaskRegistry`], [`TaskHandle`]            |
//! | **Subscriber API**| Fault reporting and telemetry hooks.                          | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors for the runtime and for modules.                 | [`RuntimeError`], [`ModuleError`]           |
//! | **Configuration** | Centralize runtime settings.                                  | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber that renders events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use modvisor::{Config, Coordinator, HostContext, ModuleError, ModuleFn, ModuleRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let root = std::env::temp_dir().join("modvisor-doc-lib");
//!     std::fs::create_dir_all(root.join("moderation"))?;
//!     std::fs::write(root.join("moderation/ban.rs"), "")?;
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn modvisor::Subscribe>> = vec![Arc::new(modvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn modvisor::Subscribe>> = Vec::new();
//!
//!     let ban: ModuleRef = ModuleFn::arc("moderation.ban", 10, |host: HostContext| async move {
//!         host.spawn("expiry-sweep", |task| async move {
//!             while !task.is_cancelled() {
//!                 task.heartbeat();
//!                 tokio::select! {
//!                     _ = task.cancelled() => break,
//!                     _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {}
//!                 }
//!             }
//!         });
//!         Ok::<_, ModuleError>(())
//!     });
//!
//!     let coordinator = Coordinator::builder(Config::default())
//!         .with_root(&root)
//!         .with_module(ban)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     // `coordinator.run().await?` would wait for SIGINT/SIGTERM instead.
//!     let report = coordinator.run_until(async {}).await?;
//!     assert_eq!(report.unloaded, vec!["moderation.ban".to_string()]);
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod modules;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    CancellationReport, Config, Coordinator, CoordinatorBuilder, ExecutionPlan, LifecycleState,
    LoadSummary, ModuleStatus, PriorityTier, ProbedTask, ShutdownReport, TaskHandle, TaskHealth,
    TaskId, TaskRegistry, discover, discover_all, plan, wait_for_shutdown_signal,
};
pub use error::{ModuleError, RuntimeError};
pub use events::{Event, EventKind, ProbeCounts};
pub use modules::{
    DescriptorStore, EnvHost, FailureKind, FailureReason, Host, HostContext, Loadable,
    ModuleCatalog, ModuleDescriptor, ModuleFn, ModuleRef, ModuleState, Severity,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
