//! Runtime core: discovery, planning, loading, and lifecycle.
//!
//! The public entry point is [`Coordinator`]; the stages it drives are exposed
//! as well so hosts can inspect a plan without loading anything.
//!
//! Internal modules:
//! - [`discovery`]: walks module roots and confirms entry points;
//! - [`scheduler`]: groups descriptors into priority tiers;
//! - [`loader`]: runs entry points and classifies outcomes;
//! - [`registry`]: tracks background tasks owned by modules;
//! - [`probe`]: periodic task health classification;
//! - [`coordinator`]: the state machine tying it all together;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod coordinator;
mod discovery;
mod loader;
mod probe;
mod registry;
mod report;
mod scheduler;
mod shutdown;
mod state;

pub use builder::CoordinatorBuilder;
pub use config::Config;
pub use coordinator::Coordinator;
pub use discovery::{discover, discover_all};
pub use registry::{
    CancellationReport, ProbedTask, TaskHandle, TaskHealth, TaskId, TaskRegistry,
};
pub use report::{LoadSummary, ModuleStatus, ShutdownReport};
pub use scheduler::{ExecutionPlan, PriorityTier, plan};
pub use shutdown::wait_for_shutdown_signal;
pub use state::LifecycleState;
