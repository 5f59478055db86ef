//! # Host reference handed to modules.
//!
//! [`Host`] is the capability interface the embedding process implements
//! (configuration lookup, plus `as_any` for reaching persistence or any other
//! concrete service). [`HostContext`] binds a host to one module and adds task
//! registration scoped to that module as owner.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{TaskHandle, TaskRegistry};
use crate::error::ModuleError;

/// Module-facing capabilities of the host process.
pub trait Host: Send + Sync + 'static {
    /// Looks up a configuration value.
    fn setting(&self, key: &str) -> Option<String>;

    /// Concrete host, for downcasting to host-specific services.
    fn as_any(&self) -> &dyn Any;
}

/// Host backed by process environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvHost;

impl Host for EnvHost {
    fn setting(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Host reference scoped to one module.
///
/// Cheap to clone. Tasks registered through it are owned by [`HostContext::module`].
#[derive(Clone)]
pub struct HostContext {
    module: Arc<str>,
    host: Arc<dyn Host>,
    tasks: Arc<TaskRegistry>,
}

impl HostContext {
    pub(crate) fn new(module: Arc<str>, host: Arc<dyn Host>, tasks: Arc<TaskRegistry>) -> Self {
        Self {
            module,
            host,
            tasks,
        }
    }

    /// Qualified name of the module this context belongs to.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The raw host reference.
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Downcasts the host to its concrete type.
    pub fn host_as<T: 'static>(&self) -> Option<&T> {
        self.host.as_any().downcast_ref::<T>()
    }

    /// Optional setting.
    pub fn setting(&self, key: &str) -> Option<String> {
        self.host.setting(key)
    }

    /// Required setting; absence yields [`ModuleError::Configuration`], which makes
    /// the loader skip the module instead of failing startup.
    pub fn require_setting(&self, key: &str) -> Result<String, ModuleError> {
        self.host
            .setting(key)
            .ok_or_else(|| ModuleError::missing_setting(key))
    }

    /// Registers a background operation the module drives itself.
    ///
    /// The module must call [`TaskRegistry::retire`] (via [`HostContext::retire`])
    /// when the operation ends, and should observe `cancel`.
    pub fn register_task(&self, category: &str, cancel: CancellationToken) -> TaskHandle {
        self.tasks.register(&self.module, category, cancel)
    }

    /// Retires a handle previously returned by [`HostContext::register_task`].
    pub fn retire(&self, handle: &TaskHandle) -> bool {
        self.tasks.retire(handle)
    }

    /// Spawns and registers a background task owned by this module.
    ///
    /// The closure receives the task's own [`TaskHandle`] (cancellation and heartbeat);
    /// the handle is retired automatically when the future completes.
    pub fn spawn<F, Fut>(&self, category: &str, f: F) -> TaskHandle
    where
        F: FnOnce(TaskHandle) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(&self.module, category, f)
    }

    /// Currently active tasks owned by this module.
    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.tasks.owned_by(&self.module)
    }
}
