//! # Module entry-point abstraction and function-backed implementation.
//!
//! A module is anything implementing [`Loadable`]: a stable qualified name, a
//! default priority tier, an async `setup` entry point, and an optional
//! `teardown` hook. [`ModuleFn`] wraps a closure for modules that need no state.
//!
//! The shared handle type is [`ModuleRef`], an `Arc<dyn Loadable>`.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ModuleError;
use crate::modules::context::HostContext;

/// Shared reference to a module.
pub type ModuleRef = Arc<dyn Loadable>;

/// # Loadable module.
///
/// `name` must equal the dotted path of the module's file relative to a
/// discovery root (`moderation/ban.rs` → `"moderation.ban"`); discovery uses it
/// to confirm that a candidate file really exposes an entry point.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use modvisor::{HostContext, Loadable, ModuleError};
///
/// struct Levels;
///
/// #[async_trait]
/// impl Loadable for Levels {
///     fn name(&self) -> &str { "levels.xp" }
///
///     fn priority(&self) -> i32 { 20 }
///
///     async fn setup(&self, host: &HostContext) -> Result<(), ModuleError> {
///         let _rate = host.require_setting("XP_RATE")?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Loadable: Send + Sync + 'static {
    /// Qualified (dotted) module name.
    fn name(&self) -> &str;

    /// Default priority tier; higher loads earlier. Config overrides win.
    fn priority(&self) -> i32 {
        0
    }

    /// Entry point. `Ok` means loaded; [`ModuleError::Configuration`] means skipped;
    /// anything else aborts the loading pass.
    async fn setup(&self, host: &HostContext) -> Result<(), ModuleError>;

    /// Called on unload, after the module's background tasks were retired.
    async fn teardown(&self, _host: &HostContext) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Function-backed module.
///
/// The closure receives an owned [`HostContext`] and produces a fresh future per
/// load, so reloading runs it again from scratch.
pub struct ModuleFn<F> {
    name: Cow<'static, str>,
    priority: i32,
    f: F,
}

impl<F> ModuleFn<F> {
    /// Creates a new function-backed module.
    pub fn new(name: impl Into<Cow<'static, str>>, priority: i32, f: F) -> Self {
        Self {
            name: name.into(),
            priority,
            f,
        }
    }

    /// Creates the module and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use modvisor::{HostContext, ModuleError, ModuleFn, ModuleRef};
    ///
    /// let m: ModuleRef = ModuleFn::arc("core.ping", 100, |_host: HostContext| async {
    ///     Ok::<_, ModuleError>(())
    /// });
    /// assert_eq!(m.name(), "core.ping");
    /// assert_eq!(m.priority(), 100);
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, priority: i32, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, priority, f))
    }
}

#[async_trait]
impl<F, Fut> Loadable for ModuleFn<F>
where
    F: Fn(HostContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ModuleError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn setup(&self, host: &HostContext) -> Result<(), ModuleError> {
        (self.f)(host.clone()).await
    }
}
