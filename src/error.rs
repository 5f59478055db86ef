//! Error types used by the modvisor runtime and by modules.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`]: errors raised by the lifecycle machinery itself.
//! - [`ModuleError`]: errors raised by a module's `setup` / `teardown` hooks.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! [`ModuleError::is_configuration`] drives the loader's skip-vs-fail classification.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::LifecycleState;

/// # Errors produced by the modvisor runtime.
///
/// Only [`RuntimeError::LoadFailure`] is meant to reach the process-level fault
/// boundary; everything else is either a caller mistake or a local condition.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Discovery root could not be read.
    #[error("cannot read module root {path:?}: {reason}")]
    Configuration {
        /// Root that failed.
        path: PathBuf,
        /// Underlying I/O reason.
        reason: String,
    },

    /// Operation is not allowed in the current lifecycle state.
    #[error("`{op}` is not permitted while the coordinator is {state}")]
    InvalidState {
        /// Operation that was attempted.
        op: &'static str,
        /// State observed when the operation was attempted.
        state: LifecycleState,
    },

    /// A module's entry point failed unexpectedly; the loading pass was aborted.
    #[error("module `{module}` failed to load: {reason}")]
    LoadFailure {
        /// Qualified name of the failing module.
        module: String,
        /// Failure description (error chain flattened).
        reason: String,
    },

    /// No descriptor with this qualified name is known.
    #[error("module `{name}` is not known")]
    ModuleNotFound {
        /// Qualified name that was looked up.
        name: String,
    },

    /// A module's teardown hook failed during unload.
    #[error("module `{module}` teardown failed: {reason}")]
    TeardownFailed {
        /// Qualified name of the module.
        module: String,
        /// Failure description.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use modvisor::RuntimeError;
    ///
    /// let err = RuntimeError::ModuleNotFound { name: "admin.ban".into() };
    /// assert_eq!(err.as_label(), "runtime_module_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Configuration { .. } => "runtime_configuration",
            RuntimeError::InvalidState { .. } => "runtime_invalid_state",
            RuntimeError::LoadFailure { .. } => "runtime_load_failure",
            RuntimeError::ModuleNotFound { .. } => "runtime_module_not_found",
            RuntimeError::TeardownFailed { .. } => "runtime_teardown_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Configuration { path, reason } => {
                format!("module root {} unreadable: {reason}", path.display())
            }
            RuntimeError::InvalidState { op, state } => format!("{op} rejected in state {state}"),
            RuntimeError::LoadFailure { module, reason } => {
                format!("fatal load failure in {module}: {reason}")
            }
            RuntimeError::ModuleNotFound { name } => format!("unknown module {name}"),
            RuntimeError::TeardownFailed { module, reason } => {
                format!("teardown of {module} failed: {reason}")
            }
        }
    }

    /// Process exit code the host should use when this error ends the process.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::LoadFailure { .. } => 70,
            RuntimeError::Configuration { .. } => 78,
            _ => 1,
        }
    }
}

/// # Errors produced by modules.
///
/// Returned from [`Loadable::setup`](crate::Loadable::setup) and
/// [`Loadable::teardown`](crate::Loadable::teardown).
/// [`ModuleError::Configuration`] means "a required setting is absent" and makes the
/// loader skip the module; every other variant is treated as a defect.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ModuleError {
    /// A required external setting is missing; the module declines to load.
    #[error("missing required setting `{setting}`")]
    Configuration {
        /// Name of the missing setting.
        setting: String,
    },

    /// Setup failed with a plain message.
    #[error("setup failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Setup failed with an underlying error value.
    #[error("setup failed")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The entry point panicked; caught by the loader.
    #[error("module panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Configuration`].
    pub fn missing_setting(setting: impl Into<String>) -> Self {
        ModuleError::Configuration {
            setting: setting.into(),
        }
    }

    /// Shorthand for [`ModuleError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ModuleError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use modvisor::ModuleError;
    ///
    /// let err = ModuleError::missing_setting("DATABASE_URL");
    /// assert_eq!(err.as_label(), "module_configuration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ModuleError::Configuration { .. } => "module_configuration",
            ModuleError::Fail { .. } => "module_failed",
            ModuleError::Source(_) => "module_failed",
            ModuleError::Panicked { .. } => "module_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ModuleError::Configuration { setting } => format!("setting {setting} is not set"),
            ModuleError::Fail { error } => format!("error: {error}"),
            ModuleError::Source(err) => format!("error: {err}"),
            ModuleError::Panicked { message } => format!("panic: {message}"),
        }
    }

    /// True if the module declined to load because of absent configuration.
    ///
    /// # Example
    /// ```
    /// use modvisor::ModuleError;
    ///
    /// assert!(ModuleError::missing_setting("TOKEN").is_configuration());
    /// assert!(!ModuleError::fail("boom").is_configuration());
    /// ```
    pub fn is_configuration(&self) -> bool {
        matches!(self, ModuleError::Configuration { .. })
    }
}
