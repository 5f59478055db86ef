//! # Module descriptors and their state machine.
//!
//! A [`ModuleDescriptor`] is created by discovery in [`ModuleState::Discovered`]
//! and then only moves forward:
//!
//! ```text
//! Discovered ──► Loading ──► Loaded
//!     │             ├──────► Skipped
//!     │             └──────► Failed
//!     └──► Skipped (duplicate)
//!
//! reload: Loaded | Skipped | Failed ──► Loading ──► ...
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ModuleError;

/// Load state of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Discovered,
    Loading,
    Loaded,
    Skipped,
    Failed,
}

impl ModuleState {
    /// Loaded, Skipped, or Failed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ModuleState::Loaded | ModuleState::Skipped | ModuleState::Failed
        )
    }

    /// Whether the automatic (non-reload) state machine allows `self → next`.
    pub fn can_advance_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Discovered, Loading)
                | (Discovered, Skipped)
                | (Loading, Loaded)
                | (Loading, Skipped)
                | (Loading, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Discovered => "discovered",
            ModuleState::Loading => "loading",
            ModuleState::Loaded => "loaded",
            ModuleState::Skipped => "skipped",
            ModuleState::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a module did not reach `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Module declined to load: a required setting is absent.
    ConfigurationSkip,
    /// Entry point failed unexpectedly.
    LoadFailure,
    /// Same qualified name already discovered earlier.
    DuplicateDescriptor,
}

/// Severity attached to a [`FailureReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Structured failure record kept on the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
    /// Error source chain, outermost first (excluding `message` itself).
    pub context: Vec<String>,
}

impl FailureReason {
    /// Classifies a module error and captures its source chain.
    pub fn from_module_error(err: &ModuleError) -> Self {
        let kind = if err.is_configuration() {
            FailureKind::ConfigurationSkip
        } else {
            FailureKind::LoadFailure
        };

        let mut context = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            context.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind,
            message: err.to_string(),
            context,
        }
    }

    /// Duplicate of a descriptor discovered earlier at `first`.
    pub fn duplicate(first: &Path) -> Self {
        Self {
            kind: FailureKind::DuplicateDescriptor,
            message: format!("duplicate of module already discovered at {}", first.display()),
            context: Vec::new(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            FailureKind::ConfigurationSkip | FailureKind::DuplicateDescriptor => Severity::Warning,
            FailureKind::LoadFailure => Severity::Error,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.context {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// One discoverable module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    path: PathBuf,
    qualified_name: String,
    priority_tier: i32,
    state: ModuleState,
    load_duration_micros: Option<u64>,
    failure_reason: Option<FailureReason>,
}

impl ModuleDescriptor {
    /// New descriptor in `Discovered` state.
    pub fn new(path: impl Into<PathBuf>, qualified_name: impl Into<String>, priority_tier: i32) -> Self {
        Self {
            path: path.into(),
            qualified_name: qualified_name.into(),
            priority_tier,
            state: ModuleState::Discovered,
            load_duration_micros: None,
            failure_reason: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn priority_tier(&self) -> i32 {
        self.priority_tier
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn load_duration_micros(&self) -> Option<u64> {
        self.load_duration_micros
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        self.failure_reason.as_ref()
    }

    pub(crate) fn begin_loading(&mut self) {
        self.advance(ModuleState::Loading);
        self.load_duration_micros = None;
        self.failure_reason = None;
    }

    pub(crate) fn mark_loaded(&mut self, elapsed: Duration) {
        self.advance(ModuleState::Loaded);
        self.load_duration_micros = Some(elapsed.as_micros().min(u128::from(u64::MAX)) as u64);
    }

    /// Records a non-success outcome; the state follows the reason's kind.
    pub(crate) fn mark_rejected(&mut self, reason: FailureReason, elapsed: Option<Duration>) {
        let next = match reason.kind {
            FailureKind::LoadFailure => ModuleState::Failed,
            FailureKind::ConfigurationSkip | FailureKind::DuplicateDescriptor => {
                ModuleState::Skipped
            }
        };
        self.advance(next);
        self.load_duration_micros =
            elapsed.map(|d| d.as_micros().min(u128::from(u64::MAX)) as u64);
        self.failure_reason = Some(reason);
    }

    /// Explicit reload: a terminal descriptor goes back to `Loading`.
    ///
    /// Returns `false` (and leaves the descriptor untouched) if it is not terminal.
    pub(crate) fn begin_reload(&mut self) -> bool {
        if !self.state.is_terminal() {
            return false;
        }
        self.state = ModuleState::Loading;
        self.load_duration_micros = None;
        self.failure_reason = None;
        true
    }

    fn advance(&mut self, next: ModuleState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal module transition {} -> {} for {}",
            self.state,
            next,
            self.qualified_name
        );
        self.state = next;
    }
}
