//! Operator-facing results of a loading pass and of shutdown.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::CancellationReport;
use crate::error::RuntimeError;
use crate::modules::{FailureReason, ModuleDescriptor, ModuleState};

/// One row of a [`LoadSummary`].
#[derive(Debug, Clone)]
pub struct ModuleStatus {
    pub name: String,
    pub path: PathBuf,
    pub tier: i32,
    pub state: ModuleState,
    pub duration: Option<Duration>,
    pub reason: Option<FailureReason>,
}

impl From<&ModuleDescriptor> for ModuleStatus {
    fn from(d: &ModuleDescriptor) -> Self {
        Self {
            name: d.qualified_name().to_string(),
            path: d.path().to_path_buf(),
            tier: d.priority_tier(),
            state: d.state(),
            duration: d.load_duration_micros().map(Duration::from_micros),
            reason: d.failure_reason().cloned(),
        }
    }
}

/// Outcome of [`Coordinator::start`](crate::Coordinator::start), duplicates included.
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub modules: Vec<ModuleStatus>,
    pub elapsed: Duration,
}

impl LoadSummary {
    pub(crate) fn from_descriptors<'a>(
        descriptors: impl IntoIterator<Item = &'a ModuleDescriptor>,
        elapsed: Duration,
    ) -> Self {
        Self {
            modules: descriptors.into_iter().map(ModuleStatus::from).collect(),
            elapsed,
        }
    }

    pub fn count(&self, state: ModuleState) -> usize {
        self.modules.iter().filter(|m| m.state == state).count()
    }

    pub fn loaded(&self) -> usize {
        self.count(ModuleState::Loaded)
    }

    pub fn skipped(&self) -> usize {
        self.count(ModuleState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(ModuleState::Failed)
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "modules: {} loaded, {} skipped, {} failed ({:.1?})",
            self.loaded(),
            self.skipped(),
            self.failed(),
            self.elapsed
        )?;
        let width = self.modules.iter().map(|m| m.name.len()).max().unwrap_or(0);
        for m in &self.modules {
            write!(f, "  [{:<7}] tier {:<4} {:<width$}", m.state.as_str(), m.tier, m.name)?;
            match (&m.reason, m.duration) {
                (Some(reason), _) => writeln!(f, "  {reason}")?,
                (None, Some(d)) => writeln!(f, "  {d:.1?}")?,
                (None, None) => writeln!(f)?,
            }
        }
        Ok(())
    }
}

/// Outcome of [`Coordinator::shutdown`](crate::Coordinator::shutdown).
///
/// A shutdown that hit its timeout still completes; inspect `tasks.abandoned`.
#[derive(Debug)]
pub struct ShutdownReport {
    pub tasks: CancellationReport,
    /// Modules torn down, in teardown order.
    pub unloaded: Vec<String>,
    pub teardown_failures: Vec<RuntimeError>,
}

impl ShutdownReport {
    /// Every task retired in time and every teardown succeeded.
    pub fn is_clean(&self) -> bool {
        self.tasks.is_clean() && self.teardown_failures.is_empty()
    }
}
