//! # Priority scheduler: descriptors → execution plan.
//!
//! Groups descriptors by priority tier and sorts tiers descending. Tiers are a
//! strict barrier for the loader; order *inside* a tier carries no meaning.
//!
//! Duplicate qualified names are resolved here: the first descriptor in
//! discovery order wins, later ones become `Skipped` with a duplicate reason.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::warn;

use crate::modules::{FailureReason, ModuleDescriptor};

/// Descriptors sharing one priority value.
#[derive(Debug, Clone)]
pub struct PriorityTier {
    priority: i32,
    descriptors: Vec<ModuleDescriptor>,
}

impl PriorityTier {
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn into_descriptors(self) -> Vec<ModuleDescriptor> {
        self.descriptors
    }
}

/// Ordered tiers (highest priority first) plus descriptors dropped as duplicates.
///
/// Immutable once built; the loader consumes it tier by tier.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    tiers: Vec<PriorityTier>,
    duplicates: Vec<ModuleDescriptor>,
}

impl ExecutionPlan {
    pub fn tiers(&self) -> &[PriorityTier] {
        &self.tiers
    }

    /// Descriptors already moved to `Skipped` as duplicates.
    pub fn duplicates(&self) -> &[ModuleDescriptor] {
        &self.duplicates
    }

    /// Number of descriptors that will be loaded.
    pub fn module_count(&self) -> usize {
        self.tiers.iter().map(PriorityTier::len).sum()
    }

    pub(crate) fn into_parts(self) -> (Vec<PriorityTier>, Vec<ModuleDescriptor>) {
        (self.tiers, self.duplicates)
    }
}

/// Builds the execution plan for `descriptors` (given in discovery order).
pub fn plan(descriptors: Vec<ModuleDescriptor>) -> ExecutionPlan {
    let mut first_seen: HashMap<String, PathBuf> = HashMap::new();
    let mut buckets: BTreeMap<i32, Vec<ModuleDescriptor>> = BTreeMap::new();
    let mut duplicates = Vec::new();

    for mut desc in descriptors {
        if let Some(first) = first_seen.get(desc.qualified_name()) {
            warn!(
                module = desc.qualified_name(),
                path = %desc.path().display(),
                first = %first.display(),
                "duplicate module dropped"
            );
            desc.mark_rejected(FailureReason::duplicate(first), None);
            duplicates.push(desc);
            continue;
        }
        first_seen.insert(desc.qualified_name().to_string(), desc.path().to_path_buf());
        buckets.entry(desc.priority_tier()).or_default().push(desc);
    }

    let tiers = buckets
        .into_iter()
        .rev()
        .map(|(priority, descriptors)| PriorityTier {
            priority,
            descriptors,
        })
        .collect();

    ExecutionPlan { tiers, duplicates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{FailureKind, ModuleState};

    fn desc(path: &str, name: &str, tier: i32) -> ModuleDescriptor {
        ModuleDescriptor::new(path, name, tier)
    }

    #[test]
    fn tiers_sorted_descending() {
        let plan = plan(vec![
            desc("a.rs", "a", 1),
            desc("b.rs", "b", 10),
            desc("c.rs", "c", 5),
            desc("d.rs", "d", 10),
            desc("e.rs", "e", -3),
        ]);
        let order: Vec<i32> = plan.tiers().iter().map(PriorityTier::priority).collect();
        assert_eq!(order, vec![10, 5, 1, -3]);
        assert_eq!(plan.tiers()[0].len(), 2);
        assert_eq!(plan.module_count(), 5);
        assert!(plan.duplicates().is_empty());
    }

    #[test]
    fn later_duplicate_is_skipped_deterministically() {
        let plan = plan(vec![
            desc("root1/x.rs", "x", 3),
            desc("root2/x.rs", "x", 9),
            desc("root1/y.rs", "y", 3),
        ]);

        assert_eq!(plan.module_count(), 2);
        assert_eq!(plan.tiers().len(), 1);
        assert_eq!(plan.tiers()[0].priority(), 3);

        let dup = &plan.duplicates()[0];
        assert_eq!(dup.path(), std::path::Path::new("root2/x.rs"));
        assert_eq!(dup.state(), ModuleState::Skipped);
        assert_eq!(
            dup.failure_reason().map(|r| r.kind),
            Some(FailureKind::DuplicateDescriptor)
        );
    }

    #[test]
    fn empty_input_gives_empty_plan() {
        let plan = plan(Vec::new());
        assert!(plan.tiers().is_empty());
        assert_eq!(plan.module_count(), 0);
    }
}
