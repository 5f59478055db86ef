//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the lifecycle coordinator.
//! It doubles as the configuration collaborator for discovery and scheduling:
//! the ignore set and tier overrides are read from here and nowhere else.
//!
//! ## Sentinel values
//! - `max_concurrent_loads = 0` → unlimited (no semaphore created)
//! - `slow_load_threshold = 0s` → slow-load reporting disabled
//! - `stale_after = 0` → treated as 1 interval

use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Global configuration for the lifecycle coordinator.
///
/// ## Field semantics
/// - `extension`: file extension of module files (without the dot)
/// - `ignore`: file stems or qualified names that are never modules
/// - `tier_overrides`: qualified name or dotted package prefix → priority tier
/// - `slow_load_threshold`: loads slower than this are reported (advisory only)
/// - `max_concurrent_loads`: cap on concurrent loads inside one tier (`0` = unlimited)
/// - `probe_interval`: period of the task health probe
/// - `stale_after`: intervals without heartbeat before a task is reported stale
/// - `shutdown_timeout`: upper bound on waiting for tasks to retire at shutdown
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    pub extension: String,
    pub ignore: HashSet<String>,
    pub tier_overrides: HashMap<String, i32>,
    pub slow_load_threshold: Duration,
    pub max_concurrent_loads: usize,
    pub probe_interval: Duration,
    pub stale_after: u32,
    pub shutdown_timeout: Duration,
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the per-tier load concurrency limit as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent_loads == 0 {
            None
        } else {
            Some(self.max_concurrent_loads)
        }
    }

    /// Returns the slow-load threshold, or `None` when disabled.
    #[inline]
    pub fn slow_threshold(&self) -> Option<Duration> {
        if self.slow_load_threshold == Duration::ZERO {
            None
        } else {
            Some(self.slow_load_threshold)
        }
    }

    /// Age after which a task without heartbeat is reported stale.
    #[inline]
    pub fn stale_window(&self) -> Duration {
        self.probe_interval.saturating_mul(self.stale_after.max(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Tier for `qualified`: exact override, then the longest dotted package
    /// prefix override, then `default`.
    ///
    /// # Example
    /// ```
    /// use modvisor::Config;
    ///
    /// let mut cfg = Config::default();
    /// cfg.tier_overrides.insert("services".into(), 90);
    /// cfg.tier_overrides.insert("services.db".into(), 100);
    ///
    /// assert_eq!(cfg.tier_for("services.db", 0), 100);
    /// assert_eq!(cfg.tier_for("services.cache.redis", 0), 90);
    /// assert_eq!(cfg.tier_for("servicesx", 7), 7);
    /// ```
    pub fn tier_for(&self, qualified: &str, default: i32) -> i32 {
        if let Some(&tier) = self.tier_overrides.get(qualified) {
            return tier;
        }
        let mut prefix = qualified;
        while let Some((head, _)) = prefix.rsplit_once('.') {
            if let Some(&tier) = self.tier_overrides.get(head) {
                return tier;
            }
            prefix = head;
        }
        default
    }

    /// True if the file stem or qualified name is in the ignore set.
    pub fn is_ignored(&self, stem: &str, qualified: &str) -> bool {
        self.ignore.contains(stem) || self.ignore.contains(qualified)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `extension = "rs"`, empty ignore set, no overrides
    /// - `slow_load_threshold = 1s`
    /// - `max_concurrent_loads = 0` (unlimited)
    /// - `probe_interval = 60s`, `stale_after = 5`
    /// - `shutdown_timeout = 30s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            extension: "rs".to_string(),
            ignore: HashSet::new(),
            tier_overrides: HashMap::new(),
            slow_load_threshold: Duration::from_secs(1),
            max_concurrent_loads: 0,
            probe_interval: Duration::from_secs(60),
            stale_after: 5,
            shutdown_timeout: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        let mut cfg = Config::default();
        assert_eq!(cfg.concurrency_limit(), None);
        assert_eq!(cfg.stale_window(), Duration::from_secs(300));

        cfg.max_concurrent_loads = 4;
        cfg.slow_load_threshold = Duration::ZERO;
        cfg.stale_after = 0;
        cfg.bus_capacity = 0;
        assert_eq!(cfg.concurrency_limit(), Some(4));
        assert_eq!(cfg.slow_threshold(), None);
        assert_eq!(cfg.stale_window(), cfg.probe_interval);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn ignore_matches_stem_or_name() {
        let mut cfg = Config::default();
        cfg.ignore.insert("helpers".into());
        cfg.ignore.insert("admin.debug".into());
        assert!(cfg.is_ignored("helpers", "utils.helpers"));
        assert!(cfg.is_ignored("debug", "admin.debug"));
        assert!(!cfg.is_ignored("debug", "dev.debug"));
    }
}
