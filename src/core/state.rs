//! Coordinator state machine.
//!
//! ```text
//! Idle ─► Discovering ─► Scheduled ─► Loading ─► Ready ─► Draining ─► Stopped
//!                                        └──────── (LoadFailure) ───────► Stopped
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    Discovering,
    Scheduled,
    Loading,
    Ready,
    Draining,
    Stopped,
}

impl LifecycleState {
    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Discovering, Scheduled)
                | (Discovering, Stopped)
                | (Scheduled, Loading)
                | (Loading, Ready)
                | (Loading, Stopped)
                | (Ready, Draining)
                | (Draining, Stopped)
        )
    }

    /// States in which a single module may be reloaded or unloaded.
    pub fn permits_reload(self) -> bool {
        matches!(
            self,
            LifecycleState::Idle | LifecycleState::Loading | LifecycleState::Ready
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Discovering => "discovering",
            LifecycleState::Scheduled => "scheduled",
            LifecycleState::Loading => "loading",
            LifecycleState::Ready => "ready",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn edges() {
        assert!(Idle.can_transition_to(Discovering));
        assert!(Loading.can_transition_to(Stopped));
        assert!(!Ready.can_transition_to(Loading));
        assert!(!Stopped.can_transition_to(Idle));
    }

    #[test]
    fn reload_windows() {
        for s in [Discovering, Scheduled, Draining, Stopped] {
            assert!(!s.permits_reload(), "{s}");
        }
        assert!(Ready.permits_reload());
    }
}
