//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for plugging fault-reporting and telemetry
//! sinks into the runtime. Each subscriber is driven by a dedicated worker loop fed
//! by a bounded queue that is owned by the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching, retries); they do **not** block
//!   the loader, the registry, or other subscribers.
//! - Each subscriber **declares** its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. If a queue overflows, events for that
//!   subscriber are **dropped** (warn).
//!
//! ## Example
//! ```rust
//! use modvisor::{Event, EventKind, Subscribe};
//!
//! struct FaultSink;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FaultSink {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ModuleFailed {
//!             // forward to the error-reporting backend...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "fault-sink" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
