//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the coordinator, loader,
//! task registry, probe loop, and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`ProbeCounts`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! The bus is the write-only fault-reporting and telemetry sink: nothing in the
//! runtime reads it back to make decisions.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, ProbeCounts};
