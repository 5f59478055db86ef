//! # Module abstractions and bookkeeping.
//!
//! This module provides the module-related types:
//! - [`Loadable`] - trait every module implements (`setup`, optional `teardown`)
//! - [`ModuleFn`] - function-backed module implementation
//! - [`ModuleRef`] - shared reference to a module (`Arc<dyn Loadable>`)
//! - [`ModuleCatalog`] - typed registry consulted by discovery
//! - [`Host`], [`HostContext`] - capabilities handed to modules
//! - [`ModuleDescriptor`], [`ModuleState`], [`FailureReason`] - per-module load record
//! - [`DescriptorStore`] - in-memory catalog of discovered descriptors

mod catalog;
mod context;
mod descriptor;
mod loadable;
mod store;

pub use catalog::ModuleCatalog;
pub use context::{EnvHost, Host, HostContext};
pub use descriptor::{FailureKind, FailureReason, ModuleDescriptor, ModuleState, Severity};
pub use loadable::{Loadable, ModuleFn, ModuleRef};
pub use store::DescriptorStore;
