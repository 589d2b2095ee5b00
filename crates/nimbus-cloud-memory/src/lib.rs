//! In-memory cloud backend for Nimbus
//!
//! This crate implements every backend client trait of `nimbus-cloud` on top
//! of an explicit, per-scope transactional key-value store. It is used by the
//! scenario tests and by the `nimbus` CLI simulator.
//!
//! # Features
//!
//! - Networks, subnets, routers and instances
//! - Load balancers with pools, health monitors, members, listeners and
//!   public addresses
//! - Simulated asynchronous provisioning: objects stay pending for a
//!   configurable number of reads
//! - Fault injection per resource kind
//! - Tags and the member-port side-table
//!
//! # Example
//!
//! ```ignore
//! use nimbus_cloud::{CloudConnection, ProvisionSettings};
//! use nimbus_cloud_memory::{MemoryCloud, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = MemoryStore::new();
//! let cloud = Arc::new(MemoryCloud::new(store.scope("demo"))?);
//! let connection = CloudConnection::new(cloud.clients(), ProvisionSettings::default());
//! ```

pub mod cloud;
pub mod error;
pub mod faults;
pub mod store;

pub use cloud::{Census, DEFAULT_EXTERNAL_NETWORK, MemoryCloud};
pub use error::{MemoryError, Result};
pub use faults::Fault;
pub use store::{MemoryStore, Scope, Transaction};
