//! Workflow-engine plugin for leasing compute hosts from a host-pool service.
//!
//! [`acquire`] leases a host over HTTP and projects the result into the
//! node's runtime properties, writing a private-key file when the pool hands
//! out key-based credentials. [`release`] returns the host to the pool and
//! removes every local trace of the lease. Both classify failures so the
//! engine can decide whether to retry ([`Error::recoverability`]).

mod client;
mod error;
mod keys;
mod ops;
pub mod properties;

pub use client::{HostPoolClient, ServiceSettings};
pub use common::{AllocationFilters, AllocationRecord, ServiceContract};
pub use error::{Error, Recoverability, Result};
pub use keys::KeyStore;
pub use ops::{acquire, release, NodeContext};
pub use properties::{InMemoryProperties, PropertyStore};
