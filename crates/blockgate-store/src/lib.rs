//! Object storage for blockgate.
//!
//! Blocks, their metadata and the upload bookkeeping objects are stored as
//! named blobs. The upload pipeline derives all of its state from which of
//! these blobs exist, so the store contract is deliberately small.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- map-based store for tests and embedding
//! - [`LocalFsObjectStore`] -- directory tree with atomic renames
//!
//! Wrappers:
//!
//! - [`TenantStore`] -- restricts a shared store to one tenant's prefix
//! - [`FaultInjectingStore`] -- fails selected operations, for tests
//!
//! # Design Rules
//!
//! 1. Writes replace; there is no append.
//! 2. There is no multi-object transaction.
//! 3. Absence is reported as [`StoreError::NotFound`], never as empty data.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fault;
pub mod local;
pub mod memory;
pub mod tenant;
pub mod traits;

pub use error::{StoreError, StoreOp, StoreResult};
pub use fault::FaultInjectingStore;
pub use local::LocalFsObjectStore;
pub use memory::InMemoryObjectStore;
pub use tenant::TenantStore;
pub use traits::{ObjectAttributes, ObjectStore};
