//! Backend-agnostic object storage for a database engine.
//!
//! The engine persists table parts, logs and metadata files as objects in a
//! flat keyed namespace (`"store/abc/data.bin"`). This crate defines the
//! contract those callers program against and ships two backends.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStorage`] trait:
//!
//! - [`InMemoryObjectStorage`] -- `BTreeMap`-based store for tests and embedding
//! - [`LocalObjectStorage`] -- one file per object under a root directory
//!
//! [`create_storage`] builds either from a [`StorageConfig`], and
//! [`conformance::run`] checks any implementation against the contract.
//!
//! # Design Rules
//!
//! 1. Keys are opaque: `/` only shapes prefix listing and directory mapping.
//! 2. A write is invisible until its writer is finalized; dropping it aborts.
//! 3. `Rewrite` replaces an object, `Append` extends it. Nothing else mutates.
//! 4. `exists` never fails; every other failure is a typed [`StorageError`].
//! 5. Capabilities are queried (`supports_append`, `supports_attributes`), never assumed.

pub mod config;
pub mod conformance;
pub mod error;
pub mod io;
pub mod local;
pub mod memory;
pub mod path;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{create_storage, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use io::{ObjectReader, ObjectWriter};
pub use local::LocalObjectStorage;
pub use memory::InMemoryObjectStorage;
pub use objstore_types::{
    Durability, ObjectAttributes, ObjectMetadata, ReadMethod, ReadSettings, WriteMode,
    WriteSettings, DEFAULT_BUFFER_SIZE,
};
pub use traits::{ObjectStorage, ObjectStorageExt};
