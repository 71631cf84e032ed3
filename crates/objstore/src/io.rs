//! Streaming handles returned by [`ObjectStorage`](crate::ObjectStorage).
//!
//! Both handles are owned by the caller once returned. Dropping a handle
//! releases every backend resource it holds, on success and failure paths
//! alike. A writer commits only through [`ObjectWriter::finalize`]; a writer
//! dropped without finalizing aborts (see each backend for what an aborted
//! append leaves behind).

use std::fmt::Debug;
use std::io::{Read, Write};

use crate::error::StorageResult;

/// Sequential read stream over one object.
pub trait ObjectReader: Read + Send + Debug {
    /// Path of the object being read.
    fn path(&self) -> &str;

    /// Size of the object when the stream was opened, if known.
    fn size(&self) -> Option<u64>;
}

/// Sequential write stream into one object.
pub trait ObjectWriter: Write + Send + Debug {
    /// Path of the object being written.
    fn path(&self) -> &str;

    /// Bytes accepted by this stream so far.
    fn bytes_written(&self) -> u64;

    /// Flush and commit the written bytes.
    ///
    /// Once this returns `Ok`, the object is visible to every call issued
    /// afterwards. On `Err`, nothing new is committed for `Rewrite`.
    fn finalize(self: Box<Self>) -> StorageResult<()>;
}
