use std::collections::HashSet;
use std::io::{Read, Write};

use objstore_types::{
    ObjectAttributes, ObjectMetadata, ReadSettings, WriteMode, WriteSettings, DEFAULT_BUFFER_SIZE,
};

use crate::error::{StorageError, StorageResult};
use crate::io::{ObjectReader, ObjectWriter};
use crate::path::validate_path;

/// Backend-agnostic object storage over a flat keyed namespace.
///
/// All implementations must satisfy these invariants:
/// - `exists` never fails; it answers `false` for anything that is not a
///   currently committed object, malformed paths included.
/// - A finalized write is visible to every call issued after `finalize`
///   returns.
/// - `Rewrite` replaces, `Append` extends; there is no in-place update.
/// - Removing an object never affects any other path.
/// - Calls against different paths are safe from any number of threads.
///
/// Same-path concurrency (a read racing a rewrite, a removal racing a
/// write) is backend-defined.
pub trait ObjectStorage: Send + Sync {
    /// Short backend identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Whether [`WriteMode::Append`] is accepted.
    fn supports_append(&self) -> bool;

    /// Whether attributes passed to `write_object` are stored and reported.
    ///
    /// When `false`, attributes are silently dropped and
    /// [`ObjectMetadata::attributes`] is always `None`.
    fn supports_attributes(&self) -> bool;

    /// Check whether an object exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Append every key beginning with `path` to `children`.
    ///
    /// A prefix with no match appends nothing and succeeds. Ordering is not
    /// part of the contract.
    fn list_prefix(&self, path: &str, children: &mut Vec<String>) -> StorageResult<()>;

    /// Metadata snapshot for the object at `path`.
    ///
    /// Returns `NotFound` if no object exists there.
    fn get_object_metadata(&self, path: &str) -> StorageResult<ObjectMetadata>;

    /// Open a sequential read stream.
    ///
    /// `read_hint` (expected number of bytes to read) and `file_size` (known
    /// object size) are advisory and never change the returned bytes.
    /// Returns `NotFound` if no object exists at call time.
    fn read_object(
        &self,
        path: &str,
        settings: &ReadSettings,
        read_hint: Option<usize>,
        file_size: Option<usize>,
    ) -> StorageResult<Box<dyn ObjectReader>>;

    /// Open a write stream. Bytes are committed by [`ObjectWriter::finalize`].
    ///
    /// `buf_size` sizes the backend's write buffer. `Append` on a backend
    /// without append support fails with `Unsupported`.
    fn write_object(
        &self,
        path: &str,
        attributes: Option<ObjectAttributes>,
        buf_size: usize,
        mode: WriteMode,
        settings: &WriteSettings,
    ) -> StorageResult<Box<dyn ObjectWriter>>;

    /// Remove the object at `path`.
    ///
    /// Returns `NotFound` if there is none, `NotAFile` if `path` names a
    /// directory-like entity.
    fn remove_object(&self, path: &str) -> StorageResult<()>;

    /// Remove several objects.
    ///
    /// Fails fast: every path is checked before anything is removed, and a
    /// missing member fails the call with `NotFound` naming it while the
    /// other members stay in place. Duplicate paths are removed once.
    ///
    /// The default implementation checks with `exists` and then removes one
    /// path at a time, so a removal racing from another caller between the
    /// two phases can still leave the batch half done. Backends that can
    /// hold the namespace still override this.
    fn remove_objects(&self, paths: &[String]) -> StorageResult<()> {
        for path in paths {
            validate_path(path)?;
            if !self.exists(path) {
                return Err(StorageError::not_found(path.as_str()));
            }
        }
        let mut seen = HashSet::with_capacity(paths.len());
        for path in paths {
            if seen.insert(path.as_str()) {
                self.remove_object(path)?;
            }
        }
        Ok(())
    }

    /// Remove the object at `path` if there is one. Idempotent.
    fn remove_object_if_exists(&self, path: &str) -> StorageResult<()> {
        match self.remove_object(path) {
            Err(StorageError::NotFound { .. }) => Ok(()),
            other => other,
        }
    }
}

/// Whole-object conveniences over the streaming contract.
pub trait ObjectStorageExt: ObjectStorage {
    /// Read an entire object into memory.
    fn read_to_vec(&self, path: &str) -> StorageResult<Vec<u8>> {
        let mut reader = self.read_object(path, &ReadSettings::default(), None, None)?;
        let mut buf = match reader.size() {
            Some(size) => Vec::with_capacity(size as usize),
            None => Vec::new(),
        };
        reader
            .read_to_end(&mut buf)
            .map_err(|e| StorageError::io(path, e))?;
        Ok(buf)
    }

    /// Write `data` as one object and commit it.
    fn write_bytes(
        &self,
        path: &str,
        data: &[u8],
        attributes: Option<ObjectAttributes>,
        mode: WriteMode,
    ) -> StorageResult<()> {
        let buf_size = data.len().clamp(1, DEFAULT_BUFFER_SIZE);
        let mut writer =
            self.write_object(path, attributes, buf_size, mode, &WriteSettings::default())?;
        writer
            .write_all(data)
            .map_err(|e| StorageError::io(path, e))?;
        writer.finalize()
    }

    /// Collect every key under `prefix` into a fresh vector.
    fn list_all(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut children = Vec::new();
        self.list_prefix(prefix, &mut children)?;
        Ok(children)
    }
}

impl<T: ObjectStorage + ?Sized> ObjectStorageExt for T {}
