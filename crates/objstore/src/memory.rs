use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use objstore_types::{ObjectAttributes, ObjectMetadata, ReadSettings, WriteMode, WriteSettings};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::io::{ObjectReader, ObjectWriter};
use crate::path::{
    directory_prefix, ensure_no_object_ancestor, validate_object_key, validate_path,
    validate_prefix,
};
use crate::traits::ObjectStorage;

const BACKEND_NAME: &str = "memory";

/// Largest staging buffer a writer reserves up front, whatever `buf_size` says.
const MAX_INITIAL_RESERVE: usize = 64 * 1024 * 1024;

/// A committed object.
#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    attributes: ObjectAttributes,
}

type ObjectMap = BTreeMap<String, StoredObject>;

/// In-memory, `BTreeMap`-based object storage.
///
/// The reference backend: it implements the full contract and is intended
/// for tests and embedding. Objects live behind an `RwLock` and are shared
/// with readers as cheap `Bytes` snapshots, so a reader opened before a
/// rewrite keeps seeing the old content.
///
/// - Attributes are supported: metadata always carries `Some` map, empty
///   when the writer supplied none.
/// - Append is supported unless the storage was built with
///   [`InMemoryObjectStorage::without_append`].
/// - Writes commit on `finalize`; a dropped writer commits nothing.
/// - `remove_objects` checks and removes under one write lock, so a failed
///   batch leaves every member in place.
/// - Listings are returned in ascending key order.
pub struct InMemoryObjectStorage {
    objects: Arc<RwLock<ObjectMap>>,
    append_supported: bool,
}

impl InMemoryObjectStorage {
    /// Create a new empty storage with append support.
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            append_supported: true,
        }
    }

    /// Create a new empty storage that rejects [`WriteMode::Append`].
    pub fn without_append() -> Self {
        Self {
            append_supported: false,
            ..Self::new()
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    /// Returns `true` if the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.read_map()
            .values()
            .map(|obj| obj.data.len() as u64)
            .sum()
    }

    /// Remove all objects.
    pub fn clear(&self) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Infallible read access for queries that must never fail. The map is
    /// only mutated by whole-entry inserts and removals, so a poisoned lock
    /// still guards a consistent map.
    fn read_map(&self) -> RwLockReadGuard<'_, ObjectMap> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_read(&self) -> StorageResult<RwLockReadGuard<'_, ObjectMap>> {
        self.objects
            .read()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }

    fn try_write(&self) -> StorageResult<RwLockWriteGuard<'_, ObjectMap>> {
        self.objects
            .write()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` if some key lives underneath `path`.
fn is_directory(map: &ObjectMap, path: &str) -> bool {
    let dir = directory_prefix(path);
    map.range(dir.clone()..)
        .next()
        .is_some_and(|(key, _)| key.starts_with(&dir))
}

/// Reject a write that would nest `path` under an object or replace a
/// directory-like entity with one.
fn check_writable(map: &ObjectMap, path: &str) -> StorageResult<()> {
    ensure_no_object_ancestor(path, |ancestor| map.contains_key(ancestor))?;
    if !map.contains_key(path) && is_directory(map, path) {
        return Err(StorageError::not_a_file(path));
    }
    Ok(())
}

/// Classify a path with no object behind it.
fn missing(map: &ObjectMap, path: &str) -> StorageError {
    if is_directory(map, path) {
        StorageError::not_a_file(path)
    } else {
        StorageError::not_found(path)
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn supports_append(&self) -> bool {
        self.append_supported
    }

    fn supports_attributes(&self) -> bool {
        true
    }

    fn exists(&self, path: &str) -> bool {
        self.read_map().contains_key(path)
    }

    fn list_prefix(&self, path: &str, children: &mut Vec<String>) -> StorageResult<()> {
        validate_prefix(path)?;
        let map = self.try_read()?;
        let before = children.len();
        children.extend(
            map.range(path.to_string()..)
                .take_while(|(key, _)| key.starts_with(path))
                .map(|(key, _)| key.clone()),
        );
        debug!(prefix = path, found = children.len() - before, "memory list");
        Ok(())
    }

    fn get_object_metadata(&self, path: &str) -> StorageResult<ObjectMetadata> {
        validate_path(path)?;
        let map = self.try_read()?;
        let obj = map.get(path).ok_or_else(|| StorageError::not_found(path))?;
        Ok(ObjectMetadata::new(obj.data.len() as u64)
            .with_last_modified(obj.last_modified)
            .with_attributes(obj.attributes.clone()))
    }

    fn read_object(
        &self,
        path: &str,
        _settings: &ReadSettings,
        _read_hint: Option<usize>,
        _file_size: Option<usize>,
    ) -> StorageResult<Box<dyn ObjectReader>> {
        validate_path(path)?;
        let map = self.try_read()?;
        let obj = map.get(path).ok_or_else(|| StorageError::not_found(path))?;
        Ok(Box::new(MemoryObjectReader {
            path: path.to_string(),
            cursor: Cursor::new(obj.data.clone()),
        }))
    }

    fn write_object(
        &self,
        path: &str,
        attributes: Option<ObjectAttributes>,
        buf_size: usize,
        mode: WriteMode,
        _settings: &WriteSettings,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        validate_object_key(path)?;
        if mode.is_append() && !self.append_supported {
            return Err(StorageError::unsupported(BACKEND_NAME, "append"));
        }
        check_writable(&*self.try_read()?, path)?;
        Ok(Box::new(MemoryObjectWriter {
            objects: Arc::clone(&self.objects),
            path: path.to_string(),
            attributes,
            mode,
            buffer: Vec::with_capacity(buf_size.min(MAX_INITIAL_RESERVE)),
        }))
    }

    fn remove_object(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        let mut map = self.try_write()?;
        if map.remove(path).is_none() {
            return Err(missing(&map, path));
        }
        debug!(path, "memory remove");
        Ok(())
    }

    fn remove_objects(&self, paths: &[String]) -> StorageResult<()> {
        for path in paths {
            validate_path(path)?;
        }
        let mut map = self.try_write()?;
        if let Some(absent) = paths.iter().find(|p| !map.contains_key(p.as_str())) {
            return Err(missing(&map, absent));
        }
        for path in paths {
            map.remove(path.as_str());
        }
        debug!(count = paths.len(), "memory bulk remove");
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStorage")
            .field("object_count", &self.len())
            .field("append_supported", &self.append_supported)
            .finish()
    }
}

/// Reader over a snapshot of one object's bytes.
#[derive(Debug)]
pub struct MemoryObjectReader {
    path: String,
    cursor: Cursor<Bytes>,
}

impl Read for MemoryObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl ObjectReader for MemoryObjectReader {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> Option<u64> {
        Some(self.cursor.get_ref().len() as u64)
    }
}

/// Writer staging bytes until `finalize` commits them into the map.
pub struct MemoryObjectWriter {
    objects: Arc<RwLock<ObjectMap>>,
    path: String,
    attributes: Option<ObjectAttributes>,
    mode: WriteMode,
    buffer: Vec<u8>,
}

impl Write for MemoryObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemoryObjectWriter {
    fn path(&self) -> &str {
        &self.path
    }

    fn bytes_written(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn finalize(mut self: Box<Self>) -> StorageResult<()> {
        let buffer = std::mem::take(&mut self.buffer);
        let attributes = self.attributes.take();
        let mut map = self
            .objects
            .write()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        // Re-checked under the write lock: the namespace may have moved on
        // since the writer was opened.
        check_writable(&map, &self.path)?;

        let now = Utc::now();
        let committed = match (self.mode, map.remove(&self.path)) {
            (WriteMode::Append, Some(existing)) => {
                let mut data = BytesMut::with_capacity(existing.data.len() + buffer.len());
                data.extend_from_slice(&existing.data);
                data.extend_from_slice(&buffer);
                StoredObject {
                    data: data.freeze(),
                    last_modified: now,
                    attributes: attributes.unwrap_or(existing.attributes),
                }
            }
            _ => StoredObject {
                data: Bytes::from(buffer),
                last_modified: now,
                attributes: attributes.unwrap_or_default(),
            },
        };
        let size = committed.data.len();
        map.insert(self.path.clone(), committed);

        debug!(path = %self.path, mode = %self.mode, size, "memory commit");
        Ok(())
    }
}

impl std::fmt::Debug for MemoryObjectWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectWriter")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
