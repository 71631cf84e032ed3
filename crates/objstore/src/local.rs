//! Local filesystem backend.
//!
//! Object keys map onto relative paths under a root directory, one file per
//! object, `/` segments becoming directories.
//!
//! Backend-specific behavior:
//! - **Attributes are not supported.** Attributes passed to `write_object`
//!   are dropped and metadata reports `attributes: None`.
//! - `Rewrite` stages into a hidden temporary file next to the target and
//!   renames it into place on `finalize`. An unfinalized rewrite leaves the
//!   previous object untouched, and a reader opened before the rename keeps
//!   reading the old file.
//! - `Append` is native: the file is opened in append mode behind a
//!   `BufWriter` of `buf_size`. Bytes reach the file whenever the buffer
//!   fills, so an append dropped without `finalize` may leave a prefix of
//!   the new bytes behind.
//! - Removing the last object in a directory prunes the empty directories
//!   up to the root, so directory-like entities exist only while they hold
//!   objects.
//! - An object key cannot be both an object and a directory: writing
//!   `a/b` while `a` is an object fails with `InvalidPath`.
//! - File names starting with [`TEMP_FILE_PREFIX`] are reserved for staging
//!   files. Writing an object whose last segment carries the prefix fails
//!   with `InvalidPath`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use memmap2::Mmap;
use objstore_types::{
    Durability, ObjectAttributes, ObjectMetadata, ReadMethod, ReadSettings, WriteMode,
    WriteSettings,
};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{StorageError, StorageResult};
use crate::io::{ObjectReader, ObjectWriter};
use crate::path::{
    ensure_no_object_ancestor, is_well_formed, validate_object_key, validate_path,
    validate_prefix,
};
use crate::traits::ObjectStorage;

const BACKEND_NAME: &str = "local";

/// File name prefix of in-flight rewrite files. Never listed.
pub const TEMP_FILE_PREFIX: &str = ".objstore-tmp-";

/// Attempts to create a file whose parent directory a concurrent removal
/// may prune between `create_dir_all` and the open.
const CREATE_ATTEMPTS: usize = 3;

/// What a path resolves to on disk.
enum Entry {
    File(fs::Metadata),
    Directory,
}

/// Object storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    /// Open storage rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| StorageError::io(root.display().to_string(), e))?;
        Ok(Self { root })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a validated key.
    fn key_to_path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_end_matches('/'))
    }

    /// Storage key of a file under the root.
    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(segments.join("/"))
        }
    }

    /// Resolve a validated path to what is on disk.
    fn resolve(&self, path: &str) -> StorageResult<Option<Entry>> {
        match fs::metadata(self.key_to_path(path)) {
            Ok(meta) if meta.is_dir() => Ok(Some(Entry::Directory)),
            // A trailing '/' can only address a directory.
            Ok(_) if path.ends_with('/') => Ok(None),
            Ok(meta) => Ok(Some(Entry::File(meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Metadata of the file behind `path`, or `NotFound`.
    fn file_metadata(&self, path: &str) -> StorageResult<fs::Metadata> {
        match self.resolve(path)? {
            Some(Entry::File(meta)) => Ok(meta),
            _ => Err(StorageError::not_found(path)),
        }
    }

    /// Remove one file and prune the directories it leaves empty.
    fn remove_file(&self, path: &str) -> StorageResult<()> {
        let target = self.key_to_path(path);
        fs::remove_file(&target).map_err(|e| StorageError::io(path, e))?;
        if let Some(parent) = target.parent() {
            self.prune_empty_dirs(parent);
        }
        debug!(path, "local remove");
        Ok(())
    }

    /// Remove empty directories from `dir` upwards, stopping at the root.
    ///
    /// Best effort: a directory that is not empty, or that a concurrent
    /// writer repopulates, simply stops the walk.
    fn prune_empty_dirs(&self, dir: &Path) {
        let mut current = Some(dir);
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            let is_empty = match fs::read_dir(dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => false,
            };
            if !is_empty {
                break;
            }
            if let Err(e) = fs::remove_dir(dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %e, "failed to prune empty directory");
                }
                break;
            }
            current = dir.parent();
        }
    }

    /// Create (or open) a file, creating parent directories as needed.
    fn create_file(&self, path: &str, target: &Path, options: &OpenOptions) -> StorageResult<File> {
        let parent = target.parent().unwrap_or(&self.root);
        let mut attempt = 0;
        loop {
            attempt += 1;
            fs::create_dir_all(parent).map_err(|e| StorageError::io(path, e))?;
            match options.open(target) {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < CREATE_ATTEMPTS => {
                    continue;
                }
                Err(e) => return Err(StorageError::io(path, e)),
            }
        }
    }
}

/// Whether the last segment of `path` collides with staging file names.
fn is_reserved_name(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|name| name.starts_with(TEMP_FILE_PREFIX))
}

impl ObjectStorage for LocalObjectStorage {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn supports_append(&self) -> bool {
        true
    }

    fn supports_attributes(&self) -> bool {
        false
    }

    fn exists(&self, path: &str) -> bool {
        is_well_formed(path) && !path.ends_with('/') && self.key_to_path(path).is_file()
    }

    fn list_prefix(&self, path: &str, children: &mut Vec<String>) -> StorageResult<()> {
        validate_prefix(path)?;
        // Only the directory holding the prefix's last segment can match.
        let dir = match path.rfind('/') {
            Some(idx) => self.root.join(&path[..idx]),
            None => self.root.clone(),
        };
        if !dir.is_dir() {
            return Ok(());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let entry_path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| dir.display().to_string());
                    let source = io::Error::from(e);
                    // Directories pruned by a concurrent removal vanish mid-walk.
                    if source.kind() == io::ErrorKind::NotFound {
                        continue;
                    }
                    return Err(StorageError::io(entry_path, source));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(TEMP_FILE_PREFIX)
            {
                continue;
            }
            if let Some(key) = self.path_to_key(entry.path()) {
                if key.starts_with(path) {
                    found.push(key);
                }
            }
        }
        found.sort();

        debug!(prefix = path, found = found.len(), "local list");
        children.extend(found);
        Ok(())
    }

    fn get_object_metadata(&self, path: &str) -> StorageResult<ObjectMetadata> {
        validate_path(path)?;
        let meta = self.file_metadata(path)?;
        let mut metadata = ObjectMetadata::new(meta.len());
        if let Ok(modified) = meta.modified() {
            metadata = metadata.with_last_modified(DateTime::<Utc>::from(modified));
        }
        Ok(metadata)
    }

    fn read_object(
        &self,
        path: &str,
        settings: &ReadSettings,
        read_hint: Option<usize>,
        file_size: Option<usize>,
    ) -> StorageResult<Box<dyn ObjectReader>> {
        validate_path(path)?;
        if path.ends_with('/') {
            return Err(StorageError::not_found(path));
        }
        let file = File::open(self.key_to_path(path)).map_err(|e| StorageError::io(path, e))?;
        let meta = file.metadata().map_err(|e| StorageError::io(path, e))?;
        if meta.is_dir() {
            return Err(StorageError::not_found(path));
        }
        let size = meta.len();

        let source = if settings.method == ReadMethod::Mmap && size > 0 {
            // SAFETY: rewrites replace the file by rename and never touch
            // this inode; appends only extend it past the mapped length.
            let map = unsafe { Mmap::map(&file) }.map_err(|e| StorageError::io(path, e))?;
            LocalSource::Mapped(Cursor::new(map))
        } else {
            let known = file_size.or_else(|| usize::try_from(size).ok());
            let capacity = settings.buffer_size_for(read_hint, known);
            let mut reader = BufReader::with_capacity(capacity, file);
            if settings.prefetch {
                reader.fill_buf().map_err(|e| StorageError::io(path, e))?;
            }
            LocalSource::Buffered(reader)
        };

        Ok(Box::new(LocalObjectReader {
            path: path.to_string(),
            size,
            source,
        }))
    }

    fn write_object(
        &self,
        path: &str,
        attributes: Option<ObjectAttributes>,
        buf_size: usize,
        mode: WriteMode,
        settings: &WriteSettings,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        validate_object_key(path)?;
        if is_reserved_name(path) {
            return Err(StorageError::invalid_path(
                path,
                format!("names starting with {TEMP_FILE_PREFIX:?} are reserved"),
            ));
        }
        ensure_no_object_ancestor(path, |ancestor| self.key_to_path(ancestor).is_file())?;
        let target = self.key_to_path(path);
        if target.is_dir() {
            return Err(StorageError::not_a_file(path));
        }
        if attributes.as_ref().is_some_and(|a| !a.is_empty()) {
            debug!(path, "local backend drops object attributes");
        }

        let (file, temp_path) = match mode {
            WriteMode::Rewrite => {
                let parent = target.parent().unwrap_or(&self.root);
                let temp = parent.join(format!("{TEMP_FILE_PREFIX}{}", Uuid::now_v7()));
                let mut options = OpenOptions::new();
                options.write(true).create_new(true);
                (self.create_file(path, &temp, &options)?, Some(temp))
            }
            WriteMode::Append => {
                let mut options = OpenOptions::new();
                options.append(true).create(true);
                (self.create_file(path, &target, &options)?, None)
            }
        };

        Ok(Box::new(LocalObjectWriter {
            path: path.to_string(),
            target,
            temp_path,
            writer: Some(BufWriter::with_capacity(buf_size.max(1), file)),
            mode,
            durability: settings.durability,
            bytes_written: 0,
        }))
    }

    fn remove_object(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        match self.resolve(path)? {
            Some(Entry::File(_)) => self.remove_file(path),
            Some(Entry::Directory) => Err(StorageError::not_a_file(path)),
            None => Err(StorageError::not_found(path)),
        }
    }

    /// Checks every member before removing any. A member removed by another
    /// caller between the check and the removal fails the call with
    /// `NotFound` after the members before it were already removed.
    fn remove_objects(&self, paths: &[String]) -> StorageResult<()> {
        for path in paths {
            validate_path(path)?;
            match self.resolve(path)? {
                Some(Entry::File(_)) => {}
                Some(Entry::Directory) => return Err(StorageError::not_a_file(path.as_str())),
                None => return Err(StorageError::not_found(path.as_str())),
            }
        }
        let mut removed = std::collections::HashSet::with_capacity(paths.len());
        for path in paths {
            if removed.insert(path.as_str()) {
                self.remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
enum LocalSource {
    Buffered(BufReader<File>),
    Mapped(Cursor<Mmap>),
}

/// Read stream over one local file.
#[derive(Debug)]
pub struct LocalObjectReader {
    path: String,
    size: u64,
    source: LocalSource,
}

impl Read for LocalObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            LocalSource::Buffered(reader) => reader.read(buf),
            LocalSource::Mapped(cursor) => cursor.read(buf),
        }
    }
}

impl ObjectReader for LocalObjectReader {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// Write stream into one local file.
#[derive(Debug)]
pub struct LocalObjectWriter {
    path: String,
    target: PathBuf,
    /// Staging file for `Rewrite`; cleared once renamed into place.
    temp_path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    mode: WriteMode,
    durability: Durability,
    bytes_written: u64,
}

impl LocalObjectWriter {
    fn inner(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("writer already finalized"))
    }
}

impl Write for LocalObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner()?.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()
    }
}

impl ObjectWriter for LocalObjectWriter {
    fn path(&self) -> &str {
        &self.path
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn finalize(mut self: Box<Self>) -> StorageResult<()> {
        let path = self.path.clone();
        let writer = self.writer.take().ok_or_else(|| {
            StorageError::io(path.as_str(), io::Error::other("writer already finalized"))
        })?;
        // On any error below, `Drop` still unlinks the staging file.
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::io(path.as_str(), e.into_error()))?;
        if self.durability == Durability::Fsync {
            file.sync_all()
                .map_err(|e| StorageError::io(path.as_str(), e))?;
        }
        drop(file);

        if let Some(temp) = self.temp_path.take() {
            if let Err(e) = fs::rename(&temp, &self.target) {
                self.temp_path = Some(temp);
                return Err(StorageError::io(path, e));
            }
        }

        debug!(
            path = %self.path,
            mode = %self.mode,
            size = self.bytes_written,
            "local commit"
        );
        Ok(())
    }
}

impl Drop for LocalObjectWriter {
    fn drop(&mut self) {
        // Close before unlinking the staging file.
        self.writer.take();
        if let Some(temp) = self.temp_path.take() {
            if let Err(e) = fs::remove_file(&temp) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(temp = %temp.display(), error = %e, "failed to remove staging file");
                }
            }
            debug!(path = %self.path, "discarded unfinalized rewrite");
        }
    }
}
