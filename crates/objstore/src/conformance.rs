//! Contract conformance suite.
//!
//! [`run`] exercises every guarantee of [`ObjectStorage`] against a live
//! backend, confined to a scratch prefix, and reports each check
//! separately. Backend test suites assert that the report passes; the CLI
//! exposes it as `objstore check` to vet a configured backend.
//!
//! The suite adapts to the capability methods: append is expected to
//! concatenate when [`ObjectStorage::supports_append`] is `true` and to fail
//! with `Unsupported` otherwise; attributes likewise follow
//! [`ObjectStorage::supports_attributes`].

use std::fmt;
use std::io::{Read, Write};

use objstore_types::{ObjectAttributes, ReadMethod, ReadSettings, WriteMode, WriteSettings};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectStorage, ObjectStorageExt};

type CheckFn = fn(&dyn ObjectStorage, &str) -> Result<(), String>;

/// Every check, in execution order.
const CHECKS: &[(&str, CheckFn)] = &[
    ("missing_paths_do_not_exist", missing_paths_do_not_exist),
    ("rewrite_round_trip", rewrite_round_trip),
    ("unfinalized_rewrite_commits_nothing", unfinalized_rewrite_commits_nothing),
    ("read_hints_are_advisory", read_hints_are_advisory),
    ("remove_missing_is_not_found", remove_missing_is_not_found),
    ("remove_if_exists_is_idempotent", remove_if_exists_is_idempotent),
    ("append_semantics", append_semantics),
    ("list_prefix_is_exact", list_prefix_is_exact),
    ("remove_objects_all_present", remove_objects_all_present),
    ("remove_objects_fails_fast", remove_objects_fails_fast),
    ("directory_is_not_a_file", directory_is_not_a_file),
    ("object_key_is_not_a_directory", object_key_is_not_a_directory),
    ("attributes_follow_capability", attributes_follow_capability),
];

/// Outcome of one check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    /// `None` when the check passed.
    pub failure: Option<String>,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of a full conformance run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConformanceReport {
    pub backend: String,
    pub scratch_prefix: String,
    pub checks: Vec<CheckOutcome>,
    /// Scratch objects that could not be removed afterwards.
    pub leftovers: Vec<String>,
}

impl ConformanceReport {
    /// `true` when every check passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(CheckOutcome::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed())
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self.checks.iter().filter(|c| c.passed()).count();
        write!(
            f,
            "{}: {passed}/{} checks passed",
            self.backend,
            self.checks.len()
        )?;
        for failure in self.failures() {
            write!(
                f,
                "\n  {}: {}",
                failure.name,
                failure.failure.as_deref().unwrap_or_default()
            )?;
        }
        Ok(())
    }
}

/// Run every check against `storage` under `scratch_prefix`.
///
/// Each check writes below `<scratch_prefix>/<check name>/`, which should be
/// empty of objects; everything written there is removed before returning.
/// An empty prefix places the check directories at the namespace root.
pub fn run(storage: &dyn ObjectStorage, scratch_prefix: &str) -> ConformanceReport {
    let scratch = match scratch_prefix.trim_end_matches('/') {
        "" => String::new(),
        trimmed => format!("{trimmed}/"),
    };
    let mut checks = Vec::with_capacity(CHECKS.len());

    for &(name, check) in CHECKS {
        let base = check_base(&scratch, name);
        let failure = check(storage, &base).err();
        match &failure {
            None => debug!(backend = storage.name(), check = name, "conformance check passed"),
            Some(reason) => {
                warn!(backend = storage.name(), check = name, reason = %reason, "conformance check failed")
            }
        }
        checks.push(CheckOutcome { name, failure });
    }

    ConformanceReport {
        backend: storage.name().to_string(),
        leftovers: cleanup(storage, &scratch),
        scratch_prefix: scratch,
        checks,
    }
}

fn check_base(scratch: &str, name: &str) -> String {
    format!("{scratch}{name}/")
}

/// Remove everything the checks wrote, returning what could not be removed.
///
/// Only the per-check directories are swept, so objects elsewhere under the
/// scratch prefix are never touched.
fn cleanup(storage: &dyn ObjectStorage, scratch: &str) -> Vec<String> {
    let mut leftovers = Vec::new();
    for &(name, _) in CHECKS {
        let base = check_base(scratch, name);
        match storage.list_all(&base) {
            Ok(keys) => leftovers.extend(
                keys.into_iter()
                    .filter(|key| storage.remove_object_if_exists(key).is_err()),
            ),
            Err(e) => warn!(base = %base, error = %e, "failed to list conformance scratch space"),
        }
    }
    leftovers
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn step<T>(result: StorageResult<T>, what: &str) -> Result<T, String> {
    result.map_err(|e| format!("{what}: {e}"))
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

fn expect_err<T>(
    result: StorageResult<T>,
    what: &str,
    matches: impl FnOnce(&StorageError) -> bool,
    expected: &str,
) -> Result<StorageError, String> {
    match result {
        Ok(_) => Err(format!("{what}: succeeded, expected {expected}")),
        Err(e) if matches(&e) => Ok(e),
        Err(e) => Err(format!("{what}: got {e}, expected {expected}")),
    }
}

fn put(storage: &dyn ObjectStorage, path: &str, data: &[u8]) -> Result<(), String> {
    step(
        storage.write_bytes(path, data, None, WriteMode::Rewrite),
        &format!("write {path}"),
    )
}

fn read(storage: &dyn ObjectStorage, path: &str) -> Result<Vec<u8>, String> {
    step(storage.read_to_vec(path), &format!("read {path}"))
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn missing_paths_do_not_exist(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let never = format!("{base}never-written");
    ensure(!storage.exists(&never), || format!("{never} exists before any write"))?;
    ensure(!storage.exists(""), || "empty path exists".into())?;

    let removed = format!("{base}removed");
    put(storage, &removed, b"short-lived")?;
    step(storage.remove_object(&removed), "remove")?;
    ensure(!storage.exists(&removed), || format!("{removed} exists after removal"))
}

fn rewrite_round_trip(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    for len in [0usize, 1, 4096, 300_000] {
        let path = format!("{base}obj-{len}");
        let data = pattern(len);
        put(storage, &path, &data)?;
        ensure(storage.exists(&path), || format!("{path} missing after write"))?;
        ensure(read(storage, &path)? == data, || {
            format!("{path}: content differs after round trip")
        })?;
        let meta = step(storage.get_object_metadata(&path), "metadata")?;
        ensure(meta.size_bytes == len as u64, || {
            format!("{path}: size_bytes {} != {len}", meta.size_bytes)
        })?;
    }

    // Rewrite with shorter content must not leave a tail behind.
    let path = format!("{base}obj-300000");
    put(storage, &path, b"short")?;
    ensure(read(storage, &path)? == b"short", || "rewrite kept stale tail".into())
}

fn unfinalized_rewrite_commits_nothing(
    storage: &dyn ObjectStorage,
    base: &str,
) -> Result<(), String> {
    let path = format!("{base}obj");
    put(storage, &path, b"committed")?;
    {
        let mut writer = step(
            storage.write_object(&path, None, 8, WriteMode::Rewrite, &WriteSettings::default()),
            "open writer",
        )?;
        writer
            .write_all(b"abandoned bytes")
            .map_err(|e| format!("write: {e}"))?;
    }
    ensure(read(storage, &path)? == b"committed", || {
        "dropped writer changed the object".into()
    })
}

fn read_hints_are_advisory(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let path = format!("{base}obj");
    let data = pattern(10_000);
    put(storage, &path, &data)?;

    let variants = [
        (ReadSettings::default(), None, None),
        (ReadSettings::default().with_buffer_size(3), Some(1), Some(7)),
        (ReadSettings::default().with_prefetch(true), Some(1 << 30), None),
        (ReadSettings::default().with_method(ReadMethod::Mmap), None, Some(data.len())),
    ];
    for (settings, read_hint, file_size) in variants {
        let mut reader = step(
            storage.read_object(&path, &settings, read_hint, file_size),
            "open reader",
        )?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| format!("read: {e}"))?;
        ensure(buf == data, || {
            format!("bytes differ with {settings:?}, hint {read_hint:?}, size {file_size:?}")
        })?;
    }

    let missing = format!("{base}missing");
    expect_err(
        storage.read_object(&missing, &ReadSettings::default(), None, None),
        "read missing",
        StorageError::is_not_found,
        "NotFound",
    )?;
    Ok(())
}

fn remove_missing_is_not_found(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let path = format!("{base}missing");
    expect_err(
        storage.remove_object(&path),
        "remove missing",
        StorageError::is_not_found,
        "NotFound",
    )?;
    expect_err(
        storage.get_object_metadata(&path),
        "metadata of missing",
        StorageError::is_not_found,
        "NotFound",
    )?;
    Ok(())
}

fn remove_if_exists_is_idempotent(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let path = format!("{base}obj");
    put(storage, &path, b"x")?;
    step(storage.remove_object_if_exists(&path), "first remove_if_exists")?;
    step(storage.remove_object_if_exists(&path), "second remove_if_exists")?;
    ensure(!storage.exists(&path), || "object survived removal".into())?;

    let never = format!("{base}never-written");
    step(storage.remove_object_if_exists(&never), "remove_if_exists on missing")?;
    step(storage.remove_object_if_exists(&never), "repeat remove_if_exists on missing")
}

fn append_semantics(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let path = format!("{base}log");
    put(storage, &path, b"first|")?;

    if storage.supports_append() {
        step(
            storage.write_bytes(&path, b"second", None, WriteMode::Append),
            "append",
        )?;
        ensure(read(storage, &path)? == b"first|second", || {
            "append did not concatenate".into()
        })?;
        let meta = step(storage.get_object_metadata(&path), "metadata")?;
        ensure(meta.size_bytes == 12, || {
            format!("size_bytes {} after append, expected 12", meta.size_bytes)
        })?;

        let fresh = format!("{base}fresh");
        step(
            storage.write_bytes(&fresh, b"created", None, WriteMode::Append),
            "append to missing",
        )?;
        ensure(read(storage, &fresh)? == b"created", || {
            "append did not create a missing object".into()
        })
    } else {
        expect_err(
            storage.write_object(&path, None, 8, WriteMode::Append, &WriteSettings::default()),
            "append",
            |e| matches!(e, StorageError::Unsupported { .. }),
            "Unsupported",
        )?;
        ensure(read(storage, &path)? == b"first|", || {
            "rejected append changed the object".into()
        })
    }
}

fn list_prefix_is_exact(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    for key in ["a/x", "a/y", "b/z"] {
        put(storage, &format!("{base}{key}"), key.as_bytes())?;
    }

    let mut listed = step(storage.list_all(&format!("{base}a/")), "list a/")?;
    listed.sort();
    let expected = vec![format!("{base}a/x"), format!("{base}a/y")];
    ensure(listed == expected, || format!("listed {listed:?}, expected {expected:?}"))?;

    let mut children = vec!["sentinel".to_string()];
    step(
        storage.list_prefix(&format!("{base}nothing-here/"), &mut children),
        "list empty prefix",
    )?;
    ensure(children == ["sentinel"], || {
        format!("empty listing changed output to {children:?}")
    })
}

fn remove_objects_all_present(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let p1 = format!("{base}p1");
    let p2 = format!("{base}p2");
    let keep = format!("{base}keep");
    for path in [&p1, &p2, &keep] {
        put(storage, path, b"x")?;
    }
    step(storage.remove_objects(&[p1.clone(), p2.clone()]), "remove_objects")?;
    ensure(!storage.exists(&p1) && !storage.exists(&p2), || {
        "members survived remove_objects".into()
    })?;
    ensure(storage.exists(&keep), || "remove_objects touched another path".into())
}

fn remove_objects_fails_fast(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let p1 = format!("{base}p1");
    let p2 = format!("{base}p2");
    put(storage, &p1, b"x")?;

    let err = expect_err(
        storage.remove_objects(&[p1.clone(), p2.clone()]),
        "remove_objects with missing member",
        StorageError::is_not_found,
        "NotFound",
    )?;
    ensure(err.path() == Some(p2.as_str()), || {
        format!("error names {:?}, expected {p2}", err.path())
    })?;
    ensure(storage.exists(&p1), || {
        "failed remove_objects removed a present member".into()
    })
}

fn directory_is_not_a_file(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let dir = format!("{base}dir");
    put(storage, &format!("{dir}/leaf"), b"x")?;

    ensure(!storage.exists(&dir), || "directory-like path reported as object".into())?;
    let not_a_file = |e: &StorageError| matches!(e, StorageError::NotAFile { .. });
    expect_err(storage.remove_object(&dir), "remove directory", not_a_file, "NotAFile")?;
    expect_err(
        storage.remove_object_if_exists(&dir),
        "remove_if_exists directory",
        not_a_file,
        "NotAFile",
    )?;
    ensure(storage.exists(&format!("{dir}/leaf")), || {
        "failed directory removal touched its children".into()
    })
}

fn object_key_is_not_a_directory(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let parent = format!("{base}obj");
    let child = format!("{parent}/child");
    put(storage, &parent, b"parent")?;

    expect_err(
        storage.write_bytes(&child, b"child", None, WriteMode::Rewrite),
        "write under an object key",
        |e| matches!(e, StorageError::InvalidPath { .. }),
        "InvalidPath",
    )?;
    ensure(!storage.exists(&child), || "child of an object was created".into())?;

    put(storage, &parent, b"replaced")?;
    ensure(read(storage, &parent)? == b"replaced", || {
        "rewrite of the parent object failed".into()
    })
}

fn attributes_follow_capability(storage: &dyn ObjectStorage, base: &str) -> Result<(), String> {
    let path = format!("{base}obj");
    let mut attributes = ObjectAttributes::new();
    attributes.insert("x-table".into(), "hits".into());
    step(
        storage.write_bytes(&path, b"payload", Some(attributes.clone()), WriteMode::Rewrite),
        "write with attributes",
    )?;
    let meta = step(storage.get_object_metadata(&path), "metadata")?;

    if storage.supports_attributes() {
        ensure(meta.attributes.as_ref() == Some(&attributes), || {
            format!("attributes {:?}, expected {attributes:?}", meta.attributes)
        })
    } else {
        ensure(meta.attributes.is_none(), || {
            "backend without attribute support reported attributes".into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStorage;

    #[test]
    fn memory_backend_conforms() {
        let storage = InMemoryObjectStorage::new();
        let report = run(&storage, "scratch");
        assert!(report.passed(), "{report}");
        assert!(report.leftovers.is_empty());
        assert!(storage.is_empty(), "scratch objects left behind");
    }

    #[test]
    fn memory_backend_without_append_conforms() {
        let storage = InMemoryObjectStorage::without_append();
        let report = run(&storage, "scratch/");
        assert!(report.passed(), "{report}");
        assert_eq!(report.scratch_prefix, "scratch/");
    }

    #[test]
    fn empty_scratch_prefix_runs_at_root() {
        let storage = InMemoryObjectStorage::new();
        storage
            .write_bytes("outside/keep", b"x", None, WriteMode::Rewrite)
            .unwrap();
        for prefix in ["", "/"] {
            let report = run(&storage, prefix);
            assert!(report.passed(), "{report}");
            assert_eq!(report.scratch_prefix, "");
            assert!(report.leftovers.is_empty());
        }
        assert_eq!(storage.list_all("").unwrap(), vec!["outside/keep"]);
    }

    #[test]
    fn cleanup_leaves_other_scratch_objects() {
        let storage = InMemoryObjectStorage::new();
        storage
            .write_bytes("scratch/mine", b"x", None, WriteMode::Rewrite)
            .unwrap();
        let report = run(&storage, "scratch");
        assert!(report.passed(), "{report}");
        assert_eq!(storage.list_all("").unwrap(), vec!["scratch/mine"]);
    }

    #[test]
    fn scratch_prefix_is_respected() {
        let storage = InMemoryObjectStorage::new();
        storage
            .write_bytes("outside/keep", b"x", None, WriteMode::Rewrite)
            .unwrap();
        let report = run(&storage, "scratch");
        assert!(report.passed(), "{report}");
        assert_eq!(storage.list_all("").unwrap(), vec!["outside/keep"]);
    }

    /// Storage that silently ignores `Append`, violating the contract.
    struct LyingAppend(InMemoryObjectStorage);

    impl ObjectStorage for LyingAppend {
        fn name(&self) -> &str {
            "lying"
        }
        fn supports_append(&self) -> bool {
            true
        }
        fn supports_attributes(&self) -> bool {
            self.0.supports_attributes()
        }
        fn exists(&self, path: &str) -> bool {
            self.0.exists(path)
        }
        fn list_prefix(&self, path: &str, children: &mut Vec<String>) -> StorageResult<()> {
            self.0.list_prefix(path, children)
        }
        fn get_object_metadata(&self, path: &str) -> StorageResult<objstore_types::ObjectMetadata> {
            self.0.get_object_metadata(path)
        }
        fn read_object(
            &self,
            path: &str,
            settings: &ReadSettings,
            read_hint: Option<usize>,
            file_size: Option<usize>,
        ) -> StorageResult<Box<dyn crate::io::ObjectReader>> {
            self.0.read_object(path, settings, read_hint, file_size)
        }
        fn write_object(
            &self,
            path: &str,
            attributes: Option<ObjectAttributes>,
            buf_size: usize,
            _mode: WriteMode,
            settings: &WriteSettings,
        ) -> StorageResult<Box<dyn crate::io::ObjectWriter>> {
            self.0
                .write_object(path, attributes, buf_size, WriteMode::Rewrite, settings)
        }
        fn remove_object(&self, path: &str) -> StorageResult<()> {
            self.0.remove_object(path)
        }
    }

    #[test]
    fn contract_violation_is_reported() {
        let storage = LyingAppend(InMemoryObjectStorage::new());
        let report = run(&storage, "scratch");
        assert!(!report.passed());
        let failed: Vec<_> = report.failures().map(|c| c.name).collect();
        assert_eq!(failed, vec!["append_semantics"]);
        assert!(report.to_string().contains("append_semantics"));
    }

    #[test]
    fn report_serializes() {
        let report = run(&InMemoryObjectStorage::new(), "s");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["backend"], "memory");
        assert_eq!(json["checks"].as_array().unwrap().len(), CHECKS.len());
    }
}
