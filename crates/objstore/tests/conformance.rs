//! Contract conformance across every shipped backend.

use std::sync::Arc;
use std::thread;

use objstore::conformance;
use objstore::{
    create_storage, InMemoryObjectStorage, LocalObjectStorage, ObjectStorage, ObjectStorageExt,
    StorageConfig, WriteMode,
};
use tempfile::TempDir;

fn assert_conforms(storage: &dyn ObjectStorage) {
    let report = conformance::run(storage, "conformance");
    assert!(report.passed(), "{report}");
    assert!(report.leftovers.is_empty(), "leftovers: {:?}", report.leftovers);
    assert!(storage.list_all("conformance/").unwrap().is_empty());
}

#[test]
fn in_memory_conforms() {
    assert_conforms(&InMemoryObjectStorage::new());
}

#[test]
fn in_memory_without_append_conforms() {
    assert_conforms(&InMemoryObjectStorage::without_append());
}

#[test]
fn local_conforms() {
    let dir = TempDir::new().unwrap();
    let storage = LocalObjectStorage::new(dir.path().join("objects")).unwrap();
    assert_conforms(&storage);
}

#[test]
fn local_conforms_twice_on_same_root() {
    let dir = TempDir::new().unwrap();
    let storage = LocalObjectStorage::new(dir.path()).unwrap();
    assert_conforms(&storage);
    assert_conforms(&storage);
}

#[test]
fn config_created_storages_conform() {
    let dir = TempDir::new().unwrap();
    let configs = [
        StorageConfig::from_url("memory://").unwrap(),
        StorageConfig::from_url("memory://?append=false").unwrap(),
        StorageConfig::Local {
            root: dir.path().join("from-config"),
        },
    ];
    for config in &configs {
        let storage = create_storage(config).unwrap();
        assert_eq!(storage.name(), config.backend_name());
        assert_conforms(storage.as_ref());
    }
}

#[test]
fn concurrent_runs_on_disjoint_prefixes() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStorage::new(dir.path()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || conformance::run(storage.as_ref(), &format!("worker-{i}")))
        })
        .collect();

    for handle in handles {
        let report = handle.join().unwrap();
        assert!(report.passed(), "{report}");
    }
    assert!(storage.list_all("").unwrap().is_empty());
}

#[test]
fn objects_outside_scratch_survive() {
    let storage = InMemoryObjectStorage::new();
    storage
        .write_bytes("store/part-1/data.bin", b"payload", None, WriteMode::Rewrite)
        .unwrap();
    assert_conforms(&storage);
    assert_eq!(storage.read_to_vec("store/part-1/data.bin").unwrap(), b"payload");
}
