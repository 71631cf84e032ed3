//! Storage configuration and backend construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::local::LocalObjectStorage;
use crate::memory::InMemoryObjectStorage;
use crate::traits::ObjectStorage;

/// Backend selection, tagged by `backend`.
///
/// ```toml
/// backend = "local"
/// root = "/var/lib/db/objects"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum StorageConfig {
    /// In-memory storage (tests, embedding).
    #[serde(rename = "memory")]
    Memory {
        /// Accept `WriteMode::Append`.
        #[serde(default = "default_append")]
        append: bool,
    },

    /// Local filesystem storage.
    #[serde(rename = "local")]
    Local {
        /// Directory holding every object.
        root: PathBuf,
    },
}

fn default_append() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory { append: true }
    }
}

impl StorageConfig {
    /// Parse configuration from a URL string.
    ///
    /// Supported URL formats:
    /// - `memory://`
    /// - `memory://?append=false`
    /// - `file:///path/to/objects`
    pub fn from_url(url: &str) -> StorageResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| StorageError::Config(format!("invalid storage URL {url:?}: {e}")))?;

        match parsed.scheme() {
            "memory" => {
                let append = match parsed.query_pairs().find(|(k, _)| k == "append") {
                    Some((_, v)) => v.parse::<bool>().map_err(|_| {
                        StorageError::Config(format!("invalid append flag {v:?} in {url:?}"))
                    })?,
                    None => true,
                };
                Ok(Self::Memory { append })
            }
            "file" => {
                let root = parsed.to_file_path().map_err(|()| {
                    StorageError::Config(format!("not a local file URL: {url:?}"))
                })?;
                Ok(Self::Local { root })
            }
            scheme => Err(StorageError::Config(format!(
                "unknown storage scheme: {scheme}"
            ))),
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> StorageResult<Self> {
        toml::from_str(text).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Self::from_toml_str(&text)
    }

    /// Render configuration as TOML.
    pub fn to_toml_string(&self) -> StorageResult<String> {
        toml::to_string(self).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Backend identifier this configuration builds.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory",
            Self::Local { .. } => "local",
        }
    }
}

/// Create a storage backend from configuration.
///
/// # Example
///
/// ```
/// use objstore::{create_storage, ObjectStorage, StorageConfig};
///
/// let storage = create_storage(&StorageConfig::from_url("memory://").unwrap()).unwrap();
/// assert!(!storage.exists("anything"));
/// ```
pub fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStorage>> {
    let storage: Arc<dyn ObjectStorage> = match config {
        StorageConfig::Memory { append: true } => Arc::new(InMemoryObjectStorage::new()),
        StorageConfig::Memory { append: false } => {
            Arc::new(InMemoryObjectStorage::without_append())
        }
        StorageConfig::Local { root } => Arc::new(LocalObjectStorage::new(root.clone())?),
    };
    info!(backend = storage.name(), "object storage created");
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ObjectStorageExt;
    use objstore_types::WriteMode;

    #[test]
    fn memory_url_parsing() {
        assert_eq!(
            StorageConfig::from_url("memory://").unwrap(),
            StorageConfig::Memory { append: true }
        );
        assert_eq!(
            StorageConfig::from_url("memory://?append=false").unwrap(),
            StorageConfig::Memory { append: false }
        );
        assert!(StorageConfig::from_url("memory://?append=maybe").is_err());
    }

    #[test]
    fn file_url_parsing() {
        let config = StorageConfig::from_url("file:///var/lib/objects").unwrap();
        assert_eq!(
            config,
            StorageConfig::Local {
                root: PathBuf::from("/var/lib/objects")
            }
        );
    }

    #[test]
    fn unknown_scheme() {
        let err = StorageConfig::from_url("s3://bucket").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(StorageConfig::from_url("not a url").is_err());
    }

    #[test]
    fn toml_local() {
        let config = StorageConfig::from_toml_str(
            r#"
backend = "local"
root = "/data/objects"
"#,
        )
        .unwrap();
        assert_eq!(
            config,
            StorageConfig::Local {
                root: PathBuf::from("/data/objects")
            }
        );
        assert_eq!(config.backend_name(), "local");
    }

    #[test]
    fn toml_memory_defaults_to_append() {
        let config = StorageConfig::from_toml_str(r#"backend = "memory""#).unwrap();
        assert_eq!(config, StorageConfig::Memory { append: true });
    }

    #[test]
    fn toml_round_trip() {
        let config = StorageConfig::Memory { append: false };
        let text = config.to_toml_string().unwrap();
        assert_eq!(StorageConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn toml_unknown_backend() {
        let err = StorageConfig::from_toml_str(r#"backend = "tape""#).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("storage.toml");
        std::fs::write(&path, "backend = \"memory\"\nappend = false\n").unwrap();
        assert_eq!(
            StorageConfig::load(&path).unwrap(),
            StorageConfig::Memory { append: false }
        );
        assert!(StorageConfig::load(&dir.path().join("missing.toml"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn create_memory_storage() {
        let storage = create_storage(&StorageConfig::Memory { append: false }).unwrap();
        assert_eq!(storage.name(), "memory");
        assert!(!storage.supports_append());
        storage
            .write_bytes("k", b"v", None, WriteMode::Rewrite)
            .unwrap();
        assert_eq!(storage.read_to_vec("k").unwrap(), b"v");
    }

    #[test]
    fn create_local_storage() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("objects");
        let storage = create_storage(&StorageConfig::Local { root: root.clone() }).unwrap();
        assert_eq!(storage.name(), "local");
        assert!(root.is_dir());
    }
}
