use std::io;

/// Errors from object storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The operation required an object at this path and there was none.
    #[error("object not found: {path}")]
    NotFound { path: String },

    /// The path denotes a directory-like entity, not a leaf object.
    #[error("not a file: {path}")]
    NotAFile { path: String },

    /// The backend does not support the requested mode or feature.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported { backend: String, operation: String },

    /// Transport or backend failure unrelated to existence.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Reserved for strict-create semantics. `Rewrite` never raises it.
    #[error("object already exists: {path}")]
    AlreadyExists { path: String },

    /// The path is not a well-formed object key.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Storage configuration could not be parsed or applied.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal lock was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl StorageError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn not_a_file(path: impl Into<String>) -> Self {
        Self::NotAFile { path: path.into() }
    }

    pub fn unsupported(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend: backend.into(),
            operation: operation.into(),
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error, mapping `ErrorKind::NotFound` to [`StorageError::NotFound`].
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// `NotFound` is the one expected, recoverable error kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The object path this error concerns, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path }
            | Self::NotAFile { path }
            | Self::Io { path, .. }
            | Self::AlreadyExists { path }
            | Self::InvalidPath { path, .. } => Some(path),
            Self::Unsupported { .. } | Self::Config(_) | Self::Poisoned(_) => None,
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err = StorageError::io("a/b", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert_eq!(err.path(), Some("a/b"));
    }

    #[test]
    fn io_other_kinds_stay_io() {
        let err = StorageError::io("a/b", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            StorageError::not_found("x").to_string(),
            "object not found: x"
        );
        assert_eq!(
            StorageError::unsupported("memory", "append").to_string(),
            "append is not supported by the memory backend"
        );
        assert_eq!(
            StorageError::invalid_path("../x", "must not contain '..'").to_string(),
            "invalid path \"../x\": must not contain '..'"
        );
    }

    #[test]
    fn path_accessor() {
        assert_eq!(StorageError::not_a_file("dir").path(), Some("dir"));
        assert_eq!(StorageError::Config("bad".into()).path(), None);
    }
}
