//! Object path validation.
//!
//! The namespace is flat, but `/` separates segments that backends may map
//! onto a directory hierarchy. A well-formed path:
//! - Must be non-empty
//! - Must not contain a NUL byte
//! - Must not start with `/`
//! - Must not contain empty, `.` or `..` segments (a single trailing `/` is
//!   allowed and addresses a directory-like entity)
//!
//! Object keys, the paths a write may create, must additionally not end
//! with `/`.

use crate::error::{StorageError, StorageResult};

/// Validate a path used to address an object or a directory-like entity.
///
/// # Examples
///
/// ```
/// use objstore::path::validate_path;
///
/// assert!(validate_path("data/part-0001.bin").is_ok());
/// assert!(validate_path("data/").is_ok());
/// assert!(validate_path("").is_err());
/// assert!(validate_path("data/../etc").is_err());
/// ```
pub fn validate_path(path: &str) -> StorageResult<()> {
    if path.is_empty() {
        return Err(StorageError::invalid_path(path, "path must not be empty"));
    }
    if path.starts_with('/') {
        return Err(StorageError::invalid_path(path, "must not start with '/'"));
    }
    let body = path.strip_suffix('/').unwrap_or(path);
    validate_segments(path, body)
}

/// Validate a path a write may create.
pub fn validate_object_key(path: &str) -> StorageResult<()> {
    validate_path(path)?;
    if path.ends_with('/') {
        return Err(StorageError::invalid_path(path, "object key must not end with '/'"));
    }
    Ok(())
}

/// Validate a listing prefix.
///
/// Prefixes are looser than paths: the empty prefix selects everything and
/// the last segment may be partial. Traversal segments are still rejected.
pub fn validate_prefix(prefix: &str) -> StorageResult<()> {
    if prefix.is_empty() {
        return Ok(());
    }
    if prefix.starts_with('/') {
        return Err(StorageError::invalid_path(prefix, "must not start with '/'"));
    }
    if prefix.contains('\0') {
        return Err(StorageError::invalid_path(prefix, "contains NUL byte"));
    }
    // Only complete segments can be traversal segments.
    let complete = match prefix.rfind('/') {
        Some(idx) => &prefix[..idx],
        None => return Ok(()),
    };
    if complete.split('/').any(|seg| seg == "..") {
        return Err(StorageError::invalid_path(prefix, "must not contain '..' segments"));
    }
    Ok(())
}

/// Returns `true` if `path` passes [`validate_path`].
pub fn is_well_formed(path: &str) -> bool {
    validate_path(path).is_ok()
}

/// The key prefix under which `path` would contain children.
///
/// `"a/b"` and `"a/b/"` both yield `"a/b/"`.
pub fn directory_prefix(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Every proper ancestor of `path`, shortest first.
///
/// `"a/b/c"` yields `"a"` then `"a/b"`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let body = path.strip_suffix('/').unwrap_or(path);
    body.match_indices('/').map(move |(idx, _)| &body[..idx])
}

/// Reject an object key that would nest under an existing object.
///
/// `is_object` answers whether an ancestor is currently an object.
pub fn ensure_no_object_ancestor(
    path: &str,
    mut is_object: impl FnMut(&str) -> bool,
) -> StorageResult<()> {
    match ancestors(path).find(|ancestor| is_object(*ancestor)) {
        Some(ancestor) => Err(StorageError::invalid_path(
            path,
            format!("ancestor {ancestor:?} is an object"),
        )),
        None => Ok(()),
    }
}

fn validate_segments(path: &str, body: &str) -> StorageResult<()> {
    if body.contains('\0') {
        return Err(StorageError::invalid_path(path, "contains NUL byte"));
    }
    for segment in body.split('/') {
        match segment {
            "" => {
                return Err(StorageError::invalid_path(path, "contains an empty segment"));
            }
            "." | ".." => {
                return Err(StorageError::invalid_path(
                    path,
                    format!("must not contain '{segment}' segments"),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_paths() {
        for path in ["a", "a/b", "data/part-0001.bin", "a/b/", "x.y/z..w", "with space"] {
            assert!(validate_path(path).is_ok(), "{path} should be valid");
        }
    }

    #[test]
    fn invalid_paths() {
        for path in ["", "/a", "a//b", "a/./b", "../a", "a/..", "a\0b", "/", "a//"] {
            assert!(validate_path(path).is_err(), "{path:?} should be invalid");
        }
    }

    #[test]
    fn object_keys_reject_trailing_slash() {
        assert!(validate_object_key("a/b").is_ok());
        let err = validate_object_key("a/b/").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
    }

    #[test]
    fn prefixes() {
        assert!(validate_prefix("").is_ok());
        assert!(validate_prefix("a").is_ok());
        assert!(validate_prefix("a/").is_ok());
        assert!(validate_prefix("a/b.").is_ok());
        assert!(validate_prefix("a/..").is_ok()); // partial last segment
        assert!(validate_prefix("../a").is_err());
        assert!(validate_prefix("a/../").is_err());
        assert!(validate_prefix("/a").is_err());
    }

    #[test]
    fn directory_prefix_normalizes() {
        assert_eq!(directory_prefix("a/b"), "a/b/");
        assert_eq!(directory_prefix("a/b/"), "a/b/");
    }

    #[test]
    fn ancestors_shortest_first() {
        assert_eq!(ancestors("a/b/c").collect::<Vec<_>>(), vec!["a", "a/b"]);
        assert_eq!(ancestors("a/b/").collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(ancestors("a").count(), 0);
    }

    #[test]
    fn object_ancestor_is_rejected() {
        assert!(ensure_no_object_ancestor("a/b/c", |p| p == "x").is_ok());
        let err = ensure_no_object_ancestor("a/b/c", |p| p == "a/b").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
        assert_eq!(err.path(), Some("a/b/c"));
        assert!(err.to_string().contains("\"a/b\""));
    }

    proptest! {
        #[test]
        fn prop_joined_segments_are_valid(segments in proptest::collection::vec("[a-z0-9_-][a-z0-9._-]{0,7}", 1..6)) {
            let path = segments.join("/");
            prop_assert!(validate_object_key(&path).is_ok());
            let dir = format!("{path}/");
            prop_assert!(validate_path(&dir).is_ok());
            prop_assert!(validate_prefix(&path).is_ok());
        }

        #[test]
        fn prop_traversal_is_rejected(prefix in "[a-z]{1,4}", suffix in "[a-z]{1,4}") {
            let path = format!("{prefix}/../{suffix}");
            prop_assert!(validate_path(&path).is_err());
            prop_assert!(validate_prefix(&path).is_err());
        }
    }
}
