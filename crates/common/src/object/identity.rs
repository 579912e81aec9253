//! Bucket/key identity of a namespace path
//!
//! A namespace path looks like `/bucket/dir/file.txt`. The first component is
//! the bucket, the remainder (joined with `/`) is the object key. A trailing
//! separator marks a directory, an empty key marks the bucket itself and a
//! bare `/` is the root that contains every bucket.

use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Separator used inside object keys
pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path is not absolute: {0}")]
    NotAbsolute(String),
    #[error("path is not valid unicode: {0}")]
    NotUnicode(String),
}

/// A bucket plus key pair
///
/// Ordering and equality are over `(bucket, key)`, so directory and file
/// forms of the same name are distinct identities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectIdentity {
    bucket: String,
    key: String,
}

fn is_namespace_separator(c: char) -> bool {
    c == SEPARATOR
}

fn is_host_separator(c: char) -> bool {
    c == MAIN_SEPARATOR || c == SEPARATOR
}

impl ObjectIdentity {
    /// The namespace root, parent of every bucket
    pub fn root() -> Self {
        Self {
            bucket: String::new(),
            key: String::new(),
        }
    }

    /// The root directory of `bucket`
    pub fn bucket_root(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: String::new(),
        }
    }

    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let identity = Self {
            bucket: bucket.into(),
            key: key.into(),
        };
        debug_assert!(
            identity.key.is_empty() || !identity.bucket.is_empty(),
            "object key without a bucket"
        );
        identity
    }

    /// Parse a `/`-separated absolute path
    pub fn parse_namespace_path(path: &str) -> Result<Self, PathError> {
        Self::parse_with(path, is_namespace_separator)
    }

    /// Parse a path in host filesystem form, relative to the mount point
    pub fn parse_host_path(path: &Path) -> Result<Self, PathError> {
        let raw = path
            .to_str()
            .ok_or_else(|| PathError::NotUnicode(path.display().to_string()))?;
        Self::parse_with(raw, is_host_separator)
    }

    fn parse_with(path: &str, is_separator: fn(char) -> bool) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if !path.starts_with(is_separator) {
            return Err(PathError::NotAbsolute(path.to_string()));
        }

        let trailing = path.ends_with(is_separator);
        let mut tokens = path
            .split(is_separator)
            .map(str::trim)
            .filter(|token| !token.is_empty());

        let Some(bucket) = tokens.next() else {
            return Ok(Self::root());
        };

        let mut key = tokens.collect::<Vec<_>>().join("/");
        if trailing && !key.is_empty() {
            key.push(SEPARATOR);
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key,
        })
    }

    /// Host filesystem form, rooted at the mount point
    ///
    /// Directory identities keep their trailing separator so the result
    /// parses back to the same identity.
    pub fn to_host_path(&self) -> PathBuf {
        let mut path = String::with_capacity(self.bucket.len() + self.key.len() + 2);
        path.push(MAIN_SEPARATOR);
        if !self.bucket.is_empty() {
            path.push_str(&self.bucket);
        }
        if !self.key.is_empty() {
            path.push(MAIN_SEPARATOR);
            path.extend(self.key.chars().map(|c| {
                if c == SEPARATOR {
                    MAIN_SEPARATOR
                } else {
                    c
                }
            }));
        }
        PathBuf::from(path)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_root(&self) -> bool {
        self.bucket.is_empty()
    }

    pub fn is_bucket(&self) -> bool {
        !self.bucket.is_empty() && self.key.is_empty()
    }

    pub fn is_directory(&self) -> bool {
        self.key.is_empty() || self.key.ends_with(SEPARATOR) || self.is_dot_entry()
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// True for keys whose last name is `.` or `..`
    pub fn is_dot_entry(&self) -> bool {
        !self.key.is_empty() && matches!(self.name(), "." | "..")
    }

    /// Dotfile convention; `.` and `..` are not hidden
    pub fn is_hidden(&self) -> bool {
        if self.key.is_empty() {
            return false;
        }
        let name = self.name();
        name.starts_with('.') && name != "." && name != ".."
    }

    /// Last path component, without any trailing separator
    pub fn name(&self) -> &str {
        if self.key.is_empty() {
            return &self.bucket;
        }
        let trimmed = self.key.trim_end_matches(SEPARATOR);
        match trimmed.rsplit_once(SEPARATOR) {
            Some((_, name)) => name,
            None => trimmed,
        }
    }

    /// Containing directory, in directory form
    ///
    /// The root and bucket roots have no parent in the object namespace.
    pub fn parent(&self) -> Option<Self> {
        if self.key.is_empty() {
            return None;
        }
        let trimmed = self.key.trim_end_matches(SEPARATOR);
        let key = match trimmed.rsplit_once(SEPARATOR) {
            Some((head, _)) => format!("{head}{SEPARATOR}"),
            None => String::new(),
        };
        Some(Self {
            bucket: self.bucket.clone(),
            key,
        })
    }

    pub fn to_directory_form(&self) -> Self {
        if self.is_file() {
            Self {
                bucket: self.bucket.clone(),
                key: format!("{}{SEPARATOR}", self.key),
            }
        } else {
            self.clone()
        }
    }

    pub fn to_file_form(&self) -> Self {
        match self.key.strip_suffix(SEPARATOR) {
            Some(stripped) => Self {
                bucket: self.bucket.clone(),
                key: stripped.to_string(),
            },
            None => self.clone(),
        }
    }

    /// Child `name` of this directory
    ///
    /// # Panics
    ///
    /// If `self` is not a directory, or is a `.`/`..` entry.
    pub fn append(&self, name: &str) -> Self {
        assert!(
            self.is_directory() && !self.is_dot_entry(),
            "append on non-directory identity {self}"
        );
        if self.is_root() {
            return Self::bucket_root(name);
        }
        Self {
            bucket: self.bucket.clone(),
            key: format!("{}{name}", self.key),
        }
    }

    /// Replace a trailing `.` or `..` with the directory it refers to
    pub fn resolve_dot_entry(&self) -> Self {
        if !self.is_dot_entry() {
            return self.clone();
        }
        let up = self.name() == "..";
        let containing = self.parent().unwrap_or_else(|| Self::bucket_root(&self.bucket));
        let containing = containing.resolve_dot_entry();
        if !up {
            return containing;
        }
        match containing.parent() {
            Some(parent) => parent,
            None if containing.is_bucket() => Self::root(),
            None => containing,
        }
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SEPARATOR}{}", self.bucket)?;
        if !self.key.is_empty() {
            write!(f, "{SEPARATOR}{}", self.key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> ObjectIdentity {
        ObjectIdentity::parse_namespace_path(path).unwrap()
    }

    #[test]
    fn test_parse_root_and_bucket() {
        let root = id("/");
        assert!(root.is_root());
        assert!(root.is_directory());
        assert_eq!(root.to_string(), "/");

        let bucket = id("/photos");
        assert!(bucket.is_bucket());
        assert!(bucket.is_directory());
        assert_eq!(bucket.bucket(), "photos");
        assert_eq!(bucket.key(), "");
        assert_eq!(id("/photos/"), bucket);
    }

    #[test]
    fn test_parse_files_and_directories() {
        let file = id("/photos/2024/beach.jpg");
        assert!(file.is_file());
        assert_eq!(file.key(), "2024/beach.jpg");
        assert_eq!(file.name(), "beach.jpg");

        let dir = id("/photos/2024/");
        assert!(dir.is_directory());
        assert_eq!(dir.key(), "2024/");
        assert_eq!(dir.name(), "2024");
    }

    #[test]
    fn test_parse_collapses_empty_and_padded_tokens() {
        assert_eq!(id("//photos// 2024 //x"), id("/photos/2024/x"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            ObjectIdentity::parse_namespace_path(""),
            Err(PathError::Empty)
        );
        assert!(matches!(
            ObjectIdentity::parse_namespace_path("photos/a"),
            Err(PathError::NotAbsolute(_))
        ));
    }

    #[test]
    fn test_dot_entries_are_directories() {
        assert!(id("/b/dir/.").is_directory());
        assert!(id("/b/..").is_directory());
        assert!(!id("/b/.").is_hidden());
        assert!(id("/b/dir/.env").is_hidden());
        assert!(id("/b/.cache/").is_hidden());
        assert!(!id("/b/visible").is_hidden());
    }

    #[test]
    fn test_resolve_dot_entry() {
        assert_eq!(id("/b/dir/.").resolve_dot_entry(), id("/b/dir/"));
        assert_eq!(id("/b/dir/sub/..").resolve_dot_entry(), id("/b/dir/"));
        assert_eq!(id("/b/dir/..").resolve_dot_entry(), id("/b"));
        assert_eq!(id("/b/..").resolve_dot_entry(), ObjectIdentity::root());
        assert_eq!(id("/b/x").resolve_dot_entry(), id("/b/x"));
    }

    #[test]
    fn test_parent() {
        assert_eq!(id("/b/a/c.txt").parent(), Some(id("/b/a/")));
        assert_eq!(id("/b/a/sub/").parent(), Some(id("/b/a/")));
        assert_eq!(id("/b/top").parent(), Some(id("/b")));
        assert_eq!(id("/b").parent(), None);
        assert_eq!(ObjectIdentity::root().parent(), None);
    }

    #[test]
    fn test_directory_and_file_forms() {
        let file = id("/b/a/c");
        let dir = file.to_directory_form();
        assert_eq!(dir, id("/b/a/c/"));
        assert_eq!(dir.to_directory_form(), dir);
        assert_eq!(dir.to_file_form(), file);
        assert_eq!(file.to_file_form(), file);

        for path in ["/b/a/c", "/b/a/c/", "/b", "/", "/b/x/."] {
            let x = id(path);
            assert_eq!(x.to_directory_form().to_file_form(), x.to_file_form(), "{path}");
        }
    }

    #[test]
    fn test_append() {
        assert_eq!(id("/b").append("x.txt"), id("/b/x.txt"));
        assert_eq!(id("/b/dir/").append("sub/"), id("/b/dir/sub/"));
        assert_eq!(ObjectIdentity::root().append("b"), id("/b"));
    }

    #[test]
    #[should_panic(expected = "append on non-directory")]
    fn test_append_on_file_panics() {
        id("/b/file").append("x");
    }

    #[test]
    fn test_host_path_round_trip() {
        for path in [
            "/",
            "/b",
            "/b/",
            "/b/file.txt",
            "/b/dir/",
            "/b/dir/nested/deep.bin",
            "/b/dir/nested/",
            "/b/.hidden",
            "/b/a b/c d.txt",
        ] {
            let original = id(path);
            let host = original.to_host_path();
            let reparsed = ObjectIdentity::parse_host_path(&host).unwrap();
            assert_eq!(reparsed, original, "{path} -> {}", host.display());
        }
    }

    #[test]
    fn test_ordering_is_bucket_then_key() {
        let mut ids = vec![id("/b/z"), id("/a/z"), id("/b/a"), id("/a")];
        ids.sort();
        assert_eq!(ids, vec![id("/a"), id("/a/z"), id("/b/a"), id("/b/z")]);
    }
}
