//! Core type definitions for FileSync
//!
//! This module defines the identifiers used throughout the system:
//! origins, remote resource ids, and origin-relative file paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace identifier grouping a set of synced file-like entries.
///
/// An origin is a `scheme://authority` pair, e.g. `http://www.example.com`.
/// It is the top-level grouping key for per-origin sync state.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Origin(String);

impl Origin {
    /// Create a new origin (validates the `scheme://authority` shape)
    pub fn new(origin: impl Into<String>) -> Result<Self, OriginError> {
        let origin = origin.into();
        Self::validate(&origin)?;
        Ok(Self(origin))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    /// Get the origin as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate an origin string.
    ///
    /// The persisted metadata key format uses a single space to separate
    /// the origin from the path, so the origin itself must never contain
    /// whitespace.
    fn validate(origin: &str) -> Result<(), OriginError> {
        let Some((scheme, authority)) = origin.split_once("://") else {
            return Err(OriginError::MissingSeparator);
        };

        let Some(first) = scheme.chars().next() else {
            return Err(OriginError::EmptyScheme);
        };
        if !first.is_ascii_alphabetic() {
            return Err(OriginError::InvalidSchemeStart(first));
        }
        for c in scheme.chars() {
            if !c.is_ascii_alphanumeric() && c != '+' && c != '-' && c != '.' {
                return Err(OriginError::InvalidSchemeChar(c));
            }
        }

        if authority.is_empty() {
            return Err(OriginError::EmptyAuthority);
        }
        for c in origin.chars() {
            if c.is_whitespace() || c.is_control() {
                return Err(OriginError::IllegalChar(c));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Origin({:?})", self.0)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when creating an origin
#[derive(Debug, Clone, thiserror::Error)]
pub enum OriginError {
    #[error("origin must contain \"://\"")]
    MissingSeparator,
    #[error("origin scheme must not be empty")]
    EmptyScheme,
    #[error("origin scheme must start with a letter, got {0:?}")]
    InvalidSchemeStart(char),
    #[error("origin scheme contains invalid character: {0:?}")]
    InvalidSchemeChar(char),
    #[error("origin authority must not be empty")]
    EmptyAuthority,
    #[error("origin contains whitespace or control character: {0:?}")]
    IllegalChar(char),
}

/// Opaque identifier for a remote object (folder or file).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a new resource id (must not be empty)
    pub fn new(id: impl Into<String>) -> Result<Self, ResourceIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ResourceIdError::Empty);
        }
        Ok(Self(id))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the resource id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the underlying string
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({:?})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when creating a resource id
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceIdError {
    #[error("resource id must not be empty")]
    Empty,
}

/// A path identifying a file-like entry within an origin's namespace,
/// relative to that origin's root directory.
///
/// Paths are stored with a leading `/` and may contain spaces; the key
/// codec relies on the origin (not the path) being space-free.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new relative path (must be absolute within the origin)
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if !path.starts_with('/') {
            return Err(PathError::MissingLeadingSlash);
        }
        for c in path.chars() {
            if c.is_control() {
                return Err(PathError::IllegalChar(c));
            }
        }
        Ok(Self(path))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelativePath({:?})", self.0)
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when creating a relative path
#[derive(Debug, Clone, thiserror::Error)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,
    #[error("path must start with '/'")]
    MissingLeadingSlash,
    #[error("path contains control character: {0:?}")]
    IllegalChar(char),
}

/// Kind of a synced entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// Returns true for folder entries
    #[must_use]
    pub const fn is_folder(self) -> bool {
        matches!(self, Self::Folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_validation() {
        assert!(Origin::new("http://www.example.com").is_ok());
        assert!(Origin::new("https://example.com:8080").is_ok());
        assert!(Origin::new("chrome-extension://abcdef").is_ok());

        assert!(matches!(
            Origin::new("example.com"),
            Err(OriginError::MissingSeparator)
        ));
        assert!(matches!(
            Origin::new("://example.com"),
            Err(OriginError::EmptyScheme)
        ));
        assert!(matches!(Origin::new("http://"), Err(OriginError::EmptyAuthority)));
        assert!(matches!(
            Origin::new("http://bad host"),
            Err(OriginError::IllegalChar(' '))
        ));
        assert!(matches!(
            Origin::new("1http://example.com"),
            Err(OriginError::InvalidSchemeStart('1'))
        ));
    }

    #[test]
    fn test_relative_path_validation() {
        assert!(RelativePath::new("/x").is_ok());
        assert!(RelativePath::new("/dir/file with spaces.txt").is_ok());

        assert!(matches!(RelativePath::new(""), Err(PathError::Empty)));
        assert!(matches!(
            RelativePath::new("x"),
            Err(PathError::MissingLeadingSlash)
        ));
        assert!(matches!(
            RelativePath::new("/a\nb"),
            Err(PathError::IllegalChar('\n'))
        ));
    }

    #[test]
    fn test_resource_id() {
        assert!(ResourceId::new("folder123").is_ok());
        assert!(matches!(ResourceId::new(""), Err(ResourceIdError::Empty)));
        assert_eq!(ResourceId::new_unchecked("x").as_str(), "x");
    }
}
