//! Lock file records.
//!
//! A lock file pins either a single bundle (`BundleLock`) or a list of images
//! (`ImagesLock`) to digest references. Parsing peeks at `kind` first and
//! then deserializes the whole document into the matching record.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CopyError, Result};

/// `kind` value of a bundle lock.
pub const BUNDLE_LOCK_KIND: &str = "BundleLock";

/// `kind` value of an images lock.
pub const IMAGES_LOCK_KIND: &str = "ImagesLock";

/// A parsed lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockFile {
    Bundle(BundleLock),
    Images(ImagesLock),
}

/// Just enough of a lock document to dispatch on.
#[derive(Debug, Deserialize)]
struct LockHeader {
    #[serde(default)]
    kind: Option<String>,
}

impl LockFile {
    /// Read and parse a lock file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CopyError::LockFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content).map_err(|e| match e {
            CopyError::SerializationError(message) => CopyError::LockFile {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse a lock document held in memory.
    pub fn parse(content: &str) -> Result<Self> {
        let header: LockHeader = serde_yaml::from_str(content)?;
        match header.kind.as_deref() {
            Some(BUNDLE_LOCK_KIND) => Ok(LockFile::Bundle(serde_yaml::from_str(content)?)),
            Some(IMAGES_LOCK_KIND) => Ok(LockFile::Images(ImagesLock::parse(content)?)),
            Some(other) => Err(CopyError::LockKindError(other.to_string())),
            None => Err(CopyError::LockKindError("<missing>".to_string())),
        }
    }
}

/// Lock pinning a single bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleLock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    pub spec: BundleLockSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLockSpec {
    pub image: LockedImage,
}

impl BundleLock {
    /// Digest reference of the locked bundle.
    pub fn image(&self) -> &str {
        &self.spec.image.image
    }
}

/// Lock pinning a list of images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesLock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    pub spec: ImagesLockSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesLockSpec {
    #[serde(default)]
    pub images: Vec<LockedImage>,
}

impl ImagesLock {
    /// Parse an images lock document, rejecting any other kind.
    pub fn parse(content: &str) -> Result<Self> {
        let lock: ImagesLock = serde_yaml::from_str(content)?;
        if lock.kind != IMAGES_LOCK_KIND {
            return Err(CopyError::LockKindError(lock.kind));
        }
        Ok(lock)
    }

    /// Image references in declared order, duplicates included.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.spec.images.iter().map(|i| i.image.as_str())
    }
}

/// One pinned image entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedImage {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<std::collections::BTreeMap<String, String>>,
}
