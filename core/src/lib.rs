//! bundlecopy core - foundational types
//!
//! Error taxonomy, run configuration, lock file records and the image set
//! shared by the resolution and transfer stages.

pub mod config;
pub mod error;
pub mod image_set;
pub mod lock;

// Re-export commonly used types
pub use config::{CopyConfig, RegistryConfig, DEFAULT_CONCURRENCY};
pub use error::{CopyError, Result};
pub use image_set::UnprocessedImageSet;
pub use lock::{BundleLock, ImagesLock, LockFile, LockedImage};
