//! bundlecopy runtime: resolution of copy sources and OCI transfer.
//!
//! Resolution turns a lock file, bundle or image reference into an ordered
//! set of images. For bundles, images collocated in the bundle's own
//! repository are preferred. Transfer then relocates the set into a
//! repository or a tar archive.

#![allow(clippy::result_large_err)]

pub mod bundle;
pub mod collocation;
pub mod copy;
pub mod oci;
pub mod resolve;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-export common types
pub use bundle::{BundleDetector, BUNDLE_CONFIG_LABEL, IMAGES_LOCK_PATH};
pub use collocation::check_bundle_repo_for_collocated_images;
pub use copy::{execute, CopyMode, CopyOutcome, CopyRequest};
pub use oci::{ImageReference, OciRegistry, Registry, RepositoryReference};
pub use resolve::{resolve_source, RegistrySource, Resolution};
pub use transfer::{digest_tag, ImageRelocator, RelocatedImage, TarImageSet};
