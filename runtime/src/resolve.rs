//! Resolve a registry source into the set of images to copy.

use std::path::PathBuf;

use bundlecopy_core::error::{CopyError, Result};
use bundlecopy_core::image_set::UnprocessedImageSet;
use bundlecopy_core::lock::LockFile;

use crate::bundle::BundleDetector;
use crate::oci::registry::Registry;

const EXPECTED_IMAGE_FLAG: &str = "Expected image flag when given an image reference. \
     Please run with -i instead of -b, or use -b with a bundle reference";

const EXPECTED_BUNDLE_FLAG: &str =
    "Expected bundle flag when copying a bundle, please use -b instead of -i";

/// A source that lives in a registry (everything except a tar archive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    /// Path to a BundleLock or ImagesLock file
    Lock(PathBuf),
    /// Bundle reference
    Bundle(String),
    /// Plain image reference
    Image(String),
}

/// Outcome of resolving a registry source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Images that must be copied
    pub images: UnprocessedImageSet,
    /// The bundle's own reference, when the source was a bundle
    pub bundle: Option<String>,
}

/// Compute the images to copy for `source`.
///
/// The bundle reference is returned alongside the set but is never placed in
/// it here; only the collocation pass adds it.
pub async fn resolve_source(source: &RegistrySource, registry: &dyn Registry) -> Result<Resolution> {
    let detector = BundleDetector::new(registry);

    match source {
        RegistrySource::Lock(path) => match LockFile::from_path(path)? {
            LockFile::Bundle(lock) => resolve_bundle(&detector, lock.image()).await,
            LockFile::Images(lock) => {
                let images: UnprocessedImageSet = lock.images().collect();
                tracing::info!(
                    lock = %path.display(),
                    count = images.len(),
                    "Resolved images lock"
                );
                Ok(Resolution {
                    images,
                    bundle: None,
                })
            }
        },
        RegistrySource::Bundle(reference) => resolve_bundle(&detector, reference).await,
        RegistrySource::Image(reference) => {
            if detector.is_bundle(reference).await? {
                return Err(CopyError::MismatchError(EXPECTED_BUNDLE_FLAG.to_string()));
            }
            let mut images = UnprocessedImageSet::new();
            images.add(reference.as_str());
            Ok(Resolution {
                images,
                bundle: None,
            })
        }
    }
}

async fn resolve_bundle(detector: &BundleDetector<'_>, bundle: &str) -> Result<Resolution> {
    if !detector.is_bundle(bundle).await? {
        return Err(CopyError::MismatchError(EXPECTED_IMAGE_FLAG.to_string()));
    }

    let images: UnprocessedImageSet = detector.referenced_images(bundle).await?.into_iter().collect();
    Ok(Resolution {
        images,
        bundle: Some(bundle.to_string()),
    })
}
