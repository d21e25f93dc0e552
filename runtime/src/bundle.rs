//! Bundle detection.
//!
//! A bundle is an image whose config carries the bundle label and whose
//! layers embed an images lock listing the images the bundle depends on.

use std::io::Read;

use bundlecopy_core::error::{CopyError, Result};
use bundlecopy_core::lock::ImagesLock;
use flate2::read::GzDecoder;

use crate::oci::manifest::{config_label, OciDocument};
use crate::oci::reference::ImageReference;
use crate::oci::registry::Registry;

/// Config label marking an image as a bundle.
pub const BUNDLE_CONFIG_LABEL: &str = "dev.carvel.imgpkg.bundle";

/// Location of the embedded images lock inside a bundle's filesystem.
pub const IMAGES_LOCK_PATH: &str = ".imgpkg/images.yml";

/// Answers "is this a bundle?" and "what does it reference?" against a registry.
pub struct BundleDetector<'a> {
    registry: &'a dyn Registry,
}

impl<'a> BundleDetector<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Whether `reference` denotes a bundle rather than a plain image.
    ///
    /// Registry failures are returned as-is.
    pub async fn is_bundle(&self, reference: &str) -> Result<bool> {
        let parsed = ImageReference::parse(reference)?;
        let OciDocument::Image(manifest) = self.registry.fetch_manifest(&parsed).await?.parse()?
        else {
            return Ok(false);
        };

        let config_bytes = self
            .registry
            .fetch_blob(&parsed, manifest.config())
            .await?;
        let is_bundle = config_label(&config_bytes, BUNDLE_CONFIG_LABEL)?.is_some();

        tracing::debug!(reference = %reference, is_bundle, "Checked bundle label");
        Ok(is_bundle)
    }

    /// Images declared by a bundle, in declared order and without deduplication.
    pub async fn referenced_images(&self, reference: &str) -> Result<Vec<String>> {
        let parsed = ImageReference::parse(reference)?;
        let layers = match self.registry.fetch_manifest(&parsed).await?.parse()? {
            OciDocument::Image(manifest) => manifest.layers().clone(),
            OciDocument::Index(_) => Vec::new(),
        };

        // Upper layers shadow lower ones. A layer that cannot be read as a
        // tar does not hold the lock.
        for layer in layers.iter().rev() {
            let data = self.registry.fetch_blob(&parsed, layer).await?;
            let content = match find_images_lock(&data) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(
                        bundle = %reference,
                        layer = %layer.digest(),
                        error = %e,
                        "Skipping unreadable layer"
                    );
                    continue;
                }
            };

            let lock = ImagesLock::parse(&content)?;
            let images: Vec<String> = lock.images().map(str::to_string).collect();
            tracing::info!(
                bundle = %reference,
                count = images.len(),
                "Found images referenced by bundle"
            );
            return Ok(images);
        }

        Err(CopyError::OciImageError(format!(
            "Bundle {} does not contain {}",
            reference, IMAGES_LOCK_PATH
        )))
    }
}

/// Read the images lock out of a (possibly gzipped) tar layer.
fn find_images_lock(layer: &[u8]) -> Result<Option<String>> {
    let reader: Box<dyn Read + '_> = if layer.starts_with(&[0x1f, 0x8b]) {
        Box::new(GzDecoder::new(layer))
    } else {
        Box::new(layer)
    };

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| CopyError::OciImageError(format!("Failed to read bundle layer: {}", e)))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| CopyError::OciImageError(format!("Failed to read bundle layer: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| CopyError::OciImageError(format!("Invalid path in bundle layer: {}", e)))?;
        let path = path.to_string_lossy();
        if path.trim_start_matches("./") != IMAGES_LOCK_PATH {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content).map_err(|e| {
            CopyError::OciImageError(format!("Failed to read {}: {}", IMAGES_LOCK_PATH, e))
        })?;
        return Ok(Some(content));
    }

    Ok(None)
}
