//! OCI manifest, index and image configuration handling.
//!
//! Documents are parsed from raw registry bytes with `oci-spec` for
//! traversal only. The original bytes (and therefore digests) are what gets
//! pushed back.

use std::collections::HashMap;

use bundlecopy_core::error::{CopyError, Result};
use oci_spec::image::{
    DescriptorBuilder, ImageConfiguration, ImageIndex, ImageIndexBuilder, ImageManifest,
    MediaType,
};
use sha2::{Digest, Sha256};

pub use oci_spec::image::Descriptor;

pub const OCI_IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_IMAGE_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Manifest media types accepted when fetching from a registry.
pub const ACCEPTED_MANIFEST_MEDIA_TYPES: &[&str] = &[
    OCI_IMAGE_MANIFEST_MEDIA_TYPE,
    OCI_IMAGE_INDEX_MEDIA_TYPE,
    DOCKER_MANIFEST_MEDIA_TYPE,
    DOCKER_MANIFEST_LIST_MEDIA_TYPE,
];

/// Annotation carrying the original reference of an image in a layout.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// A manifest as served by a registry: either an image or an index of images.
#[derive(Debug, Clone)]
pub enum OciDocument {
    Image(ImageManifest),
    Index(ImageIndex),
}

impl OciDocument {
    /// Parse manifest bytes, choosing the document type from `mediaType`.
    ///
    /// Documents without a media type are indexes when they list `manifests`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| CopyError::OciImageError(format!("Invalid manifest: {}", e)))?;

        let is_index = match value.get("mediaType").and_then(|m| m.as_str()) {
            Some(OCI_IMAGE_INDEX_MEDIA_TYPE) | Some(DOCKER_MANIFEST_LIST_MEDIA_TYPE) => true,
            Some(_) => false,
            None => value.get("manifests").is_some() && value.get("config").is_none(),
        };

        let document = if is_index {
            serde_json::from_value(value).map(OciDocument::Index)
        } else {
            serde_json::from_value(value).map(OciDocument::Image)
        };
        document.map_err(|e| CopyError::OciImageError(format!("Invalid manifest: {}", e)))
    }

    /// Media type declared in the document, or the OCI default for its kind.
    pub fn media_type(&self) -> String {
        let (declared, fallback) = match self {
            OciDocument::Image(m) => (m.media_type(), OCI_IMAGE_MANIFEST_MEDIA_TYPE),
            OciDocument::Index(i) => (i.media_type(), OCI_IMAGE_INDEX_MEDIA_TYPE),
        };
        declared
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Config and layer blobs of an image. Empty for an index.
    pub fn blobs(&self) -> Vec<&Descriptor> {
        match self {
            OciDocument::Image(m) => std::iter::once(m.config()).chain(m.layers()).collect(),
            OciDocument::Index(_) => Vec::new(),
        }
    }

    /// Manifests listed by an index. Empty for an image.
    pub fn children(&self) -> &[Descriptor] {
        match self {
            OciDocument::Image(_) => &[],
            OciDocument::Index(i) => i.manifests(),
        }
    }
}

/// Value of config label `key`, if the image configuration sets it.
pub fn config_label(config: &[u8], key: &str) -> Result<Option<String>> {
    let config: ImageConfiguration = serde_json::from_slice(config)
        .map_err(|e| CopyError::OciImageError(format!("Invalid image config: {}", e)))?;
    Ok(config
        .config()
        .as_ref()
        .and_then(|c| c.labels().as_ref())
        .and_then(|labels| labels.get(key))
        .cloned())
}

/// Descriptor of a top-level manifest in an image layout, named by `ref_name`.
pub fn layout_entry(media_type: &str, digest: &str, size: usize, ref_name: &str) -> Result<Descriptor> {
    DescriptorBuilder::default()
        .media_type(MediaType::from(media_type))
        .digest(digest.to_string())
        .size(size as i64)
        .annotations(HashMap::from([(
            REF_NAME_ANNOTATION.to_string(),
            ref_name.to_string(),
        )]))
        .build()
        .map_err(|e| CopyError::OciImageError(format!("Invalid descriptor for {}: {}", digest, e)))
}

/// `index.json` of an image layout listing `manifests`.
pub fn layout_index(manifests: Vec<Descriptor>) -> Result<ImageIndex> {
    ImageIndexBuilder::default()
        .schema_version(2u32)
        .media_type(MediaType::ImageIndex)
        .manifests(manifests)
        .build()
        .map_err(|e| CopyError::OciImageError(format!("Invalid layout index: {}", e)))
}

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Check that `bytes` hash to `expected`. Non-sha256 digests are not checked.
pub fn verify_digest(expected: &str, bytes: &[u8]) -> Result<()> {
    if !expected.starts_with("sha256:") {
        return Ok(());
    }
    let actual = sha256_digest(bytes);
    if actual != expected {
        return Err(CopyError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Hex part of a digest, used as the blob file name in a layout.
pub fn digest_hex(digest: &str) -> &str {
    digest.split_once(':').map(|(_, hex)| hex).unwrap_or(digest)
}
