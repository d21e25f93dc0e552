//! Image transfer between registries and tar archives.
//!
//! Both collaborators walk the same content tree: a manifest (or index),
//! its children, and their blobs. Content is read from a [`ContentSource`]
//! and written to a [`ContentSink`] bottom-up, so a manifest is only written
//! once everything it references is in place. Manifest bytes are never
//! re-serialized, which keeps every digest stable.

mod archive;
mod relocate;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bundlecopy_core::error::{CopyError, Result};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::OnceCell;

use crate::oci::manifest::{digest_hex, sha256_digest, verify_digest, Descriptor, OciDocument};
use crate::oci::reference::{ImageReference, RepositoryReference};
use crate::oci::registry::Registry;

pub use archive::TarImageSet;
pub use relocate::ImageRelocator;

/// Where one image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedImage {
    /// Reference the image was read from
    pub source: String,
    /// Digest reference it was written to
    pub destination: String,
}

/// Tag given to top-level manifests in a destination repository.
///
/// Registries garbage-collect untagged manifests, so each copied image gets
/// a tag derived from its digest (`sha256:abc` → `sha256-abc.imgpkg`).
pub fn digest_tag(digest: &str) -> String {
    format!("{}.imgpkg", digest.replace(':', "-"))
}

/// Read side of a transfer.
#[async_trait]
pub(crate) trait ContentSource: Send + Sync {
    /// Manifest bytes for a child of an index.
    async fn manifest(&self, descriptor: &Descriptor) -> Result<Vec<u8>>;

    async fn blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>>;
}

/// Write side of a transfer.
#[async_trait]
pub(crate) trait ContentSink: Send + Sync {
    async fn write_blob(&self, digest: &str, data: &[u8]) -> Result<()>;

    async fn write_manifest(&self, digest: &str, bytes: &[u8], media_type: &str) -> Result<()>;
}

/// Content stored in one registry repository.
pub(crate) struct RegistryReader<'a> {
    registry: &'a dyn Registry,
    reference: &'a ImageReference,
}

impl<'a> RegistryReader<'a> {
    pub(crate) fn new(registry: &'a dyn Registry, reference: &'a ImageReference) -> Self {
        Self {
            registry,
            reference,
        }
    }
}

#[async_trait]
impl ContentSource for RegistryReader<'_> {
    async fn manifest(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let child = ImageReference {
            registry: self.reference.registry.clone(),
            repository: self.reference.repository.clone(),
            tag: None,
            digest: Some(descriptor.digest().clone()),
        };
        Ok(self.registry.fetch_manifest(&child).await?.bytes)
    }

    async fn blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.registry.fetch_blob(self.reference, descriptor).await
    }
}

/// Content pushed into one registry repository.
pub(crate) struct RegistryWriter<'a> {
    registry: &'a dyn Registry,
    destination: &'a RepositoryReference,
}

impl<'a> RegistryWriter<'a> {
    pub(crate) fn new(registry: &'a dyn Registry, destination: &'a RepositoryReference) -> Self {
        Self {
            registry,
            destination,
        }
    }

    /// Tag an already pushed top-level manifest.
    pub(crate) async fn tag(&self, digest: &str, bytes: &[u8], media_type: &str) -> Result<()> {
        let tagged = self.destination.with_tag(&digest_tag(digest));
        self.registry.push_manifest(&tagged, bytes, media_type).await
    }
}

#[async_trait]
impl ContentSink for RegistryWriter<'_> {
    async fn write_blob(&self, digest: &str, data: &[u8]) -> Result<()> {
        self.registry
            .push_blob(&self.destination.with_digest(digest), data, digest)
            .await
    }

    async fn write_manifest(&self, digest: &str, bytes: &[u8], media_type: &str) -> Result<()> {
        self.registry
            .push_manifest(&self.destination.with_digest(digest), bytes, media_type)
            .await
    }
}

/// Path of a blob inside an OCI image layout.
pub(crate) fn layout_blob_path(root: &Path, digest: &str) -> PathBuf {
    let algorithm = digest.split_once(':').map(|(a, _)| a).unwrap_or("sha256");
    root.join("blobs").join(algorithm).join(digest_hex(digest))
}

/// Content stored in an unpacked OCI image layout.
pub(crate) struct LayoutReader {
    root: PathBuf,
}

impl LayoutReader {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) async fn read(&self, digest: &str) -> Result<Vec<u8>> {
        let path = layout_blob_path(&self.root, digest);
        tokio::fs::read(&path).await.map_err(|e| {
            CopyError::ArchiveError(format!("Missing blob {} in archive: {}", digest, e))
        })
    }
}

#[async_trait]
impl ContentSource for LayoutReader {
    async fn manifest(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.read(descriptor.digest()).await
    }

    async fn blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.read(descriptor.digest()).await
    }
}

/// Content written into an OCI image layout directory.
pub(crate) struct LayoutWriter {
    root: PathBuf,
}

impl LayoutWriter {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn write(&self, digest: &str, data: &[u8]) -> Result<()> {
        let path = layout_blob_path(&self.root, digest);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await.map_err(|e| {
            CopyError::ArchiveError(format!("Failed to write blob {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl ContentSink for LayoutWriter {
    async fn write_blob(&self, digest: &str, data: &[u8]) -> Result<()> {
        self.write(digest, data).await
    }

    async fn write_manifest(&self, digest: &str, bytes: &[u8], _media_type: &str) -> Result<()> {
        self.write(digest, bytes).await
    }
}

/// Single-flight record of blobs written during one transfer.
///
/// Images often share layers. Concurrent tasks asking for the same digest
/// wait on one upload instead of racing.
#[derive(Default)]
struct BlobTracker {
    written: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl BlobTracker {
    fn cell(&self, digest: &str) -> Arc<OnceCell<()>> {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        written.entry(digest.to_string()).or_default().clone()
    }
}

/// Copies manifest trees from any source into one sink.
pub(crate) struct TreeCopier<'a> {
    sink: &'a dyn ContentSink,
    blobs: BlobTracker,
}

impl<'a> TreeCopier<'a> {
    pub(crate) fn new(sink: &'a dyn ContentSink) -> Self {
        Self {
            sink,
            blobs: BlobTracker::default(),
        }
    }

    /// Copy `bytes` and everything it references. Returns the manifest digest.
    pub(crate) fn copy_tree<'b>(
        &'b self,
        source: &'b dyn ContentSource,
        bytes: &'b [u8],
        media_type: &'b str,
    ) -> BoxFuture<'b, Result<String>> {
        async move {
            let digest = sha256_digest(bytes);
            let document = OciDocument::from_slice(bytes)?;

            for child in document.children() {
                let child_bytes = source.manifest(child).await?;
                verify_digest(child.digest(), &child_bytes)?;
                let child_media_type = child.media_type().to_string();
                self.copy_tree(source, &child_bytes, &child_media_type)
                    .await?;
            }
            for blob in document.blobs() {
                self.copy_blob(source, blob).await?;
            }

            self.sink.write_manifest(&digest, bytes, media_type).await?;
            tracing::debug!(digest = %digest, media_type = %media_type, "Manifest copied");
            Ok(digest)
        }
        .boxed()
    }

    async fn copy_blob(&self, source: &dyn ContentSource, blob: &Descriptor) -> Result<()> {
        let digest = blob.digest();
        let cell = self.blobs.cell(digest);
        cell.get_or_try_init(|| async move {
            let data = source.blob(blob).await?;
            verify_digest(digest, &data)?;
            self.sink.write_blob(digest, &data).await?;
            tracing::debug!(digest = %digest, size = data.len(), "Blob copied");
            Ok::<(), CopyError>(())
        })
        .await?;
        Ok(())
    }
}
