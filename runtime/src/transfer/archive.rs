//! Tar archive export and import.
//!
//! An archive is an OCI image layout (`oci-layout`, `index.json`,
//! `blobs/sha256/<hex>`) packed into a plain tar file. Each `index.json`
//! entry records the image's source reference in the `ref.name` annotation.

use std::path::{Path, PathBuf};

use bundlecopy_core::error::{CopyError, Result};
use bundlecopy_core::image_set::UnprocessedImageSet;
use futures::stream::{self, StreamExt, TryStreamExt};
use oci_spec::image::ImageIndex;

use super::{LayoutReader, LayoutWriter, RegistryReader, RegistryWriter, RelocatedImage, TreeCopier};
use crate::oci::manifest::{layout_entry, layout_index, verify_digest, Descriptor, REF_NAME_ANNOTATION};
use crate::oci::reference::{ImageReference, RepositoryReference};
use crate::oci::registry::Registry;

const OCI_LAYOUT_FILE: &str = "oci-layout";
const OCI_LAYOUT_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;
const INDEX_FILE: &str = "index.json";

/// Moves images between registries and tar archives.
pub struct TarImageSet {
    concurrency: usize,
}

impl TarImageSet {
    /// `concurrency` bounds how many images are in flight at once.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Pull `images` into a tar archive at `output`.
    ///
    /// The returned destinations are manifest digests inside the archive.
    pub async fn export(
        &self,
        images: &UnprocessedImageSet,
        output: &Path,
        registry: &dyn Registry,
    ) -> Result<Vec<RelocatedImage>> {
        let layout = tempfile::tempdir()?;
        let writer = LayoutWriter::new(layout.path());
        let copier = TreeCopier::new(&writer);

        tracing::info!(
            count = images.len(),
            output = %output.display(),
            "Exporting images to archive"
        );

        let exported: Vec<(RelocatedImage, Descriptor)> = stream::iter(images.iter())
            .map(|image| export_one(image, registry, &copier))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let index = layout_index(exported.iter().map(|(_, d)| d.clone()).collect())?;
        tokio::fs::write(layout.path().join(OCI_LAYOUT_FILE), OCI_LAYOUT_CONTENT).await?;
        tokio::fs::write(
            layout.path().join(INDEX_FILE),
            serde_json::to_vec_pretty(&index)?,
        )
        .await?;

        let src = layout.path().to_path_buf();
        let dst = output.to_path_buf();
        tokio::task::spawn_blocking(move || create_tar_archive(&src, &dst))
            .await
            .map_err(|e| CopyError::ArchiveError(format!("Archive task failed: {}", e)))??;

        tracing::info!(output = %output.display(), "Archive written");
        Ok(exported.into_iter().map(|(image, _)| image).collect())
    }

    /// Push every image in the archive at `input` into `destination`.
    pub async fn import(
        &self,
        input: &Path,
        destination: &RepositoryReference,
        registry: &dyn Registry,
    ) -> Result<Vec<RelocatedImage>> {
        let layout = tempfile::tempdir()?;
        let src = input.to_path_buf();
        let dst: PathBuf = layout.path().to_path_buf();
        tokio::task::spawn_blocking(move || extract_tar_archive(&src, &dst))
            .await
            .map_err(|e| CopyError::ArchiveError(format!("Archive task failed: {}", e)))??;

        let index_path = layout.path().join(INDEX_FILE);
        let index_content = tokio::fs::read(&index_path).await.map_err(|e| {
            CopyError::ArchiveError(format!(
                "Failed to read {} from {}: {}",
                INDEX_FILE,
                input.display(),
                e
            ))
        })?;
        let index: ImageIndex = serde_json::from_slice(&index_content)
            .map_err(|e| CopyError::ArchiveError(format!("Invalid {}: {}", INDEX_FILE, e)))?;

        tracing::info!(
            count = index.manifests().len(),
            input = %input.display(),
            destination = %destination,
            "Importing images from archive"
        );

        let reader = LayoutReader::new(layout.path());
        let writer = RegistryWriter::new(registry, destination);
        let copier = TreeCopier::new(&writer);

        stream::iter(index.manifests().iter())
            .map(|entry| import_one(entry, &reader, &writer, &copier, destination))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

async fn export_one(
    image: &str,
    registry: &dyn Registry,
    copier: &TreeCopier<'_>,
) -> Result<(RelocatedImage, Descriptor)> {
    let reference = ImageReference::parse(image)?;
    let fetched = registry.fetch_manifest(&reference).await?;
    if let Some(expected) = &reference.digest {
        verify_digest(expected, &fetched.bytes)?;
    }

    let reader = RegistryReader::new(registry, &reference);
    let digest = copier
        .copy_tree(&reader, &fetched.bytes, &fetched.media_type)
        .await?;
    tracing::info!(source = %image, digest = %digest, "Image exported");

    let descriptor = layout_entry(&fetched.media_type, &digest, fetched.bytes.len(), image)?;
    let exported = RelocatedImage {
        source: image.to_string(),
        destination: digest,
    };
    Ok((exported, descriptor))
}

async fn import_one(
    entry: &Descriptor,
    reader: &LayoutReader,
    writer: &RegistryWriter<'_>,
    copier: &TreeCopier<'_>,
    destination: &RepositoryReference,
) -> Result<RelocatedImage> {
    let bytes = reader.read(entry.digest()).await?;
    verify_digest(entry.digest(), &bytes)?;

    let media_type = entry.media_type().to_string();
    let digest = copier.copy_tree(reader, &bytes, &media_type).await?;
    writer.tag(&digest, &bytes, &media_type).await?;

    let source = entry
        .annotations()
        .as_ref()
        .and_then(|a| a.get(REF_NAME_ANNOTATION))
        .cloned()
        .unwrap_or_else(|| digest.clone());
    let relocated = destination.with_digest(&digest).to_string();
    tracing::info!(source = %source, destination = %relocated, "Image imported");

    Ok(RelocatedImage {
        source,
        destination: relocated,
    })
}

fn create_tar_archive(src_dir: &Path, output: &Path) -> Result<()> {
    let file = std::fs::File::create(output).map_err(|e| {
        CopyError::ArchiveError(format!("Failed to create {}: {}", output.display(), e))
    })?;

    let mut builder = tar::Builder::new(file);
    builder
        .append_dir_all(".", src_dir)
        .map_err(|e| CopyError::ArchiveError(format!("Failed to archive images: {}", e)))?;
    builder
        .finish()
        .map_err(|e| CopyError::ArchiveError(format!("Failed to finalize archive: {}", e)))?;
    Ok(())
}

fn extract_tar_archive(input: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(input).map_err(|e| {
        CopyError::ArchiveError(format!("Failed to open {}: {}", input.display(), e))
    })?;
    let mut archive = tar::Archive::new(file);
    archive
        .unpack(dest)
        .map_err(|e| CopyError::ArchiveError(format!("Failed to extract archive: {}", e)))
}
