//! Registry to registry relocation.

use bundlecopy_core::error::Result;
use bundlecopy_core::image_set::UnprocessedImageSet;
use futures::stream::{self, StreamExt, TryStreamExt};

use super::{RegistryReader, RegistryWriter, RelocatedImage, TreeCopier};
use crate::oci::manifest::verify_digest;
use crate::oci::reference::{ImageReference, RepositoryReference};
use crate::oci::registry::Registry;

/// Copies images into a single destination repository.
pub struct ImageRelocator {
    concurrency: usize,
}

impl ImageRelocator {
    /// `concurrency` bounds how many images are in flight at once.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Copy every image in `images` into `destination`.
    ///
    /// Results are returned in the set's order. The first failure aborts the
    /// run; images already copied stay in the destination.
    pub async fn relocate(
        &self,
        images: &UnprocessedImageSet,
        destination: &RepositoryReference,
        registry: &dyn Registry,
    ) -> Result<Vec<RelocatedImage>> {
        let writer = RegistryWriter::new(registry, destination);
        let copier = TreeCopier::new(&writer);

        tracing::info!(
            count = images.len(),
            destination = %destination,
            concurrency = self.concurrency,
            "Relocating images"
        );

        stream::iter(images.iter())
            .map(|image| relocate_one(image, registry, &writer, &copier, destination))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

async fn relocate_one(
    image: &str,
    registry: &dyn Registry,
    writer: &RegistryWriter<'_>,
    copier: &TreeCopier<'_>,
    destination: &RepositoryReference,
) -> Result<RelocatedImage> {
    let reference = ImageReference::parse(image)?;
    let fetched = registry.fetch_manifest(&reference).await?;
    if let Some(expected) = &reference.digest {
        verify_digest(expected, &fetched.bytes)?;
    }

    let reader = RegistryReader::new(registry, &reference);
    let digest = copier
        .copy_tree(&reader, &fetched.bytes, &fetched.media_type)
        .await?;
    writer
        .tag(&digest, &fetched.bytes, &fetched.media_type)
        .await?;

    let relocated = destination.with_digest(&digest).to_string();
    tracing::info!(source = %image, destination = %relocated, "Image relocated");
    Ok(RelocatedImage {
        source: image.to_string(),
        destination: relocated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRegistry;
    use crate::transfer::digest_tag;
    use bundlecopy_core::error::CopyError;

    fn destination() -> RepositoryReference {
        RepositoryReference::parse("dst.io/team/mirror").unwrap()
    }

    #[tokio::test]
    async fn test_relocates_images_in_order() {
        let registry = FakeRegistry::new();
        let a = registry.put_plain_image("src.io/team/a", "a");
        let b = registry.put_plain_image("other.io/b", "b");
        let images: UnprocessedImageSet = [a.clone(), b.clone()].into_iter().collect();

        let relocated = ImageRelocator::new(5)
            .relocate(&images, &destination(), &registry)
            .await
            .unwrap();

        assert_eq!(relocated.len(), 2);
        assert_eq!(relocated[0].source, a);
        assert_eq!(relocated[1].source, b);
        for (image, result) in [a, b].iter().zip(&relocated) {
            let digest = image.split('@').nth(1).unwrap();
            assert_eq!(result.destination, format!("dst.io/team/mirror@{}", digest));
            assert!(registry.has_manifest("dst.io/team/mirror", digest));
            assert!(registry.has_manifest("dst.io/team/mirror", &digest_tag(digest)));
        }
    }

    #[tokio::test]
    async fn test_relocates_tagged_image() {
        let registry = FakeRegistry::new();
        let digest = registry.put_image("src.io/team/app", &serde_json::json!({}), &[b"l"]);
        let pinned = ImageReference::parse(&format!("src.io/team/app@{}", digest)).unwrap();
        let bytes = registry.fetch_manifest(&pinned).await.unwrap().bytes;
        registry.put_manifest(
            "src.io/team/app",
            &bytes,
            crate::oci::manifest::OCI_IMAGE_MANIFEST_MEDIA_TYPE,
            Some("v1"),
        );

        let images: UnprocessedImageSet = ["src.io/team/app:v1"].into_iter().collect();
        let relocated = ImageRelocator::new(1)
            .relocate(&images, &destination(), &registry)
            .await
            .unwrap();
        assert_eq!(
            relocated[0].destination,
            format!("dst.io/team/mirror@{}", digest)
        );
    }

    #[tokio::test]
    async fn test_relocates_index_with_children() {
        let registry = FakeRegistry::new();
        let amd = registry.put_plain_image("src.io/team/multi", "amd64");
        let arm = registry.put_plain_image("src.io/team/multi", "arm64");
        let child_digests: Vec<&str> = [&amd, &arm]
            .iter()
            .map(|r| r.split('@').nth(1).unwrap())
            .collect();
        let index = registry.put_index("src.io/team/multi", &child_digests);
        let images: UnprocessedImageSet = [index.clone()].into_iter().collect();

        let relocated = ImageRelocator::new(2)
            .relocate(&images, &destination(), &registry)
            .await
            .unwrap();

        let index_digest = index.split('@').nth(1).unwrap();
        assert_eq!(
            relocated[0].destination,
            format!("dst.io/team/mirror@{}", index_digest)
        );
        for child in child_digests {
            assert!(registry.has_manifest("dst.io/team/mirror", child));
        }
        assert!(registry.has_manifest("dst.io/team/mirror", index_digest));
    }

    #[tokio::test]
    async fn test_digest_mismatch_aborts() {
        let registry = FakeRegistry::new();
        let a = registry.put_plain_image("src.io/team/a", "a");
        let b = registry.put_plain_image("src.io/team/b", "b");
        // Serve b's manifest under a's digest.
        let a_digest = a.split('@').nth(1).unwrap();
        let b_digest = b.split('@').nth(1).unwrap();
        registry.alias_manifest("src.io/team/b", b_digest, a_digest);
        let tampered = format!("src.io/team/b@{}", a_digest);
        let images: UnprocessedImageSet = [tampered].into_iter().collect();

        let err = ImageRelocator::new(5)
            .relocate(&images, &destination(), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn test_missing_image_fails() {
        let registry = FakeRegistry::new();
        let images: UnprocessedImageSet = ["src.io/team/none:v1"].into_iter().collect();
        let err = ImageRelocator::new(5)
            .relocate(&images, &destination(), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::RegistryError { .. }));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let registry = FakeRegistry::new();
        let a = registry.put_plain_image("src.io/team/a", "a");
        let images: UnprocessedImageSet = [a].into_iter().collect();
        let relocated = ImageRelocator::new(0)
            .relocate(&images, &destination(), &registry)
            .await
            .unwrap();
        assert_eq!(relocated.len(), 1);
    }
}
