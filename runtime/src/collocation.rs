//! Prefer copies of bundle images that already live in the bundle's repository.
//!
//! Images referenced by a bundle are often pushed next to the bundle under
//! the same digest. Reading them from there avoids pulling from the original,
//! possibly restricted, repositories. This pass only probes; it never writes.

use bundlecopy_core::error::{CopyError, Result};
use bundlecopy_core::image_set::UnprocessedImageSet;

use crate::oci::reference::ImageReference;
use crate::oci::registry::Registry;

/// Rewrite each image to `bundle_repo@digest` when that reference exists.
///
/// The bundle itself is always the first entry of the result. A failed probe
/// keeps the original reference; an image that is not digest-qualified is a
/// parse error.
pub async fn check_bundle_repo_for_collocated_images(
    found_images: UnprocessedImageSet,
    bundle_url: &str,
    registry: &dyn Registry,
) -> Result<UnprocessedImageSet> {
    let mut checked = UnprocessedImageSet::new();
    checked.add(bundle_url);

    let bundle_repo = bundle_url.split('@').next().unwrap_or(bundle_url);

    for image_url in found_images {
        let parts: Vec<&str> = image_url.split('@').collect();
        let [_, digest] = parts.as_slice() else {
            return Err(CopyError::ReferenceError(format!(
                "Parsing image URL: {}",
                image_url
            )));
        };

        let candidate_url = format!("{}@{}", bundle_repo, digest);
        let candidate = ImageReference::parse_digest(&candidate_url)?;

        match registry.probe(&candidate).await {
            Ok(_) => {
                tracing::debug!(
                    image = %image_url,
                    collocated = %candidate_url,
                    "Using image collocated with bundle"
                );
                checked.add(candidate_url);
            }
            Err(e) => {
                tracing::debug!(
                    image = %image_url,
                    candidate = %candidate_url,
                    error = %e,
                    "Image not collocated with bundle, keeping original location"
                );
                checked.add(image_url);
            }
        }
    }

    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRegistry;

    #[tokio::test]
    async fn test_collocated_image_is_rewritten() {
        let registry = FakeRegistry::new();
        let bundle = registry.put_bundle("registry.io/org/bundle", &[]);
        // Same content pushed to both the original repo and the bundle repo.
        let original = registry.put_plain_image("source.io/team/app", "app-layer");
        let collocated = registry.put_plain_image("registry.io/org/bundle", "app-layer");
        assert_eq!(
            original.split('@').nth(1),
            collocated.split('@').nth(1),
            "same content must have the same digest"
        );

        let found: UnprocessedImageSet = [original.clone()].into_iter().collect();
        let checked = check_bundle_repo_for_collocated_images(found, &bundle, &registry)
            .await
            .unwrap();

        assert_eq!(checked.all(), &[bundle, collocated]);
    }

    #[tokio::test]
    async fn test_missing_collocated_image_keeps_original() {
        let registry = FakeRegistry::new();
        let bundle = registry.put_bundle("registry.io/org/bundle", &[]);
        let original = registry.put_plain_image("source.io/team/app", "app-layer");

        let found: UnprocessedImageSet = [original.clone()].into_iter().collect();
        let checked = check_bundle_repo_for_collocated_images(found, &bundle, &registry)
            .await
            .unwrap();

        assert_eq!(checked.all(), &[bundle, original]);
        assert_eq!(registry.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_tag_reference_is_parse_error() {
        let registry = FakeRegistry::new();
        let bundle = registry.put_bundle("registry.io/org/bundle", &[]);
        let found: UnprocessedImageSet = ["source.io/team/app:v1"].into_iter().collect();

        let err = check_bundle_repo_for_collocated_images(found, &bundle, &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::ReferenceError(_)));
        assert!(err.to_string().contains("Parsing image URL: source.io/team/app:v1"));
        assert_eq!(registry.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_digest_is_parse_error() {
        let registry = FakeRegistry::new();
        let bundle = registry.put_bundle("registry.io/org/bundle", &[]);
        let found: UnprocessedImageSet = ["source.io/team/app@sha256:short"].into_iter().collect();

        let err = check_bundle_repo_for_collocated_images(found, &bundle, &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::ReferenceError(_)));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_preserve_processing_order() {
        let registry = FakeRegistry::new();
        let bundle = registry.put_bundle("registry.io/org/bundle", &[]);
        let a = registry.put_plain_image("source.io/team/a", "a");
        let b = registry.put_plain_image("source.io/team/b", "b");
        let b_collocated = registry.put_plain_image("registry.io/org/bundle", "b");

        let found: UnprocessedImageSet = [a.clone(), b.clone()].into_iter().collect();
        let checked = check_bundle_repo_for_collocated_images(found, &bundle, &registry)
            .await
            .unwrap();

        assert_eq!(checked.all(), &[bundle, a, b_collocated]);
    }

    #[tokio::test]
    async fn test_image_already_in_bundle_repo_is_not_duplicated() {
        let registry = FakeRegistry::new();
        let bundle = registry.put_bundle("registry.io/org/bundle", &[]);
        let image = registry.put_plain_image("registry.io/org/bundle", "x");

        let found: UnprocessedImageSet = [image.clone()].into_iter().collect();
        let checked = check_bundle_repo_for_collocated_images(found, &bundle, &registry)
            .await
            .unwrap();
        assert_eq!(checked.all(), &[bundle, image]);
    }
}
