//! Copy mode selection and dispatch.
//!
//! A copy run has exactly one source and one destination. [`CopyMode::select`]
//! validates the combination before anything touches a registry, and
//! [`execute`] resolves the source and hands the image set to the matching
//! transfer collaborator.

use std::path::PathBuf;

use bundlecopy_core::error::{CopyError, Result};

use crate::collocation::check_bundle_repo_for_collocated_images;
use crate::oci::reference::RepositoryReference;
use crate::oci::registry::Registry;
use crate::resolve::{resolve_source, RegistrySource};
use crate::transfer::{ImageRelocator, RelocatedImage, TarImageSet};

const EXPECTED_ONE_SOURCE: &str =
    "expected exactly one source: --lock, --bundle (-b), --image (-i) or --from-tar";

const EXPECTED_ONE_DESTINATION: &str = "expected exactly one destination: --to-tar or --to-repo";

/// Raw source and destination choices, as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyRequest {
    pub lock: Option<String>,
    pub bundle: Option<String>,
    pub image: Option<String>,
    pub from_tar: Option<String>,
    pub to_repo: Option<String>,
    pub to_tar: Option<String>,
}

/// A validated source/destination pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyMode {
    /// Tar archive into a repository
    Import {
        from_tar: PathBuf,
        to_repo: RepositoryReference,
    },
    /// Registry source into a tar archive
    Export {
        source: RegistrySource,
        to_tar: PathBuf,
    },
    /// Registry source into a repository
    Relocate {
        source: RegistrySource,
        to_repo: RepositoryReference,
    },
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl CopyMode {
    /// Validate `request` and pick the copy mode. Empty strings count as unset.
    pub fn select(request: &CopyRequest) -> Result<Self> {
        let lock = non_empty(&request.lock);
        let bundle = non_empty(&request.bundle);
        let image = non_empty(&request.image);
        let from_tar = non_empty(&request.from_tar);
        let to_repo = non_empty(&request.to_repo);
        let to_tar = non_empty(&request.to_tar);

        let sources = [lock, bundle, image, from_tar].iter().flatten().count();
        if sources != 1 {
            return Err(CopyError::ConfigError(EXPECTED_ONE_SOURCE.to_string()));
        }
        let destinations = [to_repo, to_tar].iter().flatten().count();
        if destinations != 1 {
            return Err(CopyError::ConfigError(EXPECTED_ONE_DESTINATION.to_string()));
        }

        if let Some(from_tar) = from_tar {
            let Some(to_repo) = to_repo else {
                return Err(CopyError::ConfigError(
                    "cannot copy from a tar archive to a tar archive; use --to-repo".to_string(),
                ));
            };
            return Ok(CopyMode::Import {
                from_tar: PathBuf::from(from_tar),
                to_repo: RepositoryReference::parse(to_repo)?,
            });
        }

        let source = match (lock, bundle, image) {
            (Some(lock), _, _) => RegistrySource::Lock(PathBuf::from(lock)),
            (_, Some(bundle), _) => RegistrySource::Bundle(bundle.to_string()),
            (_, _, Some(image)) => RegistrySource::Image(image.to_string()),
            (None, None, None) => {
                return Err(CopyError::ConfigError(EXPECTED_ONE_SOURCE.to_string()))
            }
        };

        match (to_tar, to_repo) {
            (Some(to_tar), _) => Ok(CopyMode::Export {
                source,
                to_tar: PathBuf::from(to_tar),
            }),
            (None, Some(to_repo)) => Ok(CopyMode::Relocate {
                source,
                to_repo: RepositoryReference::parse(to_repo)?,
            }),
            (None, None) => Err(CopyError::ConfigError(EXPECTED_ONE_DESTINATION.to_string())),
        }
    }

    /// Human-readable destination, for summaries.
    pub fn destination(&self) -> String {
        match self {
            CopyMode::Import { to_repo, .. } | CopyMode::Relocate { to_repo, .. } => {
                to_repo.to_string()
            }
            CopyMode::Export { to_tar, .. } => to_tar.display().to_string(),
        }
    }
}

/// Result of a completed copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub images: Vec<RelocatedImage>,
    pub destination: String,
}

/// Run a validated copy.
pub async fn execute(
    mode: &CopyMode,
    concurrency: usize,
    registry: &dyn Registry,
) -> Result<CopyOutcome> {
    let images = match mode {
        CopyMode::Import { from_tar, to_repo } => {
            TarImageSet::new(concurrency)
                .import(from_tar, to_repo, registry)
                .await?
        }
        CopyMode::Export { source, to_tar } => {
            let set = resolve_with_collocation(source, registry).await?;
            TarImageSet::new(concurrency)
                .export(&set, to_tar, registry)
                .await?
        }
        CopyMode::Relocate { source, to_repo } => {
            let set = resolve_with_collocation(source, registry).await?;
            ImageRelocator::new(concurrency)
                .relocate(&set, to_repo, registry)
                .await?
        }
    };

    Ok(CopyOutcome {
        images,
        destination: mode.destination(),
    })
}

async fn resolve_with_collocation(
    source: &RegistrySource,
    registry: &dyn Registry,
) -> Result<bundlecopy_core::image_set::UnprocessedImageSet> {
    let resolution = resolve_source(source, registry).await?;
    match resolution.bundle {
        Some(bundle) => {
            check_bundle_repo_for_collocated_images(resolution.images, &bundle, registry).await
        }
        None => Ok(resolution.images),
    }
}
