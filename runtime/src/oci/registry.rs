//! OCI registry access.
//!
//! [`Registry`] is the narrow capability set the resolver and the transfer
//! collaborators need. [`OciRegistry`] implements it with the
//! `oci-distribution` crate against real registries (Docker Hub, GHCR, etc.).

use std::collections::HashSet;

use async_trait::async_trait;
use bundlecopy_core::config::RegistryConfig;
use bundlecopy_core::error::{CopyError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::OciDistributionError;
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};
use tokio::sync::Mutex;

use super::manifest::{Descriptor, OciDocument, ACCEPTED_MANIFEST_MEDIA_TYPES};
use super::reference::ImageReference;

/// Raw manifest as served by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedManifest {
    /// Manifest bytes exactly as served
    pub bytes: Vec<u8>,
    /// Digest reported by the registry
    pub digest: String,
    /// Media type declared in the document
    pub media_type: String,
}

impl FetchedManifest {
    pub fn parse(&self) -> Result<OciDocument> {
        OciDocument::from_slice(&self.bytes)
    }
}

/// Registry operations used by resolution and transfer.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch the manifest (or index) a reference points at.
    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<FetchedManifest>;

    /// Fetch a blob from the repository of `reference`.
    async fn fetch_blob(&self, reference: &ImageReference, descriptor: &Descriptor)
        -> Result<Vec<u8>>;

    /// Cheap existence probe. Returns the manifest digest if the reference resolves.
    async fn probe(&self, reference: &ImageReference) -> Result<String>;

    /// Upload a blob into the repository of `reference`.
    async fn push_blob(&self, reference: &ImageReference, data: &[u8], digest: &str) -> Result<()>;

    /// Upload manifest bytes unchanged under `reference`.
    async fn push_manifest(
        &self,
        reference: &ImageReference,
        manifest: &[u8],
        media_type: &str,
    ) -> Result<()>;
}

/// Registry client backed by `oci-distribution`.
pub struct OciRegistry {
    client: Client,
    auth: OciRegistryAuth,
    /// Repositories that already hold a push token.
    push_authorized: Mutex<HashSet<String>>,
}

impl OciRegistry {
    /// Create a registry client from CLI/env configuration.
    pub fn new(config: &RegistryConfig) -> Self {
        let protocol = if config.insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });
        let auth = match config.credentials() {
            Some((username, password)) => {
                OciRegistryAuth::Basic(username.to_string(), password.to_string())
            }
            None => OciRegistryAuth::Anonymous,
        };

        Self {
            client,
            auth,
            push_authorized: Mutex::new(HashSet::new()),
        }
    }

    async fn authorize_push(&self, oci_ref: &Reference, reference: &ImageReference) -> Result<()> {
        let key = reference.repository_name();
        let mut authorized = self.push_authorized.lock().await;
        if authorized.contains(&key) {
            return Ok(());
        }
        self.client
            .auth(oci_ref, &self.auth, RegistryOperation::Push)
            .await
            .map_err(|e| registry_error(reference, "Failed to authenticate for push", e))?;
        authorized.insert(key);
        Ok(())
    }
}

#[async_trait]
impl Registry for OciRegistry {
    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<FetchedManifest> {
        let oci_ref = to_oci_reference(reference);
        tracing::debug!(reference = %reference, "Fetching manifest");

        let (bytes, digest) = self
            .client
            .pull_manifest_raw(&oci_ref, &self.auth, ACCEPTED_MANIFEST_MEDIA_TYPES)
            .await
            .map_err(|e| registry_error(reference, "Failed to pull manifest", e))?;

        let media_type = OciDocument::from_slice(&bytes)?.media_type();

        Ok(FetchedManifest {
            bytes,
            digest,
            media_type,
        })
    }

    async fn fetch_blob(
        &self,
        reference: &ImageReference,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>> {
        let oci_ref = to_oci_reference(reference);
        let layer = OciDescriptor {
            media_type: descriptor.media_type().to_string(),
            digest: descriptor.digest().clone(),
            size: descriptor.size(),
            ..Default::default()
        };

        tracing::debug!(
            digest = %descriptor.digest(),
            size = descriptor.size(),
            "Pulling blob"
        );

        let mut data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&oci_ref, &layer, &mut data)
            .await
            .map_err(|e| {
                registry_error(
                    reference,
                    &format!("Failed to pull blob {}", descriptor.digest()),
                    e,
                )
            })?;
        Ok(data)
    }

    async fn probe(&self, reference: &ImageReference) -> Result<String> {
        let oci_ref = to_oci_reference(reference);
        self.client
            .fetch_manifest_digest(&oci_ref, &self.auth)
            .await
            .map_err(|e| registry_error(reference, "Manifest not found", e))
    }

    async fn push_blob(&self, reference: &ImageReference, data: &[u8], digest: &str) -> Result<()> {
        let oci_ref = to_oci_reference(reference);
        self.authorize_push(&oci_ref, reference).await?;

        tracing::debug!(digest = %digest, size = data.len(), "Pushing blob");
        self.client
            .push_blob(&oci_ref, data, digest)
            .await
            .map_err(|e| registry_error(reference, &format!("Failed to push blob {}", digest), e))?;
        Ok(())
    }

    async fn push_manifest(
        &self,
        reference: &ImageReference,
        manifest: &[u8],
        media_type: &str,
    ) -> Result<()> {
        let oci_ref = to_oci_reference(reference);
        self.authorize_push(&oci_ref, reference).await?;

        let content_type = http::HeaderValue::from_str(media_type).map_err(|e| {
            CopyError::OciImageError(format!("Invalid manifest media type '{}': {}", media_type, e))
        })?;
        let url = self
            .client
            .push_manifest_raw(&oci_ref, manifest.to_vec(), content_type)
            .await
            .map_err(|e| registry_error(reference, "Failed to push manifest", e))?;

        tracing::debug!(reference = %reference, url = %url, "Manifest pushed");
        Ok(())
    }
}

/// Convert an ImageReference to an oci-distribution Reference.
pub(crate) fn to_oci_reference(reference: &ImageReference) -> Reference {
    match (&reference.digest, &reference.tag) {
        (Some(digest), _) => Reference::with_digest(
            reference.registry.clone(),
            reference.repository.clone(),
            digest.clone(),
        ),
        (None, Some(tag)) => Reference::with_tag(
            reference.registry.clone(),
            reference.repository.clone(),
            tag.clone(),
        ),
        (None, None) => Reference::with_tag(
            reference.registry.clone(),
            reference.repository.clone(),
            "latest".to_string(),
        ),
    }
}

fn registry_error(reference: &ImageReference, context: &str, err: OciDistributionError) -> CopyError {
    CopyError::RegistryError {
        registry: reference.registry.clone(),
        message: format!("{} for {}: {}", context, reference, err),
    }
}
