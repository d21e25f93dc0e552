//! OCI image reference parsing.
//!
//! Parses references like `ghcr.io/org/app:v1.0` or
//! `ghcr.io/org/app@sha256:...` into structured components, and destination
//! repositories like `registry.io:5000/team/mirror`.

use bundlecopy_core::error::{CopyError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

/// Name, tag and digest of a reference, before any defaults are applied.
struct RawParts<'a> {
    name: &'a str,
    tag: Option<&'a str>,
    digest: Option<&'a str>,
}

fn split_reference(reference: &str) -> Result<RawParts<'_>> {
    if reference.is_empty() {
        return Err(CopyError::ReferenceError("Empty image reference".to_string()));
    }

    let (name_tag, digest) = match reference.rsplit_once('@') {
        Some((name_tag, digest)) => {
            if !digest.contains(':') {
                return Err(CopyError::ReferenceError(format!(
                    "Invalid digest format in reference '{}': expected algorithm:hex",
                    reference
                )));
            }
            (name_tag, Some(digest))
        }
        None => (reference, None),
    };

    // A colon after the last slash always starts a tag, so `nginx:1` is
    // tagged and a registry port needs a repository path after it.
    let last_segment_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
    let (name, tag) = match name_tag[last_segment_start..].rfind(':') {
        Some(colon) => {
            let colon = last_segment_start + colon;
            (&name_tag[..colon], Some(&name_tag[colon + 1..]))
        }
        None => (name_tag, None),
    };

    if name.is_empty() {
        return Err(CopyError::ReferenceError(format!(
            "Empty repository in reference '{}'",
            reference
        )));
    }
    if matches!(tag, Some("")) {
        return Err(CopyError::ReferenceError(format!(
            "Empty tag in reference '{}'",
            reference
        )));
    }

    Ok(RawParts { name, tag, digest })
}

/// Split a name into registry and repository, reporting whether the
/// registry was given explicitly.
fn split_registry_repository(name: &str) -> Result<(String, String, bool)> {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(CopyError::ReferenceError(format!(
                    "Empty repository in reference '{}'",
                    name
                )));
            }
            return Ok((first.to_string(), rest.to_string(), true));
        }
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        // Single name like "nginx" → "library/nginx" for Docker Hub
        format!("library/{}", name)
    };

    Ok((DEFAULT_REGISTRY.to_string(), repository, false))
}

/// Whether a slash-free name is a registry host rather than a repository.
fn looks_like_registry_host(name: &str) -> bool {
    if name.contains('/') || name.contains('@') {
        return false;
    }
    let host = match name.split_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            return !host.is_empty();
        }
        Some(_) => return false,
        None => name,
    };
    host.contains('.') || host == "localhost"
}

/// Validate an `algorithm:hex` digest the way registries do.
fn validate_digest(digest: &str) -> Result<()> {
    let (algorithm, hex) = digest.split_once(':').ok_or_else(|| {
        CopyError::ReferenceError(format!("Invalid digest '{}': expected algorithm:hex", digest))
    })?;
    let expected_len = match algorithm {
        "sha256" => 64,
        "sha512" => 128,
        other => {
            return Err(CopyError::ReferenceError(format!(
                "Unsupported digest algorithm '{}' in '{}'",
                other, digest
            )))
        }
    };
    if hex.len() != expected_len || !hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return Err(CopyError::ReferenceError(format!(
            "Invalid {} digest '{}': expected {} lowercase hex characters",
            algorithm, digest, expected_len
        )));
    }
    Ok(())
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `ghcr.io/org/image@sha256:abc...` → ghcr.io/org/image@sha256:abc...
    pub fn parse(reference: &str) -> Result<Self> {
        let parts = split_reference(reference.trim())?;
        let (registry, repository, _) = split_registry_repository(parts.name)?;

        let tag = match (parts.tag, parts.digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest: parts.digest.map(str::to_string),
        })
    }

    /// Parse a digest reference with no implicit defaults.
    ///
    /// The registry must be explicit and the digest must be a well-formed
    /// sha256/sha512 digest.
    pub fn parse_digest(reference: &str) -> Result<Self> {
        let parts = split_reference(reference)?;
        let digest = parts.digest.ok_or_else(|| {
            CopyError::ReferenceError(format!(
                "Expected a digest reference (repo@sha256:...), got '{}'",
                reference
            ))
        })?;
        validate_digest(digest)?;

        let (registry, repository, explicit) = split_registry_repository(parts.name)?;
        if !explicit {
            return Err(CopyError::ReferenceError(format!(
                "Registry must be explicit in '{}'",
                reference
            )));
        }

        Ok(ImageReference {
            registry,
            repository,
            tag: parts.tag.map(str::to_string),
            digest: Some(digest.to_string()),
        })
    }

    /// `registry/repository` without tag or digest.
    pub fn repository_name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.repository_name();
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Destination repository for relocation (no tag, no digest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub registry: String,
    pub repository: String,
}

impl RepositoryReference {
    /// Parse a destination repository.
    ///
    /// A bare registry host (`registry.io`, `registry.io:5000`) is rejected
    /// rather than read as a Docker Hub repository.
    pub fn parse(repository: &str) -> Result<Self> {
        let trimmed = repository.trim();
        if looks_like_registry_host(trimmed) {
            return Err(CopyError::ReferenceError(format!(
                "Repository '{}' names a registry but no repository path",
                repository
            )));
        }

        let parts = split_reference(trimmed)?;
        if parts.tag.is_some() || parts.digest.is_some() {
            return Err(CopyError::ReferenceError(format!(
                "Repository '{}' must not include a tag or digest",
                repository
            )));
        }
        let (registry, repository, _) = split_registry_repository(parts.name)?;
        Ok(Self {
            registry,
            repository,
        })
    }

    /// Reference to `digest` inside this repository.
    pub fn with_digest(&self, digest: &str) -> ImageReference {
        ImageReference {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest.to_string()),
        }
    }

    /// Reference to `tag` inside this repository.
    pub fn with_tag(&self, tag: &str) -> ImageReference {
        ImageReference {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }
}

impl std::fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)
    }
}
