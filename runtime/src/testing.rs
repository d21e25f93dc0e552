//! In-memory registry used by unit tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use bundlecopy_core::error::{CopyError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::bundle::{BUNDLE_CONFIG_LABEL, IMAGES_LOCK_PATH};
use crate::oci::manifest::{
    sha256_digest, Descriptor, OciDocument, OCI_IMAGE_INDEX_MEDIA_TYPE, OCI_IMAGE_MANIFEST_MEDIA_TYPE,
};
use oci_spec::image::MediaType;
use crate::oci::registry::{FetchedManifest, Registry};
use crate::oci::reference::ImageReference;

#[derive(Default)]
struct Repo {
    /// tag or digest → (bytes, media type)
    manifests: HashMap<String, (Vec<u8>, String)>,
    blobs: HashMap<String, Vec<u8>>,
}

/// Registry that keeps repositories in memory and records calls.
#[derive(Default)]
pub struct FakeRegistry {
    repos: Mutex<HashMap<String, Repo>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far, as `op name`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("probe ")).count()
    }

    fn record(&self, op: &str, reference: &ImageReference) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", op, reference.full_reference()));
    }

    pub fn put_blob(&self, repo: &str, data: &[u8], media_type: MediaType) -> Descriptor {
        let digest = sha256_digest(data);
        self.repos
            .lock()
            .unwrap()
            .entry(repo.to_string())
            .or_default()
            .blobs
            .insert(digest.clone(), data.to_vec());
        Descriptor::new(media_type, data.len() as i64, digest)
    }

    /// Store a manifest under its digest, and under `tag` if given. Returns the digest.
    pub fn put_manifest(&self, repo: &str, bytes: &[u8], media_type: &str, tag: Option<&str>) -> String {
        let digest = sha256_digest(bytes);
        let mut repos = self.repos.lock().unwrap();
        let entry = repos.entry(repo.to_string()).or_default();
        entry
            .manifests
            .insert(digest.clone(), (bytes.to_vec(), media_type.to_string()));
        if let Some(tag) = tag {
            entry
                .manifests
                .insert(tag.to_string(), (bytes.to_vec(), media_type.to_string()));
        }
        digest
    }

    /// Store a plain image with the given config and layers. Returns the manifest digest.
    pub fn put_image(&self, repo: &str, config: &serde_json::Value, layers: &[&[u8]]) -> String {
        let config_bytes = serde_json::to_vec(config).unwrap();
        let config_desc = self.put_blob(repo, &config_bytes, MediaType::ImageConfig);
        let layer_descs: Vec<Descriptor> = layers
            .iter()
            .map(|l| self.put_blob(repo, l, MediaType::ImageLayerGzip))
            .collect();
        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_MANIFEST_MEDIA_TYPE,
            "config": config_desc,
            "layers": layer_descs,
        });
        let bytes = serde_json::to_vec(&manifest).unwrap();
        self.put_manifest(repo, &bytes, OCI_IMAGE_MANIFEST_MEDIA_TYPE, None)
    }

    /// Store a plain image with a unique layer. Returns `repo@digest`.
    pub fn put_plain_image(&self, repo: &str, content: &str) -> String {
        let digest = self.put_image(
            repo,
            &serde_json::json!({
                "architecture": "amd64",
                "os": "linux",
                "rootfs": {"type": "layers", "diff_ids": []},
            }),
            &[content.as_bytes()],
        );
        format!("{}@{}", repo, digest)
    }

    /// Store a bundle whose embedded images lock lists `images`. Returns `repo@digest`.
    pub fn put_bundle(&self, repo: &str, images: &[&str]) -> String {
        let layer = bundle_layer(images);
        let digest = self.put_image(repo, &bundle_config(), &[&layer]);
        format!("{}@{}", repo, digest)
    }

    /// Store an index over the given manifest digests. Returns `repo@digest`.
    pub fn put_index(&self, repo: &str, children: &[&str]) -> String {
        let repos = self.repos.lock().unwrap();
        let entry = repos.get(repo).expect("repo must exist");
        let manifests: Vec<serde_json::Value> = children
            .iter()
            .map(|d| {
                let (bytes, media_type) = entry.manifests.get(*d).expect("child must exist");
                serde_json::json!({"mediaType": media_type, "digest": d, "size": bytes.len()})
            })
            .collect();
        drop(repos);
        let index = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_INDEX_MEDIA_TYPE,
            "manifests": manifests,
        });
        let bytes = serde_json::to_vec(&index).unwrap();
        let digest = self.put_manifest(repo, &bytes, OCI_IMAGE_INDEX_MEDIA_TYPE, None);
        format!("{}@{}", repo, digest)
    }

    /// Replace a stored blob's bytes without changing its digest key.
    pub fn corrupt_blob(&self, repo: &str, digest: &str) {
        let mut repos = self.repos.lock().unwrap();
        let blob = repos
            .get_mut(repo)
            .and_then(|r| r.blobs.get_mut(digest))
            .expect("blob must exist");
        blob.push(0xff);
    }

    /// Serve the manifest stored under `from` under the key `to` as well.
    pub fn alias_manifest(&self, repo: &str, from: &str, to: &str) {
        let mut repos = self.repos.lock().unwrap();
        let entry = repos.get_mut(repo).expect("repo must exist");
        let manifest = entry.manifests.get(from).cloned().expect("manifest must exist");
        entry.manifests.insert(to.to_string(), manifest);
    }

    pub fn has_manifest(&self, repo: &str, key: &str) -> bool {
        self.repos
            .lock()
            .unwrap()
            .get(repo)
            .map(|r| r.manifests.contains_key(key))
            .unwrap_or(false)
    }

    pub fn has_blob(&self, repo: &str, digest: &str) -> bool {
        self.repos
            .lock()
            .unwrap()
            .get(repo)
            .map(|r| r.blobs.contains_key(digest))
            .unwrap_or(false)
    }

    fn lookup(&self, reference: &ImageReference) -> Option<(Vec<u8>, String)> {
        let key = reference
            .digest
            .clone()
            .or_else(|| reference.tag.clone())
            .unwrap_or_else(|| "latest".to_string());
        self.repos
            .lock()
            .unwrap()
            .get(&reference.repository_name())
            .and_then(|r| r.manifests.get(&key).cloned())
    }
}

fn not_found(reference: &ImageReference) -> CopyError {
    CopyError::RegistryError {
        registry: reference.registry.clone(),
        message: format!("MANIFEST_UNKNOWN: {}", reference),
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<FetchedManifest> {
        self.record("fetch_manifest", reference);
        let (bytes, media_type) = self.lookup(reference).ok_or_else(|| not_found(reference))?;
        Ok(FetchedManifest {
            digest: sha256_digest(&bytes),
            bytes,
            media_type,
        })
    }

    async fn fetch_blob(&self, reference: &ImageReference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.record("fetch_blob", reference);
        self.repos
            .lock()
            .unwrap()
            .get(&reference.repository_name())
            .and_then(|r| r.blobs.get(descriptor.digest()).cloned())
            .ok_or_else(|| CopyError::RegistryError {
                registry: reference.registry.clone(),
                message: format!("BLOB_UNKNOWN: {}", descriptor.digest()),
            })
    }

    async fn probe(&self, reference: &ImageReference) -> Result<String> {
        self.record("probe", reference);
        self.lookup(reference)
            .map(|(bytes, _)| sha256_digest(&bytes))
            .ok_or_else(|| not_found(reference))
    }

    async fn push_blob(&self, reference: &ImageReference, data: &[u8], digest: &str) -> Result<()> {
        self.record("push_blob", reference);
        assert_eq!(sha256_digest(data), digest, "pushed blob must match digest");
        self.repos
            .lock()
            .unwrap()
            .entry(reference.repository_name())
            .or_default()
            .blobs
            .insert(digest.to_string(), data.to_vec());
        Ok(())
    }

    async fn push_manifest(&self, reference: &ImageReference, manifest: &[u8], media_type: &str) -> Result<()> {
        self.record("push_manifest", reference);
        let repo = reference.repository_name();
        let parsed = OciDocument::from_slice(manifest)?;
        {
            let repos = self.repos.lock().unwrap();
            let entry = repos.get(&repo);
            for blob in parsed.blobs() {
                if !entry.map(|r| r.blobs.contains_key(blob.digest())).unwrap_or(false) {
                    return Err(CopyError::RegistryError {
                        registry: reference.registry.clone(),
                        message: format!("BLOB_UNKNOWN: {}", blob.digest()),
                    });
                }
            }
        }
        let tag = reference.tag.as_deref();
        let digest = self.put_manifest(&repo, manifest, media_type, tag);
        if let Some(expected) = &reference.digest {
            assert_eq!(&digest, expected, "manifest pushed by digest must match");
        }
        Ok(())
    }
}

/// Image configuration carrying the bundle label.
pub fn bundle_config() -> serde_json::Value {
    serde_json::json!({
        "architecture": "amd64",
        "os": "linux",
        "config": {"Labels": {BUNDLE_CONFIG_LABEL: "true"}},
        "rootfs": {"type": "layers", "diff_ids": []},
    })
}

/// Gzipped tar layer holding `.imgpkg/images.yml` for `images`.
pub fn bundle_layer(images: &[&str]) -> Vec<u8> {
    let mut yaml = String::from("apiVersion: imgpkg.carvel.dev/v1alpha1\nkind: ImagesLock\nspec:\n  images:");
    yaml.push_str(if images.is_empty() { " []\n" } else { "\n" });
    for image in images {
        yaml.push_str(&format!("  - image: {}\n", image));
    }

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(yaml.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, IMAGES_LOCK_PATH, yaml.as_bytes())
        .unwrap();
    let tar_bytes = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}
