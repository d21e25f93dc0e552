//! `bundlecopy copy` command: copy a bundle or images to a repository or tar archive.

use bundlecopy_core::{CopyConfig, RegistryConfig};
use bundlecopy_runtime::{CopyMode, CopyRequest, OciRegistry};
use clap::Args;

#[derive(Args, Debug, Clone, Default)]
pub struct CopyArgs {
    /// BundleLock or ImagesLock file to copy from
    #[arg(long, value_name = "PATH")]
    pub lock: Option<String>,

    /// Bundle reference to copy from
    #[arg(short, long, value_name = "REF")]
    pub bundle: Option<String>,

    /// Image reference to copy from
    #[arg(short, long, value_name = "REF")]
    pub image: Option<String>,

    /// Tar archive to import from
    #[arg(long, value_name = "PATH")]
    pub from_tar: Option<String>,

    /// Destination repository (e.g., "registry.io/team/mirror")
    #[arg(long, value_name = "REPO")]
    pub to_repo: Option<String>,

    /// Destination tar archive
    #[arg(long, value_name = "PATH")]
    pub to_tar: Option<String>,

    /// Maximum number of images copied at once
    #[arg(long, default_value_t = bundlecopy_core::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Registry username (falls back to BUNDLECOPY_USERNAME)
    #[arg(long)]
    pub registry_username: Option<String>,

    /// Registry password (falls back to BUNDLECOPY_PASSWORD)
    #[arg(long)]
    pub registry_password: Option<String>,

    /// Access registries anonymously
    #[arg(long)]
    pub registry_anon: bool,

    /// Use plain HTTP for all registries
    #[arg(long)]
    pub registry_insecure: bool,
}

impl CopyArgs {
    /// Source and destination choices, for mode selection.
    pub fn request(&self) -> CopyRequest {
        CopyRequest {
            lock: self.lock.clone(),
            bundle: self.bundle.clone(),
            image: self.image.clone(),
            from_tar: self.from_tar.clone(),
            to_repo: self.to_repo.clone(),
            to_tar: self.to_tar.clone(),
        }
    }

    /// Run configuration, with environment fallbacks applied.
    pub fn config(&self) -> CopyConfig {
        let registry = RegistryConfig {
            username: self.registry_username.clone(),
            password: self.registry_password.clone(),
            anonymous: self.registry_anon,
            insecure: self.registry_insecure,
        }
        .with_env_fallback();

        CopyConfig {
            concurrency: self.concurrency,
            registry,
        }
    }
}

pub async fn execute(args: CopyArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Source and destination errors are reported before flag errors.
    let mode = CopyMode::select(&args.request())?;
    let config = args.config();
    config.validate()?;

    tracing::debug!(mode = ?mode, concurrency = config.concurrency, "Starting copy");

    let registry = OciRegistry::new(&config.registry);
    let outcome = bundlecopy_runtime::execute(&mode, config.concurrency, &registry).await?;

    for image in &outcome.images {
        tracing::info!(source = %image.source, destination = %image.destination, "Copied");
    }
    println!(
        "Copied {} image(s) to {}",
        outcome.images.len(),
        outcome.destination
    );
    Ok(())
}
