use serde::{Deserialize, Serialize};

use crate::error::{CopyError, Result};

/// Default number of images transferred at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Environment variable consulted for the registry username.
pub const USERNAME_ENV: &str = "BUNDLECOPY_USERNAME";

/// Environment variable consulted for the registry password.
pub const PASSWORD_ENV: &str = "BUNDLECOPY_PASSWORD";

/// Copy run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Maximum number of images in flight during a transfer
    pub concurrency: usize,

    /// Registry access settings
    pub registry: RegistryConfig,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            registry: RegistryConfig::default(),
        }
    }
}

impl CopyConfig {
    /// Reject settings the transfer collaborators cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CopyError::ConfigError(
                "--concurrency must be a positive integer".to_string(),
            ));
        }
        self.registry.validate()
    }
}

/// Registry access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Username for basic authentication
    pub username: Option<String>,

    /// Password for basic authentication
    pub password: Option<String>,

    /// Force anonymous access even if credentials are available
    pub anonymous: bool,

    /// Talk plain HTTP to every registry
    pub insecure: bool,
}

impl RegistryConfig {
    /// Fill missing credentials from `BUNDLECOPY_USERNAME` / `BUNDLECOPY_PASSWORD`.
    ///
    /// Anonymous configurations are returned untouched.
    pub fn with_env_fallback(mut self) -> Self {
        if self.anonymous {
            return self;
        }
        if self.username.is_none() {
            self.username = std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty());
        }
        if self.password.is_none() {
            self.password = std::env::var(PASSWORD_ENV).ok().filter(|v| !v.is_empty());
        }
        self
    }

    /// Credentials to present, or `None` for anonymous access.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.anonymous {
            return None;
        }
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.anonymous && (self.username.is_some() || self.password.is_some()) {
            return Err(CopyError::ConfigError(
                "--registry-anon cannot be combined with registry credentials".to_string(),
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(CopyError::ConfigError(
                "--registry-username and --registry-password must be given together".to_string(),
            ));
        }
        Ok(())
    }
}
