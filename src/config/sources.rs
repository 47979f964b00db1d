// src/config/sources.rs
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::refresh::error::ConfigError;
use crate::refresh::providers::{drive, github, medium};
use crate::refresh::scheduler::Backoff;
use crate::refresh::types::{SourceClient, SourceConfig, SourceKind};

fn default_blog_cadence() -> u64 {
    60
}
fn default_cadence() -> u64 {
    1800
}
fn default_timeout() -> u64 {
    20
}

/// Placeholder meaning "read the secret from the environment".
const ENV_MARKER: &str = "env";
const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogSection {
    pub username: String,
    #[serde(default = "default_blog_cadence")]
    pub cadence_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReposSection {
    pub username: String,
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Optional; "ENV" reads GITHUB_TOKEN.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSection {
    pub folder_id: String,
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_base: Option<String>,
    /// "ENV" reads GOOGLE_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSection {
    #[serde(default = "BackoffSection::default_retries")]
    pub max_retries: u32,
    #[serde(default = "BackoffSection::default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "BackoffSection::default_max_ms")]
    pub max_ms: u64,
}

impl BackoffSection {
    fn default_retries() -> u32 {
        3
    }
    fn default_base_ms() -> u64 {
        500
    }
    fn default_max_ms() -> u64 {
        30_000
    }
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            max_retries: Self::default_retries(),
            base_ms: Self::default_base_ms(),
            max_ms: Self::default_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Directory for persisted snapshots; memory-only when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Whole refresh configuration. Every source section is optional; a missing
/// section means that source is not scheduled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub blog: Option<BlogSection>,
    #[serde(default)]
    pub repos: Option<ReposSection>,
    #[serde(default)]
    pub drive: Option<DriveSection>,
    #[serde(default)]
    pub backoff: BackoffSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// Everything needed to register one source with the scheduler.
pub struct SourceSetup {
    pub config: SourceConfig,
    pub cadence: Duration,
    pub client: Arc<dyn SourceClient>,
}

impl RefreshConfig {
    /// Resolve "ENV" secrets and check every value the scheduler relies on.
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if let Some(repos) = self.repos.as_mut() {
            repos.token = resolve_secret(repos.token.take(), GITHUB_TOKEN_ENV)?;
        }
        if let Some(drive) = self.drive.as_mut() {
            drive.api_key = resolve_secret(drive.api_key.take(), GOOGLE_API_KEY_ENV)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(b) = &self.blog {
            check_source(SourceKind::Blog, &b.username, b.cadence_secs, b.timeout_secs)?;
        }
        if let Some(r) = &self.repos {
            check_source(SourceKind::Repos, &r.username, r.cadence_secs, r.timeout_secs)?;
        }
        if let Some(d) = &self.drive {
            check_source(SourceKind::Drive, &d.folder_id, d.cadence_secs, d.timeout_secs)?;
        }
        if self.backoff.base_ms > self.backoff.max_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff.base_ms ({}) exceeds backoff.max_ms ({})",
                self.backoff.base_ms, self.backoff.max_ms
            )));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_retries: self.backoff.max_retries,
            base: Duration::from_millis(self.backoff.base_ms),
            max_delay: Duration::from_millis(self.backoff.max_ms),
        }
    }

    /// Build clients for every configured source.
    pub fn source_setups(&self) -> Result<Vec<SourceSetup>, ConfigError> {
        let mut out = Vec::new();

        if let Some(b) = &self.blog {
            let client = medium::MediumClient::new(
                b.api_base.as_deref().unwrap_or(medium::DEFAULT_API_BASE),
                Duration::from_secs(b.timeout_secs),
            )?;
            out.push(SourceSetup {
                config: SourceConfig::new(SourceKind::Blog, b.username.trim()),
                cadence: Duration::from_secs(b.cadence_secs),
                client: Arc::new(client),
            });
        }

        if let Some(r) = &self.repos {
            let client = github::GithubClient::new(
                r.api_base.as_deref().unwrap_or(github::DEFAULT_API_BASE),
                r.token.clone(),
                Duration::from_secs(r.timeout_secs),
            )?;
            out.push(SourceSetup {
                config: SourceConfig::new(SourceKind::Repos, r.username.trim()),
                cadence: Duration::from_secs(r.cadence_secs),
                client: Arc::new(client),
            });
        }

        if let Some(d) = &self.drive {
            let client = drive::DriveClient::new(
                d.api_base.as_deref().unwrap_or(drive::DEFAULT_API_BASE),
                d.api_key.clone(),
                Duration::from_secs(d.timeout_secs),
            )?;
            out.push(SourceSetup {
                config: SourceConfig::new(SourceKind::Drive, d.folder_id.trim()),
                cadence: Duration::from_secs(d.cadence_secs),
                client: Arc::new(client),
            });
        }

        Ok(out)
    }
}

fn check_source(
    source: SourceKind,
    identifier: &str,
    cadence_secs: u64,
    timeout_secs: u64,
) -> Result<(), ConfigError> {
    if identifier.trim().is_empty() {
        return Err(ConfigError::EmptyIdentifier(source));
    }
    if cadence_secs == 0 {
        return Err(ConfigError::NonPositiveCadence(source));
    }
    if timeout_secs == 0 {
        return Err(ConfigError::Invalid(format!(
            "timeout for {source} must be positive"
        )));
    }
    Ok(())
}

fn resolve_secret(value: Option<String>, var: &'static str) -> Result<Option<String>, ConfigError> {
    match value {
        Some(v) if v.trim().eq_ignore_ascii_case(ENV_MARKER) => env::var(var)
            .map(Some)
            .map_err(|_| ConfigError::MissingEnv(var)),
        Some(v) if v.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}
