// src/refresh/types.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::refresh::error::{ConfigError, FetchError};

/// The external services whose content the portfolio displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Blog,
    Repos,
    Drive,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Blog, SourceKind::Repos, SourceKind::Drive];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Blog => "blog",
            SourceKind::Repos => "repos",
            SourceKind::Drive => "drive",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blog" => Ok(SourceKind::Blog),
            "repos" => Ok(SourceKind::Repos),
            "drive" => Ok(SourceKind::Drive),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }
}

/// A blog post as listed in the author's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub fork: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// One normalized item of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Post(PostRecord),
    Repo(RepoRecord),
    File(FileRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// Last refresh attempt succeeded.
    Ok,
    /// Last refresh attempt failed; items are from an earlier success.
    Stale,
    /// Refresh failed and there was never a successful fetch to fall back on.
    Error,
    NeverFetched,
}

/// The current view of one source, replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: SourceKind,
    pub fetched_at: Option<DateTime<Utc>>,
    pub items: Vec<Record>,
    pub status: SnapshotStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

impl Snapshot {
    /// Sentinel returned for sources that have not been fetched yet.
    pub fn never_fetched(source: SourceKind) -> Self {
        Self {
            source,
            fetched_at: None,
            items: Vec::new(),
            status: SnapshotStatus::NeverFetched,
            reason: None,
            digest: None,
        }
    }

    pub fn is_never_fetched(&self) -> bool {
        self.status == SnapshotStatus::NeverFetched
    }
}

/// What the scheduler needs to know about one source. Credentials live in
/// the client built for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub source: SourceKind,
    /// Username or folder id, depending on the source.
    pub identifier: String,
}

impl SourceConfig {
    pub fn new(source: SourceKind, identifier: impl Into<String>) -> Self {
        Self {
            source,
            identifier: identifier.into(),
        }
    }
}

/// Reads one external service and normalizes its content into records.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    /// `identifier` is the service-specific key: a username or a folder id.
    async fn fetch(&self, identifier: &str) -> Result<Vec<Record>, FetchError>;
    fn source(&self) -> SourceKind;
}
