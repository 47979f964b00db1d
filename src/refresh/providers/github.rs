// src/refresh/providers/github.rs
//! Public repositories of one GitHub user, most recently updated first.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::Client;
use serde::Deserialize;

use crate::refresh::error::{ConfigError, FetchError};
use crate::refresh::http::{build_client, send_for_page, MAX_PAGES};
use crate::refresh::types::{Record, RepoRecord, SourceClient, SourceKind};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const PER_PAGE: &str = "100";

/// Target of the `rel="next"` entry in a `Link` header, if any.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|p| {
            let p = p.trim();
            p == r#"rel="next""# || p == "rel=next"
        });
        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        is_next.then(|| url.to_string())
    })
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    fork: bool,
}

pub struct GithubClient {
    client: Client,
    api_base: String,
    headers: HeaderMap,
}

impl GithubClient {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ConfigError::InvalidCredential(SourceKind::Repos))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(Self {
            client: build_client(timeout)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            headers,
        })
    }

    pub fn parse_repos(body: &str) -> Result<Vec<Record>, FetchError> {
        let t0 = std::time::Instant::now();
        let repos: Vec<GithubRepo> = serde_json::from_str(body)
            .map_err(|e| FetchError::parse(format!("github repos: {e}"), body))?;

        let out = repos
            .into_iter()
            .map(|r| {
                Record::Repo(RepoRecord {
                    name: r.name,
                    description: r
                        .description
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty()),
                    url: r.html_url,
                    language: r.language,
                    stars: r.stargazers_count,
                    forks: r.forks_count,
                    updated_at: r.updated_at,
                    fork: r.fork,
                })
            })
            .collect();

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("refresh_parse_ms", "source" => SourceKind::Repos.as_str()).record(ms);
        Ok(out)
    }
}

#[async_trait]
impl SourceClient for GithubClient {
    async fn fetch(&self, identifier: &str) -> Result<Vec<Record>, FetchError> {
        let url = format!("{}/users/{}/repos", self.api_base, identifier.trim());
        let mut req = self
            .client
            .get(url)
            .query(&[("sort", "updated"), ("per_page", PER_PAGE)]);

        let mut out = Vec::new();
        for page in 1..=MAX_PAGES {
            let (headers, body) = send_for_page(req.headers(self.headers.clone())).await?;
            out.extend(Self::parse_repos(&body)?);
            match next_link(&headers) {
                Some(next) if page < MAX_PAGES => req = self.client.get(next),
                Some(_) => {
                    tracing::warn!(
                        target: "refresh",
                        source = %SourceKind::Repos,
                        pages = MAX_PAGES,
                        items = out.len(),
                        "page limit reached; remaining repositories dropped"
                    );
                    break;
                }
                None => break,
            }
        }
        Ok(out)
    }

    fn source(&self) -> SourceKind {
        SourceKind::Repos
    }
}
