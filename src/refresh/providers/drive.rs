// src/refresh/providers/drive.rs
//! Files in one shared Google Drive folder (Drive API v3).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use reqwest::Client;
use serde::Deserialize;

use crate::refresh::error::{ConfigError, FetchError};
use crate::refresh::http::{build_client, send_for_text, MAX_PAGES};
use crate::refresh::types::{FileRecord, Record, SourceClient, SourceKind};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
const FIELDS: &str =
    "nextPageToken,files(id,name,mimeType,webViewLink,thumbnailLink,modifiedTime)";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    web_view_link: Option<String>,
    #[serde(default)]
    thumbnail_link: Option<String>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

pub struct DriveClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
}

impl DriveClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Drive query selecting the folder's non-trashed children.
    fn folder_query(folder_id: &str) -> String {
        let escaped = folder_id.trim().replace('\\', "\\\\").replace('\'', "\\'");
        format!("'{escaped}' in parents and trashed = false")
    }

    pub fn parse_files(body: &str) -> Result<Vec<Record>, FetchError> {
        Self::parse_page(body).map(|(items, _)| items)
    }

    /// One `files.list` page plus the token for the next one.
    fn parse_page(body: &str) -> Result<(Vec<Record>, Option<String>), FetchError> {
        let t0 = std::time::Instant::now();
        let list: FileList = serde_json::from_str(body)
            .map_err(|e| FetchError::parse(format!("drive files: {e}"), body))?;

        let out = list
            .files
            .into_iter()
            .map(|f| {
                Record::File(FileRecord {
                    id: f.id,
                    name: f.name,
                    mime_type: f.mime_type,
                    url: f.web_view_link,
                    thumbnail_url: f.thumbnail_link,
                    modified_at: f.modified_time,
                })
            })
            .collect();

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("refresh_parse_ms", "source" => SourceKind::Drive.as_str()).record(ms);
        let next = list.next_page_token.filter(|t| !t.is_empty());
        Ok((out, next))
    }
}

#[async_trait]
impl SourceClient for DriveClient {
    async fn fetch(&self, identifier: &str) -> Result<Vec<Record>, FetchError> {
        let url = format!("{}/drive/v3/files", self.api_base);
        let mut query = vec![
            ("q", Self::folder_query(identifier)),
            ("orderBy", "modifiedTime desc".to_string()),
            ("fields", FIELDS.to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }

        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        for page in 1..=MAX_PAGES {
            let mut req = self.client.get(&url).query(&query);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let (items, next) = Self::parse_page(&send_for_text(req).await?)?;
            out.extend(items);
            match next {
                Some(_) if page == MAX_PAGES => {
                    tracing::warn!(
                        target: "refresh",
                        source = %SourceKind::Drive,
                        pages = MAX_PAGES,
                        items = out.len(),
                        "page limit reached; remaining files dropped"
                    );
                }
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(out)
    }

    fn source(&self) -> SourceKind {
        SourceKind::Drive
    }
}
