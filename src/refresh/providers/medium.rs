// src/refresh/providers/medium.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use reqwest::Client;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::refresh::error::{ConfigError, FetchError};
use crate::refresh::http::{build_client, send_for_text};
use crate::refresh::normalize_text;
use crate::refresh::types::{PostRecord, Record, SourceClient, SourceKind};

pub const DEFAULT_API_BASE: &str = "https://medium.com";
const SUMMARY_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    // `content:encoded`; the deserializer matches on local names.
    #[serde(rename = "encoded")]
    content: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
}

fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        return DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    // "GMT"-suffixed dates are common in feeds; chrono accepts the obsolete zone names.
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Reads an author's public Medium RSS feed.
pub struct MediumClient {
    client: Client,
    api_base: String,
}

impl MediumClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn feed_url(&self, username: &str) -> String {
        let user = username.trim().trim_start_matches('@');
        format!("{}/feed/@{}", self.api_base, user)
    }

    pub fn parse_feed(xml: &str) -> Result<Vec<Record>, FetchError> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| FetchError::parse(format!("medium rss: {e}"), xml))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default(), SUMMARY_MAX_CHARS);
            let url = it.link.unwrap_or_default().trim().to_string();
            if title.is_empty() || url.is_empty() {
                continue;
            }
            let body = it
                .content
                .filter(|c| !c.trim().is_empty())
                .or(it.description)
                .unwrap_or_default();

            out.push(Record::Post(PostRecord {
                title,
                url,
                published_at: it.pub_date.as_deref().and_then(parse_pub_date),
                summary: normalize_text(&body, SUMMARY_MAX_CHARS),
                categories: it
                    .categories
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
            }));
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("refresh_parse_ms", "source" => SourceKind::Blog.as_str()).record(ms);
        Ok(out)
    }
}

#[async_trait]
impl SourceClient for MediumClient {
    async fn fetch(&self, identifier: &str) -> Result<Vec<Record>, FetchError> {
        let body = send_for_text(self.client.get(self.feed_url(identifier))).await?;
        Self::parse_feed(&body)
    }

    fn source(&self) -> SourceKind {
        SourceKind::Blog
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
