// src/refresh/mod.rs
pub mod error;
pub mod http;
pub mod providers;
pub mod scheduler;
pub mod store;
pub mod types;

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::watch;

use crate::refresh::error::FetchError;
use crate::refresh::scheduler::Backoff;
use crate::refresh::store::SnapshotStore;
use crate::refresh::types::{Record, SourceClient, SourceConfig};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "refresh_cycles_total",
            "Fetch cycles completed, labelled by source and outcome."
        );
        describe_counter!(
            "refresh_skipped_total",
            "Triggers skipped because the source was already in flight."
        );
        describe_counter!(
            "refresh_retries_total",
            "Network retries performed inside a fetch cycle."
        );
        describe_histogram!("refresh_fetch_ms", "Fetch cycle duration in milliseconds.");
        describe_histogram!("refresh_parse_ms", "Response parse time in milliseconds.");
        describe_gauge!("refresh_items", "Items in the current snapshot.");
        describe_gauge!(
            "refresh_last_success_ts",
            "Unix ts of the last successful refresh."
        );
    });
}

/// Normalize display text: decode entities, drop tags, collapse whitespace,
/// cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_BREAKS: OnceCell<regex::Regex> = OnceCell::new();
    let re_breaks = RE_BREAKS.get_or_init(|| {
        regex::Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|figure)>").unwrap()
    });
    out = re_breaks.replace_all(&out, " ").to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect::<String>().trim_end().to_string();
        out.push('…');
    }
    out
}

/// Result of one fetch-normalize-persist cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Updated { items: usize },
    Failed { error: FetchError },
    /// The client panicked; the source was marked stale with the panic message.
    Panicked { message: String },
}

impl CycleOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, CycleOutcome::Updated { .. })
    }
}

/// Fetch `config.identifier` through `client` and write the result to
/// `store`. Errors never escape: they become `mark_stale` plus a log entry.
pub async fn run_cycle(
    config: &SourceConfig,
    client: &dyn SourceClient,
    store: &SnapshotStore,
    backoff: &Backoff,
    stop: &mut watch::Receiver<bool>,
) -> CycleOutcome {
    ensure_metrics_described();
    let source = config.source;
    let t0 = Instant::now();

    let result = fetch_with_backoff(config, client, backoff, stop).await;

    let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("refresh_fetch_ms", "source" => source.as_str()).record(elapsed_ms);

    match result {
        Ok(items) => {
            let n = items.len();
            store.put(source, items);
            counter!("refresh_cycles_total", "source" => source.as_str(), "outcome" => "ok")
                .increment(1);
            gauge!("refresh_items", "source" => source.as_str()).set(n as f64);
            gauge!("refresh_last_success_ts", "source" => source.as_str())
                .set(chrono::Utc::now().timestamp() as f64);
            tracing::info!(target: "refresh", %source, items = n, elapsed_ms, "snapshot refreshed");
            CycleOutcome::Updated { items: n }
        }
        Err(error) => {
            match &error {
                FetchError::Parse { message, raw } => {
                    tracing::warn!(
                        target: "refresh",
                        %source,
                        %message,
                        raw = %raw,
                        "unexpected response shape"
                    );
                }
                FetchError::Auth { status } => {
                    tracing::error!(
                        target: "refresh",
                        %source,
                        status,
                        "credential rejected; needs operator attention"
                    );
                }
                other => {
                    tracing::warn!(
                        target: "refresh",
                        %source,
                        error = %other,
                        elapsed_ms,
                        "fetch failed"
                    );
                }
            }
            let snap = store.mark_stale(source, error.to_string());
            counter!(
                "refresh_cycles_total",
                "source" => source.as_str(),
                "outcome" => error.kind()
            )
            .increment(1);
            tracing::debug!(target: "refresh", %source, status = ?snap.status, "snapshot marked");
            CycleOutcome::Failed { error }
        }
    }
}

async fn fetch_with_backoff(
    config: &SourceConfig,
    client: &dyn SourceClient,
    backoff: &Backoff,
    stop: &mut watch::Receiver<bool>,
) -> Result<Vec<Record>, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match client.fetch(&config.identifier).await {
            Ok(items) => return Ok(items),
            Err(e) if e.is_retryable() && attempt <= backoff.max_retries => {
                let delay = backoff.delay(attempt);
                tracing::debug!(
                    target: "refresh",
                    source = %config.source,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after network error"
                );
                counter!("refresh_retries_total", "source" => config.source.as_str()).increment(1);
                if !scheduler::sleep_unless_stopped(delay, stop).await {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
