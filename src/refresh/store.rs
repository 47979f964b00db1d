// src/refresh/store.rs
//! Snapshot store: the only state shared between the scheduler and readers.
//!
//! Every write builds a fresh `Snapshot` and swaps the `Arc` under a short
//! write lock, so a reader sees either the previous snapshot or the new one.
//! Writes to the same source are serialized by the scheduler's in-flight
//! guard, not here.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::refresh::types::{Record, Snapshot, SnapshotStatus, SourceKind};

#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<HashMap<SourceKind, Arc<Snapshot>>>,
    dir: Option<PathBuf>,
}

impl SnapshotStore {
    /// Memory-only store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that mirrors every snapshot to `{dir}/{source}.json` and starts
    /// from whatever was persisted there.
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating snapshot dir {}", dir.display()))?;

        let mut map = HashMap::new();
        for source in SourceKind::ALL {
            let path = snapshot_path(&dir, source);
            if !path.exists() {
                continue;
            }
            match load_snapshot(&path) {
                Ok(snap) if snap.source == source => {
                    tracing::info!(
                        target: "refresh",
                        %source,
                        items = snap.items.len(),
                        "loaded persisted snapshot"
                    );
                    map.insert(source, Arc::new(snap));
                }
                Ok(snap) => {
                    tracing::warn!(
                        target: "refresh",
                        path = %path.display(),
                        found = %snap.source,
                        "persisted snapshot belongs to another source; ignoring"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        target: "refresh",
                        path = %path.display(),
                        "snapshot load: {e:#}"
                    );
                }
            }
        }

        Ok(Self {
            inner: RwLock::new(map),
            dir: Some(dir),
        })
    }

    /// Replace the snapshot for `source` with `items`, status OK.
    pub fn put(&self, source: SourceKind, items: Vec<Record>) -> Arc<Snapshot> {
        let digest = items_digest(&items);
        let snap = Arc::new(Snapshot {
            source,
            fetched_at: Some(Utc::now()),
            items,
            status: SnapshotStatus::Ok,
            reason: None,
            digest,
        });

        let previous = self.swap(source, snap.clone());
        let changed = previous.map_or(true, |p| p.digest != snap.digest);
        tracing::debug!(
            target: "refresh",
            %source,
            items = snap.items.len(),
            changed,
            "snapshot replaced"
        );

        self.persist(&snap);
        snap
    }

    /// Keep the current items but flag them as outdated. A source that never
    /// succeeded moves to `Error` instead.
    pub fn mark_stale(&self, source: SourceKind, reason: impl Into<String>) -> Arc<Snapshot> {
        let reason = reason.into();
        let current = self.get(source);
        let status = match current.status {
            SnapshotStatus::NeverFetched | SnapshotStatus::Error => SnapshotStatus::Error,
            SnapshotStatus::Ok | SnapshotStatus::Stale => SnapshotStatus::Stale,
        };
        let snap = Arc::new(Snapshot {
            status,
            reason: Some(reason),
            ..(*current).clone()
        });

        self.swap(source, snap.clone());
        self.persist(&snap);
        snap
    }

    /// Current snapshot, or the never-fetched sentinel.
    pub fn get(&self, source: SourceKind) -> Arc<Snapshot> {
        let guard = match self.inner.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        guard
            .get(&source)
            .cloned()
            .unwrap_or_else(|| Arc::new(Snapshot::never_fetched(source)))
    }

    /// All sources in `SourceKind::ALL` order.
    pub fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        SourceKind::ALL.iter().map(|s| self.get(*s)).collect()
    }

    fn swap(&self, source: SourceKind, snap: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        guard.insert(source, snap)
    }

    fn persist(&self, snap: &Snapshot) {
        let Some(dir) = &self.dir else {
            return;
        };
        if let Err(e) = write_snapshot(dir, snap) {
            tracing::warn!(target: "refresh", source = %snap.source, "persist snapshot: {e:#}");
        }
    }
}

fn snapshot_path(dir: &Path, source: SourceKind) -> PathBuf {
    dir.join(format!("{source}.json"))
}

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn write_snapshot(dir: &Path, snap: &Snapshot) -> Result<()> {
    let path = snapshot_path(dir, snap.source);
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(snap).context("serializing snapshot")?;
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

/// Hex SHA-256 of the serialized items.
pub fn items_digest(items: &[Record]) -> Option<String> {
    let bytes = serde_json::to_vec(items).ok()?;
    let hash = Sha256::digest(&bytes);
    Some(hash.iter().map(|b| format!("{b:02x}")).collect())
}
