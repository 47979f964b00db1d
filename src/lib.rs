// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod metrics;
pub mod refresh;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use crate::api::{create_router, AppState};
pub use crate::config::RefreshConfig;
pub use crate::refresh::scheduler::{Backoff, Scheduler, TriggerOutcome};
pub use crate::refresh::store::SnapshotStore;
pub use crate::refresh::types::{
    Record, Snapshot, SnapshotStatus, SourceClient, SourceConfig, SourceKind,
};

const DEFAULT_LOG_FILTER: &str = "portfolio_refresh=info,refresh=info,warn";

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; `LOG_FORMAT=json` switches to JSON lines. A no-op if the host
/// runtime already installed one.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Open the snapshot store described by `cfg` (persistent when a dir is set).
pub fn open_store(cfg: &RefreshConfig) -> Result<Arc<SnapshotStore>> {
    let store = match &cfg.store.dir {
        Some(dir) => SnapshotStore::with_dir(dir)
            .with_context(|| format!("opening snapshot store at {}", dir.display()))?,
        None => SnapshotStore::new(),
    };
    Ok(Arc::new(store))
}

/// Register every configured source. Does not start the scheduler.
pub fn build_scheduler(cfg: &RefreshConfig, store: Arc<SnapshotStore>) -> Result<Scheduler> {
    let mut scheduler = Scheduler::new(store, cfg.backoff());
    for setup in cfg.source_setups()? {
        scheduler.register_source(setup.config, setup.cadence, setup.client)?;
    }
    Ok(scheduler)
}

/// Build the store, start the scheduler, and return the HTTP router over it.
pub fn app(cfg: &RefreshConfig) -> Result<(axum::Router, Arc<Scheduler>)> {
    let store = open_store(cfg)?;
    let scheduler = Arc::new(build_scheduler(cfg, store)?);
    scheduler.start();
    let router = create_router(AppState::new(scheduler.clone()));
    Ok((router, scheduler))
}
