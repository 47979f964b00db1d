//! Portfolio refresh service: binary entrypoint.
//! Loads config, starts the per-source refresh schedules, and serves the
//! snapshot read API.

use portfolio_refresh::{config, init_tracing, metrics::Metrics};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Recorder first, so the initial refresh cycles are counted.
    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!("metrics disabled: {e:#}");
            None
        }
    };

    let cfg = config::load_default()?;
    let (mut router, scheduler) = portfolio_refresh::app(&cfg)?;
    tracing::info!(sources = ?scheduler.sources(), "refresh service ready");

    if let Some(m) = metrics {
        router = router.merge(m.router());
    }

    Ok(router.into())
}
