//! Run one refresh cycle for every configured source and print the
//! resulting snapshots as JSON. Handy for checking credentials and ids.

use anyhow::Result;
use portfolio_refresh::{build_scheduler, config, init_tracing, open_store, TriggerOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = config::load_default()?;
    let scheduler = build_scheduler(&cfg, open_store(&cfg)?)?;

    for source in scheduler.sources() {
        match scheduler.trigger(source) {
            TriggerOutcome::Started(handle) => {
                let outcome = handle.await?;
                tracing::info!(%source, updated = outcome.is_updated(), "cycle finished");
            }
            other => tracing::warn!(%source, ?other, "cycle not started"),
        }
    }

    let snapshots: Vec<_> = scheduler
        .store()
        .snapshots()
        .into_iter()
        .map(|s| (*s).clone())
        .collect();
    println!("{}", serde_json::to_string_pretty(&snapshots)?);
    Ok(())
}
