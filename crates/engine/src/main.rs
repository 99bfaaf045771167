use std::sync::Arc;

use anyhow::Context;

use medstock_engine::{ReorderEngine, Seed};
use medstock_infra::{EngineConfig, EvaluationScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("invalid MEDSTOCK_* configuration")?;
    medstock_observability::init(config.log_format);

    let seed = match std::env::var("MEDSTOCK_SEED") {
        Ok(path) => Seed::load(&path).with_context(|| format!("loading seed from {path}"))?,
        Err(_) => {
            tracing::warn!("MEDSTOCK_SEED not set; starting with no medicines or suppliers");
            Seed::default()
        }
    };
    tracing::info!(
        medicines = seed.medicines.len(),
        suppliers = seed.suppliers.len(),
        "seed loaded"
    );

    let engine = Arc::new(ReorderEngine::new(seed.into_in_memory(), config.clone()));
    let scheduler = EvaluationScheduler::from_config(&config).spawn("reorder-evaluation", engine);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");

    scheduler.shutdown().await;
    let stats = scheduler.stats();
    tracing::info!(
        cycles_run = stats.cycles_run,
        cycles_failed = stats.cycles_failed,
        "engine stopped"
    );
    Ok(())
}
