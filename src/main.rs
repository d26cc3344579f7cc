//! Engagement Pacer — Binary Entrypoint
//! Boots the discovery/admission/pacing control loop with the JSON file
//! store, fixture-backed sources, and the dry-run executor.
//!
//! See `README.md` for quickstart and `config/pacer.toml` for tuning.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use engagement_pacer::action::{DryRunExecutor, TemplateGenerator};
use engagement_pacer::config::AppConfig;
use engagement_pacer::discover::static_source::StaticSource;
use engagement_pacer::discover::types::DiscoverySource;
use engagement_pacer::notify::NotifierMux;
use engagement_pacer::scheduler::Engine;
use engagement_pacer::store::JsonFileStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("engagement_pacer=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    // /metrics exporter is best-effort; the loop runs fine without it.
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!(error = ?e, "prometheus exporter not started");
    }

    let cfg = AppConfig::load_default().context("loading configuration")?;
    cfg.validate().context("validating configuration")?;

    let store = JsonFileStore::new(&cfg.data_dir);
    let sources: Vec<Box<dyn DiscoverySource>> = cfg
        .discovery
        .fixture_paths
        .iter()
        .map(|p| Box::new(StaticSource::from_path(p)) as Box<dyn DiscoverySource>)
        .collect();
    if sources.is_empty() {
        tracing::warn!("no discovery sources configured; every cycle will be a no-op");
    }

    let engine = Engine::new(
        cfg,
        store,
        sources,
        Box::new(TemplateGenerator),
        Box::new(DryRunExecutor),
        NotifierMux::from_env(),
    )
    .await
    .context("initializing engine")?;

    engine
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = ?e, "ctrl-c handler failed");
            }
        })
        .await
}
