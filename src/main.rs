use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod advisory;
mod config;
mod dashboard;
mod db;
mod engine;
mod pipeline;
mod provider;

use advisory::AdvisoryClient;
use config::Config;
use dashboard::AppState;
use db::Database;
use pipeline::Analyzer;
use provider::pmu::PmuClient;
use provider::RaceDataProvider;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    info!(
        "Budget {:.2} per race, {:.2} stake step, {}% edge threshold",
        config.budget,
        config.currency_step,
        config.edge_threshold * 100.0
    );
    if config.advisory_api_key.is_some() {
        info!(
            "Advisory enabled: {} ({}s deadline, {} retries)",
            config.advisory_model, config.advisory_timeout_secs, config.advisory_max_retries
        );
    } else {
        info!("Advisory disabled, deterministic strategy only");
    }

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    // Racing-data provider
    let provider: Arc<dyn RaceDataProvider> = Arc::new(PmuClient::new(&config.pmu_api_url)?);
    info!("Racing data from {} ({})", provider.name(), config.pmu_api_url);

    // Advisory client (inert without an API key)
    let advisory = AdvisoryClient::new(
        &config.advisory_api_url,
        config.advisory_api_key.clone(),
        &config.advisory_model,
        Duration::from_secs(config.advisory_timeout_secs),
        config.advisory_max_retries,
    )?;

    let analyzer = Analyzer::new(&config, provider, advisory, db.clone());

    // Serve the dashboard and JSON API (blocks until shutdown)
    let state = AppState {
        db,
        analyzer,
        budget: config.budget,
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
