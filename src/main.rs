use anyhow::Result;
use car_registry::lookup::LookupClient;
use car_registry::{config, db, http};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database.url.clone());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    info!("connected to storage");

    let lookup = LookupClient::new(
        &cfg.lookup.host,
        Duration::from_secs(cfg.app.request_timeout_secs),
    )?;

    let state = http::AppState {
        pool,
        lookup: Arc::new(lookup),
        unique_reg_num: cfg.registry.unique_reg_num,
    };
    let app = http::router(state);

    let addr = format!("0.0.0.0:{}", cfg.app.port);
    info!(%addr, "starting registry server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
