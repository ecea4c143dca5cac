use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strand_orchestrator::config::OrchestratorConfig;
use strand_orchestrator::repository::{PgAnalysisRepository, PgSampleDirectory};
use strand_orchestrator::service::{AnalysisService, SystemClock, TokioDispatcher};
use strand_orchestrator::{api, db};
use strand_runner::{
    ContainerExecutor, GatkStages, RunnerConfig, StageConfig, check_runtime_available,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "strand_orchestrator=info,strand_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Strand Orchestrator...");

    let config = OrchestratorConfig::from_env().context("Invalid orchestrator configuration")?;
    let runner_config = RunnerConfig::from_env().context("Invalid runner configuration")?;
    runner_config
        .validate()
        .context("Invalid runner configuration")?;
    let stage_config = StageConfig::from_env();

    info!(
        "Loaded configuration: image={}, volume={}, timeout={:?}, output_dir={}",
        runner_config.image,
        runner_config.volume_mapping(),
        runner_config.command_timeout,
        config.output_dir
    );

    // Analyses can still be accepted without a runtime; their runs will fail
    if let Err(e) = check_runtime_available(&runner_config.runtime).await {
        warn!("Container runtime check failed: {:#}", e);
    }

    info!("Connecting to database...");
    let pool = connect_with_retry(&config.database_url).await?;
    info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let executor = Arc::new(ContainerExecutor::new(runner_config));
    let stages = Arc::new(GatkStages::new(executor, stage_config));

    let service = Arc::new(AnalysisService::new(
        Arc::new(PgAnalysisRepository::new(pool.clone())),
        Arc::new(PgSampleDirectory::new(pool)),
        stages,
        Arc::new(TokioDispatcher::current()),
        Arc::new(SystemClock),
        config.analysis_settings(),
    ));

    let app = api::create_router(service);

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}

/// Connect to Postgres, retrying with exponential backoff
///
/// The database container is often still starting when the orchestrator
/// comes up.
async fn connect_with_retry(database_url: &str) -> Result<PgPool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match db::create_pool(database_url).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!("Connected to database after {} attempt(s)", attempt);
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to database after {} attempts", MAX_RETRIES);
                    return Err(e).context("Failed to create database pool");
                }

                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
