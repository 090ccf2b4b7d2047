use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edu_sync::{connect_db, run_migrations, SyncConfig, SyncPipeline};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "edu-cli")]
#[command(about = "Educational content sync command-line interface")]
struct Cli {
    /// Default filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Print the sync summary as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync cycle.
    Sync,
    /// Apply database migrations.
    Migrate,
    /// Run sync cycles on SYNC_CRON until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("edu={level},{level}", level = cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let pool = connect_db(&config.database_url).await?;
            run_migrations(&pool).await?;
            let pipeline = SyncPipeline::new(config)?.with_pool(pool);
            let summary = pipeline.run_once().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "sync complete: run_id={} files={} stale_rows={} assets_copied={} errors={} warnings={}",
                    summary.run_id,
                    summary.content_files,
                    summary.stale_rows,
                    summary.assets.copied,
                    summary.errors.len(),
                    summary.warnings.len()
                );
                for error in &summary.errors {
                    println!("  error: {error}");
                }
            }
        }
        Commands::Migrate => {
            let pool = connect_db(&config.database_url).await?;
            run_migrations(&pool).await?;
            info!("migrations applied");
        }
        Commands::Schedule => {
            let pool = connect_db(&config.database_url).await?;
            run_migrations(&pool).await?;
            let pipeline = Arc::new(SyncPipeline::new(config)?.with_pool(pool));
            let Some(mut scheduler) = pipeline.maybe_build_scheduler().await? else {
                warn!("scheduler disabled, set EDU_SCHEDULER_ENABLED=true");
                return Ok(());
            };
            scheduler.start().await.context("starting scheduler")?;
            info!(cron = %pipeline.config().sync_cron, "scheduler started");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            scheduler.shutdown().await.context("stopping scheduler")?;
            info!("scheduler stopped");
        }
    }

    Ok(())
}
