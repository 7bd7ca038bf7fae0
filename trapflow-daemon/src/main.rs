//! trapflow-daemon entry point.
//!
//! Loads configuration, initializes logging, assembles the trap
//! pipeline and runs it until a shutdown signal arrives. In this
//! standalone build the pipeline writes into the in-process store;
//! production deployments inject their own `TrapStore` /
//! `AlertEvaluator` implementations through the builder.

mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;

use trapflow_core::config::TrapflowConfig;
use trapflow_core::pipeline::Pipeline;
use trapflow_pipeline::{ConsoleConfig, TrapPipelineBuilder};

use crate::cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = TrapflowConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;

    // CLI overrides take precedence over the config file
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "trapflow-daemon starting");

    let console_config = ConsoleConfig::from_core(&config.console, &config.forward);
    let (mut pipeline, storm_rx) = TrapPipelineBuilder::new()
        .config(console_config)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build trap pipeline: {}", e))?;

    // Log storm events as they arrive
    let event_task = storm_rx.map(|mut rx| {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::warn!(
                    source = %event.source,
                    count = event.trap_count,
                    until = event.silenced_until,
                    "storm protection silenced a source"
                );
            }
        })
    });

    pipeline
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start trap pipeline: {}", e))?;
    tracing::info!("trap pipeline started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    if let Err(e) = pipeline.stop().await {
        tracing::error!(error = %e, "failed to stop trap pipeline");
    }
    if let Some(task) = event_task {
        task.abort();
        let _ = task.await;
    }

    tracing::info!(
        processed = pipeline.processed_count(),
        parse_errors = pipeline.parse_error_count(),
        "trapflow-daemon shut down"
    );
    Ok(())
}
