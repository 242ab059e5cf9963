//! Main entry point for the labeler binary
//!
//! Wires the engine to JSON-file annotation and item stores, the random
//! generator and the on-disk snapshot store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;

use labeler::services::{InMemoryAnnotationStore, InMemoryItemStore, RandomGenerator, RealStateStore};
use labeler::LabelingEngine;
use shared::{component_info, logging, Component, LabelingConfig};

/// Adaptive incremental labeling with in-context examples
#[derive(Parser)]
#[command(name = "labeler")]
#[command(about = "Mines high-agreement annotations and labels the rest with a generative model")]
pub struct Args {
    /// Labeling configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Human annotations: { user: { instance_id: { schema: label } } }
    #[arg(long)]
    pub annotations: PathBuf,

    /// Items in dataset order: [ { "id": ..., "text": ... } ]
    #[arg(long)]
    pub items: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Tracing endpoint URL
    #[arg(long)]
    pub trace_ep: Option<String>,

    /// Run one refresh and one batch per schema, save, and exit
    #[arg(long)]
    pub once: bool,

    /// Override the configured snapshot path
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let trace_endpoint = args.trace_ep.clone().map(logging::TracingEndpoint::new);
    logging::init_tracing(Some(&args.log_level), trace_endpoint);

    let mut config = LabelingConfig::from_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    if let Some(state_file) = args.state_file {
        config.persistence.state_file = state_file;
    }

    let annotations = InMemoryAnnotationStore::from_json_file(&args.annotations)
        .await
        .context("loading annotations")?;
    let items = InMemoryItemStore::from_json_file(&args.items)
        .await
        .context("loading items")?;
    let state_store = RealStateStore::new(config.persistence.state_file.clone());

    let schema_names: Vec<String> = config.schemas.iter().map(|s| s.name.clone()).collect();
    let engine = Arc::new(LabelingEngine::new(
        config,
        annotations,
        items,
        RandomGenerator::new(),
        state_store,
    ));
    engine.load_state().await.context("restoring saved state")?;

    if args.once {
        logging::log_startup(Component::Engine, "single labeling pass");
        engine.refresh_examples().await.context("refreshing examples")?;
        for schema_name in &schema_names {
            let reported = engine.batch_label_instances(schema_name).await?;
            component_info!(
                Component::Engine,
                "'{}': {} confident predictions",
                schema_name,
                reported.len()
            );
        }
        engine.save_state().await.context("saving state")?;
        println!("{}", serde_json::to_string_pretty(&engine.get_status().await)?);
        return Ok(());
    }

    logging::log_startup(Component::Engine, "incremental labeling service");
    if !engine.start_background_worker().await {
        logging::log_shutdown(Component::Engine, "background labeling is disabled in the configuration");
        return Ok(());
    }

    match signal::ctrl_c().await {
        Ok(()) => logging::log_shutdown(Component::Engine, "Received Ctrl+C signal"),
        Err(err) => logging::log_error(Component::Engine, "Signal handling", &err),
    }

    engine.stop_background_worker().await;
    engine.save_state().await.context("saving state on shutdown")?;

    logging::log_success(Component::Engine, "Labeler stopped gracefully");
    Ok(())
}
