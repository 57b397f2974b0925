pub mod types;
pub mod config;
pub mod measure;
pub mod join;
pub mod topology;
pub mod data;
pub mod color;
pub mod projection;
pub mod tooltip;
pub mod choropleth;
pub mod charts;
pub mod render;
pub mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the choropleth for every measure plus the auxiliary charts
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the interactive map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

async fn load(app_config: &config::AppConfig) -> Arc<data::Dataset> {
    match data::load_dataset(&app_config.input).await {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("Error loading files: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config } => {
            info!("Rendering with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = load(&app_config).await;

            let config_for_render = app_config.clone();
            let written =
                tokio::task::spawn_blocking(move || render::generate_outputs(&config_for_render, dataset)).await??;

            info!("Render complete: {} files in {:?}", written.len(), app_config.output.dir);
        }
        Commands::Serve { config } => {
            info!("Serving with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = load(&app_config).await;

            server::start_server(app_config, dataset).await?;
        }
    }

    Ok(())
}
