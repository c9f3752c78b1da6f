use anyhow::{Context, Result};
use clap::Parser;
use cloud_storage_mcp::config::StorageConfig;
use cloud_storage_mcp::mcp::McpServer;
use cloud_storage_mcp::storage::StorageService;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cloud-storage-mcp")]
#[command(about = "MCP server for uploading files to S3, Qiniu or Alibaba Cloud OSS")]
struct CliArgs {
    /// JSON configuration file; overrides CONFIG_FILE and individual variables.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn build_storage(config_file: Option<&Path>) -> cloud_storage_mcp::Result<StorageService> {
    let config = StorageConfig::load(config_file)?;
    StorageService::new(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloud_storage_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    info!("Starting cloud-storage-mcp");

    let args = CliArgs::parse();

    let storage = match build_storage(args.config.as_deref()) {
        Ok(storage) => {
            let backend = storage.backend_info();
            info!("Cloud storage ready: {} ({})", backend.name, backend.kind);
            Some(storage)
        }
        Err(e) => {
            error!("Failed to initialize cloud storage: {}", e);
            None
        }
    };

    McpServer::new(storage)
        .run()
        .await
        .context("MCP server error")
}
