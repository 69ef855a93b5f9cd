//! xiaodu-mcp - MCP server for Xiaodu smart speakers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use xiaodu_core::config::{TransportKind, XiaoduConfig};
use xiaodu_core::device::{AccessToken, HttpDeviceCloud, ServiceLimits, XiaoduService};
use xiaodu_core::mcp::{McpServer, StdioTransport, serve_http};
use xiaodu_core::tools::{ToolRegistry, default_registry};

#[derive(Parser)]
#[command(name = "xiaodu-mcp")]
#[command(about = "Xiaodu smart-speaker MCP server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP tools
    Serve {
        /// stdio, sse or http
        #[arg(short, long, env = "XIAODU_TRANSPORT")]
        transport: Option<TransportKind>,

        /// Listen address for sse and http
        #[arg(short, long, env = "XIAODU_BIND")]
        bind: Option<String>,

        /// JSON configuration file with ${NAME} placeholders
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the tool table as JSON
    Tools {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("xiaodu-mcp {}", env!("CARGO_PKG_VERSION"));
            println!("xiaodu-core {}", xiaodu_core::VERSION);
        }
        Commands::Tools { config } => {
            let config = XiaoduConfig::load(config.as_deref()).context("loading configuration")?;
            let registry = build_registry(&config)?;
            println!("{}", serde_json::to_string_pretty(&registry.list())?);
        }
        Commands::Serve {
            transport,
            bind,
            config,
        } => {
            let mut config =
                XiaoduConfig::load(config.as_deref()).context("loading configuration")?;
            if let Some(transport) = transport {
                config.server.transport = transport;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await?;
        }
    }

    Ok(())
}

fn build_registry(config: &XiaoduConfig) -> Result<ToolRegistry> {
    let cloud = HttpDeviceCloud::new(&config.cloud)?;
    let service = XiaoduService::new(Arc::new(cloud)).with_limits(ServiceLimits::from(&config.cloud));
    Ok(default_registry(service)?)
}

async fn serve(config: XiaoduConfig) -> Result<()> {
    let server = McpServer::builder()
        .name(config.server.name.clone())
        .version(xiaodu_core::VERSION)
        .with_tools(build_registry(&config)?)
        .with_default_token(config.cloud.access_token.clone().and_then(AccessToken::new))
        .build();

    info!(
        transport = %config.server.transport,
        api_base = %config.cloud.api_base,
        tools = server.tools().len(),
        "Starting xiaodu-mcp"
    );

    match config.server.transport {
        TransportKind::Stdio => server.run(StdioTransport::new()).await?,
        TransportKind::Sse | TransportKind::Http => serve_http(server, &config.server.bind).await?,
    }

    Ok(())
}
