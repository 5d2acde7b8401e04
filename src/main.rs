//! Toolhub IPC server - main entry point.
//!
//! Serves the `tools`, `resources` and `prompts` services over TCP+msgpack.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use toolhub_core::ipc::IpcServer;
use toolhub_core::{Config, ToolServer};

#[derive(Debug, Parser)]
#[command(name = "toolhub-server", version, about = "Sandboxed tool server for agent runtimes")]
struct Args {
    /// JSON configuration file. Missing sections take defaults.
    #[arg(short, long, env = "TOOLHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(short, long)]
    listen: Option<String>,

    /// Sandbox root, repeatable. Replaces the configured roots.
    #[arg(short, long = "root")]
    roots: Vec<PathBuf>,

    /// Create missing sandbox roots at startup.
    #[arg(long)]
    create_roots: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if !args.roots.is_empty() {
        config.sandbox.allowed_roots = args.roots;
    }
    config.sandbox.create_roots |= args.create_roots;

    toolhub_core::observability::init_tracing(&config.observability);

    let server = Arc::new(ToolServer::from_config(&config)?);
    let addr: SocketAddr = config.server.listen_addr.parse()?;

    tracing::info!("Toolhub server starting on {}", addr);
    tracing::info!("  tools: {}", server.engine().registry().len());
    tracing::info!("  sandbox roots: {}", server.engine().guard().roots().len());

    let ipc = IpcServer::new(server, addr, config.ipc.clone());
    let shutdown = ipc.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            shutdown.cancel();
        }
    });

    ipc.serve().await?;
    Ok(())
}
