mod cli;

use reelforge::{config, server, store};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

#[tokio::main]
async fn serve(host: String, port: u16, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting Reelforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let workflow_store = store::WorkflowStore::new();

    // Expired workflows (terminal or not) are swept on an interval.
    store::start_cleanup_task(
        workflow_store.clone(),
        config.pipeline.cleanup_interval(),
        config.pipeline.retention(),
    );

    server::start_server(config, workflow_store).await
}

fn check_tools() -> Result<()> {
    let mut all_found = true;
    for tool in ["ffmpeg", "ffprobe"] {
        match which::which(tool) {
            Ok(path) => println!("{tool}: {}", path.display()),
            Err(_) => {
                println!("{tool}: NOT FOUND");
                all_found = false;
            }
        }
    }
    if !all_found {
        anyhow::bail!("some required tools are missing; multi-scene merging will fail");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on the
    // verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=trace,tower_http=debug".to_string()
        } else {
            "reelforge=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(Commands::Serve { host, port, config }) => serve(host, port, config.as_deref()),
        Some(Commands::CheckTools) => check_tools(),
        None => serve("0.0.0.0".to_string(), 8080, None),
    }
}
