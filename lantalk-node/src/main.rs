// LanTalk node: discovery heartbeats, messages and file transfer over one UDP port.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lantalk_node::{console, Config, Node};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "lantalk",
    version,
    about = "Peer discovery, messaging and file transfer on a LAN"
)]
struct Cli {
    /// Config file (default: ~/.config/lantalk/config.toml, then /etc/lantalk/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Identity announced to peers
    #[arg(long)]
    name: Option<String>,
    /// Protocol UDP port
    #[arg(long)]
    port: Option<u16>,
    /// Directory for received files
    #[arg(long)]
    download_dir: Option<PathBuf>,
    /// Run without the interactive shell
    #[arg(long)]
    no_console: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = Config::load(cli.config.as_deref()).context("loading config")?;
    if let Some(name) = cli.name {
        cfg.node_name = name;
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if let Some(dir) = cli.download_dir {
        cfg.download_dir = dir;
    }
    cfg.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let node = Node::start(cfg)
            .await
            .context("binding protocol socket")?;
        if cli.no_console {
            shutdown_signal().await?;
        } else {
            tokio::select! {
                r = console::run(&node) => r?,
                r = shutdown_signal() => r?,
            }
        }
        info!("shutting down");
        node.shutdown();
        Ok::<(), anyhow::Error>(())
    });
    // stdin reads run on a blocking thread that may never return
    rt.shutdown_background();
    result
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
