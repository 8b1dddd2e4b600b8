//! `matrixd` – Matrix-Over-IP display server.
//!
//! Opens the LED panel, shows the idle pattern and serves one remote client
//! at a time until Ctrl-C (or SIGTERM on Unix).
//!
//! # Usage
//!
//! ```text
//! matrixd [OPTIONS]
//!
//! Options:
//!   -a, --address <ADDR>       listen address [default from config: 0.0.0.0:8080]
//!   -r, --rows <N>             rows on each panel
//!   -c, --columns <N>          columns on each panel
//!   -l, --chain-length <N>     panels per chain
//!   -p, --parallel <N>         parallel chains
//!   -b, --brightness <PCT>     brightness percentage
//!       --config <PATH>        config file [default: $XDG_CONFIG_HOME/matrixd/config.toml]
//! ```
//!
//! Every option can also be set through a `MATRIXD_*` environment variable.
//! Command-line values win over the config file.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use matrix_server::application::service::MatrixService;
use matrix_server::infrastructure::display::{DisplayAdapter, HeadlessBackend, MatrixBackend};
use matrix_server::infrastructure::network::SessionLoop;
use matrix_server::infrastructure::storage::config::{default_config_path, load_config, ServerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Matrix-Over-IP display server.
#[derive(Debug, Parser)]
#[command(name = "matrixd", about = "Serve an RGB LED matrix over TCP", version)]
struct Cli {
    /// Listen address (`host:port` or `:port`).
    #[arg(short = 'a', long, env = "MATRIXD_ADDRESS")]
    address: Option<String>,

    /// Rows on each panel.
    #[arg(short = 'r', long, env = "MATRIXD_ROWS")]
    rows: Option<u32>,

    /// Columns on each panel.
    #[arg(short = 'c', long, env = "MATRIXD_COLUMNS")]
    columns: Option<u32>,

    /// Number of daisy-chained panels.
    #[arg(short = 'l', long, env = "MATRIXD_CHAIN_LENGTH")]
    chain_length: Option<u32>,

    /// Number of parallel chains.
    #[arg(short = 'p', long, env = "MATRIXD_PARALLEL")]
    parallel: Option<u32>,

    /// Brightness percentage (1–100).
    #[arg(short = 'b', long, env = "MATRIXD_BRIGHTNESS")]
    brightness: Option<u8>,

    /// Path to the TOML config file.
    #[arg(long, env = "MATRIXD_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Applies command-line overrides on top of the file config.
    fn apply(&self, cfg: &mut ServerConfig) {
        if let Some(addr) = &self.address {
            cfg.network.listen = addr.clone();
        }
        if let Some(v) = self.rows {
            cfg.matrix.rows = v;
        }
        if let Some(v) = self.columns {
            cfg.matrix.columns = v;
        }
        if let Some(v) = self.chain_length {
            cfg.matrix.chain_length = v;
        }
        if let Some(v) = self.parallel {
            cfg.matrix.parallel = v;
        }
        if let Some(v) = self.brightness {
            cfg.matrix.brightness = v;
        }
    }

    fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path().context("locating config file")?,
        };
        let mut cfg = load_config(&path).with_context(|| format!("loading {}", path.display()))?;
        self.apply(&mut cfg);
        Ok(cfg)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    info!("matrixd starting");

    let listen = cfg.network.listen_addr().await?;
    let options = cfg.matrix.options();
    let backend = HeadlessBackend::new().with_refresh_rate(cfg.matrix.headless_refresh_hz);
    info!("using {} panel backend", backend.name());

    let adapter = DisplayAdapter::open(options, &backend).context("opening display")?;
    let size = adapter.bounds();
    let service = Arc::new(MatrixService::new(adapter));

    let idle_frame = cfg
        .idle
        .pattern
        .render(size, cfg.idle.color())
        .context("rendering idle pattern")?;

    // ── Shutdown signal ───────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        running_clone.store(false, Ordering::Relaxed);
    });

    // ── Session loop ──────────────────────────────────────────────────────────
    let mut session_loop = SessionLoop::bind(listen, Arc::clone(&service), idle_frame)
        .await?
        .with_read_timeout(cfg.network.read_timeout());
    let result = session_loop.run(running).await;
    drop(session_loop);

    match Arc::try_unwrap(service) {
        Ok(service) => service.shutdown().context("closing display")?,
        Err(_) => error!("display still shared at shutdown; relying on drop to release it"),
    }

    info!("matrixd stopped");
    result
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl-C: {e}");
        // Without a signal source the server runs until killed.
        std::future::pending::<()>().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_flags_leaves_config_untouched() {
        // Arrange
        let cli = Cli::parse_from(["matrixd"]);
        let mut cfg = ServerConfig::default();

        // Act
        cli.apply(&mut cfg);

        // Assert
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_cli_short_flags_override_geometry() {
        let cli = Cli::parse_from(["matrixd", "-r", "16", "-c", "64", "-l", "2", "-p", "3", "-b", "40"]);
        let mut cfg = ServerConfig::default();

        cli.apply(&mut cfg);

        assert_eq!(cfg.matrix.rows, 16);
        assert_eq!(cfg.matrix.columns, 64);
        assert_eq!(cfg.matrix.chain_length, 2);
        assert_eq!(cfg.matrix.parallel, 3);
        assert_eq!(cfg.matrix.brightness, 40);
    }

    #[tokio::test]
    async fn test_cli_address_override() {
        let cli = Cli::parse_from(["matrixd", "--address", ":9090"]);
        let mut cfg = ServerConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.network.listen_addr().await.unwrap().port(), 9090);
    }

    #[test]
    fn test_cli_rejects_non_numeric_rows() {
        assert!(Cli::try_parse_from(["matrixd", "--rows", "lots"]).is_err());
    }
}
