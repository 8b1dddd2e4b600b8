//! `matrix-client` – small command-line front end for a remote LED matrix.
//!
//! ```text
//! matrix-client [--address HOST:PORT] info
//! matrix-client [--address HOST:PORT] fill <R> <G> <B>
//! matrix-client [--address HOST:PORT] pixel <X> <Y> <R> <G> <B>
//! matrix-client [--address HOST:PORT] clear
//! ```
//!
//! `fill`, `pixel` and `clear` draw into the local mirror and then present it
//! with a single swap, so `pixel` lights one pixel on an otherwise black
//! display.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use matrix_client::infrastructure::remote::{ProxyConfig, RemoteMatrix};
use matrix_core::Rgba;

#[derive(Debug, Parser)]
#[command(name = "matrix-client", about = "Draw on a remote RGB LED matrix", version)]
struct Cli {
    /// Server address.
    #[arg(short = 'a', long, env = "MATRIX_ADDRESS", default_value = "127.0.0.1:8080")]
    address: String,

    /// Seconds to wait for each reply.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Print the remote display size.
    Info,
    /// Fill the whole display with one colour.
    Fill { r: u8, g: u8, b: u8 },
    /// Light one pixel on a black display.
    Pixel { x: i32, y: i32, r: u8, g: u8, b: u8 },
    /// Blank the display.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = ProxyConfig {
        call_timeout: Duration::from_secs(cli.timeout),
        ..ProxyConfig::default()
    };

    let mut matrix = RemoteMatrix::connect_with(&cli.address, config)
        .await
        .with_context(|| format!("connecting to {}", cli.address))?;

    match cli.command {
        Command::Info => {
            let size = matrix.query_geometry().await?;
            println!("{size}");
        }
        Command::Fill { r, g, b } => {
            matrix.fill(Rgba::rgb(r, g, b));
            matrix.swap().await?;
        }
        Command::Pixel { x, y, r, g, b } => {
            matrix
                .try_set(x, y, Rgba::rgb(r, g, b))
                .with_context(|| format!("pixel ({x}, {y}) is outside the {} display", matrix.size()))?;
            matrix.swap().await?;
        }
        Command::Clear => {
            matrix.clear();
            matrix.swap().await?;
        }
    }

    info!("done");
    matrix.close().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_subcommand_parses_channels() {
        // Arrange / Act
        let cli = Cli::parse_from(["matrix-client", "-a", "10.0.0.5:9000", "fill", "255", "0", "16"]);

        // Assert
        assert_eq!(cli.address, "10.0.0.5:9000");
        assert_eq!(cli.command, Command::Fill { r: 255, g: 0, b: 16 });
    }

    #[test]
    fn test_pixel_subcommand_accepts_coordinates() {
        let cli = Cli::parse_from(["matrix-client", "pixel", "3", "7", "0", "255", "0"]);
        assert_eq!(cli.command, Command::Pixel { x: 3, y: 7, r: 0, g: 255, b: 0 });
        assert_eq!(cli.timeout, 10);
    }

    #[test]
    fn test_channel_above_255_is_rejected() {
        assert!(Cli::try_parse_from(["matrix-client", "fill", "256", "0", "0"]).is_err());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["matrix-client"]).is_err());
    }
}
