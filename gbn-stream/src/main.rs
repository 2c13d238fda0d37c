//! Entry point for `gbn-stream`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, opening the payload files).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};

use gbn_stream::{serve, transfer, ReliabilityMode, TransferConfig, UdpTransport};

/// Reliable file transfer over UDP with Go-Back-N.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Subcommand)]
enum Mode {
    /// Connect to a receiver and send a file.
    Send {
        /// Receiver address (e.g. 127.0.0.1:8080).
        #[arg(short, long)]
        peer: SocketAddr,
        /// File to send.
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Wait for one sender and write what it sends to a file.
    Recv {
        /// UDP port to listen on.
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
        /// Where to write the received stream.
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct Tuning {
    /// Maximum payload bytes per segment.
    #[arg(long, global = true, default_value_t = 1024)]
    mss: usize,
    /// Send window in bytes; a multiple of --mss.
    #[arg(long, global = true, default_value_t = 4096)]
    window: usize,
    /// Retransmission timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 500)]
    rto_ms: u64,
    /// Reliability strategy.
    #[arg(long, global = true, value_enum, default_value_t = ReliabilityMode::GoBackN)]
    mode: ReliabilityMode,
}

impl Tuning {
    fn config(&self) -> anyhow::Result<TransferConfig> {
        let config = TransferConfig {
            mss: self.mss,
            window_size: self.window,
            retransmit_timeout: Duration::from_millis(self.rto_ms),
            mode: self.mode,
            ..TransferConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.tuning.config()?;

    match cli.mode {
        Mode::Send { peer, file } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            log::info!(
                "sending {} ({} bytes) to {peer} [{}]",
                file.display(),
                payload.len(),
                config.mode
            );

            let mut transport = UdpTransport::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
            let report = transfer(&mut transport, peer, Bytes::from(payload), &config).await?;
            log::info!(
                "done: {} bytes, {} retransmission rounds",
                report.bytes,
                report.stats.retransmit_rounds
            );
        }
        Mode::Recv { port, output } => {
            let mut sink = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("creating {}", output.display()))?;

            let mut transport = UdpTransport::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
            let report = serve(&mut transport, &mut sink, &config).await?;
            log::info!("done: wrote {} bytes to {}", report.bytes, output.display());
        }
    }
    Ok(())
}
