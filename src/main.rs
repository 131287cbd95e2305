//! Entry point for `gbn-transport`.
//!
//! Parses CLI arguments and runs one session in either **send** or
//! **receive** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing, files).

use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use gbn_transport::config::{Config, DEFAULT_HOST, DEFAULT_RECEIVER_PORT, DEFAULT_SENDER_PORT};
use gbn_transport::gbn_receiver::FileLog;
use gbn_transport::session;
use gbn_transport::simulator::{FaultInjector, NoFaults, RandomFaults};
use gbn_transport::socket::UdpChannel;

/// Reliable byte stream over UDP with Go-Back-N and slow start.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Connect to a receiver and send a file.
    Send {
        /// Local address to bind.
        #[arg(short, long, default_value_t = SocketAddr::from((DEFAULT_HOST, DEFAULT_SENDER_PORT)))]
        bind: SocketAddr,
        /// File whose bytes are sent.  A missing file sends nothing.
        #[arg(short, long, default_value = "data.txt")]
        data: PathBuf,
        /// Write the congestion-window series here as JSON.
        #[arg(long)]
        cwnd_out: Option<PathBuf>,
        #[command(flatten)]
        protocol: ProtocolArgs,
    },
    /// Accept one connection and log what arrives.
    Receive {
        /// Local address to bind.
        #[arg(short, long, default_value_t = SocketAddr::from((DEFAULT_HOST, DEFAULT_RECEIVER_PORT)))]
        bind: SocketAddr,
        /// Delivered payloads are appended here, one per line.
        #[arg(short, long, default_value = "received_packets.txt")]
        log: PathBuf,
        #[command(flatten)]
        protocol: ProtocolArgs,
    },
}

/// Overrides for the role's default [`Config`].
#[derive(Args)]
struct ProtocolArgs {
    /// Peer address.
    #[arg(short, long)]
    peer: Option<SocketAddr>,
    /// Advertised window, in segments.
    #[arg(long)]
    window: Option<u16>,
    /// Maximum segment payload in bytes.
    #[arg(long)]
    mss: Option<u16>,
    /// Per-receive timeout in seconds.
    #[arg(long)]
    recv_timeout: Option<f64>,
    /// Retransmission timeout in seconds.
    #[arg(long)]
    rto: Option<f64>,
    /// Probability that a data transmission is lost or corrupted.
    #[arg(long)]
    loss: Option<f64>,
    /// FIN attempts before giving up.
    #[arg(long)]
    teardown_retries: Option<u32>,
}

impl ProtocolArgs {
    fn apply(self, mut config: Config) -> anyhow::Result<Config> {
        if let Some(peer) = self.peer {
            config.peer = peer;
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(mss) = self.mss {
            config.mss = mss;
        }
        if let Some(secs) = self.recv_timeout {
            config.recv_timeout = Duration::try_from_secs_f64(secs)
                .context("invalid --recv-timeout")?;
        }
        if let Some(secs) = self.rto {
            config.rto = Duration::try_from_secs_f64(secs).context("invalid --rto")?;
        }
        if let Some(p) = self.loss {
            config.loss_probability = p;
        }
        if let Some(n) = self.teardown_retries {
            config.max_teardown_retries = n;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            bind,
            data,
            cwnd_out,
            protocol,
        } => {
            let config = protocol.apply(Config::sender())?;
            let stream = session::read_stream(&data)
                .with_context(|| format!("reading {}", data.display()))?;
            let channel = UdpChannel::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            log::info!("sending {} byte(s) from {bind} to {}", stream.len(), config.peer);

            let faults: Box<dyn FaultInjector> = if config.loss_probability > 0.0 {
                Box::new(RandomFaults::new(config.loss_probability))
            } else {
                Box::new(NoFaults)
            };
            let outcome = session::run_sender(&channel, &config, &stream, faults)
                .await
                .context("sender session failed")?;

            let r = &outcome.report;
            log::info!(
                "done: {} chunk(s), {} retransmission(s), {} timeout(s), {} lost, {} corrupted; close {:?}",
                r.chunks,
                r.retransmissions,
                r.timeouts,
                r.simulated_losses,
                r.simulated_corruptions,
                outcome.close
            );

            if let Some(path) = cwnd_out {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                serde_json::to_writer_pretty(BufWriter::new(file), &r.cwnd_history)
                    .with_context(|| format!("writing {}", path.display()))?;
                log::info!("cwnd series written to {}", path.display());
            }
        }
        Mode::Receive {
            bind,
            log: log_path,
            protocol,
        } => {
            let config = protocol.apply(Config::receiver())?;
            let sink = FileLog::open(&log_path)
                .with_context(|| format!("opening {}", log_path.display()))?;
            let channel = UdpChannel::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;

            let outcome = session::run_receiver(&channel, &config, sink)
                .await
                .context("receiver session failed")?;
            log::info!(
                "done: {} delivered, {} out of order, {} corrupt; close {:?}",
                outcome.report.delivered,
                outcome.report.out_of_order,
                outcome.report.corrupt,
                outcome.close
            );
        }
    }
    Ok(())
}
