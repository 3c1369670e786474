//! BlockUDP anchoring node: a daemon that anchors spooled packets plus the tools to prove and
//! verify their inclusion.
#![warn(missing_docs)]

mod anchors;
mod daemon;
mod proofs;
mod spool;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use signal_hook_tokio::Signals;
use tokio::sync::oneshot;
use tracing::{debug, info};

pub use anchors::{AnchorEntry, AnchorsFile};
pub use proofs::{prove, verify, InclusionProof};
pub use spool::SpoolStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the anchoring daemon over a spool directory
    Daemon(daemon::DaemonOpts),
    /// Print the root and inclusion proof for one packet of a batch
    Prove(proofs::ProveOpts),
    /// Check a packet against a root and a proof file, exits non-zero on failure
    Verify(proofs::VerifyOpts),
    /// Show anchors recorded by the daemon
    Anchors(proofs::AnchorsOpts),
}

#[derive(Args, Debug)]
struct LogOpts {
    /// Specify the format of log events.
    #[arg(long, default_value = "multi-line", env = "BLOCKUDP_LOG_FORMAT")]
    log_format: LogFormat,
}

impl LogOpts {
    fn format(&self) -> blockudp_metrics::config::LogFormat {
        match self.log_format {
            LogFormat::SingleLine => blockudp_metrics::config::LogFormat::SingleLine,
            LogFormat::MultiLine => blockudp_metrics::config::LogFormat::MultiLine,
            LogFormat::Json => blockudp_metrics::config::LogFormat::Json,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Default)]
enum LogFormat {
    /// Format log events on multiple lines using ANSI colors.
    #[default]
    MultiLine,
    /// Format log events on a single line using ANSI colors.
    SingleLine,
    /// Format log events newline delimited JSON objects.
    /// No ANSI colors are used.
    Json,
}

/// Parse the command line and run the selected command.
pub async fn run() -> Result<ExitCode> {
    let args = Cli::parse();
    let success = match args.command {
        Command::Daemon(opts) => daemon::run(opts).await.map(|_| true)?,
        Command::Prove(opts) => proofs::prove_command(opts).await.map(|_| true)?,
        Command::Verify(opts) => proofs::verify_command(opts).await?,
        Command::Anchors(opts) => proofs::anchors_command(opts).await?,
    };
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn handle_signals(mut signals: Signals, shutdown: oneshot::Sender<()>) {
    let mut shutdown = Some(shutdown);
    while let Some(signal) = signals.next().await {
        debug!(?signal, "signal received");
        if let Some(shutdown) = shutdown.take() {
            info!("sending shutdown message");
            if shutdown.send(()).is_err() {
                debug!("shutdown receiver already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verify_parses_hex_root() {
        let cli = Cli::try_parse_from([
            "blockudp-one",
            "verify",
            "packet.bin",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "proof.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Verify(_)));

        let err = Cli::try_parse_from(["blockudp-one", "verify", "packet.bin", "abcd", "proof.json"])
            .unwrap_err();
        assert_eq!(clap::error::ErrorKind::ValueValidation, err.kind());
    }

    #[test]
    fn prove_needs_packets() {
        assert!(Cli::try_parse_from(["blockudp-one", "prove", "--index", "0"]).is_err());
        assert!(Cli::try_parse_from(["blockudp-one", "prove", "-i", "1", "a", "b"]).is_ok());
    }
}
