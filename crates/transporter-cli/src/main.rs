use clap::Parser;
use tracing::{info, warn};

use transporter_cli::{Args, RunConfig, run_upload};

const SIGINT: i32 = 2;
#[cfg(unix)]
const SIGTERM: i32 = 15;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let default_filter = if args.verbose > 0 {
        "transporter=debug,transporter_cli=debug,transporter_api=debug,transporter_package=debug,transporter_transfer=debug"
    } else {
        "transporter=info,transporter_cli=info,transporter_api=info,transporter_package=info,transporter_transfer=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = RunConfig::from_args(args);
    info!("Uploading {} as {}", config.source, config.username);

    // Dropping the upload future on a signal releases the package handle and
    // any downloaded copy before the process exits.
    let signal = tokio::select! {
        result = run_upload(config) => {
            let summary = result?;
            info!(
                "Uploaded {} bytes in {} ms as {}",
                summary.bytes_sent, summary.transfer_time_ms, summary.package_name
            );
            return Ok(());
        }
        signal = shutdown_signal() => signal,
    };

    warn!("Upload interrupted");
    std::process::exit(128 + signal);
}

#[cfg(unix)]
async fn shutdown_signal() -> i32 {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, aborting upload...");
            SIGINT
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, aborting upload...");
            SIGTERM
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> i32 {
    tokio::signal::ctrl_c().await.ok();
    info!("Received Ctrl+C, aborting upload...");
    SIGINT
}
