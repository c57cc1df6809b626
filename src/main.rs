//! Minimal launcher for `timecode-sync`.
//!
//! This binary owns exactly what spec.md's scope excludes from the core:
//! CLI flag parsing, logging configuration, and the OS signal that starts
//! a graceful shutdown. Everything else is `timecode_sync::run`.

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timecode_sync::ServerConfig;

/// Log level for the server process.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// timecode-sync: a SMPTE timecode synchronization server.
#[derive(Parser, Debug)]
#[command(name = "timecode-syncd")]
#[command(version, about = "SMPTE timecode synchronization server", long_about = None)]
struct CliArgs {
    /// Address to bind, e.g. 0.0.0.0 or ::
    #[arg(short = 'a', long, value_name = "HOST", default_value = "::")]
    host: String,

    /// TCP port to listen on
    #[arg(short = 'p', long, value_name = "PORT", default_value_t = 6363)]
    port: u16,

    /// Log the session/client count and each session's state every 30s
    #[arg(long)]
    status_report: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        status_reporting: args.status_report,
    };

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    let result = timecode_sync::run(config, shutdown).await;
    signal_task.abort();

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err @ timecode_sync::ServerError::Bind { .. }) => {
            tracing::error!("{err}");
            std::process::ExitCode::from(1)
        }
        Err(err) => {
            tracing::error!("{err}");
            std::process::ExitCode::from(2)
        }
    }
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "timecode_sync=error",
        LogLevel::Warn => "timecode_sync=warn",
        LogLevel::Info => "timecode_sync=info",
        LogLevel::Debug => "timecode_sync=debug",
        LogLevel::Trace => "timecode_sync=trace",
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {err}");
    }
}
