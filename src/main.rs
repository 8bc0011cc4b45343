use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quotagate::config::QuotagateConfig;
use quotagate::ratelimit::{
    spawn_background_sweeper, AdmissionBackend, AdmissionLimiter, RequestMetadata,
};

#[derive(Debug, Parser)]
#[command(name = "quotagate", version, about = "In-process admission control")]
struct Cli {
    /// YAML configuration file; QUOTAGATE__* environment variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate one caller against the limiter and print each outcome
    Check {
        /// Platform-assigned client address
        #[arg(long)]
        remote_addr: Option<String>,

        /// X-Forwarded-For header value
        #[arg(long)]
        forwarded_for: Option<String>,

        /// Resource scope; the default policy's scope when omitted
        #[arg(long)]
        route: Option<String>,

        /// Number of consecutive requests to evaluate
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Read JSON-lines requests and print one outcome per line
    Replay {
        /// Input file; stdin when omitted
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
}

/// One line of replay input.
#[derive(Debug, Deserialize)]
struct ReplayRequest {
    #[serde(flatten)]
    metadata: RequestMetadata,
    #[serde(default)]
    route: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Quotagate admission control");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = QuotagateConfig::load(cli.config.as_deref())?;
    let limiter = Arc::new(AdmissionLimiter::from_config(&config)?);
    info!(
        limit = limiter.policy().limit(),
        window_ms = limiter.policy().window_ms(),
        "Admission limiter initialized"
    );

    let sweeper = config.janitor.background_interval_ms.map(|interval_ms| {
        spawn_background_sweeper(
            Arc::clone(limiter.store()),
            Arc::clone(limiter.clock()),
            Duration::from_millis(interval_ms),
        )
    });

    match cli.command {
        Command::Check {
            remote_addr,
            forwarded_for,
            route,
            repeat,
        } => {
            let metadata = RequestMetadata {
                remote_addr,
                forwarded_for,
            };
            for _ in 0..repeat {
                let outcome =
                    AdmissionBackend::check(limiter.as_ref(), &metadata, route.as_deref()).await;
                println!("{}", serde_json::to_string(&outcome)?);
            }
        }
        Command::Replay { input } => {
            let reader: Box<dyn AsyncBufRead + Unpin + Send> = match input {
                Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
                None => Box::new(BufReader::new(tokio::io::stdin())),
            };

            tokio::select! {
                result = replay(limiter.as_ref(), reader, tokio::io::stdout()) => {
                    let summary = result?;
                    info!(
                        processed = summary.processed,
                        denied = summary.denied,
                        skipped = summary.skipped,
                        "Replay complete"
                    );
                }
                _ = shutdown_signal() => {}
            }
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Quotagate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.with_thread_ids(true).init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Counts gathered over one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ReplaySummary {
    processed: u64,
    denied: u64,
    skipped: u64,
}

/// Evaluate every line of `reader` in order, writing one JSON outcome per
/// line to `writer`.
async fn replay<B, R, W>(backend: &B, reader: R, mut writer: W) -> anyhow::Result<ReplaySummary>
where
    B: AdmissionBackend + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut summary = ReplaySummary::default();

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let request: ReplayRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed request");
                summary.skipped += 1;
                continue;
            }
        };

        let outcome = backend
            .check(&request.metadata, request.route.as_deref())
            .await;
        summary.processed += 1;
        if !outcome.success {
            summary.denied += 1;
        }

        let mut rendered = serde_json::to_vec(&outcome)?;
        rendered.push(b'\n');
        writer.write_all(&rendered).await?;
    }

    writer.flush().await?;
    Ok(summary)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
