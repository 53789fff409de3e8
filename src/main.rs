//! edms-crawler: caption scanned DMS documents in periodic batches
//!
//! Configuration comes from environment variables (see
//! [`Config::from_env`]); a `.env` file in the working directory is loaded
//! first if present.

use clap::Parser;
use edms_crawler::config::LoggingConfig;
use edms_crawler::{
    BatchProcessor, Config, CrawlerTask, Database, Error, HttpCaptioner, SoapTransport,
    run_until_signal,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

#[derive(Parser)]
#[command(name = "edms-crawler")]
#[command(about = "Retrieve scanned documents from the DMS and store image captions")]
#[command(version)]
struct Args {
    /// Process a single batch and exit
    #[arg(long)]
    once: bool,

    /// Read environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Seconds between batches (overrides CRAWL_INTERVAL_SECS)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = load_env(args.env_file.as_deref()) {
        eprintln!("edms-crawler: {e}");
        return ExitCode::from(2);
    }

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("edms-crawler: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(secs) = args.interval_secs {
        config.batch.interval = Duration::from_secs(secs);
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("edms-crawler: cannot open log file: {e}");
        return ExitCode::from(2);
    }

    match run(config, args.once).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "edms-crawler stopped with an error");
            ExitCode::FAILURE
        }
    }
}

fn load_env(env_file: Option<&Path>) -> Result<(), dotenvy::Error> {
    match env_file {
        Some(path) => dotenvy::from_path(path),
        // A missing ./.env is normal when variables come from the host
        None => match dotenvy::dotenv() {
            Ok(_) => Ok(()),
            Err(e) if e.not_found() => Ok(()),
            Err(e) => Err(e),
        },
    }
}

/// Stderr plus an optional append-only log file, both behind the same filter
///
/// `RUST_LOG` wins over `LOG_FILTER` when both are set. The file is never
/// rotated here; rotation is left to the host (logrotate or similar).
fn init_logging(config: &LoggingConfig) -> std::io::Result<()> {
    logging_dispatch(config)?.init();
    Ok(())
}

fn logging_dispatch(config: &LoggingConfig) -> std::io::Result<tracing::Dispatch> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter()),
        )
        .with(file_layer);
    Ok(tracing::Dispatch::new(subscriber))
}

async fn run(config: Config, once: bool) -> edms_crawler::Result<()> {
    let transport = Arc::new(SoapTransport::new(&config.dms)?);
    let captioner = Arc::new(HttpCaptioner::new(&config.caption)?);
    let database = Arc::new(Database::new(&config.persistence.database_path).await?);

    tracing::info!(
        service_url = %config.dms.service_url,
        library = %config.dms.library,
        database = %config.persistence.database_path.display(),
        "edms-crawler starting"
    );

    let processor = BatchProcessor::new(&config, transport, captioner, database.clone());

    if once {
        let result = processor.process_batch().await;
        drop(processor);
        close_database(database).await;
        let report = result?;
        tracing::info!(
            fetched = report.fetched,
            captioned = report.captioned,
            skipped = report.skipped.len(),
            "single batch finished"
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let task = CrawlerTask::new(Arc::new(processor), config.batch.interval);
    let handle = tokio::spawn(task.run(cancel.clone()));

    run_until_signal(cancel).await;
    let joined = handle.await;
    close_database(database).await;
    joined.map_err(|e| Error::Other(format!("crawler task failed: {e}")))?;

    tracing::info!("edms-crawler stopped");
    Ok(())
}

async fn close_database(database: Arc<Database>) {
    if let Ok(database) = Arc::try_unwrap(database) {
        database.close().await;
    }
}
