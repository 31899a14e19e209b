use apn_scraper_lib::config::{AmbiguityPolicy, ClientConfig, RunConfig, DEFAULT_BASE_URL, DEFAULT_OUTPUT};
use apn_scraper_lib::{logger, Orchestrator, SessionClient};

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use log::{info, LevelFilter};

#[derive(Parser)]
#[command(name = "apn-scraper")]
#[command(about = "Clark County assessor property lookup by APN")]
#[command(version)]
struct Cli {
    /// Input CSV (or .xlsx) file containing APNs
    input_file: PathBuf,

    /// Output CSV file
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Name of the column holding APNs
    #[arg(short, long, default_value = "APN")]
    column: String,

    /// Records buffered per write when streaming is disabled
    #[arg(long, default_value_t = 50)]
    batch_size: usize,

    /// Write in batches instead of after every record
    #[arg(long)]
    no_stream: bool,

    /// Append to an existing output file instead of replacing it
    #[arg(long)]
    append: bool,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info", value_enum)]
    log_level: LogLevel,

    /// Directory for the per-run log file
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Assessor application base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Attempts per request before giving up
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Minimum pause between APNs in milliseconds
    #[arg(long, default_value_t = 0)]
    min_delay_ms: u64,

    /// Maximum pause between APNs in milliseconds
    #[arg(long, default_value_t = 0)]
    max_delay_ms: u64,

    /// What to do when a search matches several parcels
    #[arg(long, default_value = "fail", value_enum)]
    on_ambiguous: OnAmbiguous,

    /// Verify the site's TLS certificate
    #[arg(long)]
    verify_tls: bool,
}

#[derive(Clone, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Clone, clap::ValueEnum)]
enum OnAmbiguous {
    Fail,
    FirstMatch,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logger::init(cli.log_level.clone().into(), &cli.log_dir)?;
    info!("Starting APN Scraper...");

    let client_config = ClientConfig::default()
        .with_base_url(cli.base_url)
        .with_timeout(Duration::from_secs(cli.timeout_secs))
        .with_max_attempts(cli.max_attempts)
        .with_verify_tls(cli.verify_tls)
        .with_ambiguity(match cli.on_ambiguous {
            OnAmbiguous::Fail => AmbiguityPolicy::Fail,
            OnAmbiguous::FirstMatch => AmbiguityPolicy::FirstMatch,
        });

    let run_config = RunConfig::new(cli.input_file, cli.output)
        .with_column(cli.column)
        .with_batch_size(cli.batch_size)
        .with_streaming(!cli.no_stream)
        .with_append(cli.append)
        .with_delay(
            Duration::from_millis(cli.min_delay_ms),
            Duration::from_millis(cli.max_delay_ms),
        );

    let session = SessionClient::connect(client_config)?;
    let summary = Orchestrator::new(&session, run_config).run()?;

    info!(
        "Done: {} succeeded, {} failed of {}",
        summary.succeeded, summary.failed, summary.total
    );
    Ok(())
}
