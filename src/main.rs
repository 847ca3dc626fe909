use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pulse_check::backlog::{analyze_backlog, backfill_topics};
use pulse_check::config::{AppConfig, MAX_WINDOW_DAYS};
use pulse_check::db::establish_connection;
use pulse_check::import::import_path;
use pulse_check::ledger::DedupLedger;
use pulse_check::logging::{init_logging, OperationTimer};
use pulse_check::metrics::PipelineMetrics;
use pulse_check::models::{Platform, RunMode};
use pulse_check::pipeline::{self, CycleSchedule, StopCondition};
use pulse_check::report::{write_report, ReportOptions, SentimentStats};
use pulse_check::{SentimentAnalyzer, TopicExtractor};

/// Longest live run accepted, one year
const MAX_RUN_MINUTES: u64 = 525_600;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect, classify, store and publish highlights
    Run(RunArgs),
    /// Import Discord JSON exports into the store
    Import {
        /// Export file, or a directory of exports
        path: PathBuf,
    },
    /// Classify stored messages that have no sentiment record
    Analyze {
        /// Messages per batch (defaults to classifier.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Re-extract topics for every existing record instead
        #[arg(long)]
        backfill_topics: bool,
    },
    /// Show the sentiment distribution
    Stats {
        /// Confidence threshold for "high confidence"
        #[arg(long, default_value_t = 0.8)]
        floor: f64,
    },
    /// Write a report of top positive posts per platform
    Report {
        /// Look-back window in days
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS))]
        days: i64,

        /// Minimum confidence (exclusive)
        #[arg(long, default_value_t = 0.8)]
        min_confidence: f64,

        /// Posts per platform
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Output file
        #[arg(short, long, default_value = "sentiment_report.txt")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Log what would be stored and posted without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Platform to run
    #[arg(long, value_enum, default_value_t = PlatformArg::All)]
    platform: PlatformArg,

    /// Messages to fetch per platform per cycle
    #[arg(long)]
    limit: Option<usize>,

    /// Stop after storing, or go on to publish
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Keep cycling instead of running a single cycle
    #[arg(long)]
    live: bool,

    /// Stop a live run after this many minutes
    #[arg(long, requires = "live", value_parser = clap::value_parser!(u64).range(1..=MAX_RUN_MINUTES))]
    duration_minutes: Option<u64>,

    /// Seconds between steady-state cycles
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Discord channel to read
    #[arg(long)]
    channel_id: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformArg {
    Discord,
    Bluesky,
    X,
    All,
}

impl PlatformArg {
    fn platforms(self) -> Vec<Platform> {
        match self {
            Self::Discord => vec![Platform::Discord],
            Self::Bluesky => vec![Platform::Bluesky],
            Self::X => vec![Platform::X],
            Self::All => Platform::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Collect,
    Publish,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Collect => Self::Collect,
            ModeArg::Publish => Self::Publish,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;
    config.database.url = config.get_database_url();

    // Initialize logging; the guard flushes the file appender on exit
    let _log_guard = init_logging(
        Some(&config.get_log_level()),
        config.logging.file_path.as_deref().map(Path::new),
        &config.logging.format,
    )?;

    info!("Starting pulse-check");

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Import { path } => import(&config, &path),
        Commands::Analyze {
            batch_size,
            backfill_topics,
        } => analyze(&config, batch_size, backfill_topics),
        Commands::Stats { floor } => stats(&config, floor),
        Commands::Report {
            days,
            min_confidence,
            top,
            output,
        } => report(
            &config,
            ReportOptions {
                days,
                min_confidence,
                top_n: top,
            },
            &output,
        ),
    }
}

/// Run the collection loop until it finishes, fails or Ctrl-C arrives
async fn run(mut config: AppConfig, args: RunArgs) -> Result<()> {
    config.pipeline.dry_run |= args.dry_run;
    if let Some(mode) = args.mode {
        config.pipeline.mode = mode.into();
    }
    if let Some(limit) = args.limit {
        config.pipeline.collect_limit = limit;
    }
    if let Some(interval) = args.interval_secs {
        config.pipeline.interval_secs = interval;
    }
    if args.channel_id.is_some() {
        config.pipeline.channel_id = args.channel_id;
    }
    config.validate().context("Invalid run options")?;

    if config.pipeline.dry_run {
        warn!("Dry run: nothing will be stored or posted");
    }

    let store = Arc::new(establish_connection(&config.database).context("Failed to open content store")?);
    let requested = args.platform.platforms();
    let mut pipeline = pipeline::start(&config, store, &requested)
        .await
        .context("Failed to start pipeline")?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; finishing current cycle");
            signal.cancel();
        }
    });

    let stop = match (args.live, args.duration_minutes) {
        (false, _) => StopCondition::single_cycle(),
        (true, Some(minutes)) => StopCondition::minutes(minutes)?,
        (true, None) => StopCondition::default(),
    };

    // An explicit interval skips the warm-up cycles
    let schedule = match args.interval_secs {
        Some(secs) => CycleSchedule::fixed(Duration::from_secs(secs)),
        None => CycleSchedule::from_config(&config.pipeline),
    };
    let summary = pipeline.run(schedule, stop, cancel).await;
    info!(
        state = %pipeline.state(),
        processed = ledger_total(pipeline.processed_ledger()),
        published = ledger_total(pipeline.published_ledger()),
        "Run complete"
    );

    if summary.cycles > 0 && summary.aborted_cycles == summary.cycles {
        anyhow::bail!("Every cycle aborted; content store unreachable");
    }
    Ok(())
}

fn ledger_total(ledger: &DedupLedger) -> usize {
    Platform::ALL.iter().map(|platform| ledger.len(*platform)).sum()
}

fn import(config: &AppConfig, path: &Path) -> Result<()> {
    let timer = OperationTimer::new("import");
    let db = establish_connection(&config.database).context("Failed to open content store")?;
    let summary = import_path(&db, path).with_context(|| format!("Failed to import {}", path.display()))?;
    PipelineMetrics::default().record_imported(summary.imported);
    info!("Imported {} messages from {} files", summary.imported, summary.files);
    timer.finish();
    Ok(())
}

fn analyze(config: &AppConfig, batch_size: Option<usize>, backfill: bool) -> Result<()> {
    let timer = OperationTimer::new("analyze");
    let db = establish_connection(&config.database).context("Failed to open content store")?;
    let topics = TopicExtractor::from_config(&config.classifier)?;

    if backfill {
        let updated = backfill_topics(&db, &topics)?;
        info!("Updated topics on {} records", updated);
    } else {
        let analyzer = SentimentAnalyzer::from_config(&config.classifier)?;
        info!("Using sentiment model: {}", analyzer.model_name());
        let batch_size = batch_size.unwrap_or(config.classifier.batch_size).max(1);
        let summary = analyze_backlog(&db, &analyzer, &topics, batch_size)?;
        info!(
            "Classified {} messages in {} batches ({} failed)",
            summary.classified, summary.batches, summary.failed
        );
    }

    timer.finish();
    Ok(())
}

fn stats(config: &AppConfig, floor: f64) -> Result<()> {
    let db = establish_connection(&config.database).context("Failed to open content store")?;
    SentimentStats::gather(&db, floor)?.log();
    Ok(())
}

fn report(config: &AppConfig, options: ReportOptions, output: &Path) -> Result<()> {
    let db = establish_connection(&config.database).context("Failed to open content store")?;
    let text = write_report(&db, options, output)?;
    info!(lines = text.lines().count(), path = %output.display(), "Report ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_bounds_windows_and_durations() {
        assert!(Cli::try_parse_from(["pulse-check", "report", "--days", "7"]).is_ok());
        assert!(Cli::try_parse_from(["pulse-check", "report", "--days", "0"]).is_err());
        assert!(Cli::try_parse_from(["pulse-check", "report", "--days", "1000000000"]).is_err());

        assert!(Cli::try_parse_from(["pulse-check", "run", "--live", "--duration-minutes", "60"]).is_ok());
        assert!(Cli::try_parse_from(["pulse-check", "run", "--live", "--duration-minutes", "18446744073709551615"]).is_err());
        assert!(Cli::try_parse_from(["pulse-check", "run", "--duration-minutes", "60"]).is_err());
    }
}
