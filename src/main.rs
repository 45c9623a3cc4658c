//! Vital Sync CLI - daily health metrics to monthly markdown logs.
//!
//! Run `vitals --help` for usage information.

use anyhow::Context;
use console::style;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vital_sync::config::{self, Args, Config};
use vital_sync::lock::{LockHandle, DEFAULT_LOCK_FILE};
use vital_sync::sync::{RunOptions, SyncOutcome, SyncRunner};
use vital_sync::SyncError;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    let code = run(args).await;
    std::process::exit(code);
}

async fn run(args: Args) -> i32 {
    // Load configuration first; logging setup depends on it.
    let config_path = Config::resolve_path(&args);
    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return e.exit_code();
        }
    };

    let _guard = match setup_logging(&args, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            return 4;
        }
    };

    info!(version = vital_sync::VERSION, "Starting health metrics sync");

    // Acquire the run lock; a held lock is a benign skip, not an error.
    let lock = match LockHandle::acquire(DEFAULT_LOCK_FILE) {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            info!("Exiting: another sync is already running");
            return 0;
        }
        Err(e) => {
            error!("{e}");
            return e.exit_code();
        }
    };

    let outcome = execute(&args, config).await;

    // The lock guard is dropped here, before the process exits, on every
    // path - success, expected skip, or failure.
    drop(lock);

    match outcome {
        Ok(outcome) => {
            print_summary(&outcome);
            0
        }
        Err(e) if e.is_benign() => {
            info!("Skipping: {e}");
            println!("{} {}", style("Skipped:").yellow().bold(), e);
            0
        }
        Err(e) => {
            error!("{e}");
            eprintln!("{} {}", style("Error:").red().bold(), e);
            e.exit_code()
        }
    }
}

async fn execute(args: &Args, config: Config) -> Result<SyncOutcome, SyncError> {
    let token = config::api_token()?;

    let target = match args.date {
        Some(date) => {
            if !config.execution.allow_historical {
                return Err(SyncError::Config(
                    "historical sync is disabled - set execution.allow_historical: true".into(),
                ));
            }
            date
        }
        None => chrono::Local::now().date_naive(),
    };

    let opts = RunOptions {
        dry_run: args.dry_run,
        backfill: args.backfill || config.execution.backfill,
        show_progress: !args.no_progress && !args.json_logs,
    };

    info!(date = %target, dry_run = opts.dry_run, backfill = opts.backfill, "Sync parameters");

    let runner = SyncRunner::new(config, token)?;
    runner.run(target, opts).await
}

fn setup_logging(args: &Args, config: &Config) -> anyhow::Result<WorkerGuard> {
    let level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vital_sync={level},vitals={level}")));

    let log_file = &config.logging.file;
    let log_dir = log_file.parent().unwrap_or_else(|| std::path::Path::new("."));
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory '{}'", log_dir.display()))?;
    let file_name = log_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "vitals.log".to_string());

    let appender = if config.logging.rotation {
        tracing_appender::rolling::daily(log_dir, file_name)
    } else {
        tracing_appender::rolling::never(log_dir, file_name)
    };
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    if args.json_logs {
        let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .with(file_layer)
            .init();
    } else {
        let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact(),
            )
            .with(file_layer)
            .init();
    }

    Ok(guard)
}

fn print_summary(outcome: &SyncOutcome) {
    if outcome.dry_run {
        println!("\n{}", style("DRY RUN").yellow().bold());
        println!(
            "Would sync {} into {}",
            outcome.date,
            outcome.file.display()
        );
        return;
    }

    println!(
        "\n{} Synced {} into {}",
        style("✓").green().bold(),
        outcome.date,
        outcome.file.display()
    );
    println!(
        "  Rows written:        {}",
        style(outcome.rows_written).bold()
    );
    if outcome.duplicates_skipped > 0 {
        println!(
            "  Duplicates skipped:  {}",
            style(outcome.duplicates_skipped).bold()
        );
    }
}
