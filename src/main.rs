//! gnc-rules main entry point

use anyhow::Context;
use clap::Parser;
use gnc_rules_config::RulesConfig;
use gnc_rules_core::{apply_rules, CoreError, DefaultErrorLogger, ErrorContext, ErrorLogger, MonthPeriod, RunOptions};
use gnc_rules_store::{OpenMode, SqliteSession};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gnc-rules")]
#[command(version = "0.1.0")]
#[command(about = "Reclassify imbalanced GnuCash transactions by description", long_about = None)]
struct Args {
    /// Rules file (YAML)
    #[arg(long)]
    rules: PathBuf,

    /// GnuCash book (sqlite3 format)
    #[arg(long = "gnucash_file")]
    gnucash_file: PathBuf,

    /// Year of the month to process
    #[arg(long)]
    year: i32,

    /// Month to process (1-12)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: u32,

    /// Report changes without saving the book
    #[arg(long)]
    dry_run: bool,

    /// Remove a stale GnuCash lock before opening
    #[arg(long)]
    break_lock: bool,
}

impl Args {
    fn open_mode(&self) -> OpenMode {
        if self.dry_run {
            OpenMode::ReadOnly
        } else if self.break_lock {
            OpenMode::BreakLock
        } else {
            OpenMode::Normal
        }
    }
}

fn run(args: &Args) -> Result<(), CoreError> {
    let config = RulesConfig::load(&args.rules)?;
    let period = MonthPeriod::new(args.year, args.month)?;

    let mut session = SqliteSession::open(&args.gnucash_file, args.open_mode())?;
    let stdout = std::io::stdout();
    apply_rules(
        &mut session,
        &config,
        &period,
        RunOptions { dry_run: args.dry_run },
        stdout.lock(),
    )?;
    session.close()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.dry_run && args.break_lock {
        DefaultErrorLogger.log_warning(
            "--break-lock has no effect with --dry-run",
            &ErrorContext::new("open_book".to_string()),
        );
    }

    run(&args).map_err(|error| {
        let context = ErrorContext::new("apply_rules".to_string())
            .with_data("rules", json!(args.rules.display().to_string()))
            .with_data("gnucash_file", json!(args.gnucash_file.display().to_string()))
            .with_data("period", json!(format!("{:04}-{:02}", args.year, args.month)));
        DefaultErrorLogger.log_error(&error, &context);
        error
    })
    .with_context(|| format!("Failed to apply {}", args.rules.display()))
}

