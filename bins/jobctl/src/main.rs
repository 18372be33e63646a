use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobs_core::cfg::{self, AppId, Paths};
use jobs_core::job::JobView;
use jobs_core::joblog::LogStore;
use jobs_core::store::JobStore;
use jobs_core::{logx, schedule};
use tracing::debug;

/// Shares the daemon's config and data dirs.
const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: "jobd",
};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Inspect and maintain jobd state offline")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Directory holding jobs.json and logs/ (default: from jobd's config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List jobs
    List {
        /// Include canceled jobs awaiting purge
        #[arg(long)]
        all: bool,
    },
    /// Show one job as JSON
    Show { id: String },
    /// Print a job's log, newest first
    Logs { id: String },
    /// Remove canceled jobs from the table
    Purge,
    /// Check a cron expression and print its next fire times
    Validate {
        expr: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logx::init(&logx::level_for(cli.verbose, "warn"));

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let cmd = match cli.cmd {
        Command::Validate { expr, count } => return validate(&expr, count),
        cmd => cmd,
    };

    let paths = match &cli.data_dir {
        Some(dir) => Paths::under(dir),
        None => cfg::load_or_init(&APP)?.paths(&APP, None)?,
    };
    debug!("data_dir={}", paths.data_dir.display());
    let store = JobStore::open(&paths.jobs_file).context("open job table")?;
    let logs = LogStore::open(&paths.log_dir).context("open job logs")?;

    match cmd {
        Command::List { all } => {
            let jobs = if all { store.list_all() } else { store.list_active() };
            if jobs.is_empty() {
                println!("no jobs");
            }
            for j in jobs {
                let next = j.next_run.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
                println!(
                    "{}  {:<9}  {:<15}  {}  next={}",
                    j.id,
                    j.status.to_string(),
                    j.cron_expression,
                    j.script_name.as_deref().unwrap_or("-"),
                    next
                );
            }
        }
        Command::Show { id } => {
            let Some(record) = store.get(&id) else {
                eprintln!("job not found: {id}");
                return Ok(ExitCode::FAILURE);
            };
            let has_logs = logs.exists(&id);
            println!("{}", serde_json::to_string_pretty(&JobView { record, has_logs })?);
        }
        Command::Logs { id } => {
            for e in logs.read(&id) {
                println!("{} [{}] {}", e.timestamp.to_rfc3339(), e.level, e.message);
            }
        }
        Command::Purge => {
            let n = store.purge_canceled()?;
            println!("purged {n} canceled job(s)");
        }
        Command::Validate { expr, count } => return validate(&expr, count),
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(expr: &str, count: usize) -> Result<ExitCode> {
    let parsed = schedule::parse(expr)?;
    for t in schedule::upcoming(&parsed, count) {
        println!("{}", t.to_rfc3339());
    }
    Ok(ExitCode::SUCCESS)
}
