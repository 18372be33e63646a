use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use jobs_core::cfg::{self, AppId, Config};
use jobs_core::joblog::LogStore;
use jobs_core::logx;
use jobs_core::store::JobStore;
use tracing::{info, warn};

mod bootstrap;
mod module;
mod runner;
mod scheduler;
mod web;

use module::{Module, ModuleCtx};
use runner::Supervisor;
use scheduler::SchedulerEngine;

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"), // <- no literal; comes from crate name
};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Cron job scheduler daemon")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Config file (default: the per-user config dir)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory for jobs.json and logs/
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// HTTP listen address, overrides `http_addr`
    #[arg(long)]
    listen: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => cfg::load_or_init_at(path)?,
        None => cfg::load_or_init(&APP).context("config")?,
    };
    logx::init(&logx::level_for(cli.verbose, &cfg.log_level));

    info!("{} boot", APP.application);
    runtime()?.block_on(serve(cli, cfg))
}

#[cfg(feature = "rt-single")]
fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
}

#[cfg(not(feature = "rt-single"))]
fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

async fn serve(cli: Cli, cfg: Config) -> Result<()> {
    let paths = cfg.paths(&APP, cli.data_dir.as_deref())?;
    info!("cfg data_dir={}", paths.data_dir.display());

    let store = JobStore::open(&paths.jobs_file).context("open job table")?;
    let logs = LogStore::open(&paths.log_dir).context("open job logs")?;
    let scripts = cfg.script_dir()?;
    if !scripts.root().is_dir() {
        warn!("scripts dir {} does not exist", scripts.root().display());
    }
    let supervisor = Supervisor::new(logs, cfg.interpreter.clone(), cfg.worker_debug);
    let engine = SchedulerEngine::new(store, supervisor, scripts);

    bootstrap::reconcile(&engine);

    let (tx, rx) = tokio::sync::watch::channel(false);
    let ctx = ModuleCtx { engine: engine.clone(), shutdown: rx };
    let modules = modules(&cli, &cfg)?;
    let running = tokio::spawn(module::run_all(modules, ctx));

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutdown requested");
    let _ = tx.send(true);
    running.await?;
    engine.shutdown();
    Ok(())
}

#[cfg(feature = "web-api")]
fn modules(cli: &Cli, cfg: &Config) -> Result<Vec<Box<dyn Module>>> {
    let http = cli.listen.as_deref().unwrap_or(&cfg.http_addr);
    let http = Some(http.parse::<SocketAddr>().with_context(|| format!("parse listen address {http}"))?);
    let https = cfg
        .https_addr
        .as_deref()
        .map(|a| a.parse::<SocketAddr>().with_context(|| format!("parse https address {a}")))
        .transpose()?;
    let web: Box<dyn Module> =
        Box::new(web::WebServer::new(http, https, cfg.tls_cert_pem.clone(), cfg.tls_key_pem.clone()));
    Ok(vec![web])
}

#[cfg(not(feature = "web-api"))]
fn modules(cli: &Cli, _cfg: &Config) -> Result<Vec<Box<dyn Module>>> {
    if cli.listen.is_some() {
        warn!("--listen ignored: built without web-api");
    }
    Ok(Vec::new())
}
