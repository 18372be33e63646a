use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::script::ScriptDir;

/// Identifier used to compute per-app configuration directories.
#[derive(Clone, Copy)]
pub struct AppId {
    /// Reverse-DNS style qualifier, e.g. `"com"`.
    pub qualifier: &'static str,
    /// Organization or vendor name, e.g. `"local"`.
    pub organization: &'static str,
    /// Application name, e.g. `"jobd"`.
    pub application: &'static str,
}

/// Application configuration persisted to `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracing level to use if `RUST_LOG` is not set (e.g. `"info"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where `jobs.json` and `logs/` live. Defaults to the app data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Directory worker scripts are resolved in.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Program the script path is handed to (e.g. `python3`); `None` runs it directly.
    #[serde(default)]
    pub interpreter: Option<String>,
    /// Script used when a schedule request names none.
    #[serde(default)]
    pub default_script: Option<String>,
    /// Pass `--debug` to worker scripts.
    #[serde(default = "default_true")]
    pub worker_debug: bool,
    /// Plain HTTP listener.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    /// Optional HTTPS listener; needs both PEM paths below.
    #[serde(default)]
    pub https_addr: Option<String>,
    /// TLS certificate chain (PEM).
    #[serde(default)]
    pub tls_cert_pem: Option<String>,
    /// TLS private key (PEM).
    #[serde(default)]
    pub tls_key_pem: Option<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_scripts_dir() -> PathBuf { PathBuf::from("scripts") }
fn default_http_addr() -> String { "127.0.0.1:8080".to_string() }
fn default_true() -> bool { true }

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: None,
            scripts_dir: default_scripts_dir(),
            interpreter: None,
            default_script: None,
            worker_debug: true,
            http_addr: default_http_addr(),
            https_addr: None,
            tls_cert_pem: None,
            tls_key_pem: None,
        }
    }
}

/// Concrete on-disk locations derived from a [`Config`].
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root data directory.
    pub data_dir: PathBuf,
    /// The durable job table.
    pub jobs_file: PathBuf,
    /// Directory of per-job log files.
    pub log_dir: PathBuf,
}

impl Paths {
    /// Lay out the standard files under `data_dir`.
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            jobs_file: data_dir.join("jobs.json"),
            log_dir: data_dir.join("logs"),
            data_dir,
        }
    }
}

impl Config {
    /// Resolve data paths; `override_dir` (from the command line) wins.
    pub fn paths(&self, app: &AppId, override_dir: Option<&Path>) -> Result<Paths> {
        let dir = match override_dir.or(self.data_dir.as_deref()) {
            Some(d) => d.to_path_buf(),
            None => project_dirs(app)?.data_dir().to_path_buf(),
        };
        Ok(Paths::under(absolute(&dir)?))
    }

    /// Script directory with relative paths anchored at the working directory.
    pub fn script_dir(&self) -> Result<ScriptDir> {
        Ok(ScriptDir::new(absolute(&self.scripts_dir)?, self.default_script.clone()))
    }
}

fn absolute(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolve working directory")?;
    Ok(cwd.join(p))
}

fn project_dirs(app: &AppId) -> Result<ProjectDirs> {
    ProjectDirs::from(app.qualifier, app.organization, app.application)
        .ok_or_else(|| anyhow::anyhow!("failed to resolve ProjectDirs"))
}

/// Return the configuration directory for this app, creating it if needed.
pub fn config_dir(app: &AppId) -> Result<PathBuf> {
    let dir = project_dirs(app)?.config_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    Ok(dir)
}

/// Load `config.toml` from the app config dir or create a default one.
pub fn load_or_init(app: &AppId) -> Result<Config> {
    let path = config_dir(app)?.join("config.toml");
    load_or_init_at(&path)
}

/// Load the config file at `path`, writing defaults there first if it is missing.
pub fn load_or_init_at(path: &Path) -> Result<Config> {
    if path.exists() {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&txt)
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    } else {
        let cfg = Config::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        save_config(path, &cfg)?;
        Ok(cfg)
    }
}

fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_load_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cfg/config.toml");
        let cfg = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.http_addr, "127.0.0.1:8080");
        assert!(cfg.worker_debug);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "interpreter = \"python3\"\ndefault_script = \"example.py\"\n").unwrap();
        let cfg = load_or_init_at(&path).unwrap();
        assert_eq!(cfg.interpreter.as_deref(), Some("python3"));
        assert_eq!(cfg.scripts_dir, PathBuf::from("scripts"));
        let dir = cfg.script_dir().unwrap();
        assert!(dir.root().is_absolute());
        assert_eq!(dir.resolve(None).unwrap().0, "example.py");
    }

    #[test]
    fn override_dir_wins() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config { data_dir: Some("/nowhere".into()), ..Config::default() };
        let app = AppId { qualifier: "com", organization: "local", application: "jobd-test" };
        let paths = cfg.paths(&app, Some(tmp.path())).unwrap();
        assert_eq!(paths.jobs_file, tmp.path().join("jobs.json"));
        assert_eq!(paths.log_dir, tmp.path().join("logs"));
    }
}
