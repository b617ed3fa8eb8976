use anyhow::{bail, Context, Result};
use clap::Parser;
use lib_reporter::loggers::subscriber::LoggingSetup;
use lib_reporter::ReporterOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::sources::SourceKind;

/// Config file read when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "stats_report.conf";
/// Log files kept from earlier runs.
const KEEP_LOG_FILES: usize = 4;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(name = "stats-report", about = "Reports process statistics to a WebSocket or HTTP endpoint", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "STATS_REPORT_URL", help = "Destination URL (ws://, wss://, http:// or https://).")]
    pub url: Option<String>,

    #[clap(long, env = "STATS_REPORT_FREQUENCY_SECS", help = "Seconds between reports; 0 reports once.")]
    pub frequency_secs: Option<f64>,

    #[clap(long, env = "STATS_REPORT_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "STATS_REPORT_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "STATS_REPORT_LOG_LEVEL", help = "Log filter (trace, debug, info, warn, error or a directive).")]
    pub log_level: Option<String>,

    #[clap(long, env = "STATS_REPORT_LOG_JSON", num_args = 0..=1, default_missing_value = "true", help = "Write console logs as JSON lines.")]
    pub log_json: Option<bool>,

    #[clap(long, env = "STATS_REPORT_SOURCES", value_delimiter = ',', help = "Comma separated sources: process, heartbeat, file.")]
    pub sources: Option<Vec<String>>,

    #[clap(long, env = "STATS_REPORT_FILE_PATH", help = "File reported by the `file` source.")]
    pub file_path: Option<PathBuf>,

    #[clap(long, env = "STATS_REPORT_CONNECT_TIMEOUT_MS", help = "WebSocket connect timeout in milliseconds.")]
    pub connect_timeout_ms: Option<u64>,

    #[clap(long, env = "STATS_REPORT_REQUEST_TIMEOUT_MS", help = "HTTP request timeout in milliseconds.")]
    pub request_timeout_ms: Option<u64>,

    #[clap(long, env = "STATS_REPORT_USER_AGENT", help = "User-Agent sent to the destination.")]
    pub user_agent: Option<String>,

    #[clap(long, env = "STATS_REPORT_ONCE", num_args = 0..=1, default_missing_value = "true", help = "Report every source once, then exit.")]
    pub once: Option<bool>,

    #[clap(long, env = "STATS_REPORT_DRY_RUN", num_args = 0..=1, default_missing_value = "true", help = "Keep reports in memory instead of sending them.")]
    pub dry_run: Option<bool>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            url: other.url.or(self.url),
            frequency_secs: other.frequency_secs.or(self.frequency_secs),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_json: other.log_json.or(self.log_json),
            sources: other.sources.or(self.sources),
            file_path: other.file_path.or(self.file_path),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            user_agent: other.user_agent.or(self.user_agent),
            once: other.once.or(self.once),
            dry_run: other.dry_run.or(self.dry_run),
        }
    }

    fn defaults() -> Config {
        Config {
            frequency_secs: Some(10.0),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            log_json: Some(false),
            sources: Some(vec!["process".to_string(), "heartbeat".to_string()]),
            once: Some(false),
            dry_run: Some(false),
            ..Default::default()
        }
    }

    pub fn url(&self) -> Result<&str> {
        match self.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => bail!("no destination configured; pass --url or set STATS_REPORT_URL"),
        }
    }

    /// Reporting period. `--once` forces zero.
    pub fn frequency(&self) -> Result<Duration> {
        if self.is_once() {
            return Ok(Duration::ZERO);
        }
        let secs = self.frequency_secs.unwrap_or(0.0);
        Duration::try_from_secs_f64(secs).with_context(|| format!("invalid frequency: {} seconds", secs))
    }

    pub fn is_once(&self) -> bool {
        self.once.unwrap_or(false)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }

    pub fn source_kinds(&self) -> Result<Vec<SourceKind>> {
        let names = self.sources.as_deref().unwrap_or_default();
        if names.is_empty() {
            bail!("no sources configured");
        }
        let mut kinds = Vec::with_capacity(names.len());
        for name in names {
            let kind: SourceKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    pub fn reporter_options(&self) -> ReporterOptions {
        let defaults = ReporterOptions::default();
        ReporterOptions {
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }

    pub fn logging_setup(&self) -> LoggingSetup {
        LoggingSetup {
            app_name: "stats-report".to_string(),
            log_dir: self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.clone().unwrap_or_else(|| "info".to_string()),
            json: self.log_json.unwrap_or(false),
            keep_files: KEEP_LOG_FILES,
        }
    }
}

/// Defaults, then the config file, then environment and command line.
pub fn load_config() -> Result<Config> {
    resolve(Config::parse())
}

/// Layers `cli` (already holding env values) over the config file and the defaults.
pub fn resolve(cli: Config) -> Result<Config> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path, cli.config_path.is_some())? {
        current_config = current_config.merge(file_config);
    }
    Ok(current_config.merge(cli))
}

// A missing default file is fine; a missing file the user named is not.
fn read_config_file(path: &Path, required: bool) -> Result<Option<Config>> {
    if !path.exists() {
        if required {
            bail!("config file not found: {}", path.display());
        }
        return Ok(None);
    }
    let config_str =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let file_config = serde_json::from_str::<Config>(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(Some(file_config))
}
