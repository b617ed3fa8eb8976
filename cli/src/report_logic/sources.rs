//! Built-in statistics sources for the `stats-report` binary.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use lib_reporter::{Payload, SourceError, SourceHooks, StatsSource};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Process,
    Heartbeat,
    File,
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "process" => Ok(SourceKind::Process),
            "heartbeat" => Ok(SourceKind::Heartbeat),
            "file" => Ok(SourceKind::File),
            other => Err(anyhow!("unknown source '{}' (expected process, heartbeat or file)", other)),
        }
    }
}

/// Instantiates the configured sources. The `file` source needs `file_path`.
pub fn build_sources(kinds: &[SourceKind], file_path: Option<&PathBuf>) -> Result<Vec<Arc<dyn StatsSource>>> {
    let mut sources: Vec<Arc<dyn StatsSource>> = Vec::with_capacity(kinds.len());
    for kind in kinds {
        match kind {
            SourceKind::Process => sources.push(Arc::new(ProcessSource::new()?)),
            SourceKind::Heartbeat => sources.push(Arc::new(HeartbeatSource)),
            SourceKind::File => {
                let Some(path) = file_path else {
                    bail!("the file source needs --file-path");
                };
                sources.push(Arc::new(FileSource::new(path.clone())));
            }
        }
    }
    Ok(sources)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessSnapshot<'a> {
    host: &'a str,
    pid: u32,
    executable: &'a str,
    uptime_secs: f64,
    timestamp: String,
}

/// Identity and uptime of the running process, as JSON.
pub struct ProcessSource {
    host: String,
    pid: u32,
    executable: String,
    started: Instant,
}

impl ProcessSource {
    pub fn new() -> Result<Self> {
        let host = hostname::get()
            .context("reading hostname")?
            .to_string_lossy()
            .into_owned();
        let executable = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Self {
            host,
            pid: std::process::id(),
            executable,
            started: Instant::now(),
        })
    }
}

#[async_trait]
impl StatsSource for ProcessSource {
    fn name(&self) -> &str {
        "process"
    }

    async fn serialize(&self) -> Result<Payload, SourceError> {
        let snapshot = ProcessSnapshot {
            host: &self.host,
            pid: self.pid,
            executable: &self.executable,
            uptime_secs: self.started.elapsed().as_secs_f64(),
            timestamp: Utc::now().to_rfc3339(),
        };
        Payload::structured(&snapshot).map_err(|e| SourceError::Failed(e.into()))
    }
}

/// `alive <rfc3339>` as plain text.
pub struct HeartbeatSource;

#[async_trait]
impl StatsSource for HeartbeatSource {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn serialize(&self) -> Result<Payload, SourceError> {
        Ok(Payload::Text(format!("alive {}", Utc::now().to_rfc3339())))
    }
}

/// Raw bytes of a file, skipped while the file does not exist.
pub struct FileSource {
    path: PathBuf,
    seen: AtomicBool,
    hooks: Mutex<Option<SourceHooks>>,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            seen: AtomicBool::new(false),
            hooks: Mutex::new(None),
        }
    }

    fn log(&self, message: String) {
        if let Ok(hooks) = self.hooks.lock() {
            if let Some(hooks) = hooks.as_ref() {
                hooks.log(message);
            }
        }
    }
}

#[async_trait]
impl StatsSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn serialize(&self) -> Result<Payload, SourceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                if !self.seen.swap(true, Ordering::SeqCst) {
                    self.log(format!("{} is available", self.path.display()));
                }
                Ok(Payload::Binary(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.seen.swap(false, Ordering::SeqCst) {
                    self.log(format!("{} disappeared, waiting for it", self.path.display()));
                }
                Err(SourceError::NotReady)
            }
            Err(e) => Err(SourceError::Failed(
                anyhow::Error::new(e).context(format!("reading {}", self.path.display())),
            )),
        }
    }

    fn attach(&self, hooks: SourceHooks) {
        if let Ok(mut slot) = self.hooks.lock() {
            *slot = Some(hooks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[tokio::test]
    async fn process_snapshot_is_json_with_identity_fields() {
        let source = ProcessSource::new().unwrap();
        let Payload::Structured(value) = source.serialize().await.unwrap() else {
            panic!("expected a structured payload");
        };
        assert_eq!(value["pid"], Value::from(std::process::id()));
        assert!(value["host"].as_str().is_some_and(|h| !h.is_empty()));
        assert!(value["uptimeSecs"].as_f64().is_some());
        assert!(value["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn heartbeat_is_an_alive_line() {
        let Payload::Text(line) = HeartbeatSource.serialize().await.unwrap() else {
            panic!("expected text");
        };
        let stamp = line.strip_prefix("alive ").expect("prefix");
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test]
    async fn file_source_is_not_ready_until_the_file_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.bin");
        let source = FileSource::new(path.clone());

        assert!(source.serialize().await.unwrap_err().is_not_ready());

        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        match source.serialize().await.unwrap() {
            Payload::Binary(bytes) => assert_eq!(bytes, vec![1, 2, 3]),
            other => panic!("expected binary, got {other:?}"),
        }

        std::fs::remove_file(&path).unwrap();
        assert!(source.serialize().await.unwrap_err().is_not_ready());
    }

    #[test]
    fn source_names_parse_case_insensitively() {
        assert_eq!(" Process ".parse::<SourceKind>().unwrap(), SourceKind::Process);
        assert_eq!("HEARTBEAT".parse::<SourceKind>().unwrap(), SourceKind::Heartbeat);
        assert!("disk".parse::<SourceKind>().is_err());
    }

    #[test]
    fn file_source_requires_a_path() {
        assert!(build_sources(&[SourceKind::File], None).is_err());
        let sources = build_sources(&[SourceKind::Heartbeat, SourceKind::File], Some(&PathBuf::from("x"))).unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["heartbeat", "file"]);
    }
}
