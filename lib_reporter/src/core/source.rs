//! # Statistics Source Contract
//!
//! What the reporter needs from anything it reports: a stable name, an async
//! `serialize`, and a place to receive the hooks the reporter installs.

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;

use super::session::ReleaseHandle;
use crate::errors::SourceError;
use crate::loggers::{LogSink, ReportEvent};
use crate::payload::Payload;

/// A producer of statistics snapshots.
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use lib_reporter::{Payload, Reporter, SourceError, StatsSource};
///
/// struct Uptime(std::time::Instant);
///
/// #[async_trait]
/// impl StatsSource for Uptime {
///     fn name(&self) -> &str { "uptime" }
///     async fn serialize(&self) -> Result<Payload, SourceError> {
///         Ok(Payload::Text(format!("{}", self.0.elapsed().as_secs())))
///     }
/// }
///
/// # async fn demo() -> Result<(), lib_reporter::ReporterError> {
/// let reporter = Reporter::new("http://127.0.0.1:8080/stats")?;
/// reporter.start_reporting(Arc::new(Uptime(std::time::Instant::now())), Duration::from_secs(5))?;
/// # Ok(()) }
/// ```
#[async_trait]
pub trait StatsSource: Send + Sync + 'static {
    /// Stable identity used to tag every log line about this source.
    fn name(&self) -> &str;

    /// Produces the current snapshot. Return `SourceError::NotReady` when
    /// there is nothing to report yet; the tick is skipped silently.
    async fn serialize(&self) -> Result<Payload, SourceError>;

    /// Receives the reporter's hooks when reporting starts. Sources that want
    /// to log, report errors, or stop themselves keep a copy.
    fn attach(&self, hooks: SourceHooks) {
        let _ = hooks;
    }
}

/// Error sink, log sink and release signal installed into a source.
#[derive(Clone)]
pub struct SourceHooks {
    source: Arc<str>,
    sink: Arc<dyn LogSink>,
    release: ReleaseHandle,
}

impl SourceHooks {
    pub(crate) fn new(source: Arc<str>, sink: Arc<dyn LogSink>, release: ReleaseHandle) -> Self {
        Self { source, sink, release }
    }

    /// Forwards an error to the reporter's log, tagged with the source name.
    pub fn report_error(&self, error: impl Display) {
        self.sink.record(ReportEvent::SourceError {
            source: self.source.to_string(),
            detail: error.to_string(),
        });
    }

    /// Forwards an informational message, tagged with the source name.
    pub fn log(&self, message: impl Display) {
        self.sink.record(ReportEvent::SourceLog {
            source: self.source.to_string(),
            message: message.to_string(),
        });
    }

    /// Stops reporting this source. Only the first call has an effect.
    pub fn release(&self) -> bool {
        self.release.release()
    }

    /// The release signal on its own, for sources that hand it elsewhere.
    pub fn release_handle(&self) -> ReleaseHandle {
        self.release.clone()
    }
}
