use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::lock;
use crate::payload::ContentType;

/// Where in a tick a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStage {
    /// `StatsSource::serialize` failed.
    Serialize,
    /// The payload could not be encoded for the wire.
    Encode,
    /// The channel failed to deliver the frame.
    Transmit,
}

impl fmt::Display for TickStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickStage::Serialize => write!(f, "serialize"),
            TickStage::Encode => write!(f, "encode"),
            TickStage::Transmit => write!(f, "transmit"),
        }
    }
}

/// Everything the reporter tells the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    /// A session was registered. A zero frequency means "once".
    Started {
        /// Source name.
        source: String,
        /// Tick period.
        frequency: Duration,
    },
    /// A session reached its terminal stop.
    Stopped {
        /// Source name.
        source: String,
    },
    /// A tick was aborted.
    TickFailed {
        /// Source name.
        source: String,
        /// Failing stage.
        stage: TickStage,
        /// Error text.
        detail: String,
    },
    /// A newer sample replaced this tick's frame before it went out.
    Superseded {
        /// Source name.
        source: String,
    },
    /// A frame was delivered.
    Sent {
        /// Source name.
        source: String,
        /// Wire content type.
        content_type: ContentType,
        /// Body length.
        bytes: usize,
    },
    /// The source reported an error through its hooks.
    SourceError {
        /// Source name.
        source: String,
        /// Error text.
        detail: String,
    },
    /// The source logged a message through its hooks.
    SourceLog {
        /// Source name.
        source: String,
        /// Message text.
        message: String,
    },
    /// The last session stopped and the shared channel was closed.
    ChannelClosed {
        /// Destination URL.
        url: String,
    },
}

impl ReportEvent {
    /// The source this event belongs to, if any.
    pub fn source(&self) -> Option<&str> {
        match self {
            ReportEvent::Started { source, .. }
            | ReportEvent::Stopped { source }
            | ReportEvent::TickFailed { source, .. }
            | ReportEvent::Superseded { source }
            | ReportEvent::Sent { source, .. }
            | ReportEvent::SourceError { source, .. }
            | ReportEvent::SourceLog { source, .. } => Some(source),
            ReportEvent::ChannelClosed { .. } => None,
        }
    }

    /// `true` for events logged at error level.
    pub fn is_error(&self) -> bool {
        matches!(self, ReportEvent::TickFailed { .. } | ReportEvent::SourceError { .. })
    }
}

/// Receives the reporter's events.
pub trait LogSink: Send + Sync {
    /// Handles one event. Must not block.
    fn record(&self, event: ReportEvent);
}

/// Default sink: forwards every event to `tracing`, tagged with the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&self, event: ReportEvent) {
        match event {
            ReportEvent::Started { source, frequency } => {
                if frequency.is_zero() {
                    info!(source = %source, "start reporting once");
                } else {
                    info!(
                        source = %source,
                        frequency_secs = frequency.as_secs_f64(),
                        "start reporting every {} seconds",
                        frequency.as_secs_f64()
                    );
                }
            }
            ReportEvent::Stopped { source } => info!(source = %source, "stop reporting"),
            ReportEvent::TickFailed { source, stage, detail } => {
                error!(source = %source, stage = %stage, "[{}] {}", source, detail)
            }
            ReportEvent::Superseded { source } => {
                debug!(source = %source, "sample superseded by a newer one")
            }
            ReportEvent::Sent { source, content_type, bytes } => {
                debug!(source = %source, content_type = content_type.as_mime(), bytes, "sample sent")
            }
            ReportEvent::SourceError { source, detail } => error!(source = %source, "[{}] {}", source, detail),
            ReportEvent::SourceLog { source, message } => info!(source = %source, "[{}] {}", source, message),
            ReportEvent::ChannelClosed { url } => warn!(url = %url, "no sources left, channel closed"),
        }
    }
}

/// Sink that keeps events in memory for later inspection.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingLogSink {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far, oldest first.
    pub fn events(&self) -> Vec<ReportEvent> {
        lock(&self.events).clone()
    }

    /// Error-level events tagged with `source`.
    pub fn errors_for(&self, source: &str) -> Vec<ReportEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.is_error() && e.source() == Some(source))
            .cloned()
            .collect()
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&ReportEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| predicate(e)).count()
    }
}

impl LogSink for RecordingLogSink {
    fn record(&self, event: ReportEvent) {
        lock(&self.events).push(event);
    }
}
