//! # Logging
//!
//! The reporter never writes logs directly. Every observable event (session
//! start and stop, failed ticks, messages from sources) is a [`ReportEvent`]
//! handed to a [`LogSink`]. The default [`TracingLogSink`] turns them into
//! `tracing` records tagged with the source name; [`RecordingLogSink`] keeps
//! them in memory.
//!
//! With the `loggers` feature, [`subscriber`] installs a console + file
//! subscriber for binaries.

/// Reporter events and the sinks that receive them.
pub mod events;
/// Process-wide `tracing` subscriber setup.
#[cfg(feature = "loggers")]
pub mod subscriber;

pub use events::{LogSink, RecordingLogSink, ReportEvent, TickStage, TracingLogSink};
