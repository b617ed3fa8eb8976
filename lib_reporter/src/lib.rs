//! # lib_reporter
//!
//! Reports any number of statistics sources, each on its own schedule, to a
//! single destination over one shared connection: a persistent WebSocket for
//! `ws://`/`wss://` destinations, one POST per sample for `http://`/`https://`.
//!
//! The shared channel opens on the first sample and closes when the last
//! source stops. Under contention the newest sample wins: a frame still
//! waiting to go out is replaced, an HTTP request still in flight is
//! cancelled. Failed samples are logged and never retried; the next tick is
//! the retry.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Outbound transports behind the `Channel` contract.
pub mod channels;
/// Transport options.
pub mod configs;
/// Reporter, sessions, registry and the source contract.
pub mod core;
/// Destination parsing and transport selection.
pub mod destination;
/// Error types for construction, sources and channels.
pub mod errors;
/// Reporter events, log sinks and subscriber setup.
pub mod loggers;
/// Payloads and encoded wire frames.
pub mod payload;

// --- Public API Re-exports ---
pub use crate::channels::{Channel, MemoryChannel};
pub use crate::configs::ReporterOptions;
pub use crate::core::{ReleaseHandle, Reporter, ReporterBuilder, SessionState, SourceHooks, StatsSource};
pub use crate::destination::{ChannelKind, Destination};
pub use crate::errors::{ChannelError, ReporterError, SourceError};
pub use crate::loggers::{LogSink, RecordingLogSink, ReportEvent, TickStage, TracingLogSink};
pub use crate::payload::{ContentType, Frame, Payload};

/// Locks `mutex`, recovering the data if a holder panicked. None of the
/// guarded state can be left half-updated by a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
