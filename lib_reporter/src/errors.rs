//! # Error Types
//!
//! Three error families, one per boundary:
//!
//! - [`ReporterError`]: construction of a `Reporter` (bad or unsupported
//!   destination) and starting a session without a runtime. The only error
//!   that ever reaches the caller.
//! - [`SourceError`]: what a statistics source returns from `serialize`.
//! - [`ChannelError`]: what a transport returns from `send`.
//!
//! Source and channel errors are caught at the tick boundary and turned into
//! log events; they never propagate out of a reporting session.

use thiserror::Error;

/// Errors raised while constructing a `Reporter`.
#[derive(Debug, Error)]
pub enum ReporterError {
    /// The destination string is not an absolute URL.
    #[error("invalid destination url '{url}': {source}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// The parser's reason.
        #[source]
        source: url::ParseError,
    },

    /// The scheme is neither WebSocket- nor HTTP-family.
    #[error("unsupported destination scheme '{scheme}' in '{url}' (expected ws, wss, http or https)")]
    UnsupportedScheme {
        /// The rejected input.
        url: String,
        /// The scheme found in it.
        scheme: String,
    },

    /// The scheme is supported, but its transport was compiled out.
    #[error("transport for scheme '{scheme}' is not enabled in this build")]
    TransportDisabled {
        /// The scheme whose feature is off.
        scheme: String,
    },

    /// The transport client could not be built.
    #[error("failed to build transport: {0}")]
    Transport(String),

    /// Reporting was started outside a Tokio runtime.
    #[error("start_reporting must be called inside a Tokio runtime")]
    NoRuntime,
}

/// Errors a statistics source may return from `serialize`.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No data is available yet. Swallowed silently by the session.
    #[error("source has no data available yet")]
    NotReady,

    /// Any other failure. Logged with the source's name; the tick is skipped.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl SourceError {
    /// Convenience constructor for a message-only failure.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        SourceError::Failed(anyhow::anyhow!("{}", message))
    }

    /// `true` for the "no data yet" signal.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, SourceError::NotReady)
    }
}

/// Errors raised by a `Channel` while transmitting a frame.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The payload could not be encoded for the wire.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Establishing the connection failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Destination that refused or timed out.
        url: String,
        /// Underlying reason.
        reason: String,
    },

    /// The connection was closed before the frame went out.
    #[error("channel closed before the frame was sent")]
    Closed,

    /// A newer frame replaced this one before it was sent (latest sample wins).
    #[error("frame superseded by a newer sample")]
    Superseded,

    /// The transport reported an I/O or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The destination answered with a non-success HTTP status.
    #[error("destination answered with HTTP status {0}")]
    Status(u16),

    /// The operation did not finish within the configured timeout.
    #[error("timed out after {0} ms")]
    Timeout(u64),
}

impl ChannelError {
    /// `true` when the frame lost a latest-sample-wins race. Not a failure.
    pub fn is_superseded(&self) -> bool {
        matches!(self, ChannelError::Superseded)
    }
}
