//! # Outbound Channels
//!
//! A `Reporter` owns exactly one channel to its destination, shared by every
//! reporting session. Sessions interleave freely on it, so each transport
//! enforces a latest-sample-wins policy instead of queueing:
//!
//! - **`socket`**: one persistent WebSocket. A frame still waiting to be
//!   written when a newer one arrives is discarded; frames pending on a dead
//!   connection are dropped with it.
//! - **`http`**: one POST per frame. A new send cancels the request still in
//!   flight.
//! - **`memory`**: records frames in-process (tests and dry runs).
//!
//! `ensure_open` and `close` are synchronous state transitions so the
//! reporter can order a close against a later reopen under its own lock.
//! The reporter opens the channel itself and then calls `transmit`, which
//! never reopens a channel that was closed in between.

use std::sync::Arc;

use async_trait::async_trait;

use crate::configs::ReporterOptions;
use crate::destination::{ChannelKind, Destination};
use crate::errors::{ChannelError, ReporterError};
use crate::payload::Frame;

/// Persistent WebSocket transport.
#[cfg(feature = "socket")]
pub mod socket;
/// Request-per-frame HTTP transport.
#[cfg(feature = "http")]
pub mod http;
/// In-process recording transport.
pub mod memory;

#[cfg(feature = "http")]
pub use http::HttpChannel;
pub use memory::MemoryChannel;
#[cfg(feature = "socket")]
pub use socket::SocketChannel;

/// The contract every outbound transport fulfils.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Which transport family this is.
    fn kind(&self) -> ChannelKind;

    /// Opens the underlying connection if it is not open. No-op otherwise.
    fn ensure_open(&self) -> Result<(), ChannelError>;

    /// Transmits one frame on an already open channel. Never opens it: a
    /// closed channel fails with `ChannelError::Closed`.
    ///
    /// Returns `ChannelError::Superseded` when a newer frame replaced this one
    /// before it went out.
    async fn transmit(&self, frame: Frame) -> Result<(), ChannelError>;

    /// Transmits one frame, opening the channel first if needed.
    async fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.transmit(frame).await
    }

    /// Tears the connection down. A later `ensure_open` or `send` reopens it.
    fn close(&self);

    /// `true` while a connection (or request) is live.
    fn is_open(&self) -> bool;

    /// Waits until teardown started by `close` has finished.
    async fn closed(&self) {}
}

/// Builds the channel matching `destination`'s scheme family.
///
/// # Errors
/// `TransportDisabled` when the matching transport feature is off, or
/// `Transport` when the client cannot be built.
pub fn build_channel(
    destination: &Destination,
    options: &ReporterOptions,
) -> Result<Arc<dyn Channel>, ReporterError> {
    match destination.kind() {
        #[cfg(feature = "socket")]
        ChannelKind::Socket => Ok(Arc::new(SocketChannel::new(destination, options))),
        #[cfg(feature = "http")]
        ChannelKind::Http => Ok(Arc::new(HttpChannel::new(destination, options)?)),
        #[allow(unreachable_patterns)]
        _ => Err(ReporterError::TransportDisabled {
            scheme: destination.url().scheme().to_string(),
        }),
    }
}
