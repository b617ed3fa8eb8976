//! # Reporting Session
//!
//! One session per reported source: a timer task that serializes the source
//! and pushes the frame through the reporter's shared channel.
//!
//! A session moves `Idle → Active → Stopped` exactly once. The stop is a
//! ticket held in a shared slot; whoever takes it first (the source's release
//! signal, the one-shot tick, or reporter shutdown) cancels the timer and
//! hands the session back to the registry. Later attempts find the slot empty.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::registry::{Registry, SessionId};
use super::source::StatsSource;
use crate::errors::{ChannelError, SourceError};
use crate::lock;
use crate::loggers::{ReportEvent, TickStage};
use crate::payload::Frame;

/// Observable lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, timer armed.
    Active,
    /// Stopped; no further ticks.
    Stopped,
}

/// The one-shot stop of a session.
pub(crate) struct StopTicket {
    pub(crate) id: SessionId,
    pub(crate) cancel: CancellationToken,
    pub(crate) registry: Weak<Registry>,
}

impl StopTicket {
    fn redeem(self) {
        self.cancel.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.finish(self.id);
        }
    }
}

/// Stops a session. Cloneable; only the first `release` across all clones
/// has an effect.
#[derive(Clone)]
pub struct ReleaseHandle {
    slot: Arc<Mutex<Option<StopTicket>>>,
}

impl ReleaseHandle {
    pub(crate) fn new(ticket: StopTicket) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(ticket))),
        }
    }

    /// Stops the session. Returns `true` if this call did it, `false` if it
    /// was already stopped.
    pub fn release(&self) -> bool {
        // Take first, redeem after: redeeming locks the registry.
        let ticket = lock(&self.slot).take();
        match ticket {
            Some(ticket) => {
                ticket.redeem();
                true
            }
            None => false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if lock(&self.slot).is_some() {
            SessionState::Active
        } else {
            SessionState::Stopped
        }
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle").field("state", &self.state()).finish()
    }
}

/// The per-source timer loop.
pub(crate) struct ReportingSession {
    pub(crate) id: SessionId,
    pub(crate) name: Arc<str>,
    pub(crate) source: Arc<dyn StatsSource>,
    pub(crate) frequency: Duration,
    pub(crate) registry: Arc<Registry>,
    pub(crate) release: ReleaseHandle,
    pub(crate) cancel: CancellationToken,
}

impl ReportingSession {
    /// Drives the session until it is stopped.
    ///
    /// A zero frequency ticks once, immediately, then releases itself. Any
    /// other frequency ticks once per period, first tick one period after
    /// start. A tick that is still running when the next is due makes the
    /// timer skip that beat rather than run two serializations of one source.
    pub(crate) async fn run(self) {
        if self.frequency.is_zero() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = self.tick() => {}
            }
            self.release.release();
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.frequency, self.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = self.tick() => {}
                    }
                }
            }
        }
        debug!(source = %self.name, "session timer cancelled");
    }

    /// One serialize-and-send attempt. Never fails outward.
    async fn tick(&self) {
        let source = self.name.to_string();
        let sink = &self.registry.sink;

        let payload = match self.source.serialize().await {
            Ok(payload) => payload,
            Err(SourceError::NotReady) => {
                trace!(source = %self.name, "source not ready, skipping tick");
                return;
            }
            Err(e) => {
                sink.record(ReportEvent::TickFailed {
                    source,
                    stage: TickStage::Serialize,
                    detail: e.to_string(),
                });
                return;
            }
        };

        // The source may have released itself while serializing.
        if self.cancel.is_cancelled() {
            trace!(source = %self.name, "session stopped during serialize, dropping sample");
            return;
        }

        let frame = match Frame::encode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                sink.record(ReportEvent::TickFailed {
                    source,
                    stage: TickStage::Encode,
                    detail: e.to_string(),
                });
                return;
            }
        };

        match self.registry.open_for(self.id) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                sink.record(ReportEvent::TickFailed {
                    source,
                    stage: TickStage::Transmit,
                    detail: e.to_string(),
                });
                return;
            }
        }

        let (content_type, bytes) = (frame.content_type(), frame.len());
        match self.registry.channel.transmit(frame).await {
            Ok(()) => sink.record(ReportEvent::Sent { source, content_type, bytes }),
            Err(e) if e.is_superseded() => sink.record(ReportEvent::Superseded { source }),
            Err(ChannelError::Closed) if self.cancel.is_cancelled() => {
                trace!(source = %self.name, "channel closed by this session's stop");
            }
            Err(e) => sink.record(ReportEvent::TickFailed {
                source,
                stage: TickStage::Transmit,
                detail: e.to_string(),
            }),
        }
    }
}
