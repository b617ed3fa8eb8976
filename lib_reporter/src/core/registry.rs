//! # Session Registry
//!
//! The single owner of the active-session count. Sessions never touch the
//! count; they hand their stop ticket back here, and the registry decides,
//! under one lock, whether the shared channel must close. Opening the channel
//! for a tick goes through the same lock, so a stopped session cannot reopen
//! it. The log sink is only called after that lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::session::{ReleaseHandle, StopTicket};
use crate::channels::Channel;
use crate::destination::Destination;
use crate::errors::ChannelError;
use crate::lock;
use crate::loggers::{LogSink, ReportEvent};

/// Identifies a session within one reporter.
pub(crate) type SessionId = u64;

struct SessionEntry {
    source: Arc<str>,
    release: ReleaseHandle,
}

#[derive(Default)]
struct SessionTable {
    next_id: SessionId,
    active: HashMap<SessionId, SessionEntry>,
}

pub(crate) struct Registry {
    pub(crate) destination: Destination,
    pub(crate) channel: Arc<dyn Channel>,
    pub(crate) sink: Arc<dyn LogSink>,
    sessions: Mutex<SessionTable>,
    count: watch::Sender<usize>,
}

impl Registry {
    pub(crate) fn new(destination: Destination, channel: Arc<dyn Channel>, sink: Arc<dyn LogSink>) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            destination,
            channel,
            sink,
            sessions: Mutex::new(SessionTable::default()),
            count,
        }
    }

    /// Adds a session and returns its id, release signal and timer token.
    pub(crate) fn register(
        self: &Arc<Self>,
        source: Arc<str>,
        frequency: Duration,
    ) -> (SessionId, ReleaseHandle, CancellationToken) {
        let cancel = CancellationToken::new();
        let (id, release) = {
            let mut table = lock(&self.sessions);
            let id = table.next_id;
            table.next_id += 1;

            let release = ReleaseHandle::new(StopTicket {
                id,
                cancel: cancel.clone(),
                registry: Arc::downgrade(self),
            });
            table.active.insert(
                id,
                SessionEntry {
                    source: Arc::clone(&source),
                    release: release.clone(),
                },
            );
            self.count.send_replace(table.active.len());
            (id, release)
        };
        // Sinks run unlocked; they may call back into the reporter.
        self.sink.record(ReportEvent::Started {
            source: source.to_string(),
            frequency,
        });
        (id, release, cancel)
    }

    /// Opens the channel on behalf of session `id`. Returns `false`, leaving
    /// the channel alone, once that session has stopped.
    ///
    /// Runs under the session lock, so it cannot reopen a channel that the
    /// session's own stop has just closed.
    pub(crate) fn open_for(&self, id: SessionId) -> Result<bool, ChannelError> {
        let table = lock(&self.sessions);
        if !table.active.contains_key(&id) {
            return Ok(false);
        }
        self.channel.ensure_open()?;
        Ok(true)
    }

    /// Terminal stop of session `id`. Closes the channel when it was the last.
    /// Unknown ids are ignored.
    pub(crate) fn finish(&self, id: SessionId) {
        let (source, channel_closed) = {
            let mut table = lock(&self.sessions);
            let Some(entry) = table.active.remove(&id) else {
                return;
            };
            let last = table.active.is_empty();
            if last {
                self.channel.close();
            }
            self.count.send_replace(table.active.len());
            (entry.source, last)
        };
        self.sink.record(ReportEvent::Stopped {
            source: source.to_string(),
        });
        if channel_closed {
            self.sink.record(ReportEvent::ChannelClosed {
                url: self.destination.as_str().to_string(),
            });
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        lock(&self.sessions).active.len()
    }

    /// Release signals of every active session, for shutdown.
    pub(crate) fn release_handles(&self) -> Vec<ReleaseHandle> {
        lock(&self.sessions)
            .active
            .values()
            .map(|entry| entry.release.clone())
            .collect()
    }

    pub(crate) fn watch_count(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }
}
