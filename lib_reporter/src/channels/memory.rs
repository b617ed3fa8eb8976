//! # Memory Channel
//!
//! Keeps every frame it is given and counts opens and closes. Used by the
//! reporter's own tests and by binaries running in dry-run mode.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::Channel;
use crate::destination::ChannelKind;
use crate::errors::ChannelError;
use crate::lock;
use crate::payload::Frame;

/// An in-process channel that records frames instead of sending them.
pub struct MemoryChannel {
    kind: ChannelKind,
    open: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_sends: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    frames: Mutex<Vec<Frame>>,
}

impl MemoryChannel {
    /// A closed channel reporting itself as `kind`.
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            open: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            send_delay: Mutex::new(None),
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Makes every following `send` fail with a transport error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Makes every following `send` take `delay` before recording.
    pub fn set_send_delay(&self, delay: Option<Duration>) {
        *lock(&self.send_delay) = delay;
    }

    /// Frames recorded so far, oldest first.
    pub fn frames(&self) -> Vec<Frame> {
        lock(&self.frames).clone()
    }

    /// Number of closed → open transitions.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of `close` calls, whether or not the channel was open.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if !self.open.swap(true, Ordering::SeqCst) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn transmit(&self, frame: Frame) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let delay = *lock(&self.send_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            if !self.is_open() {
                return Err(ChannelError::Closed);
            }
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Transport("injected send failure".to_string()));
        }
        lock(&self.frames).push(frame);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
