//! # HTTP Channel
//!
//! One POST per frame to the destination URL, body = frame, `Content-Type` =
//! the frame's MIME type. At most one request is in flight: each send
//! allocates a fresh `CancellationToken` and cancels the previous one, so the
//! latest-issued request wins. `close` marks the request in flight as closed,
//! cancels it and frees its token; the next `ensure_open` makes the channel
//! usable again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Channel;
use crate::configs::ReporterOptions;
use crate::destination::{ChannelKind, Destination};
use crate::errors::{ChannelError, ReporterError};
use crate::lock;
use crate::payload::Frame;

#[derive(Clone)]
struct InFlight {
    id: u64,
    token: CancellationToken,
    // Set by `close` before it cancels, so the waiter knows why it woke.
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct State {
    open: bool,
    in_flight: Option<InFlight>,
}

/// Request-per-frame transport for `http://` and `https://` destinations.
pub struct HttpChannel {
    url: Url,
    client: reqwest::Client,
    request_timeout_ms: u64,
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl HttpChannel {
    /// Builds the underlying `reqwest::Client` with the configured timeout and
    /// user agent. No request is made.
    pub fn new(destination: &Destination, options: &ReporterOptions) -> Result<Self, ReporterError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout())
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(|e| ReporterError::Transport(e.to_string()))?;

        Ok(Self {
            url: destination.url().clone(),
            client,
            request_timeout_ms: options.request_timeout_ms,
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Registers a new in-flight request, cancelling the one it replaces.
    fn begin(&self) -> Result<InFlight, ChannelError> {
        let current = InFlight {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let previous = {
            let mut state = lock(&self.state);
            if !state.open {
                return Err(ChannelError::Closed);
            }
            state.in_flight.replace(current.clone())
        };
        if let Some(previous) = previous {
            debug!(url = %self.url, "cancelling previous in-flight request");
            previous.token.cancel();
        }
        Ok(current)
    }

    /// Frees the slot if `id` still owns it.
    fn finish(&self, id: u64) {
        let mut state = lock(&self.state);
        if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            state.in_flight = None;
        }
    }
}

#[async_trait]
impl Channel for HttpChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Http
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        // Connections are pooled by reqwest; a token is allocated per send.
        lock(&self.state).open = true;
        Ok(())
    }

    async fn transmit(&self, frame: Frame) -> Result<(), ChannelError> {
        let request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, frame.content_type().as_mime())
            .body(frame.into_bytes());
        let current = self.begin()?;

        let result = tokio::select! {
            _ = current.token.cancelled() => {
                return if current.closed.load(Ordering::SeqCst) {
                    Err(ChannelError::Closed)
                } else {
                    Err(ChannelError::Superseded)
                };
            }
            res = request.send() => match res {
                Ok(resp) if resp.status().is_success() => Ok(()),
                Ok(resp) => Err(ChannelError::Status(resp.status().as_u16())),
                Err(e) if e.is_timeout() => Err(ChannelError::Timeout(self.request_timeout_ms)),
                Err(e) => Err(ChannelError::Transport(e.to_string())),
            },
        };
        self.finish(current.id);
        result
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        state.open = false;
        if let Some(in_flight) = state.in_flight.take() {
            debug!(url = %self.url, "closing http channel, cancelling in-flight request");
            in_flight.closed.store(true, Ordering::SeqCst);
            in_flight.token.cancel();
        }
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }
}
