//! # WebSocket Channel
//!
//! One persistent connection per reporter. A background task owns the
//! connection and a single-slot outbox; `transmit` drops its frame into the
//! slot and waits for the task to report the write result.
//!
//! The slot holds at most one frame. A send that finds an unwritten frame in
//! it replaces that frame, and the replaced caller gets
//! `ChannelError::Superseded`. When the connection dies every waiting caller
//! gets an error and the outbox is discarded with the connection, so a
//! reconnect never flushes a backlog.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Channel;
use crate::configs::ReporterOptions;
use crate::destination::{ChannelKind, Destination};
use crate::errors::ChannelError;
use crate::lock;
use crate::payload::Frame;

type SendResult = Result<(), ChannelError>;

struct Pending {
    message: Message,
    done: oneshot::Sender<SendResult>,
}

#[derive(Default)]
struct Slot {
    pending: Option<Pending>,
    closed: bool,
}

/// Single-slot mailbox between `send` callers and the connection task.
#[derive(Default)]
struct Outbox {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl Outbox {
    /// Puts `pending` in the slot, superseding whatever was waiting there.
    fn push(&self, pending: Pending) -> SendResult {
        let stale = {
            let mut slot = lock(&self.slot);
            if slot.closed {
                return Err(ChannelError::Closed);
            }
            slot.pending.replace(pending)
        };
        if let Some(stale) = stale {
            debug!("discarding unsent frame in favour of a newer one");
            let _ = stale.done.send(Err(ChannelError::Superseded));
        }
        self.notify.notify_one();
        Ok(())
    }

    fn take(&self) -> Option<Pending> {
        lock(&self.slot).pending.take()
    }

    /// Marks the outbox dead and fails the frame still waiting, if any.
    fn shut(&self, reason: ChannelError) {
        let stale = {
            let mut slot = lock(&self.slot);
            slot.closed = true;
            slot.pending.take()
        };
        if let Some(stale) = stale {
            let _ = stale.done.send(Err(reason));
        }
    }
}

struct Connection {
    outbox: Arc<Outbox>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Persistent WebSocket transport for `ws://` and `wss://` destinations.
pub struct SocketChannel {
    url: String,
    user_agent: String,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    closing: Mutex<Vec<JoinHandle<()>>>,
}

impl SocketChannel {
    /// Creates a closed channel; the first `send` connects.
    pub fn new(destination: &Destination, options: &ReporterOptions) -> Self {
        Self {
            url: destination.as_str().to_string(),
            user_agent: options.user_agent.clone(),
            connect_timeout: options.connect_timeout(),
            connection: Mutex::new(None),
            closing: Mutex::new(Vec::new()),
        }
    }

    fn outbox(&self) -> Option<Arc<Outbox>> {
        lock(&self.connection)
            .as_ref()
            .filter(|conn| conn.is_alive())
            .map(|conn| Arc::clone(&conn.outbox))
    }
}

#[async_trait]
impl Channel for SocketChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Socket
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        let mut connection = lock(&self.connection);
        if connection.as_ref().is_some_and(Connection::is_alive) {
            return Ok(());
        }
        if let Some(dead) = connection.take() {
            dead.outbox.shut(ChannelError::Closed);
        }

        let outbox = Arc::new(Outbox::default());
        let cancel = CancellationToken::new();
        info!(url = %self.url, "opening socket channel");
        let task = tokio::spawn(run_connection(
            self.url.clone(),
            self.user_agent.clone(),
            self.connect_timeout,
            Arc::clone(&outbox),
            cancel.clone(),
        ));
        *connection = Some(Connection { outbox, cancel, task });
        Ok(())
    }

    async fn transmit(&self, frame: Frame) -> Result<(), ChannelError> {
        let outbox = self.outbox().ok_or(ChannelError::Closed)?;

        let message = match frame {
            Frame::Text { body, .. } => Message::Text(body.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        };
        let (done, result) = oneshot::channel();
        outbox.push(Pending { message, done })?;

        result.await.unwrap_or(Err(ChannelError::Closed))
    }

    fn close(&self) {
        if let Some(conn) = lock(&self.connection).take() {
            info!(url = %self.url, "closing socket channel");
            conn.cancel.cancel();
            let mut closing = lock(&self.closing);
            closing.retain(|task| !task.is_finished());
            closing.push(conn.task);
        }
    }

    fn is_open(&self) -> bool {
        lock(&self.connection).as_ref().is_some_and(Connection::is_alive)
    }

    async fn closed(&self) {
        let tasks: Vec<_> = lock(&self.closing).drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn run_connection(
    url: String,
    user_agent: String,
    connect_timeout: Duration,
    outbox: Arc<Outbox>,
    cancel: CancellationToken,
) {
    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            outbox.shut(ChannelError::Connect { url, reason: e.to_string() });
            return;
        }
    };
    if let Ok(value) = HeaderValue::from_str(&user_agent) {
        request.headers_mut().insert(USER_AGENT, value);
    }

    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            outbox.shut(ChannelError::Closed);
            return;
        }
        res = tokio::time::timeout(connect_timeout, connect_async(request)) => res,
    };
    let ws_stream = match connected {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            warn!(url = %url, error = %e, "socket channel failed to connect");
            outbox.shut(ChannelError::Connect { url, reason: e.to_string() });
            return;
        }
        Err(_) => {
            let ms = connect_timeout.as_millis() as u64;
            warn!(url = %url, timeout_ms = ms, "socket channel connect timed out");
            outbox.shut(ChannelError::Timeout(ms));
            return;
        }
    };
    info!(url = %url, "socket channel connected");

    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                outbox.shut(ChannelError::Closed);
                let _ = write.send(Message::Close(None)).await;
                let _ = write.close().await;
                debug!(url = %url, "socket channel torn down");
                return;
            }
            _ = outbox.notify.notified() => {
                while let Some(pending) = outbox.take() {
                    let result = write
                        .send(pending.message)
                        .await
                        .map_err(|e| ChannelError::Transport(e.to_string()));
                    let failed = result.is_err();
                    let _ = pending.done.send(result);
                    if failed {
                        warn!(url = %url, "socket write failed, dropping connection");
                        outbox.shut(ChannelError::Closed);
                        return;
                    }
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    warn!(url = %url, "socket channel closed by remote host");
                    break;
                }
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "socket channel read error");
                    break;
                }
                // Pings are answered by tungstenite on the next flush.
                Some(Ok(_)) => {}
            }
        }
    }
    outbox.shut(ChannelError::Closed);
}
