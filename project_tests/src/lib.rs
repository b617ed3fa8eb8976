//! Shared fixtures for the integration tests: a local capture server that
//! accepts both transports, plus listeners that misbehave on purpose.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

/// Bodies starting with this prefix are held by the server before answering.
pub const SLOW_PREFIX: &str = "slow";
/// How long a slow body is held.
pub const SLOW_DELAY: Duration = Duration::from_millis(1500);

/// One completed POST.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPost {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl CapturedPost {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One WebSocket message received by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedFrame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Default)]
struct Captured {
    posts: Mutex<Vec<CapturedPost>>,
    frames: Mutex<Vec<CapturedFrame>>,
    connections: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Local HTTP + WebSocket server recording everything it receives.
///
/// Routes: `POST /stats` (records on completion), `POST /status/500`
/// (always fails), `GET /ws` (WebSocket, records text and binary frames).
pub struct CaptureServer {
    addr: SocketAddr,
    captured: Arc<Captured>,
    task: tokio::task::JoinHandle<()>,
}

impl CaptureServer {
    pub async fn start() -> anyhow::Result<Self> {
        let captured = Arc::new(Captured::default());
        let app = Router::new()
            .route("/stats", post(capture_post))
            .route("/status/500", post(always_fail))
            .route("/ws", get(upgrade))
            .with_state(Arc::clone(&captured));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, captured, task })
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn posts(&self) -> Vec<CapturedPost> {
        self.captured.posts.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Vec<CapturedFrame> {
        self.captured.frames.lock().unwrap().clone()
    }

    /// WebSocket connections accepted so far.
    pub fn connections(&self) -> usize {
        self.captured.connections.load(Ordering::SeqCst)
    }

    /// WebSocket connections that have ended.
    pub fn disconnects(&self) -> usize {
        self.captured.disconnects.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn capture_post(State(captured): State<Arc<Captured>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if body.starts_with(SLOW_PREFIX.as_bytes()) {
        tokio::time::sleep(SLOW_DELAY).await;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    captured.posts.lock().unwrap().push(CapturedPost {
        content_type,
        body: body.to_vec(),
    });
    StatusCode::OK
}

async fn always_fail() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn upgrade(ws: WebSocketUpgrade, State(captured): State<Arc<Captured>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| record_socket(socket, captured))
}

async fn record_socket(mut socket: WebSocket, captured: Arc<Captured>) {
    captured.connections.fetch_add(1, Ordering::SeqCst);
    while let Some(Ok(msg)) = socket.recv().await {
        let frame = match msg {
            Message::Text(text) => CapturedFrame::Text(text.as_str().to_string()),
            Message::Binary(bytes) => CapturedFrame::Binary(bytes.to_vec()),
            Message::Close(_) => break,
            _ => continue,
        };
        captured.frames.lock().unwrap().push(frame);
    }
    captured.disconnects.fetch_add(1, Ordering::SeqCst);
}

/// Accepts TCP connections and never answers, so handshakes hang.
pub async fn black_hole() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Ok(addr)
}

/// An address nothing listens on.
pub async fn refused_addr() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Polls `condition` every 10 ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
