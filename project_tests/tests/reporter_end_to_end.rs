use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lib_reporter::{
    ChannelKind, Payload, RecordingLogSink, ReportEvent, Reporter, ReporterError, SessionState, SourceError,
    SourceHooks, StatsSource,
};
use project_tests::{wait_until, CaptureServer, CapturedFrame};
use serde_json::json;

const SETTLE: Duration = Duration::from_secs(3);

struct Counter {
    name: String,
    ticks: AtomicUsize,
    binary: bool,
    hooks: Mutex<Option<SourceHooks>>,
}

impl Counter {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ticks: AtomicUsize::new(0),
            binary: false,
            hooks: Mutex::new(None),
        })
    }

    fn binary(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ticks: AtomicUsize::new(0),
            binary: true,
            hooks: Mutex::new(None),
        })
    }

    fn dispose(&self) -> bool {
        self.hooks.lock().unwrap().as_ref().map(|h| h.release()).unwrap_or(false)
    }
}

#[async_trait]
impl StatsSource for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn serialize(&self) -> Result<Payload, SourceError> {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.binary {
            Ok(Payload::Binary(vec![n as u8]))
        } else {
            Payload::structured(&json!({"source": self.name, "tick": n})).map_err(|e| SourceError::Failed(e.into()))
        }
    }

    fn attach(&self, hooks: SourceHooks) {
        *self.hooks.lock().unwrap() = Some(hooks);
    }
}

struct Greeting;

#[async_trait]
impl StatsSource for Greeting {
    fn name(&self) -> &str {
        "greeting"
    }

    async fn serialize(&self) -> Result<Payload, SourceError> {
        Ok(Payload::Text("hello".into()))
    }
}

/// Stops itself from inside `serialize`, as a source being disposed would.
#[derive(Default)]
struct LastWords {
    hooks: Mutex<Option<SourceHooks>>,
}

#[async_trait]
impl StatsSource for LastWords {
    fn name(&self) -> &str {
        "last-words"
    }

    async fn serialize(&self) -> Result<Payload, SourceError> {
        if let Some(hooks) = self.hooks.lock().unwrap().as_ref() {
            hooks.release();
        }
        Ok(Payload::Text("last".into()))
    }

    fn attach(&self, hooks: SourceHooks) {
        *self.hooks.lock().unwrap() = Some(hooks);
    }
}

#[tokio::test]
async fn one_shot_sources_post_each_payload_kind() {
    let server = CaptureServer::start().await.unwrap();
    let reporter = Reporter::new(&server.http_url("/stats")).unwrap();
    assert_eq!(reporter.channel_kind(), ChannelKind::Http);

    reporter.start_reporting(Arc::new(Greeting), Duration::ZERO).unwrap();
    reporter.wait_idle().await;
    reporter.start_reporting(Counter::new("json"), Duration::ZERO).unwrap();
    reporter.wait_idle().await;
    reporter.start_reporting(Counter::binary("bytes"), Duration::ZERO).unwrap();
    reporter.wait_idle().await;

    let posts = server.posts();
    let types: Vec<_> = posts.iter().map(|p| p.content_type.as_str()).collect();
    assert_eq!(types, vec!["text/plain", "application/json", "application/octet-stream"]);
    assert_eq!(posts[0].text(), "hello");
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&posts[1].body).unwrap(),
        json!({"source": "json", "tick": 1})
    );
    assert_eq!(posts[2].body, vec![1u8]);
    assert_eq!(reporter.reporting_count(), 0);
}

#[tokio::test]
async fn periodic_source_reports_until_released() {
    let server = CaptureServer::start().await.unwrap();
    let sink = Arc::new(RecordingLogSink::new());
    let reporter = Reporter::builder(&server.http_url("/stats"))
        .log_sink(sink.clone())
        .build()
        .unwrap();

    let source = Counter::new("periodic");
    let handle = reporter.start_reporting(source.clone(), Duration::from_millis(100)).unwrap();
    assert_eq!(reporter.reporting_count(), 1);

    assert!(wait_until(SETTLE, || server.posts().len() >= 3).await);
    assert!(source.dispose());
    assert_eq!(handle.state(), SessionState::Stopped);
    assert!(!handle.release(), "second release is a no-op");
    assert_eq!(reporter.reporting_count(), 0);

    let settled = server.posts().len();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(server.posts().len() <= settled + 1, "at most the in-flight post may land");
    assert_eq!(sink.count(|e| matches!(e, ReportEvent::Stopped { .. })), 1);
    assert_eq!(sink.count(|e| matches!(e, ReportEvent::ChannelClosed { .. })), 1);
}

#[tokio::test]
async fn socket_sources_share_one_connection_closed_by_the_last_release() {
    let server = CaptureServer::start().await.unwrap();
    let reporter = Reporter::new(&server.ws_url()).unwrap();
    assert_eq!(reporter.channel_kind(), ChannelKind::Socket);

    let a = Counter::new("alpha");
    let b = Counter::binary("beta");
    let ha = reporter.start_reporting(a.clone(), Duration::from_millis(100)).unwrap();
    let hb = reporter.start_reporting(b.clone(), Duration::from_millis(150)).unwrap();

    assert!(
        wait_until(SETTLE, || {
            let frames = server.frames();
            frames.iter().any(|f| matches!(f, CapturedFrame::Text(_)))
                && frames.iter().any(|f| matches!(f, CapturedFrame::Binary(_)))
        })
        .await
    );
    assert_eq!(server.connections(), 1);
    assert!(reporter.is_channel_open());

    assert!(ha.release());
    assert_eq!(reporter.reporting_count(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(reporter.is_channel_open(), "one session is still reporting");

    assert!(hb.release());
    reporter.shutdown().await;
    assert!(!reporter.is_channel_open());
    assert!(wait_until(SETTLE, || server.disconnects() == 1).await);
    assert_eq!(server.connections(), 1);

    // Reporting again reopens the channel.
    reporter.start_reporting(Arc::new(Greeting), Duration::ZERO).unwrap();
    reporter.wait_idle().await;
    assert!(wait_until(SETTLE, || server.connections() == 2).await);
    assert!(wait_until(SETTLE, || server.frames().contains(&CapturedFrame::Text("hello".into()))).await);
}

#[tokio::test]
async fn shutdown_stops_every_session() {
    let server = CaptureServer::start().await.unwrap();
    let reporter = Reporter::new(&server.ws_url()).unwrap();

    let handles: Vec<_> = (0..3)
        .map(|i| reporter.start_reporting(Counter::new(&format!("s{i}")), Duration::from_millis(50)).unwrap())
        .collect();
    assert!(wait_until(SETTLE, || !server.frames().is_empty()).await);

    reporter.shutdown().await;
    assert_eq!(reporter.reporting_count(), 0);
    assert!(handles.iter().all(|h| h.state() == SessionState::Stopped));
    assert!(!reporter.is_channel_open());
}

#[tokio::test]
async fn source_released_while_serializing_leaves_no_socket_behind() {
    let server = CaptureServer::start().await.unwrap();
    let reporter = Reporter::new(&server.ws_url()).unwrap();

    reporter
        .start_reporting(Arc::new(LastWords::default()), Duration::from_millis(50))
        .unwrap();
    assert!(wait_until(SETTLE, || reporter.reporting_count() == 0).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    reporter.shutdown().await;

    assert!(!reporter.is_channel_open());
    assert_eq!(server.connections(), 0);
    assert!(server.frames().is_empty());
}

#[test]
fn unsupported_scheme_is_rejected_at_construction() {
    let err = Reporter::new("ftp://example.com/stats").err().expect("must fail");
    assert!(matches!(err, ReporterError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));

    let err = Reporter::new("not a url").err().expect("must fail");
    assert!(matches!(err, ReporterError::InvalidUrl { .. }));
}
