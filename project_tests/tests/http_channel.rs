use std::sync::Arc;
use std::time::Duration;

use lib_reporter::channels::HttpChannel;
use lib_reporter::{Channel, ChannelError, Destination, Frame, Payload, ReporterOptions};
use project_tests::CaptureServer;
use serde_json::json;

fn channel_for(url: &str) -> Arc<HttpChannel> {
    let destination = Destination::parse(url).expect("valid destination");
    Arc::new(HttpChannel::new(&destination, &ReporterOptions::default()).expect("client builds"))
}

fn frame(payload: impl Into<Payload>) -> Frame {
    Frame::encode(payload.into()).expect("encodes")
}

#[tokio::test]
async fn posts_carry_the_payload_content_type() {
    let server = CaptureServer::start().await.unwrap();
    let channel = channel_for(&server.http_url("/stats"));

    channel.send(frame("plain words")).await.unwrap();
    channel.send(frame(json!({"cpu": 0.5}))).await.unwrap();
    channel.send(frame(vec![0u8, 1, 2, 255])).await.unwrap();

    let posts = server.posts();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0].content_type, "text/plain");
    assert_eq!(posts[0].text(), "plain words");
    assert_eq!(posts[1].content_type, "application/json");
    assert_eq!(serde_json::from_slice::<serde_json::Value>(&posts[1].body).unwrap(), json!({"cpu": 0.5}));
    assert_eq!(posts[2].content_type, "application/octet-stream");
    assert_eq!(posts[2].body, vec![0u8, 1, 2, 255]);
    assert!(channel.is_open(), "the channel stays open between requests");
    channel.close();
    assert!(!channel.is_open());
}

#[tokio::test]
async fn newer_send_cancels_the_request_in_flight() {
    let server = CaptureServer::start().await.unwrap();
    let channel = channel_for(&server.http_url("/stats"));

    let first = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.send(frame("slow first")).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(channel.is_open());

    channel.send(frame("second")).await.unwrap();
    let first = first.await.unwrap();
    assert!(matches!(first, Err(ChannelError::Superseded)), "got {first:?}");

    let bodies: Vec<_> = server.posts().iter().map(|p| p.text()).collect();
    assert_eq!(bodies, vec!["second".to_string()]);
}

#[tokio::test]
async fn close_cancels_in_flight_and_channel_stays_usable() {
    let server = CaptureServer::start().await.unwrap();
    let channel = channel_for(&server.http_url("/stats"));

    let pending = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.send(frame("slow doomed")).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    channel.close();
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ChannelError::Closed)), "got {result:?}");
    assert!(!channel.is_open());

    channel.send(frame("after close")).await.unwrap();
    let bodies: Vec<_> = server.posts().iter().map(|p| p.text()).collect();
    assert_eq!(bodies, vec!["after close".to_string()]);
}

#[tokio::test]
async fn request_cancelled_by_close_reports_closed_even_if_a_send_follows() {
    let server = CaptureServer::start().await.unwrap();
    let channel = channel_for(&server.http_url("/stats"));

    let pending = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.send(frame("slow cut off")).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Close, then start the next request on this task before the cancelled
    // one gets a chance to wake up.
    channel.close();
    let (fresh, cut_off) = tokio::join!(channel.send(frame("fresh")), pending);

    fresh.unwrap();
    let cut_off = cut_off.unwrap();
    assert!(matches!(cut_off, Err(ChannelError::Closed)), "got {cut_off:?}");
}

#[tokio::test]
async fn transmit_never_opens_a_closed_channel() {
    let server = CaptureServer::start().await.unwrap();
    let channel = channel_for(&server.http_url("/stats"));

    let result = channel.transmit(frame("not yet")).await;
    assert!(matches!(result, Err(ChannelError::Closed)), "got {result:?}");

    channel.ensure_open().unwrap();
    channel.transmit(frame("now")).await.unwrap();
    let bodies: Vec<_> = server.posts().iter().map(|p| p.text()).collect();
    assert_eq!(bodies, vec!["now".to_string()]);
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = CaptureServer::start().await.unwrap();
    let channel = channel_for(&server.http_url("/status/500"));

    let result = channel.send(frame("anything")).await;
    assert!(matches!(result, Err(ChannelError::Status(500))), "got {result:?}");
}

#[tokio::test]
async fn request_timeout_is_reported() {
    let server = CaptureServer::start().await.unwrap();
    let destination = Destination::parse(&server.http_url("/stats")).unwrap();
    let options = ReporterOptions {
        request_timeout_ms: 200,
        ..ReporterOptions::default()
    };
    let channel = HttpChannel::new(&destination, &options).unwrap();

    let result = channel.send(frame("slow and late")).await;
    assert!(matches!(result, Err(ChannelError::Timeout(200))), "got {result:?}");
}
