use std::fs;
use std::time::Duration;

use lib_reporter::loggers::subscriber::{init_tracing, LoggingSetup};
use lib_reporter::{LogSink, ReportEvent, TracingLogSink};
use tempfile::tempdir;

#[test]
fn reporter_events_land_in_the_log_file() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let log_dir = temp_dir.path().join("logs");
    fs::create_dir_all(&log_dir).unwrap();
    fs::write(log_dir.join("e2e_20000101_000000.log"), b"old").unwrap();

    let setup = LoggingSetup {
        app_name: "e2e".to_string(),
        log_dir: log_dir.clone(),
        log_level: "info".to_string(),
        json: false,
        keep_files: 0,
    };
    let guard = init_tracing(&setup).expect("subscriber installs");

    let sink = TracingLogSink;
    sink.record(ReportEvent::Started {
        source: "cpu".to_string(),
        frequency: Duration::from_secs(5),
    });
    sink.record(ReportEvent::SourceError {
        source: "cpu".to_string(),
        detail: "sensor offline".to_string(),
    });
    drop(guard);

    let files: Vec<_> = fs::read_dir(&log_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    assert_eq!(files.len(), 1, "old log file should have been cleaned up");

    let contents = fs::read_to_string(&files[0]).unwrap();
    assert!(contents.contains("start reporting every 5 seconds"), "log was: {contents}");
    assert!(contents.contains("sensor offline"), "log was: {contents}");

    assert!(init_tracing(&setup).is_err(), "a second global subscriber is refused");
}
