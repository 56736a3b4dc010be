//! Transport behaviour against a scripted CI service
//!
//! The tokio clock is paused, so every sleep between polls completes
//! instantly and the number of remote calls per operation is exact.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use allhw_transport::{
    CiConfig, CiTransport, ConfigOverrides, MockTaskService, TaskStatus, TransportError,
};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

const FIRMWARE: &[u8] = b":10000000DEADBEEF\n:00000001FF\n";

// =============================================================================
// Helpers
// =============================================================================

fn firmware_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(FIRMWARE).unwrap();
    file
}

fn open_transport(
    mock: &Arc<MockTaskService>,
    firmware: &NamedTempFile,
) -> CiTransport<Arc<MockTaskService>> {
    let mut transport = CiTransport::with_service(CiConfig::default(), mock.clone());
    transport
        .flash(&ConfigOverrides {
            firmware: Some(firmware.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
    transport.open(&ConfigOverrides::default()).unwrap();
    transport
}

fn secs(s: f64) -> Option<Duration> {
    Some(Duration::from_secs_f64(s))
}

// =============================================================================
// Read side
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_round_trip_first_poll() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b"result=42"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    transport.write(b"input", secs(1.0)).await.unwrap();
    let out = transport.read(9, secs(1.0)).await.unwrap();

    assert_eq!(out, b"result=42");
    assert_eq!(mock.status_queries(), vec!["task-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_short_read_at_end_of_stream() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b"abc"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    transport.write(b"x", None).await.unwrap();
    let out = transport.read(10, secs(5.0)).await.unwrap();
    assert_eq!(out, b"abc");
}

#[tokio::test(start_paused = true)]
async fn test_oversized_read_request_returns_what_exists() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b"abc"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    transport.write(b"x", None).await.unwrap();
    let out = transport.read(usize::MAX, secs(1.0)).await.unwrap();
    assert_eq!(out, b"abc");
}

#[tokio::test(start_paused = true)]
async fn test_finished_without_output_times_out() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished_without_output());
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    transport.write(b"x", None).await.unwrap();
    let err = transport.read(1, None).await.unwrap_err();
    assert!(err.is_timeout());
    // Finished is known after one poll; no further requests are made
    assert_eq!(mock.status_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_finished_with_empty_output_times_out() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b""));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    transport.write(b"x", None).await.unwrap();
    assert!(transport.read(4, secs(1.0)).await.unwrap_err().is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_reads_never_exceed_request() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b"hello world!"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();

    let mut chunks = Vec::new();
    for _ in 0..4 {
        chunks.push(transport.read(3, secs(1.0)).await.unwrap());
    }
    assert_eq!(
        chunks,
        vec![b"hel".to_vec(), b"lo ".to_vec(), b"wor".to_vec(), b"ld!".to_vec()]
    );
    assert!(transport.read(3, secs(1.0)).await.unwrap_err().is_timeout());
    assert_eq!(mock.status_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_accumulate_across_polls() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::running());
    mock.push_status(TaskStatus::running_with_output(b"hel"));
    mock.push_status(TaskStatus::finished(b"hello world"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();

    assert_eq!(transport.read(5, None).await.unwrap(), b"hello");
    assert_eq!(mock.status_count(), 3);
    assert!(transport.session().is_finished());

    // Remainder is served from the final snapshot without polling again
    assert_eq!(transport.read(100, None).await.unwrap(), b" world");
    assert_eq!(mock.status_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_status_is_ignored() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_malformed_status("unexpected EOF");
    mock.push_malformed_status("not json");
    mock.push_status(TaskStatus::finished(b"ok"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();

    assert_eq!(transport.read(2, secs(10.0)).await.unwrap(), b"ok");
    assert_eq!(mock.status_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_output_still_latches_finished() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus {
        status: "finished".into(),
        output: Some("%%%".into()),
    });
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();

    assert!(transport.read(1, None).await.unwrap_err().is_timeout());
    assert!(transport.session().is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_is_bounded() {
    let mock = Arc::new(MockTaskService::new());
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();

    mock.set_unavailable(true);
    let err = transport.read(1, secs(0.1)).await.unwrap_err();
    assert!(matches!(err, TransportError::IoTimeout { operation: "read" }));
    // One poll at entry, one after the 500ms sleep, then the deadline has passed
    assert_eq!(mock.status_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_read_keeps_partial_bytes() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::running_with_output(b"ab"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();

    assert!(transport.read(5, secs(1.0)).await.unwrap_err().is_timeout());
    assert_eq!(transport.session().cursor(), 0);

    mock.push_status(TaskStatus::finished(b"abcde"));
    assert_eq!(transport.read(5, secs(5.0)).await.unwrap(), b"abcde");
}

#[tokio::test(start_paused = true)]
async fn test_read_before_write_is_usage_error() {
    let mock = Arc::new(MockTaskService::new());
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    let err = transport.read(1, None).await.unwrap_err();
    assert!(matches!(err, TransportError::Usage(_)));
    assert_eq!(mock.status_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_read_after_close_is_closed_error() {
    let mock = Arc::new(MockTaskService::new());
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();
    transport.close();

    let err = transport.read(1, None).await.unwrap_err();
    assert!(matches!(err, TransportError::Closed));
}

// =============================================================================
// Write side
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_write_submits_firmware_input_and_params() {
    let mock = Arc::new(MockTaskService::new());
    let fw = firmware_file();
    let mut transport = CiTransport::with_service(
        CiConfig::builder("http://ci.test/usertask").api_key("secret").build(),
        mock.clone(),
    );
    transport
        .flash(&ConfigOverrides {
            firmware: Some(fw.path().to_path_buf()),
            task_timeout: Some(45),
            ..Default::default()
        })
        .unwrap();
    transport
        .open(&ConfigOverrides {
            rate: Some(9600),
            log: Some(true),
            ..Default::default()
        })
        .unwrap();

    transport.write(b"\x01\x02payload", secs(1.0)).await.unwrap();
    assert_eq!(transport.task_id(), Some("task-1"));

    let submissions = mock.submissions();
    assert_eq!(submissions.len(), 1);
    let request = &submissions[0];
    assert_eq!(request.endpoint.as_str(), "http://ci.test/usertask");
    assert_eq!(request.firmware, FIRMWARE);
    assert_eq!(request.input, b"\x01\x02payload");
    assert_eq!(request.params.version, "V3");
    assert_eq!(request.params.rate, 9600);
    assert!(request.params.log);
    assert_eq!(request.params.timeout, 45);
    assert_eq!(request.params.key.as_deref(), Some("secret"));
    assert!(request.params.binary);
}

#[tokio::test(start_paused = true)]
async fn test_write_retries_until_accepted() {
    let mock = Arc::new(MockTaskService::new());
    mock.fail_submissions(3);
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    transport.write(b"x", None).await.unwrap();
    assert_eq!(mock.submit_attempts(), 4);
    assert_eq!(transport.task_id(), Some("task-1"));
}

#[tokio::test(start_paused = true)]
async fn test_write_timeout_is_bounded() {
    let mock = Arc::new(MockTaskService::new());
    mock.set_unavailable(true);
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    let err = transport.write(b"x", secs(0.1)).await.unwrap_err();
    assert!(matches!(err, TransportError::IoTimeout { operation: "write" }));
    assert_eq!(mock.submit_attempts(), 2);
    assert!(transport.task_id().is_none());

    // No task was recorded, so reading is still a usage error
    assert!(matches!(
        transport.read(1, secs(0.1)).await,
        Err(TransportError::Usage(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_tries_once_more() {
    let mock = Arc::new(MockTaskService::new());
    mock.set_unavailable(true);
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    // Zero is an ordinary deadline, not a non-blocking mode
    assert!(transport.write(b"x", secs(0.0)).await.unwrap_err().is_timeout());
    assert_eq!(mock.submit_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_write_starts_fresh_task() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b"first"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    transport.write(b"one", None).await.unwrap();
    assert_eq!(transport.read(2, None).await.unwrap(), b"fi");
    assert!(transport.session().is_finished());

    transport.write(b"two", None).await.unwrap();
    assert_eq!(transport.task_id(), Some("task-2"));
    assert!(transport.is_open());
    assert!(!transport.session().is_finished());
    assert_eq!(transport.session().cursor(), 0);
    assert!(transport.session().buffer().is_empty());

    let inputs: Vec<Vec<u8>> = mock.submissions().into_iter().map(|r| r.input).collect();
    assert_eq!(inputs, vec![b"one".to_vec(), b"two".to_vec()]);

    // Reads now follow the second task
    transport.read(5, None).await.unwrap();
    assert_eq!(mock.status_queries().last().map(String::as_str), Some("task-2"));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_write_while_closed() {
    let mock = Arc::new(MockTaskService::new());
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.close();

    let err = transport.write(b"x", None).await.unwrap_err();
    assert!(matches!(err, TransportError::Closed));
    assert_eq!(mock.submit_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b"data"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();
    transport.read(2, None).await.unwrap();

    transport.close();
    let after_first = transport.session().clone();
    transport.close();
    transport.close();
    assert_eq!(transport.session(), &after_first);
    assert!(transport.task_id().is_none());
    assert!(transport.session().buffer().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_finished_clears_only_on_reopen() {
    let mock = Arc::new(MockTaskService::new());
    mock.push_status(TaskStatus::finished(b"z"));
    let fw = firmware_file();
    let mut transport = open_transport(&mock, &fw);
    transport.write(b"x", None).await.unwrap();
    transport.read(1, None).await.unwrap();
    assert!(transport.session().is_finished());

    let _ = transport.read(1, secs(0.5)).await;
    assert!(transport.session().is_finished());

    transport.close();
    transport.open(&ConfigOverrides::default()).unwrap();
    assert!(!transport.session().is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_reflash_after_close() {
    let mock = Arc::new(MockTaskService::new());
    let fw = firmware_file();
    let other = firmware_file();
    let mut transport = open_transport(&mock, &fw);

    let reflash = ConfigOverrides {
        firmware: Some(other.path().to_path_buf()),
        ..Default::default()
    };
    assert!(matches!(
        transport.flash(&reflash),
        Err(TransportError::Usage(_))
    ));

    transport.close();
    transport.flash(&reflash).unwrap();
    assert_eq!(transport.firmware(), Some(other.path()));
}
