mod common;

use common::{FakeApi, MB};
use fw_watcher::formatting::format_rate;
use fw_watcher::speedtest::{Direction, Mode, SpeedEvent, SpeedTestEngine, SpeedTestError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Integration tests for speed-test sessions
/// Sessions run against the in-memory service so byte counts and timings are exact

#[tokio::test]
async fn test_single_mode_runs_one_round() {
    let api = Arc::new(FakeApi::new());
    let engine = SpeedTestEngine::new(api.clone());

    let session = engine
        .run_download(2, Mode::Single, &CancellationToken::new())
        .await
        .expect("download session failed");

    assert_eq!(session.trials.len(), 1);
    assert_eq!(session.trials[0].round_index, 1);
    assert_eq!(session.trials[0].bytes_transferred, 2 * MB as u64);
    assert_eq!(session.mean_rate(), None);
    assert!(session.is_complete());
    assert_eq!(api.calls(), vec!["download 2"]);
}

#[tokio::test]
async fn test_multi_mode_runs_five_rounds_with_mean() {
    let api = Arc::new(FakeApi::new());
    let engine = SpeedTestEngine::new(api.clone());

    let session = engine
        .run_upload(1, Mode::Multi, &CancellationToken::new())
        .await
        .expect("upload session failed");

    assert_eq!(session.trials.len(), 5);
    let indices: Vec<usize> = session.trials.iter().map(|t| t.round_index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    assert!(session.mean_rate().is_some());
    assert!(session.trials.iter().all(|t| t.rate.is_finite() && t.rate >= 0.0));
    assert_eq!(api.calls().len(), 5);
}

#[tokio::test]
async fn test_stop_during_round_one_keeps_its_result() {
    let stop = CancellationToken::new();
    let mut fake = FakeApi::new();
    // The user presses stop while round 1 is still transferring
    fake.stop_after_round = Some((1, stop.clone()));
    let api = Arc::new(fake);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let engine = SpeedTestEngine::new(api.clone()).with_events(events_tx);

    let session = engine
        .run(Direction::Download, 1, Mode::Multi, &stop)
        .await
        .expect("session should end normally when stopped");

    assert_eq!(session.trials.len(), 1);
    assert!(session.cancelled);
    assert_eq!(session.mean_rate(), None);
    assert_eq!(api.calls().len(), 1);
    assert_eq!(
        session.log_lines().last().map(String::as_str),
        Some("Stopped after 1 of 5 round(s)")
    );

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(SpeedEvent::RoundStarted { round: 1, of: 5, .. })));
    assert!(matches!(
        events.last(),
        Some(SpeedEvent::Stopped { completed: 1, .. })
    ));
}

#[tokio::test]
async fn test_stop_before_start_runs_nothing() {
    let api = Arc::new(FakeApi::new());
    let stop = CancellationToken::new();
    stop.cancel();

    let session = SpeedTestEngine::new(api.clone())
        .run_upload(1, Mode::Single, &stop)
        .await
        .expect("stopped session is not an error");

    assert!(session.trials.is_empty());
    assert!(session.cancelled);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_upload_rate_uses_server_received_count() {
    let mut fake = FakeApi::new();
    fake.upload_received = Some(10_485_760);
    let api = Arc::new(fake);

    let session = SpeedTestEngine::new(api.clone())
        .run_upload(20, Mode::Single, &CancellationToken::new())
        .await
        .expect("upload session failed");

    // 20 MB were generated and sent, the service only acknowledged 10 MB
    assert_eq!(api.calls(), vec![format!("upload {}", 20 * MB)]);
    assert_eq!(session.trials[0].bytes_transferred, 10_485_760);
    let expected = 10_485_760.0 / session.trials[0].elapsed.as_secs_f64().max(0.001);
    assert!((session.trials[0].rate - expected).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_download_rate_over_two_seconds() {
    let mut fake = FakeApi::new();
    fake.transfer_time = Duration::from_secs(2);
    let api = Arc::new(fake);

    let session = SpeedTestEngine::new(api)
        .run_download(20, Mode::Single, &CancellationToken::new())
        .await
        .expect("download session failed");

    let trial = &session.trials[0];
    assert_eq!(trial.bytes_transferred, 20 * MB as u64);
    assert_eq!(trial.elapsed, Duration::from_secs(2));
    assert_eq!(format_rate(trial.rate), "10.00 MB/s");
    assert_eq!(trial.to_string(), "Round 1: 10.00 MB/s (20.0 MB / 2.00 s)");
}

#[tokio::test]
async fn test_failed_round_aborts_and_keeps_completed_rounds() {
    let mut fake = FakeApi::new();
    fake.fail_speed_round = Some(3);
    let api = Arc::new(fake);

    let err = SpeedTestEngine::new(api.clone())
        .run_download(1, Mode::Multi, &CancellationToken::new())
        .await
        .expect_err("round 3 should fail the session");

    match &err {
        SpeedTestError::RoundFailed {
            direction, round, ..
        } => {
            assert_eq!(*direction, Direction::Download);
            assert_eq!(*round, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    let completed = err.completed().expect("partial results");
    assert_eq!(completed.trials.len(), 2);
    // No retry and no further rounds
    assert_eq!(api.calls().len(), 3);
    assert!(err.to_string().contains("download test failed in round 3"));
}

#[tokio::test]
async fn test_invalid_size_is_rejected_without_requests() {
    let api = Arc::new(FakeApi::new());
    let engine = SpeedTestEngine::new(api.clone());

    for size in [0, 201] {
        let err = engine
            .run_download(size, Mode::Single, &CancellationToken::new())
            .await
            .expect_err("size outside 1..=200 must be rejected");
        assert!(matches!(err, SpeedTestError::Rejected(ref e) if e.is_validation()));
        assert!(err.completed().is_none());
    }
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_configured_multi_round_count() {
    let api = Arc::new(FakeApi::new());
    let session = SpeedTestEngine::new(api)
        .with_multi_rounds(3)
        .run_download(1, Mode::Multi, &CancellationToken::new())
        .await
        .expect("download session failed");
    assert_eq!(session.trials.len(), 3);
    assert_eq!(session.planned_rounds, 3);
}
