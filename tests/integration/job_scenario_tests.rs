/*!
 * End-to-end job scenarios against the mock gateway
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use srtweave::app_config::{BatchConfig, JobOptions};
use srtweave::errors::JobError;
use srtweave::job::{ChannelSink, CoordinatorSettings, JobCoordinator, JobEvent, JobStatus, Stage};
use srtweave::providers::mock::{MockBehavior, MockGateway};
use srtweave::translation::BatchStatus;
use crate::common;

const WAIT: Duration = Duration::from_secs(10);

fn single_thread_options() -> JobOptions {
    JobOptions {
        threads: 1,
        ..common::test_options()
    }
}

/// Test cancelling a job after its first batch finished
#[tokio::test]
async fn test_cancelJob_afterFirstBatch_shouldKeepDoneCuesAndWriteNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::new(MockBehavior::Slow { delay_ms: 200 });
    let (sink, mut events) = ChannelSink::new();
    let settings = CoordinatorSettings::default().with_output_dir(temp_dir.path());
    let coordinator = JobCoordinator::with_gateway(settings, Arc::new(gateway.clone()), Arc::new(sink));

    let file = coordinator.import_bytes(temp_dir.path().join("show.srt"), common::numbered_srt(10).as_bytes())?;
    let job = coordinator.create_job(&file.id, single_thread_options())?;
    coordinator.start_job(&job.id)?;

    // Wait for batch 1 to finish
    timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            if let JobEvent::BatchStatus(info) = &event {
                if info.batch_no == 1 && info.status == BatchStatus::Done {
                    break;
                }
            }
        }
    })
    .await?;

    coordinator.cancel_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Cancelled);
    assert_eq!(finished.done_cues, 4);
    assert!(finished.output_path.is_none());
    assert!(finished.finished_at.is_some());

    // Let the in-flight batch drain, then check nothing else happened
    tokio::time::sleep(Duration::from_millis(400)).await;
    let mut rest = Vec::new();
    while let Ok(event) = events.try_recv() {
        rest.push(event);
    }
    assert!(rest.iter().all(|e| !matches!(e, JobEvent::Finished { .. } | JobEvent::Error { .. })));
    assert!(rest.iter().any(|e| matches!(e, JobEvent::Progress(p) if p.stage == Stage::Cancelled)));
    assert!(gateway.request_count() <= 2);
    assert_eq!(coordinator.get_job(&job.id)?.done_cues, 4);
    assert!(!temp_dir.path().join("show.translated.fr.srt").exists());

    // A cancelled job cannot be restarted
    assert!(matches!(
        coordinator.start_job(&job.id),
        Err(JobError::InvalidState { operation: "start", .. })
    ));
    Ok(())
}

/// Test that cancelling during a backoff sleep stops the batch without another request
#[tokio::test]
async fn test_cancelJob_duringBackoff_shouldNotCallGatewayAgain() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::failing();
    let (coordinator, _sink) = common::test_coordinator(Arc::new(gateway.clone()), temp_dir.path());

    let file = coordinator.import_bytes(temp_dir.path().join("show.srt"), common::numbered_srt(2).as_bytes())?;
    let options = JobOptions {
        max_retries: 5,
        min_delay_ms: 5_000,
        ..single_thread_options()
    };
    let job = coordinator.create_job(&file.id, options)?;
    coordinator.start_job(&job.id)?;

    // First attempt fails, then the batch sleeps for 5s
    timeout(WAIT, async {
        while gateway.request_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    coordinator.cancel_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;
    assert_eq!(finished.status, JobStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.request_count(), 1);
    let batches = coordinator.get_batches(&job.id)?;
    assert_eq!(batches[0].attempts, 1);
    Ok(())
}

/// Test that one failing batch below the ratio still produces output
#[tokio::test]
async fn test_partialFailure_shouldFinishWithSourceTextForFailedCues() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::new(MockBehavior::FailBatches { marker: "Line 9" });
    let (coordinator, sink) = common::test_coordinator(Arc::new(gateway), temp_dir.path());

    let file = coordinator.import_bytes(temp_dir.path().join("show.srt"), common::numbered_srt(10).as_bytes())?;
    let options = JobOptions {
        max_retries: 5,
        ..common::test_options()
    };
    let job = coordinator.create_job(&file.id, options)?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Done);
    assert_eq!(finished.failed_batches, 1);
    assert_eq!(finished.done_cues, 8);

    let batches = coordinator.get_batches(&job.id)?;
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[2].status, BatchStatus::Error);
    assert_eq!(batches[2].attempts, 6);
    assert!(batches[2].error_msg.as_deref().is_some_and(|m| m.contains("503")));
    assert!(batches[..2].iter().all(|b| b.status == BatchStatus::Done && b.attempts == 1));

    let output_path = finished.output_path.expect("output path");
    let output = fs::read_to_string(&output_path)?;
    assert!(output.contains("[French] Line 0\n"));
    assert!(output.contains("[French] Line 7\n"));
    assert!(output.contains("\nLine 8\n"));
    assert!(output.contains("\nLine 9\n"));

    let events = sink.events();
    assert!(events.iter().any(|e| matches!(e, JobEvent::Finished { .. })));
    Ok(())
}

/// Test that a batch failing fewer times than the retry budget succeeds
#[tokio::test]
async fn test_transientFailures_shouldSucceedWithKPlusOneAttempts() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::fail_first(2);
    let (coordinator, _sink) = common::test_coordinator(Arc::new(gateway.clone()), temp_dir.path());
    let path = common::create_test_subtitle(temp_dir.path(), "sample.srt")?;

    let file = coordinator.import(&path)?;
    let job = coordinator.create_job(&file.id, single_thread_options())?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Done);
    assert_eq!(finished.total_batches, 1);
    assert_eq!(coordinator.get_batches(&job.id)?[0].attempts, 3);
    assert_eq!(gateway.request_count(), 3);

    let output = fs::read_to_string(temp_dir.path().join("sample.translated.fr.srt"))?;
    assert!(output.contains("[French] This is a <i>test</i> subtitle."));
    assert!(output.contains("[French] It contains\nmultiple lines."));
    assert!(output.contains("{\\an8}"));
    assert!(output.contains("00:00:10,000 --> 00:00:14,000"));
    Ok(())
}

/// Test that in-flight requests never exceed the thread setting
#[tokio::test]
async fn test_threads_shouldBoundInFlightRequests() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::new(MockBehavior::Slow { delay_ms: 30 });
    let (coordinator, _sink) = common::test_coordinator(Arc::new(gateway.clone()), temp_dir.path());

    let file = coordinator.import_bytes(temp_dir.path().join("long.srt"), common::numbered_srt(20).as_bytes())?;
    let options = JobOptions {
        threads: 3,
        batch: BatchConfig {
            batch_size: 2,
            ..common::test_options().batch
        },
        ..common::test_options()
    };
    let job = coordinator.create_job(&file.id, options)?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Done);
    assert_eq!(finished.total_batches, 10);
    assert_eq!(gateway.request_count(), 10);
    assert!(gateway.peak_in_flight() <= 3);
    assert!(gateway.peak_in_flight() >= 2);
    Ok(())
}

/// Test that tags come back even when the provider drops every placeholder
#[tokio::test]
async fn test_droppedPlaceholders_shouldStillRestoreTags() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::new(MockBehavior::DropPlaceholders);
    let (coordinator, _sink) = common::test_coordinator(Arc::new(gateway), temp_dir.path());

    let srt = "1\n00:00:01,000 --> 00:00:02,000\n<i>Hello</i>\n";
    let file = coordinator.import_bytes(temp_dir.path().join("tags.srt"), srt.as_bytes())?;
    let job = coordinator.create_job(&file.id, common::test_options())?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Done);
    let output = fs::read_to_string(temp_dir.path().join("tags.translated.fr.srt"))?;
    assert_eq!(output, "1\n00:00:01,000 --> 00:00:02,000\n<i>[French] Hello</i>\n");
    Ok(())
}

/// Test translating a UTF-16 file with Windows line endings
#[tokio::test]
async fn test_utf16Input_shouldWriteUtf8WithSameLineEndings() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (coordinator, _sink) = common::test_coordinator(Arc::new(MockGateway::working()), temp_dir.path());

    let text = "1\r\n00:00:01,000 --> 00:00:02,000\r\nÇa va ?\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nOui\r\n";
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
    let path = common::create_test_file(temp_dir.path(), "wide.srt", &bytes)?;

    let file = coordinator.import(&path)?;
    assert_eq!(file.cue_count, 2);
    let job = coordinator.create_job(&file.id, common::test_options())?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Done);
    let output = String::from_utf8(fs::read(temp_dir.path().join("wide.translated.fr.srt"))?)?;
    assert_eq!(
        output,
        "1\r\n00:00:01,000 --> 00:00:02,000\r\n[French] Ça va ?\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\n[French] Oui\r\n"
    );
    Ok(())
}

/// Test that client errors are not retried
#[tokio::test]
async fn test_terminalError_shouldFailJobAfterOneAttemptPerBatch() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::new(MockBehavior::Terminal);
    let (coordinator, sink) = common::test_coordinator(Arc::new(gateway.clone()), temp_dir.path());

    let file = coordinator.import_bytes(temp_dir.path().join("show.srt"), common::numbered_srt(6).as_bytes())?;
    let job = coordinator.create_job(&file.id, common::test_options())?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Error);
    assert_eq!(gateway.request_count(), 2);
    assert!(coordinator.get_batches(&job.id)?.iter().all(|b| b.attempts == 1));
    assert!(finished.error.as_deref().is_some_and(|e| e.contains("2 of 2 batches failed")));

    let events = sink.events();
    let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], JobEvent::Error { .. }));
    Ok(())
}

/// Test that unparseable responses are retried, then fail the batch
#[tokio::test]
async fn test_garbledResponses_shouldExhaustRetries() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let gateway = MockGateway::new(MockBehavior::Garbled);
    let (coordinator, _sink) = common::test_coordinator(Arc::new(gateway.clone()), temp_dir.path());

    let file = coordinator.import_bytes(temp_dir.path().join("one.srt"), common::numbered_srt(2).as_bytes())?;
    let job = coordinator.create_job(&file.id, common::test_options())?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Error);
    assert_eq!(gateway.request_count(), 3);
    let batches = coordinator.get_batches(&job.id)?;
    assert!(batches[0].error_msg.as_deref().is_some_and(|m| m.contains("Failed to parse") || m.contains("Expected items")));
    assert!(!temp_dir.path().join("one.translated.fr.srt").exists());
    Ok(())
}

/// Test that several jobs on one file each get their own output
#[tokio::test]
async fn test_twoJobsOnOneFile_shouldBeListedInCreationOrder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (coordinator, _sink) = common::test_coordinator(Arc::new(MockGateway::working()), temp_dir.path());

    let file = coordinator.import_bytes(temp_dir.path().join("show.srt"), common::numbered_srt(3).as_bytes())?;
    let french = coordinator.create_job(&file.id, common::test_options())?;
    let german = coordinator.create_job(
        &file.id,
        JobOptions {
            target_language: "de".to_string(),
            ..common::test_options()
        },
    )?;

    // Jobs keep their copy of the file after it is removed
    coordinator.remove_file(&file.id)?;

    coordinator.start_job(&french.id)?;
    coordinator.start_job(&german.id)?;
    timeout(WAIT, coordinator.wait_for_job(&french.id)).await??;
    timeout(WAIT, coordinator.wait_for_job(&german.id)).await??;

    let ids: Vec<String> = coordinator.list_jobs().into_iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![french.id, german.id]);

    let german_output = fs::read_to_string(temp_dir.path().join("show.translated.de.srt"))?;
    assert!(german_output.contains("[German] Line 2"));
    assert!(temp_dir.path().join("show.translated.fr.srt").exists());
    Ok(())
}
