mod common;

use chrono::TimeZone;
use common::{Fault, ScriptedDriver, entities, site, test_config};
use kodegen_tools_sitecapture::{
    CaptureConfig, CaptureService, CrawlError, ProgressPublisher, ProgressSnapshot, RetryConfig,
    SessionState, TaskId, TaskStatus,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(rx: &mut UnboundedReceiver<ProgressSnapshot>) -> Vec<ProgressSnapshot> {
    let mut out = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        out.push(snapshot);
    }
    out
}

fn png_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
                .count()
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn one_entity_on_two_sites_captures_both() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(test_config(tmp.path(), 2), driver.clone(), publisher);

    let run_dir = service
        .start_run(&entities(&["Acme Corp"]), &[site("SiteA"), site("SiteB")], chrono::Utc::now())
        .await
        .expect("run completes");

    assert!(run_dir.starts_with(tmp.path()));
    assert_eq!(png_count(&run_dir.join("Acme Corp")), 2);

    let progress = service.progress().expect("current run");
    assert_eq!(progress.total, 2);
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.failed, 0);
    assert!(progress.current_task.is_none());
    for task in &progress.tasks {
        assert_eq!(task.attempts, 1);
        let artifact = task.artifact_path.as_ref().expect("artifact recorded");
        assert!(artifact.exists());
    }

    let snapshots = drain(&mut rx);
    let last = snapshots.last().expect("published at least once");
    assert!(last.is_finished());
    assert_eq!(last.completed, 2);

    let marks = driver.watermarks();
    assert_eq!(marks.len(), 2);
    assert!(marks.iter().all(|m| m.contains("Entity: Acme Corp")));

    assert_eq!(service.session_state(), SessionState::Closed);
    assert_eq!(driver.sessions_opened(), 1);
    assert_eq!(driver.sessions_closed(), 1);
    assert_eq!(driver.open_pages(), 0);
    assert_eq!(service.current_run_dir(), Some(run_dir));
}

#[tokio::test]
async fn matrix_runs_in_bounded_waves() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    driver.set_search_delay(Duration::from_millis(20));
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(test_config(tmp.path(), 2), driver.clone(), publisher);

    let names = entities(&["Acme", "Globex", "Initech"]);
    let sites = [site("SiteA"), site("SiteB")];
    service
        .start_run(&names, &sites, chrono::Utc::now())
        .await
        .expect("run completes");

    let snapshots = drain(&mut rx);
    assert!(!snapshots.is_empty());

    let ids: HashSet<TaskId> = snapshots[0].tasks.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids.len(), 6);
    assert!(snapshots[0].tasks.iter().all(|t| t.status == TaskStatus::Pending));

    let mut previous = 0;
    for snapshot in &snapshots {
        assert!(snapshot.sequence > previous, "sequence must grow");
        previous = snapshot.sequence;
        assert_eq!(snapshot.total, 6);
        assert_eq!(
            snapshot.completed + snapshot.failed + snapshot.in_flight(),
            snapshot.total
        );
        assert!(snapshot.count(TaskStatus::Processing) <= 2);
        assert!(snapshot.tasks.iter().all(|t| t.attempts <= 3));
    }

    assert!(driver.peak_pages() <= 2);
    assert!(driver.peak_pages() >= 1);
    assert_eq!(snapshots.last().map(|s| s.completed), Some(6));
}

#[tokio::test]
async fn next_wave_waits_for_the_slowest_task() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::Slow(Duration::from_millis(300)));
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(test_config(tmp.path(), 2), driver.clone(), publisher);

    service
        .start_run(&entities(&["Acme", "Globex"]), &[site_a, site("SiteB")], chrono::Utc::now())
        .await
        .expect("run completes");

    // Matrix order: Acme@SiteA, Acme@SiteB | Globex@SiteA, Globex@SiteB
    let snapshots = drain(&mut rx);
    let mut saw_fast_done_while_slow_runs = false;
    for snapshot in &snapshots {
        let (first_wave, second_wave) = snapshot.tasks.split_at(2);
        let second_started = second_wave.iter().any(|t| t.status != TaskStatus::Pending);
        if second_started {
            assert!(
                first_wave.iter().all(|t| t.status.is_terminal()),
                "second wave started before the first finished: {:?}",
                snapshot.tasks.iter().map(|t| t.status).collect::<Vec<_>>()
            );
        }
        if first_wave[0].status == TaskStatus::Processing
            && first_wave[1].status == TaskStatus::Success
        {
            assert!(!second_started);
            saw_fast_done_while_slow_runs = true;
        }
    }
    assert!(saw_fast_done_while_slow_runs);
    assert_eq!(snapshots.last().map(|s| s.completed), Some(4));
}

#[tokio::test]
async fn missing_field_fails_without_retry() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::FieldMissing);
    let service = CaptureService::new(
        test_config(tmp.path(), 2),
        driver.clone(),
        Arc::new(ProgressPublisher::new()),
    );

    service
        .start_run(&entities(&["Acme"]), &[site_a, site("SiteB")], chrono::Utc::now())
        .await
        .expect("task failures do not fail the run");

    let progress = service.progress().expect("current run");
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 1);

    let failed = &progress.tasks[0];
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.attempts, 1);
    assert!(failed.artifact_path.is_none());
    assert!(
        failed
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("input[name=q]"))
    );
    assert_eq!(service.failed_task_ids(), vec![failed.id.clone()]);
    assert_eq!(driver.open_pages(), 0);
}

#[tokio::test]
async fn navigation_error_is_retried_until_success() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::NavigationFailures(1));
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(test_config(tmp.path(), 1), driver.clone(), publisher);

    service
        .start_run(&entities(&["Acme"]), &[site_a], chrono::Utc::now())
        .await
        .expect("run completes");

    let task = service.progress().expect("current run").tasks[0].clone();
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.attempts, 2);

    let seen: Vec<TaskStatus> = drain(&mut rx).iter().map(|s| s.tasks[0].status).collect();
    assert!(seen.contains(&TaskStatus::Retrying));
    assert_eq!(seen.last(), Some(&TaskStatus::Success));
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::NavigationFailures(10));
    let service = CaptureService::new(
        test_config(tmp.path(), 1),
        driver.clone(),
        Arc::new(ProgressPublisher::new()),
    );

    service
        .start_run(&entities(&["Acme"]), &[site_a], chrono::Utc::now())
        .await
        .expect("run completes");

    let task = service.progress().expect("current run").tasks[0].clone();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 3);
    assert!(
        task.last_error
            .as_deref()
            .is_some_and(|e| e.contains("ERR_CONNECTION_RESET"))
    );
}

#[tokio::test]
async fn timed_out_task_fails_and_session_is_recycled() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::Hang);

    let config = CaptureConfig::builder()
        .storage_dir(tmp.path())
        .max_concurrent_tasks(1)
        .task_timeout(Duration::from_millis(300))
        .build()
        .expect("valid config");
    let service = CaptureService::new(config, driver.clone(), Arc::new(ProgressPublisher::new()));

    service
        .start_run(&entities(&["Acme"]), &[site_a, site("SiteB")], chrono::Utc::now())
        .await
        .expect("run completes");

    let progress = service.progress().expect("current run");
    let hung = &progress.tasks[0];
    assert_eq!(hung.status, TaskStatus::Failed);
    assert!(hung.last_error.as_deref().is_some_and(|e| e.contains("timed out")));
    assert_eq!(progress.tasks[1].status, TaskStatus::Success);

    // One session for the first wave, a fresh one after the timeout
    assert_eq!(driver.sessions_opened(), 2);
    assert_eq!(driver.sessions_closed(), 2);

    // The dropped attempt's page is closed in the background
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(driver.open_pages(), 0);
}

#[tokio::test]
async fn deadline_cuts_a_retry_short_during_backoff() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::NavigationFailures(10));

    let config = CaptureConfig::builder()
        .storage_dir(tmp.path())
        .max_concurrent_tasks(1)
        .retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        })
        .task_timeout(Duration::from_millis(300))
        .build()
        .expect("valid config");
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(config, driver.clone(), publisher);

    service
        .start_run(&entities(&["Acme"]), &[site_a, site("SiteB")], chrono::Utc::now())
        .await
        .expect("run completes");

    let progress = service.progress().expect("current run");
    let cut_short = &progress.tasks[0];
    assert_eq!(cut_short.status, TaskStatus::Failed);
    assert_eq!(cut_short.attempts, 1, "no attempt may start after the deadline");
    assert!(
        cut_short
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("timed out"))
    );
    assert_eq!(progress.tasks[1].status, TaskStatus::Success);

    // The deadline fired while the task sat in backoff
    let statuses: Vec<TaskStatus> = drain(&mut rx).iter().map(|s| s.tasks[0].status).collect();
    let retrying_at = statuses
        .iter()
        .position(|s| *s == TaskStatus::Retrying)
        .expect("backoff was published");
    assert_eq!(statuses[retrying_at + 1], TaskStatus::Failed);

    assert_eq!(driver.sessions_opened(), 2);
}

#[tokio::test]
async fn panicking_task_is_recorded_as_failed() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::Panic);
    let service = CaptureService::new(
        test_config(tmp.path(), 2),
        driver.clone(),
        Arc::new(ProgressPublisher::new()),
    );

    service
        .start_run(&entities(&["Acme"]), &[site_a, site("SiteB")], chrono::Utc::now())
        .await
        .expect("a panicking task does not fail the run");

    let progress = service.progress().expect("current run");
    assert!(progress.is_finished());
    let crashed = &progress.tasks[0];
    assert_eq!(crashed.status, TaskStatus::Failed);
    assert!(
        crashed
            .last_error
            .as_deref()
            .is_some_and(|e| e.starts_with("task aborted"))
    );
    assert_eq!(progress.tasks[1].status, TaskStatus::Success);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(driver.open_pages(), 0);
}

#[tokio::test]
async fn retrying_a_successful_task_changes_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(test_config(tmp.path(), 2), driver.clone(), publisher);

    service
        .start_run(&entities(&["Acme"]), &[site("SiteA")], chrono::Utc::now())
        .await
        .expect("run completes");
    let before = service.progress().expect("current run");
    drain(&mut rx);

    service
        .retry_tasks(&[before.tasks[0].id.clone(), TaskId::from("nope:x@y")])
        .await
        .expect("no-op retry");

    assert!(drain(&mut rx).is_empty());
    let after = service.progress().expect("current run");
    assert_eq!(after.tasks, before.tasks);
    assert_eq!(after.sequence, before.sequence);
    assert_eq!(driver.sessions_opened(), 1);
}

#[tokio::test]
async fn retry_replays_failed_tasks_in_the_same_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let site_a = site("SiteA");
    driver.fault("Acme", &site_a, Fault::FieldMissing);
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(test_config(tmp.path(), 2), driver.clone(), publisher);

    let as_of = chrono::Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .expect("valid date");
    let run_dir = service
        .start_run(&entities(&["Acme"]), &[site_a, site("SiteB")], as_of)
        .await
        .expect("run completes");
    let failed = service.failed_task_ids();
    assert_eq!(failed.len(), 1);
    drain(&mut rx);

    driver.clear_faults();
    service.retry_tasks(&failed).await.expect("retry completes");

    let snapshots = drain(&mut rx);
    assert_eq!(
        snapshots.first().map(|s| s.count(TaskStatus::Pending)),
        Some(1),
        "requeue is published before the task runs"
    );

    let progress = service.progress().expect("current run");
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.failed, 0);
    assert!(service.failed_task_ids().is_empty());
    assert_eq!(service.current_run_dir(), Some(run_dir.clone()));
    assert_eq!(png_count(&run_dir.join("Acme")), 2);

    // The replayed capture carries the time of the retry
    let marks = driver.watermarks();
    assert_eq!(marks.len(), 2);
    assert!(marks[0].contains("Queried: 2024-01-01 09:00:00 UTC"));
    assert!(!marks[1].contains("Queried: 2024-01-01"));
}

#[tokio::test]
async fn empty_inputs_are_rejected_before_anything_starts() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let service = CaptureService::new(
        test_config(tmp.path(), 2),
        driver.clone(),
        Arc::new(ProgressPublisher::new()),
    );

    let no_entities = service
        .start_run(&[], &[site("SiteA")], chrono::Utc::now())
        .await;
    assert!(matches!(no_entities, Err(CrawlError::InvalidConfig(_))));

    let no_sites = service
        .start_run(&entities(&["Acme"]), &[], chrono::Utc::now())
        .await;
    assert!(matches!(no_sites, Err(CrawlError::InvalidConfig(_))));

    assert_eq!(driver.sessions_opened(), 0);
    assert!(service.current_run_dir().is_none());
    assert_eq!(std::fs::read_dir(tmp.path()).expect("readable").count(), 0);
}

#[tokio::test]
async fn entities_sharing_a_directory_are_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let service = CaptureService::new(
        test_config(tmp.path(), 2),
        driver.clone(),
        Arc::new(ProgressPublisher::new()),
    );

    let result = service
        .start_run(&entities(&["Acme/Corp", "Acme_Corp"]), &[site("SiteA")], chrono::Utc::now())
        .await;

    match result {
        Err(CrawlError::InvalidConfig(message)) => {
            assert!(message.contains("Acme/Corp"));
            assert!(message.contains("Acme_Corp"));
        }
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
    assert_eq!(driver.sessions_opened(), 0);
    assert_eq!(std::fs::read_dir(tmp.path()).expect("readable").count(), 0);
}

#[tokio::test]
async fn unlaunchable_session_aborts_the_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    driver.fail_sessions(true);
    let publisher = Arc::new(ProgressPublisher::new());
    let mut rx = publisher.subscribe_channel();
    let service = CaptureService::new(test_config(tmp.path(), 2), driver.clone(), publisher);

    let result = service
        .start_run(&entities(&["Acme"]), &[site("SiteA")], chrono::Utc::now())
        .await;

    match result {
        Err(CrawlError::RunAborted(message)) => {
            assert!(message.contains("browser binary not found"));
        }
        other => panic!("expected RunAborted, got {other:?}"),
    }
    assert!(drain(&mut rx).is_empty());
    assert_eq!(std::fs::read_dir(tmp.path()).expect("readable").count(), 0);
}

#[tokio::test]
async fn run_dir_exists_even_when_every_task_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let (site_a, site_b) = (site("SiteA"), site("SiteB"));
    driver.fault("Acme", &site_a, Fault::FieldMissing);
    driver.fault("Acme", &site_b, Fault::FieldMissing);
    let service = CaptureService::new(
        test_config(tmp.path(), 2),
        driver.clone(),
        Arc::new(ProgressPublisher::new()),
    );

    let run_dir = service
        .start_run(&entities(&["Acme"]), &[site_a, site_b], chrono::Utc::now())
        .await
        .expect("run completes");

    assert!(run_dir.is_dir());
    let progress = service.progress().expect("current run");
    assert_eq!(progress.failed, 2);
    assert_eq!(progress.completed, 0);
    assert!(progress.is_finished());
}
