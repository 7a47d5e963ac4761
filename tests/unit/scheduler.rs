//! Unit tests for the adaptive polling scheduler

use std::sync::Arc;
use std::time::Duration;

use quantrelay::config::Config;
use quantrelay::core::{BurstTrigger, PollDecision, PollScheduler, WaitOutcome};
use quantrelay::store::FolderLayout;
use quantrelay::watchers::{UploadEvent, UploadEventKind};
use tempfile::{tempdir, TempDir};
use tokio::sync::watch;

fn layout() -> (TempDir, FolderLayout) {
    let dir = tempdir().unwrap();
    let layout = FolderLayout::new(dir.path());
    layout.ensure_directories().unwrap();
    (dir, layout)
}

fn scheduler_with(config: Config) -> (TempDir, PollScheduler) {
    let (dir, layout) = layout();
    (dir, PollScheduler::new(Arc::new(config), layout))
}

fn expect_wait(decision: PollDecision) -> Duration {
    match decision {
        PollDecision::Wait(d) => d,
        PollDecision::Suspend => panic!("expected a wait interval, got suspend"),
    }
}

fn assert_secs(d: Duration, secs: f64) {
    assert!(
        (d.as_secs_f64() - secs).abs() < 0.001,
        "expected ~{secs}s, got {:?}",
        d
    );
}

fn seed_backlog(layout: &FolderLayout, count: usize) {
    for i in 0..count {
        std::fs::write(layout.jobs_to_do().join(format!("job-{i}.job")), b"x").unwrap();
    }
}

#[test]
fn consecutive_empty_polls_grow_the_interval_then_cap() {
    // growth factor 1.2 with the cold-cadence switch after 4 empty polls
    let mut config = Config::default();
    config.poll.exponential_factor = 1.2;
    config.poll.max_empty_polls = 4;
    let (_dir, mut scheduler) = scheduler_with(config);

    let min = Duration::from_secs(300);

    scheduler.record_poll(0);
    assert_secs(expect_wait(scheduler.next_interval(false, 0)), min.as_secs_f64() * 1.2);
    scheduler.record_poll(0);
    assert_secs(expect_wait(scheduler.next_interval(false, 0)), min.as_secs_f64() * 1.44);
    scheduler.record_poll(0);
    assert_secs(expect_wait(scheduler.next_interval(false, 0)), min.as_secs_f64() * 1.728);
    scheduler.record_poll(0);
    assert_eq!(
        expect_wait(scheduler.next_interval(false, 0)),
        Duration::from_secs(1800)
    );
}

#[test]
fn idle_intervals_are_monotone_and_bounded() {
    let (_dir, mut scheduler) = scheduler_with(Config::default());
    let max = Duration::from_secs(1800);

    let mut previous = Duration::ZERO;
    for _ in 0..10 {
        scheduler.record_poll(0);
        let interval = expect_wait(scheduler.next_interval(false, 0));
        assert!(interval >= previous, "interval shrank while idle");
        assert!(interval <= max);
        previous = interval;
    }
    assert_eq!(previous, max);
}

#[test]
fn productive_poll_with_shallow_remaining_pins_hot_cadence() {
    let (_dir, mut scheduler) = scheduler_with(Config::default());

    // drift the interval up first
    scheduler.record_poll(0);
    scheduler.next_interval(false, 0);
    scheduler.record_poll(0);
    scheduler.next_interval(false, 0);

    scheduler.record_poll(5);
    assert_eq!(
        expect_wait(scheduler.next_interval(true, 2)),
        Duration::from_secs(300)
    );
}

#[test]
fn productive_poll_with_deep_remaining_halves_the_interval() {
    let mut config = Config::default();
    config.poll.max_empty_polls = 10;
    let (_dir, mut scheduler) = scheduler_with(config);

    // grow to 300 * 1.5^2 = 675s
    scheduler.record_poll(0);
    scheduler.next_interval(false, 0);
    scheduler.record_poll(0);
    let grown = expect_wait(scheduler.next_interval(false, 0));
    assert_secs(grown, 675.0);

    scheduler.record_poll(5);
    let halved = expect_wait(scheduler.next_interval(true, 10));
    assert_secs(halved, 337.5);
}

#[test]
fn deep_backlog_suspends_regardless_of_other_inputs() {
    let config = Config::default();
    let (dir, layout) = layout();
    seed_backlog(&layout, 4); // threshold is 3
    let mut scheduler = PollScheduler::new(Arc::new(config), layout);

    scheduler.record_poll(5);
    assert_eq!(scheduler.next_interval(true, 0), PollDecision::Suspend);
    scheduler.record_poll(0);
    assert_eq!(scheduler.next_interval(false, 0), PollDecision::Suspend);
    drop(dir);
}

#[test]
fn backlog_at_threshold_does_not_suspend() {
    let config = Config::default();
    let (_dir, layout) = layout();
    seed_backlog(&layout, 3);
    let mut scheduler = PollScheduler::new(Arc::new(config), layout);

    scheduler.record_poll(1);
    assert!(matches!(scheduler.next_interval(true, 1), PollDecision::Wait(_)));
}

#[tokio::test]
async fn upload_event_triggers_a_burst_wake() {
    let mut config = Config::default();
    config.burst.delay_after_upload_secs = 0;
    let config = Arc::new(config);
    let (_dir, layout) = layout();
    layout.ensure_directories().unwrap();

    let mut scheduler = PollScheduler::new(Arc::clone(&config), layout.clone());
    let mut trigger = BurstTrigger::new(Arc::clone(&config), layout, scheduler.burst_handle());

    trigger
        .handle(UploadEvent {
            kind: UploadEventKind::ParamOptUploaded,
            file_name: "a_@ES_60_WFO_Results.opt".to_string(),
            job_id: "a".to_string(),
        })
        .await;

    let (_stop_tx, mut stop_rx) = watch::channel(false);
    let outcome = scheduler
        .wait_for_next(Duration::from_secs(30), &mut stop_rx)
        .await;
    assert_eq!(outcome, WaitOutcome::Burst);
}

#[tokio::test]
async fn cooldown_swallows_back_to_back_bursts() {
    let mut config = Config::default();
    config.burst.delay_after_upload_secs = 0;
    config.burst.cooldown_secs = 600;
    let config = Arc::new(config);
    let (_dir, layout) = layout();

    let mut scheduler = PollScheduler::new(Arc::clone(&config), layout.clone());
    let mut trigger = BurstTrigger::new(Arc::clone(&config), layout, scheduler.burst_handle());

    let event = UploadEvent {
        kind: UploadEventKind::ParamOptUploaded,
        file_name: "a_@ES_60_WFO_Results.opt".to_string(),
        job_id: "a".to_string(),
    };
    trigger.handle(event.clone()).await;
    trigger.handle(event).await;

    let (_stop_tx, mut stop_rx) = watch::channel(false);
    // first burst is pending
    assert_eq!(
        scheduler.wait_for_next(Duration::from_secs(30), &mut stop_rx).await,
        WaitOutcome::Burst
    );
    // second was swallowed by the cooldown
    assert_eq!(
        scheduler.wait_for_next(Duration::from_millis(50), &mut stop_rx).await,
        WaitOutcome::Timeout
    );
}

#[tokio::test]
async fn deep_backlog_skips_the_burst() {
    let mut config = Config::default();
    config.burst.delay_after_upload_secs = 0;
    let config = Arc::new(config);
    let (_dir, layout) = layout();
    seed_backlog(&layout, 4);

    let mut scheduler = PollScheduler::new(Arc::clone(&config), layout.clone());
    let mut trigger = BurstTrigger::new(Arc::clone(&config), layout, scheduler.burst_handle());

    trigger
        .handle(UploadEvent {
            kind: UploadEventKind::DailySummaryUploaded,
            file_name: "a_@ES_60_Daily.rep".to_string(),
            job_id: "a".to_string(),
        })
        .await;

    let (_stop_tx, mut stop_rx) = watch::channel(false);
    assert_eq!(
        scheduler.wait_for_next(Duration::from_millis(50), &mut stop_rx).await,
        WaitOutcome::Timeout
    );
}

#[tokio::test]
async fn disabled_event_class_never_triggers() {
    let mut config = Config::default();
    config.burst.delay_after_upload_secs = 0;
    config.burst.on_summary_upload = false;
    let config = Arc::new(config);
    let (_dir, layout) = layout();

    let mut scheduler = PollScheduler::new(Arc::clone(&config), layout.clone());
    let mut trigger = BurstTrigger::new(Arc::clone(&config), layout, scheduler.burst_handle());

    trigger
        .handle(UploadEvent {
            kind: UploadEventKind::DailySummaryUploaded,
            file_name: "a_@ES_60_Daily.rep".to_string(),
            job_id: "a".to_string(),
        })
        .await;

    let (_stop_tx, mut stop_rx) = watch::channel(false);
    assert_eq!(
        scheduler.wait_for_next(Duration::from_millis(50), &mut stop_rx).await,
        WaitOutcome::Timeout
    );
}

#[tokio::test]
async fn stop_signal_interrupts_the_wait() {
    let (_dir, mut scheduler) = scheduler_with(Config::default());
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let waited = tokio::spawn(async move {
        scheduler.wait_for_next(Duration::from_secs(600), &mut stop_rx).await
    });
    stop_tx.send(true).unwrap();
    assert_eq!(waited.await.unwrap(), WaitOutcome::Stop);
}
