//! Adaptive polling scheduler
//!
//! Decides when the control loop asks the cloud for work. The decision
//! order is fixed:
//!
//! 1. backlog above the threshold → suspend (the engine is behind; deepening
//!    its queue helps nobody)
//! 2. productive poll with few jobs left → hot cadence (the minimum interval)
//! 3. a streak of empty polls → cold cadence (the maximum interval)
//! 4. otherwise adapt: halve after a productive poll, grow by the configured
//!    factor after an empty one, clamped to the bounds
//!
//! Upload events can cut a long wait short: after a configurable delay the
//! burst trigger inspects the backlog and, when it is shallow, fires the
//! single-slot burst channel the control loop waits on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{format_duration, Config};
use crate::store::{self, FolderLayout};
use crate::watchers::{UploadEvent, UploadEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Backlog too deep; probe again after a short sleep instead of polling.
    Suspend,
    Wait(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Timeout,
    Stop,
    Burst,
}

pub struct PollScheduler {
    config: Arc<Config>,
    layout: FolderLayout,
    consecutive_empty: u32,
    current_interval: Duration,
    total_polls: u64,
    productive_polls: u64,
    burst_rx: mpsc::Receiver<()>,
    burst_tx: mpsc::Sender<()>,
}

impl PollScheduler {
    pub fn new(config: Arc<Config>, layout: FolderLayout) -> Self {
        // single slot: a pending burst coalesces with any later one
        let (burst_tx, burst_rx) = mpsc::channel(1);
        let current_interval = config.min_poll_interval();
        Self {
            config,
            layout,
            consecutive_empty: 0,
            current_interval,
            total_polls: 0,
            productive_polls: 0,
            burst_rx,
            burst_tx,
        }
    }

    /// A clone of the burst sender for the upload-event trigger.
    pub fn burst_handle(&self) -> mpsc::Sender<()> {
        self.burst_tx.clone()
    }

    /// Records one poll outcome before the next interval is chosen.
    pub fn record_poll(&mut self, job_count: usize) {
        self.total_polls += 1;
        if job_count > 0 {
            self.productive_polls += 1;
            self.consecutive_empty = 0;
        } else {
            self.consecutive_empty += 1;
        }
    }

    pub fn consecutive_empty(&self) -> u32 {
        self.consecutive_empty
    }

    /// `(total, productive)` poll counts since startup.
    pub fn totals(&self) -> (u64, u64) {
        (self.total_polls, self.productive_polls)
    }

    /// Chooses the next polling interval, or the suspend sentinel when the
    /// on-disk backlog says the engine is behind.
    pub fn next_interval(&mut self, has_jobs: bool, remaining: usize) -> PollDecision {
        let poll = &self.config.poll;

        let backlog = store::count_job_files(&self.layout.jobs_to_do());
        if backlog > poll.remaining_jobs_threshold {
            debug!(backlog, threshold = poll.remaining_jobs_threshold, "backlog full, suspending polls");
            return PollDecision::Suspend;
        }

        if has_jobs && remaining <= poll.remaining_jobs_threshold {
            self.current_interval = self.config.min_poll_interval();
            return PollDecision::Wait(self.current_interval);
        }

        if self.consecutive_empty >= poll.max_empty_polls {
            self.current_interval = self.config.max_poll_interval();
            return PollDecision::Wait(self.current_interval);
        }

        let mut interval = self.current_interval;
        if poll.adaptive {
            interval = if has_jobs {
                self.current_interval / 2
            } else {
                self.current_interval.mul_f64(poll.exponential_factor)
            };
        }
        interval = interval.clamp(self.config.min_poll_interval(), self.config.max_poll_interval());
        self.current_interval = interval;
        PollDecision::Wait(interval)
    }

    /// One line explaining the last decision, for the poll log.
    pub fn describe(&self, decision: PollDecision, has_jobs: bool, remaining: usize) -> String {
        match decision {
            PollDecision::Suspend => "polling suspended: engine backlog over threshold".to_string(),
            PollDecision::Wait(d) => {
                let why = if has_jobs && remaining <= self.config.poll.remaining_jobs_threshold {
                    "jobs flowing, hot cadence"
                } else if self.consecutive_empty >= self.config.poll.max_empty_polls {
                    "idle streak, cold cadence"
                } else if has_jobs {
                    "adaptive: jobs found"
                } else {
                    "adaptive: no jobs"
                };
                format!("next poll in {} ({why})", format_duration(d))
            }
        }
    }

    /// Blocks until the interval elapses, a stop arrives, or a burst fires.
    pub async fn wait_for_next(
        &mut self,
        interval: Duration,
        stop: &mut watch::Receiver<bool>,
    ) -> WaitOutcome {
        tokio::select! {
            _ = tokio::time::sleep(interval) => WaitOutcome::Timeout,
            _ = stop.changed() => WaitOutcome::Stop,
            received = self.burst_rx.recv() => match received {
                Some(()) => WaitOutcome::Burst,
                None => WaitOutcome::Stop,
            },
        }
    }
}

/// Turns upload events into burst polls. Lives on the event-drain task, so
/// its cooldown state needs no locking.
pub struct BurstTrigger {
    config: Arc<Config>,
    layout: FolderLayout,
    burst_tx: mpsc::Sender<()>,
    last_burst: Option<Instant>,
}

impl BurstTrigger {
    pub fn new(config: Arc<Config>, layout: FolderLayout, burst_tx: mpsc::Sender<()>) -> Self {
        Self { config, layout, burst_tx, last_burst: None }
    }

    /// Waits out the post-upload delay (the cloud needs time to enqueue the
    /// follow-on job), then fires a burst when the backlog is shallow and
    /// the cooldown window has passed.
    pub async fn handle(&mut self, event: UploadEvent) {
        let burst = &self.config.burst;
        if !burst.enabled {
            return;
        }
        match event.kind {
            UploadEventKind::ParamOptUploaded if !burst.on_opt_upload => return,
            UploadEventKind::DailySummaryUploaded if !burst.on_summary_upload => return,
            _ => {}
        }
        info!(job_id = %event.job_id, kind = ?event.kind, "upload event received");

        tokio::time::sleep(self.config.burst_delay()).await;

        if let Some(last) = self.last_burst {
            if last.elapsed() < self.config.burst_cooldown() {
                debug!("burst cooldown active, skipping trigger");
                return;
            }
        }

        let backlog = store::count_job_files(&self.layout.jobs_to_do());
        if backlog > burst.job_threshold {
            info!(backlog, threshold = burst.job_threshold, "backlog over threshold, skipping burst");
            return;
        }

        match self.burst_tx.try_send(()) {
            Ok(()) => {
                self.last_burst = Some(Instant::now());
                info!(backlog, "burst poll triggered");
            }
            Err(mpsc::error::TrySendError::Full(())) => debug!("burst already pending, coalesced"),
            Err(mpsc::error::TrySendError::Closed(())) => warn!("burst channel closed"),
        }
    }
}

/// Drains the upload-event bus into the burst trigger, one event at a time.
pub async fn drain_upload_events(
    mut events: mpsc::Receiver<UploadEvent>,
    mut trigger: BurstTrigger,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            event = events.recv() => match event {
                Some(event) => trigger.handle(event).await,
                None => break,
            },
        }
    }
}
