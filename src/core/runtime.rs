//! The daemon runtime
//!
//! Owns the poll-download control loop and spawns the watcher tasks, the
//! walk-forward completion monitor, and the upload-event drain. One stop
//! channel fans out to everything; the control loop exits after its current
//! iteration and each watcher before its next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cloud::{ApiClient, AuthManager};
use crate::config::Config;
use crate::core::scheduler::{
    drain_upload_events, BurstTrigger, PollDecision, PollScheduler, WaitOutcome,
};
use crate::download::Downloader;
use crate::retest::monitor::CompletionMonitor;
use crate::retest::SecondPassGenerator;
use crate::store::{self, FolderLayout};
use crate::watchers::{upload_event_bus, OptResultWatcher, TradeResultWatcher};

/// How long the control loop sleeps before re-evaluating after a suspended
/// poll decision or a failed poll/token refresh.
const PROBE_SLEEP: Duration = Duration::from_secs(30);

pub struct Agent {
    config: Arc<Config>,
    layout: FolderLayout,
    auth: Arc<AuthManager>,
    api: Arc<ApiClient>,
    downloader: Arc<Downloader>,
}

impl Agent {
    pub fn new(
        config: Arc<Config>,
        layout: FolderLayout,
        auth: Arc<AuthManager>,
        api: Arc<ApiClient>,
    ) -> Self {
        let downloader = Arc::new(Downloader::new(
            Arc::clone(&config),
            layout.clone(),
            Arc::clone(&api),
        ));
        Self { config, layout, auth, api, downloader }
    }

    /// Runs until the stop channel flips. Spawned subsystems share the same
    /// stop receiver and wind down on their own.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let (event_tx, event_rx) = upload_event_bus();
        let mut scheduler = PollScheduler::new(Arc::clone(&self.config), self.layout.clone());

        let second_pass = Arc::new(SecondPassGenerator::new(
            self.layout.clone(),
            Arc::clone(&self.api),
        ));
        let trades_watcher = TradeResultWatcher::new(
            Arc::clone(&self.config),
            self.layout.clone(),
            Arc::clone(&self.api),
        );
        let opt_watcher = OptResultWatcher::new(
            Arc::clone(&self.config),
            self.layout.clone(),
            Arc::clone(&self.api),
            event_tx,
            second_pass,
        );
        let completion_monitor = CompletionMonitor::new(
            Arc::clone(&self.config),
            self.layout.clone(),
            Arc::clone(&self.api),
        );
        let burst_trigger = BurstTrigger::new(
            Arc::clone(&self.config),
            self.layout.clone(),
            scheduler.burst_handle(),
        );

        tokio::spawn(trades_watcher.run(stop.clone()));
        tokio::spawn(opt_watcher.run(stop.clone()));
        tokio::spawn(completion_monitor.run(stop.clone()));
        tokio::spawn(drain_upload_events(event_rx, burst_trigger, stop.clone()));

        info!("agent control loop started");
        let mut iteration = 0u64;
        let mut remaining = 0usize;

        while !*stop.borrow() {
            iteration += 1;

            if let Err(e) = self.auth.ensure_valid().await {
                warn!(iteration, error = %e, "token refresh failed");
                if self.sleep_or_stop(PROBE_SLEEP, &mut stop).await {
                    break;
                }
                continue;
            }

            let resp = match self.api.poll_jobs(self.config.poll.limit).await {
                Ok(resp) => resp,
                Err(e) => {
                    error!(iteration, error = %e, "poll failed");
                    if self.sleep_or_stop(PROBE_SLEEP, &mut stop).await {
                        break;
                    }
                    continue;
                }
            };

            let job_count = resp.jobs.len();
            if job_count > 0 {
                remaining = remaining.saturating_sub(job_count);
                info!(iteration, job_count, remaining, "poll returned jobs");
                let stats = self.downloader.download_all(resp.jobs).await;
                info!(
                    successful = stats.successful,
                    failed = stats.failed,
                    "download batch complete"
                );
                self.log_folder_stats();
            } else {
                remaining = 0;
                info!(iteration, "poll returned no jobs");
            }

            scheduler.record_poll(job_count);
            let decision = scheduler.next_interval(job_count > 0, remaining);
            info!("{}", scheduler.describe(decision, job_count > 0, remaining));

            match decision {
                PollDecision::Suspend => {
                    if self.sleep_or_stop(PROBE_SLEEP, &mut stop).await {
                        break;
                    }
                }
                PollDecision::Wait(interval) => {
                    match scheduler.wait_for_next(interval, &mut stop).await {
                        WaitOutcome::Stop => break,
                        WaitOutcome::Burst => {
                            info!("burst poll triggered, checking for jobs immediately");
                        }
                        WaitOutcome::Timeout => {}
                    }
                }
            }
        }
        info!("agent control loop stopped");
    }

    /// Sleeps unless the stop channel fires first; true means stop.
    async fn sleep_or_stop(&self, duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = stop.changed() => true,
        }
    }

    fn log_folder_stats(&self) {
        let (count, bytes) = store::occupancy(&[
            self.layout.jobs_to_do(),
            self.layout.jobs_in_progress(),
            self.layout.jobs_done(),
            self.layout.jobs_error(),
        ]);
        info!(files = count, size = %store::format_file_size(bytes), "job folder occupancy");
    }
}
