//! Per-day summary scan
//!
//! Not a standing watcher: the optimization watcher schedules one sweep of
//! `opt/summary` thirty seconds after each upload, by which time the engine
//! has usually written its `*_Daily.rep` reports. Because the cloud is only
//! eventually consistent after an upload, each summary waits for its result
//! row to appear before shipping; a summary whose row never shows up stays
//! in place for a later sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cloud::ApiClient;
use crate::names;
use crate::store::{self, FolderLayout};
use crate::watchers::events::{self, UploadEvent, UploadEventKind};

/// Delay between an optimization upload and the sweep it schedules.
pub const SCAN_DELAY: Duration = Duration::from_secs(30);

/// How long one sweep waits for a summary's result row to appear.
const ROW_WAIT: Duration = Duration::from_secs(60);

pub async fn scan_after(
    delay: Duration,
    layout: FolderLayout,
    api: Arc<ApiClient>,
    event_bus: mpsc::Sender<UploadEvent>,
) {
    tokio::time::sleep(delay).await;
    scan(&layout, &api, &event_bus).await;
}

pub async fn scan(layout: &FolderLayout, api: &ApiClient, event_bus: &mpsc::Sender<UploadEvent>) {
    let source = layout.opt_summary();
    let files = match store::list_by_suffix(&source, "_Daily.rep") {
        Ok(files) => files,
        Err(e) => {
            error!(error = %e, "failed to list daily summaries");
            return;
        }
    };
    if files.is_empty() {
        return;
    }
    info!(count = files.len(), "daily summaries found for upload");

    for file_name in files {
        let path = source.join(&file_name);
        if !store::file_is_stable(&path, Duration::from_secs(2)).await {
            // the engine is still writing; a later sweep picks it up
            continue;
        }
        let Some(job_id) = names::daily_summary_job_id(&file_name) else {
            warn!(file = %file_name, "cannot extract job id from summary name, skipping");
            continue;
        };

        match api.wait_for_backtest(&job_id, ROW_WAIT).await {
            Ok(true) => {}
            Ok(false) => {
                // row not there yet; a later sweep picks this file up again
                info!(file = %file_name, %job_id, "result row not ready, leaving summary in place");
                continue;
            }
            Err(e) => {
                warn!(file = %file_name, %job_id, error = %e, "result row probe failed");
                continue;
            }
        }

        match api.upload_daily_summary(&path, &job_id).await {
            Ok(resp) => {
                info!(file = %file_name, %job_id, path = %resp.path, "daily summary uploaded");
                if let Err(e) = store::move_file(&file_name, &source, &layout.opt_done()) {
                    error!(file = %file_name, error = %e, "failed to move daily summary to done");
                }
                events::publish(
                    event_bus,
                    UploadEvent {
                        kind: UploadEventKind::DailySummaryUploaded,
                        file_name: file_name.clone(),
                        job_id: job_id.clone(),
                    },
                );
            }
            Err(e) => {
                warn!(file = %file_name, %job_id, error = %e, "daily summary upload failed");
                if let Err(e) = store::move_file(&file_name, &source, &layout.opt_error()) {
                    error!(file = %file_name, error = %e, "failed to move daily summary to error");
                }
            }
        }
    }
}
