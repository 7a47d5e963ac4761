//! Parameter-optimization watcher
//!
//! Scans `opt/in` for `.opt` containers. Each upload routes to the
//! optimization-result endpoint, then fans out: a burst event on the bus, a
//! walk-forward second pass when the filename qualifies, and a delayed sweep
//! of the summary folder for per-day reports the engine wrote alongside.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::cloud::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::names;
use crate::retest::SecondPassGenerator;
use crate::store::{self, FolderLayout};
use crate::watchers::events::{self, UploadEvent, UploadEventKind};
use crate::watchers::summary;

pub struct OptResultWatcher {
    config: Arc<Config>,
    layout: FolderLayout,
    api: Arc<ApiClient>,
    events: mpsc::Sender<UploadEvent>,
    second_pass: Arc<SecondPassGenerator>,
}

impl OptResultWatcher {
    pub fn new(
        config: Arc<Config>,
        layout: FolderLayout,
        api: Arc<ApiClient>,
        events: mpsc::Sender<UploadEvent>,
        second_pass: Arc<SecondPassGenerator>,
    ) -> Self {
        Self { config, layout, api, events, second_pass }
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.watcher_tick());
        info!("optimization result monitoring started");
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => self.process_files().await,
            }
        }
        info!("optimization result monitoring stopped");
    }

    async fn process_files(&self) {
        let source = self.layout.opt_in();
        let files = match store::list_by_extension(&source, ".opt") {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "failed to list optimization results");
                return;
            }
        };

        for file_name in files {
            let path = source.join(&file_name);
            if !store::file_is_stable(&path, self.config.stability_gap()).await {
                // the engine is still writing; next tick picks it up
                continue;
            }
            match self.upload_file(&file_name).await {
                Ok(job_id) => {
                    if let Err(e) = store::move_file(&file_name, &source, &self.layout.opt_done()) {
                        error!(file = %file_name, error = %e, "failed to move optimization result to done");
                        continue;
                    }
                    info!(file = %file_name, %job_id, "optimization result uploaded and moved to done");
                    self.after_upload(&file_name, &job_id).await;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "optimization result upload failed");
                    if let Err(e) = store::move_file(&file_name, &source, &self.layout.opt_error()) {
                        error!(file = %file_name, error = %e, "failed to move optimization result to error");
                    }
                }
            }
        }
    }

    async fn upload_file(&self, file_name: &str) -> Result<String> {
        let meta = names::parse_result_meta(file_name)?;
        let path = self.layout.opt_in().join(file_name);
        info!(file = %file_name, job_id = %meta.job_id, "uploading optimization result");
        self.api
            .upload_opt_results(&path, &meta.job_id, "performance")
            .await?;
        Ok(meta.job_id)
    }

    async fn after_upload(&self, file_name: &str, job_id: &str) {
        events::publish(
            &self.events,
            UploadEvent {
                kind: UploadEventKind::ParamOptUploaded,
                file_name: file_name.to_string(),
                job_id: job_id.to_string(),
            },
        );

        if names::looks_like_walk_forward(file_name) {
            if let Ok(meta) = names::parse_result_meta(file_name) {
                let done_path = self.layout.opt_done().join(file_name);
                self.second_pass.run_best_effort(&done_path, &meta).await;
            }
        }

        // give the engine time to finish writing summary reports
        let layout = self.layout.clone();
        let api = Arc::clone(&self.api);
        let event_bus = self.events.clone();
        tokio::spawn(async move {
            summary::scan_after(summary::SCAN_DELAY, layout, api, event_bus).await;
        });
    }
}
