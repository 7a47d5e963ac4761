//! Walk-forward completion monitor
//!
//! Watches `results/trades` for the trades list a finished `WFO_RETEST` run
//! leaves behind, waits until the engine has closed the file (two-sample
//! size stability), then derives the dual equity curves and ships them
//! through the daily-summary endpoint. Each file is processed once per
//! agent lifetime; failures retry on a later scan.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::cloud::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::names;
use crate::retest::equity;
use crate::store::{self, FolderLayout};

const SCAN_PERIOD: Duration = Duration::from_secs(30);

pub struct CompletionMonitor {
    config: Arc<Config>,
    layout: FolderLayout,
    api: Arc<ApiClient>,
}

impl CompletionMonitor {
    pub fn new(config: Arc<Config>, layout: FolderLayout, api: Arc<ApiClient>) -> Self {
        Self { config, layout, api }
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(SCAN_PERIOD);
        let mut processed: HashSet<String> = HashSet::new();
        info!("walk-forward completion monitoring started");
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => self.scan(&mut processed).await,
            }
        }
        info!("walk-forward completion monitoring stopped");
    }

    async fn scan(&self, processed: &mut HashSet<String>) {
        let dir = self.layout.results_trades();
        let files = match store::list_by_suffix(&dir, "_trades.csv") {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "failed to scan for retest trades files");
                return;
            }
        };

        for file_name in files {
            if !file_name.contains("_WFO_RETEST_RUN-") || processed.contains(&file_name) {
                continue;
            }
            let path = dir.join(&file_name);
            if !store::file_is_stable(&path, self.config.stability_gap()).await {
                debug!(file = %file_name, "trades file still being written");
                continue;
            }
            match self.process(&file_name).await {
                Ok(()) => {
                    processed.insert(file_name.clone());
                    info!(file = %file_name, "retest trades processed");
                }
                Err(e) => {
                    // left unmarked so a later scan retries
                    error!(file = %file_name, error = %e, "retest trades processing failed");
                }
            }
        }
    }

    async fn process(&self, file_name: &str) -> Result<()> {
        let meta = names::parse_result_meta(file_name)?;
        let (total_runs, os_percentage) = parse_run_suffix(file_name);

        let trades_path = self.layout.results_trades().join(file_name);
        let curves = equity::build_dual_curves(
            &trades_path,
            &meta.symbol,
            &meta.timeframe,
            &meta.job_id,
            total_runs,
            os_percentage,
        )?;

        let artifact_name = format!(
            "{}_{}_{}_WFO_RETEST_dual_equity.json",
            meta.job_id, meta.symbol, meta.timeframe
        );
        let artifact_path = self.layout.results_csv().join(&artifact_name);
        std::fs::write(&artifact_path, serde_json::to_vec_pretty(&curves).map_err(|e| {
            crate::error::AgentError::Format(format!("equity curves serialization: {e}"))
        })?)?;

        self.api.upload_daily_summary(&artifact_path, &meta.job_id).await?;
        Ok(())
    }
}

/// Reads the `RUN-{N}` and `OS-{P}` tokens back out of a retest filename.
fn parse_run_suffix(file_name: &str) -> (usize, i64) {
    let mut runs = 0;
    let mut os = 0;
    for part in file_name.split('_') {
        if let Some(n) = part.strip_prefix("RUN-") {
            runs = n.parse().unwrap_or(0);
        } else if let Some(p) = part.strip_prefix("OS-") {
            os = p.parse().unwrap_or(0);
        }
    }
    (runs, os)
}
