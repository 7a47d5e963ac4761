//! Trade-result watcher
//!
//! Scans `results/to_do` for `.csv` artifacts, uploads each to the
//! trade-ingest endpoint with the symbol and timeframe parsed from its
//! filename, and moves successes to `results/done`. A failed upload leaves
//! the file in place so the next tick retries it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::cloud::ApiClient;
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::names;
use crate::store::{self, FolderLayout};

pub struct TradeResultWatcher {
    config: Arc<Config>,
    layout: FolderLayout,
    api: Arc<ApiClient>,
}

impl TradeResultWatcher {
    pub fn new(config: Arc<Config>, layout: FolderLayout, api: Arc<ApiClient>) -> Self {
        Self { config, layout, api }
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.watcher_tick());
        info!("trade result monitoring started");
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => self.process_files().await,
            }
        }
        info!("trade result monitoring stopped");
    }

    async fn process_files(&self) {
        let source = self.layout.results_to_do();
        let files = match store::list_by_extension(&source, ".csv") {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "failed to list trade results");
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
                Ok(()) => {
                    if let Err(e) =
                        store::move_file(&file_name, &source, &self.layout.results_done())
                    {
                        error!(file = %file_name, error = %e, "failed to move trade result to done");
                    } else {
                        info!(file = %file_name, "trade result uploaded and moved to done");
                    }
                }
                Err(e) => {
                    // left in place, retried on the next tick
                    warn!(file = %file_name, error = %e, "trade result upload failed");
                }
            }
        }
    }

    async fn upload_file(&self, file_name: &str) -> Result<()> {
        let (symbol, timeframe) = names::parse_trade_result(file_name)?;
        let path = self.layout.results_to_do().join(file_name);
        info!(file = %file_name, %symbol, %timeframe, "uploading trade result");
        let resp = self.api.upload_trades_csv(&path, &symbol, &timeframe).await?;
        if !resp.success {
            return Err(AgentError::Validation(format!(
                "cloud rejected trade result: {}",
                resp.message
            )));
        }
        Ok(())
    }
}
