//! Descriptor downloader
//!
//! Pulls each polled job's descriptor text from the cloud, repairs
//! server-side cache corruption, runs the expander, and publishes the
//! compressed container into `jobs/to_do` where the engine picks it up.
//! Work-in-progress lives under a temp name; only a finished container is
//! ever visible to the engine.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cloud::{ApiClient, CloudJob};
use crate::codec;
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::expand;
use crate::names;
use crate::store::FolderLayout;

#[derive(Debug, Default, Clone, Copy)]
pub struct DownloadStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

pub struct Downloader {
    config: Arc<Config>,
    layout: FolderLayout,
    api: Arc<ApiClient>,
    semaphore: Arc<Semaphore>,
}

impl Downloader {
    pub fn new(config: Arc<Config>, layout: FolderLayout, api: Arc<ApiClient>) -> Self {
        let permits = config.download.max_concurrent.max(1);
        Self {
            config,
            layout,
            api,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Downloads a polled batch in parallel, bounded by the concurrency
    /// ceiling. Per-job failures are logged, never fatal to the batch.
    pub async fn download_all(self: &Arc<Self>, jobs: Vec<CloudJob>) -> DownloadStats {
        let mut stats = DownloadStats {
            total: jobs.len(),
            ..Default::default()
        };
        if jobs.is_empty() {
            return stats;
        }

        let mut set = JoinSet::new();
        for job in jobs {
            let this = Arc::clone(self);
            set.spawn(async move {
                // closed only on shutdown, when the outcome no longer matters
                let Ok(_permit) = this.semaphore.acquire().await else {
                    return (job.id.clone(), Err(AgentError::Validation("shutting down".into())));
                };
                let outcome = this.download_one(&job).await;
                (job.id.clone(), outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((job_id, Ok(path))) => {
                    stats.successful += 1;
                    info!(job_id, path = %path.display(), "descriptor ready for engine");
                }
                Ok((job_id, Err(e))) => {
                    stats.failed += 1;
                    error!(job_id, error = %e, "descriptor download failed");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(error = %e, "download task panicked");
                }
            }
        }
        stats
    }

    /// Fetch → name → repair → expand → compress, leaving exactly one `.job`
    /// in `jobs/to_do` on success and nothing on failure.
    pub async fn download_one(&self, job: &CloudJob) -> Result<PathBuf> {
        if job.redownload {
            info!(job_id = %job.id, "redownloading job marked for replacement");
        }

        let to_do = self.layout.jobs_to_do();
        let temp_path = to_do.join(format!("{}_temp.xml", job.id));

        let result = self.place_descriptor(job, &temp_path).await;
        if result.is_err() && temp_path.exists() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result
    }

    async fn place_descriptor(&self, job: &CloudJob, temp_path: &PathBuf) -> Result<PathBuf> {
        let to_do = self.layout.jobs_to_do();

        let mut text = self.fetch_with_retry(&job.xml_url).await?;
        std::fs::write(temp_path, &text)?;

        let file_name = match target_file_name(&text) {
            Some(name) => name,
            None => {
                warn!(job_id = %job.id, "no filename tag in descriptor, synthesizing");
                format!(
                    "{}.xml",
                    names::descriptor_stem(&job.id, &job.symbol, &job.timeframe, &job.task_type)
                )
            }
        };

        let xml_path = to_do.join(&file_name);
        if xml_path.exists() {
            std::fs::remove_file(&xml_path)?;
        }
        std::fs::rename(temp_path, &xml_path)?;

        if has_empty_data_streams(&text) {
            info!(job_id = %job.id, "descriptor has empty data streams, regenerating");
            let regenerated = self.regenerate(job).await;
            match regenerated {
                Ok(fresh) => {
                    text = fresh;
                    std::fs::write(&xml_path, &text)?;
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&xml_path);
                    return Err(e);
                }
            }
        }

        let expanded = expand::expand_descriptor(&text);
        debug!(
            job_id = %job.id,
            jobs = expanded.matches("<Job>").count(),
            "descriptor expanded"
        );
        std::fs::write(&xml_path, &expanded)?;

        match codec::compress_descriptor(&xml_path, true) {
            Ok(job_path) => Ok(job_path),
            Err(e) => {
                let _ = std::fs::remove_file(&xml_path);
                let _ = std::fs::remove_file(xml_path.with_extension("job"));
                Err(e)
            }
        }
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let attempts = self.config.download.retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.api.fetch_descriptor(url).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(attempt, error = %e, "descriptor fetch failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AgentError::Validation("no download attempts".into())))
    }

    async fn regenerate(&self, job: &CloudJob) -> Result<String> {
        self.api.force_regenerate(&job.id).await?;
        self.api.fetch_descriptor(&job.xml_url).await
    }
}

/// Pulls the engine-facing filename out of the descriptor, converting a
/// trailing `.job` extension to the `.xml` working extension.
fn target_file_name(text: &str) -> Option<String> {
    let name = codec::read_tag(text, "filename").ok()?;
    if name.is_empty() {
        return None;
    }
    Some(match name.strip_suffix(".job") {
        Some(stem) => format!("{stem}.xml"),
        None => name,
    })
}

/// Detects the server-side cache bug where a descriptor arrives with empty
/// data streams: a whitespace-only `<item></item>` pair or a self-closing
/// `<market/>` / `<timeframe/>`.
fn has_empty_data_streams(text: &str) -> bool {
    if text.contains("<market/>") || text.contains("<timeframe/>") {
        return true;
    }
    let mut rest = text;
    while let Some(at) = rest.find("<item>") {
        let after = &rest[at + "<item>".len()..];
        if after.trim_start().starts_with("</item>") {
            return true;
        }
        rest = after;
    }
    false
}
