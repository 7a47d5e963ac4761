//! Walk-forward second pass
//!
//! When a walk-forward job's parameter-optimization output lands, its
//! optimized values get folded back into a `WFO_RETEST` descriptor that
//! re-runs every window with fixed parameters. The whole pipeline is
//! best-effort: the optimization result has already been uploaded, so any
//! failure here is logged and swallowed.

pub mod builder;
pub mod equity;
pub mod monitor;
pub mod table;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::cloud::ApiClient;
use crate::codec;
use crate::error::{AgentError, Result};
use crate::names::{self, ResultMeta, TaskType};
use crate::retest::table::OptRow;
use crate::store::FolderLayout;

pub struct SecondPassGenerator {
    layout: FolderLayout,
    api: Arc<ApiClient>,
}

impl SecondPassGenerator {
    pub fn new(layout: FolderLayout, api: Arc<ApiClient>) -> Self {
        Self { layout, api }
    }

    /// Runs the full second pass, logging and swallowing every failure so
    /// the caller's upload outcome stands.
    pub async fn run_best_effort(&self, opt_path: &Path, meta: &ResultMeta) {
        match self.generate(opt_path, meta).await {
            Ok(Some(path)) => {
                info!(job_id = %meta.job_id, path = %path.display(), "second-pass descriptor placed for engine");
            }
            Ok(None) => {
                debug!(job_id = %meta.job_id, "optimization output is not walk-forward, no second pass");
            }
            Err(e) => {
                warn!(job_id = %meta.job_id, error = %e, "second pass abandoned");
            }
        }
    }

    /// Decompress → parse → gate → rebuild → persist. Returns the placed
    /// container path, or `None` when the artifact turns out not to be
    /// walk-forward output.
    pub async fn generate(&self, opt_path: &Path, meta: &ResultMeta) -> Result<Option<PathBuf>> {
        let body = codec::decompress_to_string(opt_path)?;
        let rows = table::parse_table(&body);
        if rows.is_empty() {
            return Ok(None);
        }

        if !self.task_type_allows_second_pass(&meta.job_id).await {
            return Ok(None);
        }

        let original = self.load_original_descriptor(meta)?;
        let os_percent = read_os_percent(&original)
            .or_else(|| derive_os_percent(&rows[0]))
            .unwrap_or(0);

        let doc = builder::build_second_pass(
            &original,
            &rows,
            &meta.job_id,
            &meta.symbol,
            &meta.timeframe,
            os_percent,
        )?;

        let stem = names::retest_stem(&meta.job_id, &meta.symbol, &meta.timeframe, rows.len(), os_percent);
        let xml_path = self.layout.jobs_to_do().join(format!("{stem}.xml"));
        std::fs::write(&xml_path, &doc)?;
        // the .xml stays behind as a review artifact
        let job_path = codec::compress_descriptor(&xml_path, false)?;
        Ok(Some(job_path))
    }

    /// The filename predicate can false-positive, so when the cloud knows
    /// the job's task type and it is not walk-forward, stop here. An unknown
    /// job record is not disqualifying; filename plus table content carry
    /// enough evidence.
    async fn task_type_allows_second_pass(&self, job_id: &str) -> bool {
        match self.api.get_job(job_id).await {
            Ok(Some(job)) => match TaskType::from_tag(&job.task_type) {
                Some(TaskType::WalkForward) | Some(TaskType::WalkForwardMatrix) => true,
                Some(other) => {
                    debug!(job_id, task_type = other.as_tag(), "task type is not walk-forward");
                    false
                }
                None => true,
            },
            Ok(None) => {
                debug!(job_id, "job record not found, proceeding on file evidence");
                true
            }
            Err(e) => {
                debug!(job_id, error = %e, "job lookup failed, proceeding on file evidence");
                true
            }
        }
    }

    /// The engine parks fully consumed descriptors under `jobs/completed`;
    /// the original walk-forward descriptor is the template source.
    fn load_original_descriptor(&self, meta: &ResultMeta) -> Result<String> {
        let file_name = format!(
            "{}.job",
            names::descriptor_stem(&meta.job_id, &meta.symbol, &meta.timeframe, "WFO")
        );
        let path = self.layout.jobs_completed().join(&file_name);
        if !path.exists() {
            return Err(AgentError::Validation(format!(
                "original descriptor not found: {}",
                path.display()
            )));
        }
        codec::decompress_to_string(&path)
    }
}

fn read_os_percent(original: &str) -> Option<i64> {
    codec::read_tag(original, "oos_percent")
        .ok()?
        .parse::<f64>()
        .ok()
        .map(|p| p as i64)
}

/// Fallback when the original descriptor lacks `oos_percent`: derive the
/// share from the first row's IS/OS spans.
fn derive_os_percent(row: &OptRow) -> Option<i64> {
    let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    let is_days = (parse(&row.is_end)? - parse(&row.is_start)?).num_days();
    let os_days = (parse(&row.os_end)? - parse(&row.os_start)?).num_days();
    let total = is_days + os_days;
    if total <= 0 {
        return None;
    }
    Some((os_days as f64 / total as f64 * 100.0) as i64)
}
