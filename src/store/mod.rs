//! Filesystem state
//!
//! The agent owns a fixed folder tree under one managed root. State-folder
//! membership is the durable record: a logical artifact lives in exactly one
//! of its class's status folders at any time, and transitions are renames.
//!
//! ```text
//! jobs/{to_do,in_progress,done,error}     descriptors for the engine
//! jobs/completed                          engine-managed, read-only to us
//! results/{to_do,done,temp,csv,trades}    trade results
//! opt/{in,done,error,summary}             optimization output + summaries
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Resolves every folder of the managed layout relative to one root.
#[derive(Debug, Clone)]
pub struct FolderLayout {
    root: PathBuf,
}

impl FolderLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jobs_to_do(&self) -> PathBuf {
        self.root.join("jobs").join("to_do")
    }

    pub fn jobs_in_progress(&self) -> PathBuf {
        self.root.join("jobs").join("in_progress")
    }

    pub fn jobs_done(&self) -> PathBuf {
        self.root.join("jobs").join("done")
    }

    pub fn jobs_error(&self) -> PathBuf {
        self.root.join("jobs").join("error")
    }

    /// Where the engine parks descriptors it has fully consumed. The agent
    /// only reads here (second-pass generation needs the original).
    pub fn jobs_completed(&self) -> PathBuf {
        self.root.join("jobs").join("completed")
    }

    pub fn results_to_do(&self) -> PathBuf {
        self.root.join("results").join("to_do")
    }

    pub fn results_done(&self) -> PathBuf {
        self.root.join("results").join("done")
    }

    pub fn results_temp(&self) -> PathBuf {
        self.root.join("results").join("temp")
    }

    pub fn results_csv(&self) -> PathBuf {
        self.root.join("results").join("csv")
    }

    pub fn results_trades(&self) -> PathBuf {
        self.root.join("results").join("trades")
    }

    pub fn opt_in(&self) -> PathBuf {
        self.root.join("opt").join("in")
    }

    pub fn opt_done(&self) -> PathBuf {
        self.root.join("opt").join("done")
    }

    pub fn opt_error(&self) -> PathBuf {
        self.root.join("opt").join("error")
    }

    pub fn opt_summary(&self) -> PathBuf {
        self.root.join("opt").join("summary")
    }

    /// Creates every folder of the layout.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.jobs_to_do(),
            self.jobs_in_progress(),
            self.jobs_done(),
            self.jobs_error(),
            self.jobs_completed(),
            self.results_to_do(),
            self.results_done(),
            self.results_temp(),
            self.results_csv(),
            self.results_trades(),
            self.opt_in(),
            self.opt_done(),
            self.opt_error(),
            self.opt_summary(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Lists plain files in `dir` whose name ends with `ext` (e.g. ".job").
/// Enumeration order is whatever the directory yields.
pub fn list_by_extension(dir: &Path, ext: &str) -> Result<Vec<String>> {
    list_matching(dir, |name| name.ends_with(ext))
}

/// Lists plain files in `dir` whose name ends with `suffix` (e.g. "_Daily.rep").
pub fn list_by_suffix(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    list_matching(dir, |name| name.ends_with(suffix))
}

fn list_matching(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if keep(&name) {
            files.push(name);
        }
    }
    Ok(files)
}

/// Counts `.job` files in a folder, the scheduler's backlog signal.
pub fn count_job_files(dir: &Path) -> usize {
    list_by_extension(dir, ".job").map(|v| v.len()).unwrap_or(0)
}

/// Moves `file_name` from one status folder to another. A pre-existing file
/// at the destination is removed first so the rename cannot fail with an
/// exists error on platforms that refuse to overwrite.
pub fn move_file(file_name: &str, from_dir: &Path, to_dir: &Path) -> Result<()> {
    let from = from_dir.join(file_name);
    let to = to_dir.join(file_name);
    if to.exists() {
        std::fs::remove_file(&to)?;
    }
    std::fs::rename(&from, &to)?;
    Ok(())
}

/// File and byte counts across a set of folders, for status logging.
pub fn occupancy(dirs: &[PathBuf]) -> (usize, u64) {
    let mut count = 0;
    let mut bytes = 0;
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if meta.is_file() {
                count += 1;
                bytes += meta.len();
            }
        }
    }
    (count, bytes)
}

/// "File complete" predicate: two size samples separated by `gap` must agree
/// before a watcher reads a file another process may still be writing.
pub async fn file_is_stable(path: &Path, gap: Duration) -> bool {
    let Ok(first) = std::fs::metadata(path) else {
        return false;
    };
    tokio::time::sleep(gap).await;
    let Ok(second) = std::fs::metadata(path) else {
        return false;
    };
    first.len() == second.len()
}

/// Formats a byte count the way the status log reports folder sizes.
pub fn format_file_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}
