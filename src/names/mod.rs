//! Filename schema
//!
//! Canonical on-disk names encode the identifiers the watchers need to route
//! an artifact without opening it:
//!
//! - descriptor: `{jobId}_{symbolTok}_{timeframeTok}_{TASK}[_{suffix}].job`
//! - trade result: `{symbolTok}_{timeframeTok}_{jobId}.csv`
//! - opt result: `{jobId}_{symbolTok}_{timeframeTok}_{TASK}_Results.opt`
//! - per-day summary: `{jobId}_{symbolTok}_{timeframeTok}_..._Daily.rep`
//!
//! Symbol and timeframe tokens replace every comma in the source list with a
//! hyphen so multi-symbol/multi-timeframe jobs stay one path segment.

use crate::error::{AgentError, Result};

/// Task types recognized in descriptor filenames and `task_type` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Backtest,
    Optimization,
    Retest,
    Oos,
    MultiMarket,
    MultiTimeframe,
    WalkForward,
    WalkForwardMatrix,
    DynamicWalkForwardMatrix,
    Condition,
    WalkForwardRetest,
}

impl TaskType {
    pub fn from_tag(value: &str) -> Option<Self> {
        match value.trim() {
            "BACKTEST" => Some(Self::Backtest),
            "OPTIMIZATION" => Some(Self::Optimization),
            "RETEST" => Some(Self::Retest),
            "OOS" => Some(Self::Oos),
            "MM" => Some(Self::MultiMarket),
            "MTF" => Some(Self::MultiTimeframe),
            "WFO" => Some(Self::WalkForward),
            "WFM" => Some(Self::WalkForwardMatrix),
            "DWFM" => Some(Self::DynamicWalkForwardMatrix),
            "CONDITION" => Some(Self::Condition),
            "WFO_RETEST" => Some(Self::WalkForwardRetest),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Backtest => "BACKTEST",
            Self::Optimization => "OPTIMIZATION",
            Self::Retest => "RETEST",
            Self::Oos => "OOS",
            Self::MultiMarket => "MM",
            Self::MultiTimeframe => "MTF",
            Self::WalkForward => "WFO",
            Self::WalkForwardMatrix => "WFM",
            Self::DynamicWalkForwardMatrix => "DWFM",
            Self::Condition => "CONDITION",
            Self::WalkForwardRetest => "WFO_RETEST",
        }
    }

    /// The walk-forward family splits a date range into IS/OS windows.
    pub fn is_walk_forward(&self) -> bool {
        matches!(
            self,
            Self::WalkForward | Self::WalkForwardMatrix | Self::DynamicWalkForwardMatrix
        )
    }
}

/// Identifiers parsed back out of a result filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMeta {
    pub job_id: String,
    pub symbol: String,
    pub timeframe: String,
}

/// Derives the filename token for a comma-separated symbol or timeframe list.
pub fn token(list: &str) -> String {
    list.replace(',', "-")
}

/// Synthesizes the descriptor filename stem `{jobId}_{symbolTok}_{timeframeTok}_{TASK}`.
pub fn descriptor_stem(job_id: &str, symbol: &str, timeframe: &str, task: &str) -> String {
    format!("{job_id}_{}_{}_{task}", token(symbol), token(timeframe))
}

/// Synthesizes the second-pass filename stem, suffixed `RUN-{N}_OS-{P}`.
pub fn retest_stem(
    job_id: &str,
    symbol: &str,
    timeframe: &str,
    total_runs: usize,
    os_percent: i64,
) -> String {
    format!(
        "{job_id}_{}_{}_WFO_RETEST_RUN-{total_runs}_OS-{os_percent}",
        token(symbol),
        token(timeframe)
    )
}

fn with_market_prefix(symbol: &str) -> String {
    if symbol.starts_with('@') {
        symbol.to_string()
    } else {
        format!("@{symbol}")
    }
}

/// Extracts `(symbol, timeframe)` from a trade-result filename.
pub fn parse_trade_result(file_name: &str) -> Result<(String, String)> {
    let stem = file_name.trim_end_matches(".csv");
    let mut parts = stem.split('_');
    match (parts.next(), parts.next()) {
        (Some(symbol), Some(timeframe)) if !symbol.is_empty() && !timeframe.is_empty() => {
            Ok((with_market_prefix(symbol), timeframe.to_string()))
        }
        _ => Err(AgentError::Validation(format!(
            "trade result filename lacks symbol and timeframe: {file_name}"
        ))),
    }
}

/// Extracts `(jobId, symbol, timeframe)` from an opt-result or retest-trades
/// filename: the first three underscore-separated tokens.
pub fn parse_result_meta(file_name: &str) -> Result<ResultMeta> {
    let stem = match file_name.rfind('.') {
        Some(dot) => &file_name[..dot],
        None => file_name,
    };
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 3 {
        return Err(AgentError::Validation(format!(
            "filename does not carry jobId/symbol/timeframe: {file_name}"
        )));
    }
    Ok(ResultMeta {
        job_id: parts[0].to_string(),
        symbol: with_market_prefix(parts[1]),
        timeframe: parts[2].to_string(),
    })
}

/// Extracts the jobId from a per-day summary filename: the leading token up
/// to the first underscore is always the jobId, whatever follows it.
pub fn daily_summary_job_id(file_name: &str) -> Option<String> {
    let head = file_name.split('_').next()?;
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

/// Conservative predicate: does this parameter-optimization filename look
/// like walk-forward output? True only on an explicit `_WFO_`/`_WFM_`/`_DWFM_`
/// marker; a plain `_OPT_` file is never a candidate.
pub fn looks_like_walk_forward(file_name: &str) -> bool {
    let upper = file_name.to_uppercase();
    if upper.contains("_WFO_") || upper.contains("_WFM_") || upper.contains("_DWFM_") {
        return true;
    }
    false
}
