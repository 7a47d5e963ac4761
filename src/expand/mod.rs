//! Job expansion pipeline
//!
//! Transforms one cloud-side descriptor into the engine-ready document:
//! either a single `root`-wrapped job, a fan-out over symbols or timeframes,
//! or the walk-forward run split. Routing is driven solely by the
//! `task_type` tag; the advisory `stage` tag is never consulted.
//!
//! All parse failures degrade to the single-job wrap: the engine can always
//! run the descriptor as-is, so expansion is total.

use chrono::{Days, NaiveDate};
use tracing::{debug, warn};

use crate::codec;
use crate::names::TaskType;

/// Date boundaries for one walk-forward run. OS dates are computed for every
/// run (chaining needs them), but the final extra run is emitted IS-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkForwardRange {
    pub is_start: NaiveDate,
    pub is_end: NaiveDate,
    pub os_start: NaiveDate,
    pub os_end: NaiveDate,
}

const DATE_FMT: &str = "%Y-%m-%d";

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

/// Expands a raw descriptor into the final `root`-wrapped document.
pub fn expand_descriptor(text: &str) -> String {
    let task_type = codec::read_tag(text, "task_type")
        .ok()
        .and_then(|t| TaskType::from_tag(&t));

    match task_type {
        Some(TaskType::MultiMarket) if codec::read_tag(text, "symbols").is_ok() => {
            expand_list(text, "Symbol", "symbols")
        }
        Some(TaskType::MultiTimeframe) if codec::read_tag(text, "timeframes").is_ok() => {
            expand_list(text, "Timeframe", "timeframes")
        }
        Some(t) if t.is_walk_forward() && codec::read_tag(text, "oos_runs").is_ok() => {
            expand_walk_forward(text)
        }
        _ => wrap_single(text),
    }
}

/// Single-job wrap: the descriptor passes through unchanged.
pub fn wrap_single(text: &str) -> String {
    format!("<root>\n{text}\n</root>")
}

fn wrap_jobs(jobs: Vec<String>) -> String {
    format!("<root>\n{}\n</root>", jobs.join("\n"))
}

/// Fan-out over a comma-separated list tag: one job element per entry, the
/// singular tag rewritten and the list tag dropped from each copy.
fn expand_list(text: &str, singular: &str, plural: &str) -> String {
    let Ok(list) = codec::read_tag(text, plural) else {
        return wrap_single(text);
    };
    let entries: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if entries.len() <= 1 {
        debug!(tag = plural, "single entry, wrapping as regular job");
        return wrap_single(text);
    }

    let jobs = entries
        .iter()
        .map(|entry| {
            let job = codec::replace_tag(text, singular, entry);
            codec::remove_tag(&job, plural)
        })
        .collect();
    wrap_jobs(jobs)
}

/// Computes the IS/OS windows for `runs` cloud-specified runs plus the final
/// IS-only extra run, `runs + 1` ranges in total.
///
/// Day budget: `daysPerRun = totalDays / (runs × oosFraction + isFraction)`,
/// floored into whole IS and OS day counts. Run 1 starts at the global
/// start; each later run starts `isDays` before the previous run's OS end,
/// the overlap the engine's boundary handling expects. Run `runs` (the
/// second-to-last) absorbs any remainder by ending at the global end.
pub fn walk_forward_runs(
    start: NaiveDate,
    end: NaiveDate,
    runs: u32,
    oos_percent: f64,
) -> Option<Vec<WalkForwardRange>> {
    if runs == 0 || end <= start || !(0.0..=100.0).contains(&oos_percent) {
        return None;
    }

    let oos_fraction = oos_percent / 100.0;
    let is_fraction = 1.0 - oos_fraction;
    let total_days = (end - start).num_days() as f64;
    let days_per_run = total_days / (runs as f64 * oos_fraction + is_fraction);
    let is_days = (days_per_run * is_fraction) as u64;
    let os_days = (days_per_run * oos_fraction) as u64;

    let mut ranges: Vec<WalkForwardRange> = Vec::with_capacity(runs as usize + 1);
    for run in 0..=runs {
        let is_start = if run == 0 {
            start
        } else {
            ranges[run as usize - 1]
                .os_end
                .checked_sub_days(Days::new(is_days))?
        };
        let is_end = is_start.checked_add_days(Days::new(is_days))?;
        let os_start = is_end.checked_add_days(Days::new(1))?;
        let os_end = if run == runs - 1 {
            end
        } else {
            is_end.checked_add_days(Days::new(1 + os_days))?
        };
        ranges.push(WalkForwardRange { is_start, is_end, os_start, os_end });
    }
    Some(ranges)
}

/// Walk-forward expansion: N+1 job elements in ascending run order, the last
/// being the IS-only extra run with `oos_percent` 0.0 and no OS dates.
fn expand_walk_forward(text: &str) -> String {
    let parsed = (|| {
        let runs: u32 = codec::read_tag(text, "oos_runs").ok()?.parse().ok()?;
        let percent_raw = codec::read_tag(text, "oos_percent").ok()?;
        let percent: f64 = percent_raw.parse().ok()?;
        let start = NaiveDate::parse_from_str(&codec::read_tag(text, "startDate").ok()?, DATE_FMT)
            .ok()?;
        let end =
            NaiveDate::parse_from_str(&codec::read_tag(text, "endDate").ok()?, DATE_FMT).ok()?;
        Some((runs, percent_raw, percent, start, end))
    })();

    let Some((runs, percent_raw, percent, start, end)) = parsed else {
        warn!("walk-forward descriptor failed to parse, wrapping as regular job");
        return wrap_single(text);
    };
    let Some(ranges) = walk_forward_runs(start, end, runs, percent) else {
        warn!(runs, percent, "walk-forward inputs out of range, wrapping as regular job");
        return wrap_single(text);
    };

    let last = ranges.len();
    let jobs = ranges
        .iter()
        .enumerate()
        .map(|(i, range)| {
            let run_number = i + 1;
            let is_final = run_number == last;

            let mut job = codec::add_tag(text, "run", &run_number.to_string());
            job = codec::replace_tag(&job, "startDate", &fmt_date(range.is_start));
            let end_date = if is_final { range.is_end } else { range.os_end };
            job = codec::replace_tag(&job, "endDate", &fmt_date(end_date));
            job = codec::add_tag(&job, "is_start_date", &fmt_date(range.is_start));
            job = codec::add_tag(&job, "is_end_date", &fmt_date(range.is_end));
            if is_final {
                // IS-only extra run for forward parameter optimization.
                job = codec::replace_tag(&job, "oos_percent", "0.0");
            } else {
                job = codec::add_tag(&job, "os_start_date", &fmt_date(range.os_start));
                job = codec::add_tag(&job, "os_end_date", &fmt_date(range.os_end));
                job = codec::replace_tag(&job, "oos_percent", &percent_raw);
            }
            codec::remove_tag(&job, "oos_runs")
        })
        .collect();
    wrap_jobs(jobs)
}
