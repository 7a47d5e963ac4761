//! Unit tests for the job expansion pipeline

use chrono::NaiveDate;
use quantrelay::expand::{expand_descriptor, walk_forward_runs};

fn descriptor(task_type: &str, extra: &str) -> String {
    format!(
        "<Job>\n  <Id>job-1</Id>\n  <task_type>{task_type}</task_type>\n  <stage>Optimize</stage>\n  \
         <Symbol>@ES</Symbol>\n  <Timeframe>60</Timeframe>\n  <startDate>2007-01-01</startDate>\n  \
         <endDate>2013-09-08</endDate>\n{extra}</Job>"
    )
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn every_expansion_is_root_wrapped_exactly_once() {
    let inputs = [
        descriptor("BACKTEST", ""),
        descriptor("MM", "  <symbols>@ES,@NQ</symbols>\n"),
        descriptor("MTF", "  <timeframes>60,240</timeframes>\n"),
        descriptor("WFO", "  <oos_runs>3</oos_runs>\n  <oos_percent>20</oos_percent>\n"),
    ];
    for input in inputs {
        let out = expand_descriptor(&input);
        assert!(out.starts_with("<root>"), "missing root prefix: {out:.60}");
        assert!(out.ends_with("</root>"));
        assert_eq!(out.matches("</root>").count(), 1);
    }
}

#[test]
fn multi_symbol_expansion_emits_one_job_per_symbol_in_order() {
    let input = descriptor("MM", "  <symbols>@ES,@NQ,@YM</symbols>\n");
    let out = expand_descriptor(&input);

    assert_eq!(out.matches("<Job>").count(), 3);
    assert!(!out.contains("<symbols>"));
    let es = out.find("<Symbol>@ES</Symbol>").unwrap();
    let nq = out.find("<Symbol>@NQ</Symbol>").unwrap();
    let ym = out.find("<Symbol>@YM</Symbol>").unwrap();
    assert!(es < nq && nq < ym);
}

#[test]
fn multi_timeframe_expansion_is_symmetric() {
    let input = descriptor("MTF", "  <timeframes>60,120,240</timeframes>\n");
    let out = expand_descriptor(&input);

    assert_eq!(out.matches("<Job>").count(), 3);
    assert!(!out.contains("<timeframes>"));
    for tf in ["60", "120", "240"] {
        assert!(out.contains(&format!("<Timeframe>{tf}</Timeframe>")));
    }
}

#[test]
fn single_entry_list_falls_back_to_plain_wrap() {
    let input = descriptor("MM", "  <symbols>@ES</symbols>\n");
    let out = expand_descriptor(&input);
    assert_eq!(out.matches("<Job>").count(), 1);
    assert!(out.contains("<symbols>@ES</symbols>"));
}

#[test]
fn routing_ignores_the_stage_tag() {
    // stage says Optimize; task_type says plain backtest, one job, no fan-out
    let input = descriptor("BACKTEST", "  <symbols>@ES,@NQ</symbols>\n");
    let out = expand_descriptor(&input);
    assert_eq!(out.matches("<Job>").count(), 1);
}

#[test]
fn mm_without_symbols_tag_wraps_single() {
    let input = descriptor("MM", "");
    assert_eq!(expand_descriptor(&input).matches("<Job>").count(), 1);
}

#[test]
fn walk_forward_day_arithmetic_follows_the_budget_split() {
    // totalDays = 2442, daysPerRun = 2442 / (3·0.2 + 0.8) = 1744.29,
    // isDays = 1395, osDays = 348
    let ranges =
        walk_forward_runs(date("2007-01-01"), date("2013-09-08"), 3, 20.0).unwrap();
    assert_eq!(ranges.len(), 4);

    assert_eq!(ranges[0].is_start, date("2007-01-01"));
    assert_eq!(ranges[0].is_end, date("2010-10-27"));
    assert_eq!(ranges[0].os_start, date("2010-10-28"));
    assert_eq!(ranges[0].os_end, date("2011-10-11"));

    // the second-to-last run's OS absorbs the remainder up to the global end
    assert_eq!(ranges[2].os_end, date("2013-09-08"));

    // run k >= 2 starts isDays before the previous OS end (intentional overlap)
    for pair in ranges.windows(2) {
        assert_eq!(pair[1].is_start, pair[0].os_end - chrono::Duration::days(1395));
        assert_eq!((pair[1].is_end - pair[1].is_start).num_days(), 1395);
    }
}

#[test]
fn walk_forward_document_has_n_plus_one_jobs() {
    let input = descriptor("WFO", "  <oos_runs>3</oos_runs>\n  <oos_percent>20</oos_percent>\n");
    let out = expand_descriptor(&input);

    assert_eq!(out.matches("<Job>").count(), 4);
    assert!(!out.contains("<oos_runs>"));
    for run in 1..=4 {
        assert!(out.contains(&format!("<run>{run}</run>")), "missing run {run}");
    }
    // normal runs carry OS windows; the extra final run does not
    assert_eq!(out.matches("<os_start_date>").count(), 3);
    assert_eq!(out.matches("<os_end_date>").count(), 3);
    assert_eq!(out.matches("<oos_percent>20</oos_percent>").count(), 3);
    assert_eq!(out.matches("<oos_percent>0.0</oos_percent>").count(), 1);
}

#[test]
fn final_extra_run_is_in_sample_only() {
    let input = descriptor("WFO", "  <oos_runs>2</oos_runs>\n  <oos_percent>25</oos_percent>\n");
    let out = expand_descriptor(&input);

    let last_job_at = out.rfind("<Job>").unwrap();
    let last_job = &out[last_job_at..];
    assert!(last_job.contains("<oos_percent>0.0</oos_percent>"));
    assert!(!last_job.contains("<os_start_date>"));
    assert!(!last_job.contains("<os_end_date>"));

    // its endDate equals its IS end
    let ranges = walk_forward_runs(date("2007-01-01"), date("2013-09-08"), 2, 25.0).unwrap();
    let final_is_end = ranges.last().unwrap().is_end.format("%Y-%m-%d").to_string();
    assert!(last_job.contains(&format!("<endDate>{final_is_end}</endDate>")));
    assert!(last_job.contains(&format!("<is_end_date>{final_is_end}</is_end_date>")));
}

#[test]
fn dwfm_routes_through_walk_forward() {
    let input = descriptor("DWFM", "  <oos_runs>2</oos_runs>\n  <oos_percent>20</oos_percent>\n");
    assert_eq!(expand_descriptor(&input).matches("<Job>").count(), 3);
}

#[test]
fn unparseable_walk_forward_inputs_degrade_to_single_wrap() {
    for extra in [
        "  <oos_runs>abc</oos_runs>\n  <oos_percent>20</oos_percent>\n",
        "  <oos_runs>3</oos_runs>\n  <oos_percent>forty</oos_percent>\n",
        "  <oos_runs>3</oos_runs>\n  <oos_percent>140</oos_percent>\n",
    ] {
        let input = descriptor("WFO", extra);
        let out = expand_descriptor(&input);
        assert_eq!(out.matches("<Job>").count(), 1, "should fall back: {extra}");
    }
}
