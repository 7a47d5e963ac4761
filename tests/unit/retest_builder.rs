//! Unit tests for second-pass descriptor construction

use quantrelay::retest::builder::{build_second_pass, extract_job_elements};
use quantrelay::retest::table::OptRow;

fn original_with_runs(runs: usize) -> String {
    let jobs: Vec<String> = (1..=runs)
        .map(|run| {
            format!(
                "<Job>\n  <Id>wfo-1</Id>\n  <task_type>WFO</task_type>\n  \
                 <filename>wfo-1_@ES_60_WFO.job</filename>\n  <run>{run}</run>\n  \
                 <Symbol>@ES</Symbol>\n  <Timeframe>60</Timeframe>\n  \
                 <startDate>2020-01-01</startDate>\n  <endDate>2022-12-31</endDate>\n  \
                 <parameters>\n  <a>\n    <start>10</start>\n    <end>50</end>\n    <step>5</step>\n    \
                 <value>20</value>\n    <param_type>OptRange</param_type>\n    \
                 <data_type>integer</data_type>\n    <optimizable_ind>true</optimizable_ind>\n  </a>\n  \
                 <b>\n    <start>50</start>\n    <end>100</end>\n    <step>5</step>\n    \
                 <value>50</value>\n    <param_type>OptRange</param_type>\n    \
                 <data_type>integer</data_type>\n    <optimizable_ind>true</optimizable_ind>\n  </b>\n  \
                 </parameters>\n</Job>"
            )
        })
        .collect();
    format!("<root>\n{}\n</root>", jobs.join("\n"))
}

fn rows(values: &[(&str, &str)]) -> Vec<OptRow> {
    values
        .iter()
        .enumerate()
        .map(|(i, (a, b))| OptRow {
            run: i as u32 + 1,
            parameters_json: format!(r#"{{"a":"{a}","b":"{b}"}}"#),
            ..Default::default()
        })
        .collect()
}

#[test]
fn job_elements_are_extracted_in_document_order() {
    let original = original_with_runs(3);
    let jobs = extract_job_elements(&original);
    assert_eq!(jobs.len(), 3);
    for (i, job) in jobs.iter().enumerate() {
        assert!(job.starts_with("<Job>"));
        assert!(job.ends_with("</Job>"));
        assert!(job.contains(&format!("<run>{}</run>", i + 1)));
    }
}

#[test]
fn second_pass_emits_one_job_per_row_with_fixed_values() {
    let original = original_with_runs(3);
    let rows = rows(&[("10", "20"), ("30", "80"), ("35", "85")]);
    let doc = build_second_pass(&original, &rows, "wfo-1", "@ES", "60", 20).unwrap();

    assert!(doc.starts_with("<root>"));
    assert!(doc.ends_with("</root>"));
    assert_eq!(doc.matches("<Job>").count(), 3);
    assert_eq!(doc.matches("<task_type>WFO_RETEST</task_type>").count(), 3);
    assert!(!doc.contains("<param_type>OptRange</param_type>"));
    assert!(!doc.contains("<optimizable_ind>true</optimizable_ind>"));

    for value in ["10", "20", "30", "80", "35", "85"] {
        assert!(
            doc.contains(&format!("<value>{value}</value>")),
            "missing optimized value {value}"
        );
    }
    assert_eq!(doc.matches("<param_type>Fixed</param_type>").count(), 6);
}

#[test]
fn second_pass_filename_encodes_run_count_and_os_share() {
    let original = original_with_runs(3);
    let rows = rows(&[("10", "20"), ("30", "80"), ("35", "85")]);
    let doc = build_second_pass(&original, &rows, "wfo-1", "@ES", "60", 20).unwrap();
    assert_eq!(
        doc.matches("<filename>wfo-1_@ES_60_WFO_RETEST_RUN-3_OS-20.job</filename>")
            .count(),
        3
    );
}

#[test]
fn run_tags_from_the_original_survive() {
    let original = original_with_runs(3);
    let rows = rows(&[("10", "20"), ("30", "80"), ("35", "85")]);
    let doc = build_second_pass(&original, &rows, "wfo-1", "@ES", "60", 20).unwrap();
    for run in 1..=3 {
        assert!(doc.contains(&format!("<run>{run}</run>")));
    }
}

#[test]
fn template_dates_are_preserved_unbuffered() {
    let original = original_with_runs(1);
    let rows = rows(&[("10", "20")]);
    let doc = build_second_pass(&original, &rows, "wfo-1", "@ES", "60", 20).unwrap();
    assert!(doc.contains("<startDate>2020-01-01</startDate>"));
    assert!(doc.contains("<endDate>2022-12-31</endDate>"));
}

#[test]
fn descriptor_without_jobs_is_rejected() {
    let rows = rows(&[("10", "20")]);
    assert!(build_second_pass("<root></root>", &rows, "x", "@ES", "60", 20).is_err());
}
