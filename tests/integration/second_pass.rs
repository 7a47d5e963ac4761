//! End-to-end walk-forward second pass against a temp managed root
//!
//! No cloud is reachable here: the job-record lookup fails closed into the
//! "proceed on file evidence" branch, which is exactly the offline behavior
//! the generator promises.

use std::path::Path;
use std::sync::Arc;

use quantrelay::cloud::{ApiClient, AuthManager};
use quantrelay::codec;
use quantrelay::config::CloudConfig;
use quantrelay::names::ResultMeta;
use quantrelay::retest::SecondPassGenerator;
use quantrelay::store::FolderLayout;
use tempfile::{tempdir, TempDir};

fn offline_api() -> Arc<ApiClient> {
    let cfg = CloudConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        api_key: "test-key".to_string(),
        project_id: "test-project".to_string(),
        http_timeout_secs: 2,
    };
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(2))
        .build()
        .unwrap();
    let auth = Arc::new(AuthManager::new(cfg.clone(), http.clone()));
    Arc::new(ApiClient::new(cfg, auth, http))
}

fn compress_text(text: &str, dest: &Path) {
    let staging = dest.with_extension("txt");
    std::fs::write(&staging, text).unwrap();
    codec::compress_file(&staging, dest).unwrap();
    std::fs::remove_file(&staging).unwrap();
}

fn original_descriptor() -> String {
    let jobs: Vec<String> = (1..=3)
        .map(|run| {
            format!(
                "<Job>\n  <Id>wfo-1</Id>\n  <task_type>WFO</task_type>\n  \
                 <filename>wfo-1_@ES_60_WFO.job</filename>\n  <run>{run}</run>\n  \
                 <Symbol>@ES</Symbol>\n  <Timeframe>60</Timeframe>\n  \
                 <oos_percent>20.0</oos_percent>\n  \
                 <startDate>2020-01-01</startDate>\n  <endDate>2022-12-31</endDate>\n  \
                 <parameters>\n  <a>\n    <value>20</value>\n    <param_type>OptRange</param_type>\n    \
                 <data_type>integer</data_type>\n    <optimizable_ind>true</optimizable_ind>\n  </a>\n  \
                 <b>\n    <value>50</value>\n    <param_type>OptRange</param_type>\n    \
                 <data_type>integer</data_type>\n    <optimizable_ind>true</optimizable_ind>\n  </b>\n  \
                 </parameters>\n</Job>"
            )
        })
        .collect();
    format!("<root>\n{}\n</root>", jobs.join("\n"))
}

const OPT_TABLE: &str = "\
run,parameters_json,is_start_date,is_end_date,os_start_date,os_end_date
1,{\"a\":\"10\",\"b\":\"20\"},2020-01-01,2020-12-31,2021-01-01,2021-04-30
2,{\"a\":\"30\",\"b\":\"80\"},2020-05-01,2021-04-30,2021-05-01,2021-08-31
3,{\"a\":\"35\",\"b\":\"85\"},2020-09-01,2021-08-31,2021-09-01,2021-12-31
";

fn seeded_layout() -> (TempDir, FolderLayout) {
    let dir = tempdir().unwrap();
    let layout = FolderLayout::new(dir.path());
    layout.ensure_directories().unwrap();

    compress_text(
        &original_descriptor(),
        &layout.jobs_completed().join("wfo-1_@ES_60_WFO.job"),
    );
    compress_text(
        OPT_TABLE,
        &layout.opt_done().join("wfo-1_@ES_60_WFO_Results.opt"),
    );
    (dir, layout)
}

fn meta() -> ResultMeta {
    ResultMeta {
        job_id: "wfo-1".to_string(),
        symbol: "@ES".to_string(),
        timeframe: "60".to_string(),
    }
}

#[tokio::test]
async fn second_pass_places_a_retest_descriptor_for_the_engine() {
    let (_dir, layout) = seeded_layout();
    let generator = SecondPassGenerator::new(layout.clone(), offline_api());

    let opt_path = layout.opt_done().join("wfo-1_@ES_60_WFO_Results.opt");
    let placed = generator.generate(&opt_path, &meta()).await.unwrap();

    let job_path = placed.expect("walk-forward output must produce a second pass");
    assert_eq!(
        job_path,
        layout.jobs_to_do().join("wfo-1_@ES_60_WFO_RETEST_RUN-3_OS-20.job")
    );
    assert!(job_path.exists());
    // the uncompressed document stays behind as a review artifact
    assert!(layout
        .jobs_to_do()
        .join("wfo-1_@ES_60_WFO_RETEST_RUN-3_OS-20.xml")
        .exists());

    let payload = codec::decompress_to_string(&job_path).unwrap();
    assert!(payload.starts_with("<root>"));
    assert!(payload.ends_with("</root>"));
    assert_eq!(payload.matches("<Job>").count(), 3);
    assert_eq!(payload.matches("<task_type>WFO_RETEST</task_type>").count(), 3);

    // every optimizable parameter is now fixed at its per-run optimum
    for value in ["10", "20", "30", "80", "35", "85"] {
        assert!(payload.contains(&format!("<value>{value}</value>")));
    }
    assert!(!payload.contains("OptRange"));
    assert!(!payload.contains("<optimizable_ind>true</optimizable_ind>"));
    for run in 1..=3 {
        assert!(payload.contains(&format!("<run>{run}</run>")));
    }
}

#[tokio::test]
async fn plain_optimization_output_is_left_alone() {
    let (_dir, layout) = seeded_layout();
    let generator = SecondPassGenerator::new(layout.clone(), offline_api());

    let opt_path = layout.opt_done().join("wfo-1_@ES_60_OPT_Results.opt");
    compress_text("pass,net_profit\n1,100.0\n", &opt_path);

    let placed = generator.generate(&opt_path, &meta()).await.unwrap();
    assert!(placed.is_none());
    assert!(quantrelay::store::list_by_extension(&layout.jobs_to_do(), ".job")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_original_descriptor_aborts_without_output() {
    let (_dir, layout) = seeded_layout();
    std::fs::remove_file(layout.jobs_completed().join("wfo-1_@ES_60_WFO.job")).unwrap();
    let generator = SecondPassGenerator::new(layout.clone(), offline_api());

    let opt_path = layout.opt_done().join("wfo-1_@ES_60_WFO_Results.opt");
    let result = generator.generate(&opt_path, &meta()).await;
    assert!(result.is_err());
    assert!(quantrelay::store::list_by_extension(&layout.jobs_to_do(), ".job")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn corrupt_container_aborts_without_output() {
    let (_dir, layout) = seeded_layout();
    let generator = SecondPassGenerator::new(layout.clone(), offline_api());

    let opt_path = layout.opt_in().join("wfo-1_@ES_60_WFO_Results.opt");
    std::fs::write(&opt_path, "not a zlib stream").unwrap();

    assert!(generator.generate(&opt_path, &meta()).await.is_err());
}
