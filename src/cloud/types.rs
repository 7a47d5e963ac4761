//! Wire types for the cloud job service

use serde::{Deserialize, Serialize};

/// One pending job as returned by the poll endpoint. Never mutated locally;
/// the downloader consumes it and the folder tree takes over from there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudJob {
    pub id: String,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub workflow_task_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "xmlUrl")]
    pub xml_url: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub task_type: String,
    /// Set when the cloud has replaced the descriptor behind `xml_url`.
    #[serde(default)]
    pub redownload: bool,
}

#[derive(Debug, Serialize)]
pub struct PollJobsRequest {
    pub limit: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollJobsResponse {
    #[serde(default)]
    pub jobs: Vec<CloudJob>,
}

#[derive(Debug, Deserialize)]
pub struct TradeIngestResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OptUploadResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DailySummaryResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub message: Option<String>,
}
