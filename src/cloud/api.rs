//! REST client for the cloud job service
//!
//! Endpoint shapes:
//! - `POST /functions/v1/poll-jobs` - pending jobs, `{ limit }`
//! - `GET  /functions/v1/download-job-xml?job_id=…&force=true` - regenerate
//! - `POST /functions/v1/ingest-trades-csv` - multipart file + symbol/timeframe
//! - `POST /functions/v1/upload-opt-results` - multipart file + job_id/type
//! - `POST /functions/v1/upload-daily-summary` - multipart file + jobId/projectId
//! - `GET  /rest/v1/strategy_backtests?…source_job_id=eq.{id}…` - row probe
//!
//! Every call goes out with a bearer token and the service api key; uploads
//! put the payload in a multipart part named `file`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::cloud::auth::AuthManager;
use crate::cloud::types::{
    DailySummaryResponse, OptUploadResponse, PollJobsRequest, PollJobsResponse,
    TradeIngestResponse,
};
use crate::config::CloudConfig;
use crate::error::{AgentError, Result};

pub struct ApiClient {
    cfg: CloudConfig,
    auth: Arc<AuthManager>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(cfg: CloudConfig, auth: Arc<AuthManager>, http: reqwest::Client) -> Self {
        Self { cfg, auth, http }
    }

    async fn authed(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        self.auth.ensure_valid().await?;
        Ok(req
            .bearer_auth(self.auth.access_token().await)
            .header("apikey", self.auth.api_key()))
    }

    /// Asks the cloud for up to `limit` pending jobs.
    pub async fn poll_jobs(&self, limit: u32) -> Result<PollJobsResponse> {
        let url = format!("{}/functions/v1/poll-jobs", self.cfg.base_url);
        let req = self.authed(self.http.post(&url)).await?;
        let resp = req.json(&PollJobsRequest { limit }).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Api { status: status.as_u16(), body });
        }
        Ok(resp.json().await?)
    }

    /// Fetches the raw descriptor text behind a job's descriptor URL.
    pub async fn fetch_descriptor(&self, url: &str) -> Result<String> {
        debug!(url, "fetching descriptor text");
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Api { status: status.as_u16(), body });
        }
        Ok(resp.text().await?)
    }

    /// Tells the cloud to rebuild a descriptor whose cached copy carries
    /// empty data streams.
    pub async fn force_regenerate(&self, job_id: &str) -> Result<()> {
        let url = format!(
            "{}/functions/v1/download-job-xml?job_id={job_id}&force=true",
            self.cfg.base_url
        );
        let req = self.authed(self.http.get(&url)).await?;
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Api { status: status.as_u16(), body });
        }
        Ok(())
    }

    async fn file_part(path: &Path) -> Result<Part> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Part::bytes(bytes).file_name(name))
    }

    async fn send_upload(&self, url: &str, form: Form) -> Result<(u16, String)> {
        let req = self.authed(self.http.post(url)).await?;
        let resp = req.multipart(form).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AgentError::Upload { status: status.as_u16(), body });
        }
        Ok((status.as_u16(), body))
    }

    /// Uploads a trade-result CSV with its symbol and timeframe metadata.
    pub async fn upload_trades_csv(
        &self,
        path: &Path,
        symbol: &str,
        timeframe: &str,
    ) -> Result<TradeIngestResponse> {
        let url = format!("{}/functions/v1/ingest-trades-csv", self.cfg.base_url);
        let form = Form::new()
            .part("file", Self::file_part(path).await?)
            .text("symbol", symbol.to_string())
            .text("timeframe", timeframe.to_string());
        let (status, body) = self.send_upload(&url, form).await?;
        serde_json::from_str(&body).map_err(|_| AgentError::Upload { status, body })
    }

    /// Uploads a parameter-optimization result. `result_type` defaults to
    /// `performance` when empty.
    pub async fn upload_opt_results(
        &self,
        path: &Path,
        job_id: &str,
        result_type: &str,
    ) -> Result<OptUploadResponse> {
        let result_type = if result_type.is_empty() { "performance" } else { result_type };
        let url = format!("{}/functions/v1/upload-opt-results", self.cfg.base_url);
        let form = Form::new()
            .part("file", Self::file_part(path).await?)
            .text("job_id", job_id.to_string())
            .text("type", result_type.to_string());
        let (status, body) = self.send_upload(&url, form).await?;
        serde_json::from_str(&body).map_err(|_| AgentError::Upload { status, body })
    }

    /// Uploads a per-day summary, routed by jobId and the configured project.
    pub async fn upload_daily_summary(
        &self,
        path: &Path,
        job_id: &str,
    ) -> Result<DailySummaryResponse> {
        let url = format!("{}/functions/v1/upload-daily-summary", self.cfg.base_url);
        let form = Form::new()
            .part("file", Self::file_part(path).await?)
            .text("jobId", job_id.to_string())
            .text("projectId", self.cfg.project_id.clone());
        let (status, body) = self.send_upload(&url, form).await?;
        serde_json::from_str(&body).map_err(|_| AgentError::Upload { status, body })
    }

    /// Looks a job up by id. The poll endpoint is the only read surface the
    /// cloud exposes, so this polls wide and filters locally.
    pub async fn get_job(&self, job_id: &str) -> Result<Option<crate::cloud::CloudJob>> {
        let resp = self.poll_jobs(1000).await?;
        Ok(resp.jobs.into_iter().find(|j| j.id == job_id))
    }

    /// Does a result row exist for this job yet? An empty array means not yet.
    pub async fn backtest_exists(&self, job_id: &str) -> Result<bool> {
        let url = format!(
            "{}/rest/v1/strategy_backtests?select=id&source_job_id=eq.{job_id}&limit=1",
            self.cfg.base_url
        );
        let req = self.authed(self.http.get(&url)).await?;
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AgentError::Api { status: status.as_u16(), body });
        }
        Ok(body.trim() != "[]")
    }

    /// Polls the row-existence probe every two seconds until it answers yes
    /// or `timeout` elapses. The cloud is eventually consistent after an
    /// upload, so absence within the window is not an error.
    pub async fn wait_for_backtest(&self, job_id: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.backtest_exists(job_id).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    /// Cheap authenticated GET against the REST root, used at startup.
    pub async fn test_connection(&self) -> Result<()> {
        let url = format!("{}/rest/v1/", self.cfg.base_url);
        let resp = self
            .http
            .get(&url)
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Api { status: status.as_u16(), body });
        }
        Ok(())
    }
}
