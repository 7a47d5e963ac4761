//! Token lifecycle for the cloud service
//!
//! Password-grant sign-in plus refresh-token renewal. Tokens are held behind
//! a lock so every subsystem shares one session; `ensure_valid` is the guard
//! callers hit before any cloud operation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::CloudConfig;
use crate::error::{AgentError, Result};

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Default, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
}

pub struct AuthManager {
    cfg: CloudConfig,
    http: reqwest::Client,
    state: RwLock<TokenState>,
}

impl AuthManager {
    pub fn new(cfg: CloudConfig, http: reqwest::Client) -> Self {
        Self {
            cfg,
            http,
            state: RwLock::new(TokenState::default()),
        }
    }

    /// Signs in with email and password, replacing any current session.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<()> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.cfg.base_url);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Auth(format!("sign-in failed: http {status} - {body}")));
        }
        let token: TokenResponse = resp.json().await?;
        self.store(token).await;
        info!("authenticated with cloud service");
        Ok(())
    }

    /// Renews the session from the stored refresh token.
    pub async fn refresh(&self) -> Result<()> {
        let refresh_token = {
            let state = self.state.read().await;
            if state.refresh_token.is_empty() {
                return Err(AgentError::Auth("no refresh token".to_string()));
            }
            state.refresh_token.clone()
        };
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.cfg.base_url);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Auth(format!("refresh failed: http {status} - {body}")));
        }
        let token: TokenResponse = resp.json().await?;
        self.store(token).await;
        Ok(())
    }

    async fn store(&self, token: TokenResponse) {
        let mut state = self.state.write().await;
        state.access_token = token.access_token;
        state.refresh_token = token.refresh_token;
        state.expires_at = Some(Utc::now() + ChronoDuration::seconds(token.expires_in));
    }

    /// A token is treated as valid only with five minutes of slack left, so
    /// in-flight requests never straddle the expiry.
    pub async fn is_token_valid(&self) -> bool {
        let state = self.state.read().await;
        if state.access_token.is_empty() {
            return false;
        }
        match state.expires_at {
            Some(at) => at > Utc::now() + ChronoDuration::minutes(5),
            None => false,
        }
    }

    /// Refreshes when the current token is stale; errors when no session can
    /// be established at all.
    pub async fn ensure_valid(&self) -> Result<()> {
        if self.is_token_valid().await {
            return Ok(());
        }
        self.refresh().await
    }

    pub async fn access_token(&self) -> String {
        self.state.read().await.access_token.clone()
    }

    pub fn api_key(&self) -> &str {
        &self.cfg.api_key
    }

    pub async fn logout(&self) {
        let mut state = self.state.write().await;
        *state = TokenState::default();
    }
}
