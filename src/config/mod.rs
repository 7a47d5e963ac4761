//! Agent configuration
//!
//! One nested record drives every subsystem. Defaults mirror the production
//! deployment; deploy-specific values (endpoint, credentials, managed root)
//! come from environment variables so the binary needs no config file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cloud: CloudConfig,
    pub auth: AuthConfig,
    pub download: DownloadConfig,
    pub poll: PollConfig,
    pub burst: BurstConfig,
    pub watcher: WatcherConfig,
    pub logging: LoggingConfig,
    /// Root of the managed folder tree shared with the engine.
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    pub base_url: String,
    pub api_key: String,
    pub project_id: String,
    /// Per-request timeout on every cloud call.
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    pub max_concurrent: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub limit: u32,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub remaining_jobs_threshold: usize,
    pub adaptive: bool,
    pub exponential_factor: f64,
    pub max_empty_polls: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BurstConfig {
    pub enabled: bool,
    pub delay_after_upload_secs: u64,
    pub job_threshold: usize,
    pub cooldown_secs: u64,
    pub on_opt_upload: bool,
    pub on_summary_upload: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    pub tick_secs: u64,
    /// Gap between the two size samples of the file-stability probe.
    pub stability_gap_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cloud: CloudConfig {
                base_url: String::new(),
                api_key: String::new(),
                project_id: String::new(),
                http_timeout_secs: 30,
            },
            auth: AuthConfig {
                email: String::new(),
                password: String::new(),
            },
            download: DownloadConfig {
                max_concurrent: 3,
                retry_attempts: 3,
                retry_delay_ms: 1000,
            },
            poll: PollConfig {
                limit: 10,
                min_interval_ms: 5 * 60 * 1000,
                max_interval_ms: 30 * 60 * 1000,
                remaining_jobs_threshold: 3,
                adaptive: true,
                exponential_factor: 1.5,
                max_empty_polls: 3,
            },
            burst: BurstConfig {
                enabled: true,
                delay_after_upload_secs: 30,
                job_threshold: 3,
                cooldown_secs: 60,
                on_opt_upload: true,
                on_summary_upload: true,
            },
            watcher: WatcherConfig {
                tick_secs: 10,
                stability_gap_secs: 2,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                dir: PathBuf::from("logs"),
            },
            root: PathBuf::from("files"),
        }
    }
}

impl Config {
    /// Builds the configuration from defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        if let Ok(v) = std::env::var("QUANTRELAY_BASE_URL") {
            cfg.cloud.base_url = v;
        }
        if let Ok(v) = std::env::var("QUANTRELAY_API_KEY") {
            cfg.cloud.api_key = v;
        }
        if let Ok(v) = std::env::var("QUANTRELAY_PROJECT_ID") {
            cfg.cloud.project_id = v;
        }
        if let Ok(v) = std::env::var("QUANTRELAY_EMAIL") {
            cfg.auth.email = v;
        }
        if let Ok(v) = std::env::var("QUANTRELAY_PASSWORD") {
            cfg.auth.password = v;
        }
        if let Ok(v) = std::env::var("QUANTRELAY_ROOT") {
            cfg.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("QUANTRELAY_LOG_DIR") {
            cfg.logging.dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("QUANTRELAY_LOG_LEVEL") {
            cfg.logging.level = v;
        }
        cfg
    }

    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.min_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.max_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.download.retry_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.cloud.http_timeout_secs)
    }

    pub fn watcher_tick(&self) -> Duration {
        Duration::from_secs(self.watcher.tick_secs)
    }

    pub fn stability_gap(&self) -> Duration {
        Duration::from_secs(self.watcher.stability_gap_secs)
    }

    pub fn burst_delay(&self) -> Duration {
        Duration::from_secs(self.burst.delay_after_upload_secs)
    }

    pub fn burst_cooldown(&self) -> Duration {
        Duration::from_secs(self.burst.cooldown_secs)
    }
}

/// Formats a duration for log lines: seconds, whole minutes, or whole hours.
pub fn format_duration(d: Duration) -> String {
    let s = d.as_secs();
    if s < 60 {
        format!("{s}s")
    } else if s < 3600 {
        format!("{}m", s / 60)
    } else {
        format!("{}h", s / 3600)
    }
}
