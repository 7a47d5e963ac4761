//! Logging initialization
//!
//! - Production: structured JSON on stdout for log aggregation
//! - Development: human-readable, colored stdout
//!
//! Either way, a daily-rotated append-only file under the configured log
//! directory captures everything the agent does; the returned guard must be
//! held for the lifetime of the process so buffered lines get flushed.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize logging based on the environment and the configured sink.
pub fn init_logging(cfg: &LoggingConfig) -> WorkerGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));

    let file_appender = tracing_appender::rolling::daily(&cfg.dir, "agent.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);

    let is_production = matches!(
        std::env::var("QUANTRELAY_ENV").as_deref(),
        Ok("production") | Ok("prod")
    );

    if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stdout),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(true)
                    .with_writer(std::io::stdout),
            )
            .init();
    }

    guard
}
