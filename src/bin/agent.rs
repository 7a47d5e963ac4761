//! quantrelay agent daemon
//!
//! Headless entrypoint: loads configuration from the environment, signs in
//! to the cloud, bootstraps the managed folder tree, and runs the relay
//! until interrupted.

use std::sync::Arc;

use dotenvy::dotenv;
use quantrelay::cloud::{ApiClient, AuthManager};
use quantrelay::config::Config;
use quantrelay::core::Agent;
use quantrelay::logging;
use quantrelay::store::FolderLayout;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = Arc::new(Config::from_env());
    let _log_guard = logging::init_logging(&config.logging);

    info!("starting quantrelay agent");
    if config.cloud.base_url.is_empty() {
        return Err("QUANTRELAY_BASE_URL must be set".into());
    }

    let layout = FolderLayout::new(&config.root);
    layout.ensure_directories()?;
    info!(root = %layout.root().display(), "managed folder tree ready");

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()?;
    let auth = Arc::new(AuthManager::new(config.cloud.clone(), http.clone()));
    let api = Arc::new(ApiClient::new(
        config.cloud.clone(),
        Arc::clone(&auth),
        http,
    ));

    if let Err(e) = api.test_connection().await {
        warn!(error = %e, "cloud connection test failed, continuing anyway");
    }

    if config.auth.email.is_empty() {
        return Err("QUANTRELAY_EMAIL and QUANTRELAY_PASSWORD must be set".into());
    }
    auth.authenticate(&config.auth.email, &config.auth.password)
        .await?;

    let agent = Agent::new(
        Arc::clone(&config),
        layout,
        Arc::clone(&auth),
        Arc::clone(&api),
    );
    let (stop_tx, stop_rx) = watch::channel(false);
    let agent_task = tokio::spawn(agent.run(stop_rx));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping agent");
    let _ = stop_tx.send(true);
    let _ = agent_task.await;

    info!("agent stopped");
    Ok(())
}
