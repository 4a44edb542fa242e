//! Minimal pull server for BLOOMIN8 frames
//!
//! Run with: cargo run --example pull_server --features axum
//!
//! Configuration is read from the YAML file named by `BLOOMIN8_PULL_CONFIG`.
//! Then test with:
//!   curl -H 'X-Access-Token: change-me' 'http://localhost:8080/eink_pull?battery=80'

use std::sync::Arc;

use bloomin8_pull::{axum_ext, PullConfig, PullService};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (honors RUST_LOG if present)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bloomin8_pull=debug"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();

    let config = PullConfig::from_env_path()?;
    let mut service = PullService::new(config)?;
    service.subscribe(|state| {
        tracing::info!(
            battery = ?state.battery,
            success = ?state.success,
            last_seen = ?state.last_seen,
            enabled = state.is_enabled(),
            "Device state updated"
        );
    });

    let app = axum_ext::router(Arc::new(service));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
