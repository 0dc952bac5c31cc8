use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cartd::api::{self, AppState};
use cartd::config::AppConfig;
use cartd::security::TieredRateLimiter;
use cartd::server::Server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cartd=info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "cartd stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::in_memory(config.cache_ttl));
    let limiter = Arc::new(TieredRateLimiter::new(&config.api_prefix, config.rate_limits)?);
    let pipeline =
        api::pipeline_with_limiter(&config.api_prefix, Arc::clone(&state), Arc::clone(&limiter));

    let sweeper = (!config.sweep_interval.is_zero())
        .then(|| api::spawn_sweeper(state, limiter, config.sweep_interval));

    let server = Server::bind(&config.addr).await?;
    let served = server
        .run_until(move |request| pipeline.handle(request), shutdown_signal())
        .await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    served?;

    info!("cartd shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
