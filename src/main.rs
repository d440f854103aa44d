use clap::Parser;
use dotenv::dotenv;
use mytube_gateway::MyTubeClient;
use mytube_gateway::clock::SystemClock;
use mytube_gateway::config::Args;
use mytube_gateway::handlers;
use mytube_gateway::rate_limit::RateLimiter;
use mytube_gateway::state::AppState;
use mytube_gateway::telemetry::TracingSink;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    // parse cli arguments
    let args = Args::parse();

    let client = match MyTubeClient::with_hooks(
        args.client_config(),
        Arc::new(SystemClock),
        Arc::new(TracingSink),
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(AppState {
        client,
        rate_limiter: RateLimiter::new(args.rate_limit, Duration::from_secs(args.rate_window)),
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Gateway running on http://localhost:{}", args.port);
    tracing::info!("Forwarding to {}", args.base_url);
    tracing::info!(
        "Rate limit: {} requests per {} seconds",
        args.rate_limit,
        args.rate_window
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
