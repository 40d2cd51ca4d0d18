use axum::{middleware, routing::get, Router};
use std::net::{IpAddr, SocketAddr};
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatekeeper::api::{self, middleware::gate_auth, AppState};
use gatekeeper::config::Config;
use gatekeeper::db;
use gatekeeper::jobs::expiry_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting gatekeeper server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
    };

    // Expiry sweep on a cron schedule
    let scheduler = JobScheduler::new().await?;
    let sweep_pool = pool.clone();
    scheduler
        .add(Job::new_async(
            config.expiry_sweep_schedule.as_str(),
            move |_uuid, _lock| {
                let pool = sweep_pool.clone();
                Box::pin(async move {
                    if let Err(e) = expiry_sweeper::sweep_expired(&pool, None).await {
                        tracing::error!(error = %e, "Expiry sweep failed");
                    }
                })
            },
        )?)
        .await?;
    scheduler.start().await?;
    tracing::info!("Expiry sweeper scheduled");

    // Scanner endpoints require the shared gate token
    let scan_routes = api::admission::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        gate_auth::require_gate_token,
    ));

    // Build router
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(scan_routes)
        .merge(api::events::router())
        .merge(api::rights::router())
        .merge(api::logs::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let host: IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((host, config.port));
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
