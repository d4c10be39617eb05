use be_payment_service::init_payment_service;
use be_remote_db::DatabaseManager;
use std::{future::Future, net::SocketAddr, sync::Arc};

mod jobs;

pub use jobs::JobSchedule;

/// Configuration for running the monolith server.
pub struct ServerConfig {
    pub database_url: String,
    pub http_addr: SocketAddr,
    /// Lets the server start without M-Pesa credentials; payment routes and
    /// billing jobs are then disabled.
    pub local_mode: bool,
    pub jobs: JobSchedule,
    /// When this receiver gets a value, the server shuts down gracefully.
    pub shutdown: tokio::sync::watch::Receiver<()>,
}

/// Sends on `shutdown_tx` once `signal` fires. If the signal cannot be
/// listened for, the sender is held forever so receivers keep running.
pub async fn forward_shutdown<F>(signal: F, shutdown_tx: tokio::sync::watch::Sender<()>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Failed to listen for CTRL+C, graceful shutdown unavailable: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received CTRL+C, initiating shutdown...");
    let _ = shutdown_tx.send(());
}

pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(posthog_key) = std::env::var("POSTHOG_API_KEY")
        .ok()
        .filter(|s| !s.is_empty())
    {
        match posthog_rs::init_global(posthog_key.as_str()).await {
            Ok(()) => tracing::info!("PostHog analytics initialized"),
            Err(e) => tracing::warn!("Failed to initialize PostHog: {}", e),
        }
    } else {
        tracing::info!("POSTHOG_API_KEY not set, analytics disabled");
    }

    let db_manager = Arc::new(DatabaseManager::new(&config.database_url).await?);

    let (payment_router, job_handles) = match init_payment_service(db_manager.clone()) {
        Ok((router, state)) => {
            let handles = jobs::spawn_billing_jobs(state, config.jobs, config.shutdown.clone());
            (router, handles)
        }
        Err(e) if config.local_mode => {
            tracing::warn!("Payment service disabled in local mode: {}", e);
            (axum::Router::new(), Vec::new())
        }
        Err(e) => {
            tracing::error!("Failed to initialize payment service: {}", e);
            return Err(e.into());
        }
    };

    let health_route = axum::Router::new().route(
        "/health",
        axum::routing::get(|| async { axum::http::StatusCode::OK }),
    );

    let http_router = payment_router.merge(health_route);

    tracing::info!("Starting HTTP server at {}", config.http_addr);

    let mut http_shutdown = config.shutdown.clone();
    let http_listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    let result = axum::serve(
        http_listener,
        http_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = http_shutdown.changed().await;
        tracing::info!("Shutting down HTTP server...");
    })
    .await;

    if let Err(e) = result {
        tracing::error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    for handle in job_handles {
        if let Err(e) = handle.await {
            tracing::warn!("Scheduled job ended abnormally: {}", e);
        }
    }

    Ok(())
}
