use std::{sync::Arc, time::Duration};

use anyhow::Result;
use edudash::{
    backend::{AppState, Stores, build_router},
    clock::SystemClock,
    db::{create_pool, repository::Repository, run_migrations},
    pubsub::{PubSubPublisher, PubSubSubscriber},
    store::MemoryStore,
    utils::{config::AppConfig, constants::DEFAULT_LOG_FILTER},
};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cfg = AppConfig::load()?;
    info!(
        port = cfg.port,
        database = cfg.database_url.is_some(),
        redis = cfg.redis_url.is_some(),
        "EduDash access service starting"
    );

    let clock = Arc::new(SystemClock);

    let mut state = match cfg.database_url.as_deref() {
        Some(url) => {
            let pool = create_pool(url, cfg.database_max_connections).await?;
            run_migrations(&pool).await?;
            let repo = Arc::new(Repository::new(Arc::new(pool.clone())));
            AppState::new(&cfg, Stores::shared(repo), clock).with_pool(pool)
        }
        None => {
            warn!("DATABASE_URL not set, serving from the in-memory store");
            AppState::new(&cfg, Stores::shared(Arc::new(MemoryStore::new())), clock)
        }
    };

    if let Some(redis_url) = cfg.redis_url.as_deref() {
        let client = redis::Client::open(redis_url)?;
        let publisher = PubSubPublisher::new(&client).await?;
        let subscriber =
            PubSubSubscriber::new(client, state.access.clone()).with_origin(publisher.origin());
        state = state.with_publisher(Arc::new(publisher));

        tokio::spawn(async move {
            if let Err(e) = subscriber.run().await {
                tracing::error!(error = %e, "PubSub listener crashed");
            }
        });
    }

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(
            cfg.request_timeout_ms,
        )));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down gracefully...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
