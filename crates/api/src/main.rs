//! API server entry point.

use std::time::Duration;

use api::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, NewUser, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Creates the configured admin user unless it already exists.
async fn seed_admin<S: Store>(store: &S, config: &Config) {
    let Some((email, password)) = &config.seed_admin else {
        return;
    };
    match store.find_user_by_email(email).await {
        Ok(Some(_)) => tracing::info!(%email, "seed user already present"),
        Ok(None) => {
            let hash = auth::hash_password(password).expect("failed to hash seed password");
            store
                .create_user(NewUser::new(email.clone(), hash, auth::roles::ADMIN))
                .await
                .expect("failed to create seed user");
            tracing::info!(%email, "seed user created");
        }
        Err(e) => tracing::error!(error = ?e, "failed to look up seed user"),
    }
}

async fn serve<B: Store + Clone + 'static>(
    backend: B,
    backend_name: &'static str,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    seed_admin(&backend, &config).await;

    let state = api::create_state(backend, backend_name, &config);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, store = backend_name, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set, using the development signing secret");
    }

    // 3. Pick the store backend and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool)
                .with_lock_timeout(Duration::from_millis(config.sale_timeout_ms));
            store.run_migrations().await.expect("migrations failed");
            serve(store, "postgres", config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(InMemoryStore::new(), "memory", config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
