//! HTTP API for the sale-processing and inventory core.
//!
//! Provides REST endpoints for sales, manual stock movements, stock
//! reconciliation and token rotation, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use auth::TokenRotator;
use axum::Router;
use axum::routing::{get, post};
use inventory::InventoryService;
use metrics_exporter_prometheus::PrometheusHandle;
use sales::SaleCoordinator;
use store::{SoftDeleteInterceptor, Store};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub sales: SaleCoordinator<S>,
    pub inventory: InventoryService<S>,
    pub auth: TokenRotator<S>,
    /// Name of the backing store, reported by `/health`.
    pub backend: &'static str,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/auth/login", post(routes::auth::login::<S>))
        .route("/auth/refresh", post(routes::auth::refresh::<S>))
        .route("/sales", post(routes::sales::create::<S>))
        .route("/sales/{id}", get(routes::sales::get::<S>))
        .route("/movements", post(routes::movements::create::<S>))
        .route("/movements/{id}", get(routes::movements::get::<S>))
        .route(
            "/products/{id}/reconciliation",
            get(routes::products::reconciliation::<S>),
        )
        .route("/products/{id}", axum::routing::delete(routes::products::delete::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wraps a backend in the soft-delete interceptor and builds the services on
/// top of it.
pub fn create_state<B: Store + Clone + 'static>(
    backend: B,
    backend_name: &'static str,
    config: &Config,
) -> Arc<AppState<SoftDeleteInterceptor<B>>> {
    let store = SoftDeleteInterceptor::new(backend);
    Arc::new(AppState {
        sales: SaleCoordinator::with_config(store.clone(), config.sale_config()),
        inventory: InventoryService::new(store.clone()),
        auth: TokenRotator::new(store.clone(), config.auth_config()),
        store,
        backend: backend_name,
    })
}
