//! HTTP API server for the purchase workflow.
//!
//! Exposes users, orders and notifications over REST, with structured
//! logging (tracing) and Prometheus metrics. The same process hosts the
//! notification workers consuming order and billing events.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{MailSender, NotificationService};
use ordering::{InMemoryLedger, OrderOrchestrator};
use storage::{NotificationStore, OrderStore, UserStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use transport::InMemoryTransport;

use config::Config;

/// A store backing every part of the application.
pub trait AppStore: UserStore + OrderStore + NotificationStore + Clone + 'static {}

impl<S> AppStore for S where S: UserStore + OrderStore + NotificationStore + Clone + 'static {}

/// Mail sender chosen at startup.
pub type SharedMailSender = Arc<dyn MailSender>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: AppStore> {
    pub orders: OrderOrchestrator<S, InMemoryLedger, InMemoryTransport>,
    pub notifications: Arc<NotificationService<S, SharedMailSender>>,
    pub ledger: InMemoryLedger,
    pub transport: InMemoryTransport,
    pub publish_max_attempts: u32,
}

impl<S: AppStore> AppState<S> {
    /// Wires the orchestrator and notification service over one store.
    pub fn new(
        store: S,
        ledger: InMemoryLedger,
        transport: InMemoryTransport,
        mailer: SharedMailSender,
        config: &Config,
    ) -> Self {
        let orders = OrderOrchestrator::new(
            store.clone(),
            ledger.clone(),
            transport.clone(),
            config.orchestrator(),
        );
        let notifications = Arc::new(NotificationService::new(
            store,
            mailer,
            config.notifications(),
        ));

        Self {
            orders,
            notifications,
            ledger,
            transport,
            publish_max_attempts: config.publish_max_attempts,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: AppStore>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<S>))
        .route("/users", post(routes::users::create::<S>))
        .route("/users/{id}", get(routes::users::get::<S>))
        .route("/users/{id}/orders", get(routes::users::orders::<S>))
        .route("/users/{id}/deposits", post(routes::users::deposit::<S>))
        .route(
            "/users/{id}/notifications",
            get(routes::notifications::list_for_user::<S>),
        )
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/notifications", get(routes::notifications::list::<S>))
        .route("/notifications/{id}", get(routes::notifications::get::<S>))
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
