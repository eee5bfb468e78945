// Protected routes (require gateway identity headers)
use crate::app::AppState;
use crate::auth;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::handlers::{commands, instance_types, payments, requests, servers};

pub fn create_protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Catalog
        .route("/instance_types", get(instance_types::list_instance_types))
        .route("/instance_types/{id}", put(instance_types::update_instance_type))
        // Requests
        .route(
            "/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        .route("/requests/{id}/approve", post(requests::approve_request))
        .route("/requests/{id}/reject", post(requests::reject_request))
        // Servers
        .route("/servers", get(servers::list_servers))
        .route("/servers/{id}", get(servers::get_server))
        .route("/servers/{id}/transition", post(servers::transition_server))
        .route(
            "/servers/{id}/payments",
            get(servers::list_server_payments).post(payments::create_payment),
        )
        // Payments
        .route("/payments/{id}/pay", post(payments::register_payment))
        // Commands
        .route("/reconcile", post(commands::manual_reconcile_trigger))
        .route_layer(middleware::from_fn(auth::require_user))
}
