use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that are **unauthenticated** and accessible to any client. Event reads only
/// return what the listing query exposes publicly (published events by default).
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        // Exchanges email + password for an access token.
        .route("/auth/login", post(handlers::login))
        // POST /auth/refresh
        // Renews the bearer token. Deliberately outside the authenticated layer: the token
        // may be past the point where ordinary verification accepts it but still renewable.
        .route("/auth/refresh", post(handlers::refresh))
        // GET /events?search=...&status=...&sort_by=...&sort_order=...&page=...&per_page=...
        .route("/events", get(handlers::list_events))
        // GET /events/{id}
        .route("/events/{id}", get(handlers::show_event))
}
