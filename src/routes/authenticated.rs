use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Session endpoints for any caller holding a valid token, whatever the role. Every handler
/// takes the `AuthUser` extractor, so a missing or untrusted token is answered with 401
/// before the handler body runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/me
        // The caller's profile.
        .route("/auth/me", get(handlers::me))
        // POST /auth/logout
        // Acknowledges logout; the client discards its token.
        .route("/auth/logout", post(handlers::logout))
}
