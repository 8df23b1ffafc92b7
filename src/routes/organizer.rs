use crate::{
    AppState,
    auth::{EVENT_MANAGERS, RoleGate, require_role},
    handlers,
    token::TokenService,
};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};

/// Organizer Router Module
///
/// Event management routes. The whole router sits behind the role gate: the caller must
/// authenticate (401 otherwise) and hold `admin` or `organizer` (403 otherwise). Update
/// and delete then run the per-event ownership check inside the handler, before any write.
pub fn organizer_routes(tokens: TokenService) -> Router<AppState> {
    Router::<AppState>::new()
        // GET /my-events
        // The caller's own events, including drafts and cancelled ones.
        .route("/my-events", get(handlers::my_events))
        // POST /events
        // Creates an event owned by the caller.
        .route("/events", post(handlers::create_event))
        // PUT/DELETE /events/{id}
        // Owner (or admin) only. Deleting is refused while orders reference the event.
        .route(
            "/events/{id}",
            put(handlers::update_event).delete(handlers::delete_event),
        )
        .route_layer(middleware::from_fn_with_state(
            RoleGate::new(tokens, EVENT_MANAGERS),
            require_role,
        ))
}
