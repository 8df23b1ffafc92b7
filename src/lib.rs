use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Server-side authentication and authorization core.
pub mod auth;
pub mod credentials;
pub mod password;
pub mod token;

// Event data access, validation and the HTTP surface over it.
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod validation;

pub mod config;

// Caller-side session protocol (token attachment and silent renewal).
pub mod session;

// Module for routing segregation (Public, Authenticated, Organizer).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, organizer, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use credentials::{CredentialState, CredentialStore};
pub use error::ApiError;
pub use repository::{InMemoryRepository, PostgresRepository, Repository, RepositoryState};
pub use token::TokenService;

/// ApiDoc
///
/// Auto-generated OpenAPI document for every routed handler, served at
/// `/api-docs/openapi.json` and browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::refresh, handlers::me, handlers::logout,
        handlers::list_events, handlers::show_event, handlers::my_events,
        handlers::create_event, handlers::update_event, handlers::delete_event
    ),
    components(
        schemas(
            models::Role, models::Subject, models::LoginRequest, models::LoginResponse,
            models::TokenResponse, models::Event, models::EventStatus,
            models::CreateEventRequest, models::UpdateEventRequest, models::PageMeta,
        )
    ),
    modifiers(&BearerAuthAddon),
    tags(
        (name = "event-portal", description = "Event listing API")
    )
)]
struct ApiDoc;

struct BearerAuthAddon;

impl utoipa::Modify for BearerAuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// AppState
///
/// The single, immutable container of shared services. Cloning is cheap: every member is
/// reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Event repository (an external collaborator of the auth core).
    pub repo: RepositoryState,
    /// Identity records, read by login and by token verification.
    pub credentials: CredentialState,
    /// Issues, verifies and renews access tokens.
    pub tokens: TokenService,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires a single store that serves both as event repository and credential store,
    /// with a token service built from `config`.
    pub fn from_store<S>(store: Arc<S>, config: AppConfig) -> Self
    where
        S: Repository + CredentialStore + 'static,
    {
        let credentials = store.clone() as CredentialState;
        let tokens = TokenService::from_config(&config, credentials.clone());
        Self {
            repo: store as RepositoryState,
            credentials,
            tokens,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the `authenticated_routes`. Extracting `AuthUser` verifies
/// the bearer token; on failure the extractor rejects with 401 and the handler never runs.
/// On success the context is cached in the request extensions for the handler.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: No middleware applied.
        .merge(public::public_routes())
        // Authenticated Routes: any valid session.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Organizer Routes: valid session plus the admin/organizer role gate.
        .merge(organizer::organizer_routes(state.tokens.clone()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span: method, URI and the `x-request-id`, so every log line of
/// one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
