use crate::{
    AppState,
    auth::{AuthUser, BearerToken, authorize_owner},
    error::ApiError,
    models::{
        ApiResponse, CreateEventRequest, Event, EventFilter, EventQuery, LoginRequest,
        LoginResponse, Subject, TokenResponse, UpdateEventRequest,
    },
    password,
    token::{AccessToken, TokenService},
    validation,
};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;

const TOKEN_TYPE: &str = "bearer";

fn token_response(token: AccessToken) -> TokenResponse {
    TokenResponse {
        expires_in: token.expires_in(),
        access_token: token.token,
        token_type: TOKEN_TYPE.to_string(),
    }
}

// --- Auth Handlers ---

/// login
///
/// [Public Route] Exchanges an email and password for an access token. Unknown emails and
/// wrong passwords are indistinguishable to the caller (both 401).
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let Json(payload) = payload?;
    validation::validate_login(&payload)?;

    let credential = state
        .credentials
        .find_credential_by_email(payload.email.trim())
        .await?
        .filter(|c| password::verify_password(&c.password_hash, &payload.password))
        .ok_or_else(|| {
            tracing::info!("login rejected: invalid credentials");
            ApiError::Unauthorized
        })?;

    let token = state.tokens.issue(&credential)?;
    tracing::info!(subject = credential.id, role = %credential.role, "login succeeded");

    Ok(Json(ApiResponse::with_message(
        "Login successful",
        LoginResponse {
            expires_in: token.expires_in(),
            access_token: token.token,
            token_type: TOKEN_TYPE.to_string(),
            user: Subject::from(&credential),
        },
    )))
}

/// refresh
///
/// [Bearer Route] Renews the presented token. The token is not run through the usual
/// authentication stage: renewal applies its own trust rules, including the grace window.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Renewed", body = TokenResponse),
        (status = 401, description = "Token cannot be trusted")
    )
)]
pub async fn refresh(
    State(tokens): State<TokenService>,
    BearerToken(token): BearerToken,
) -> Result<Json<ApiResponse<TokenResponse>>, ApiError> {
    let renewed = tokens.renew(&token).await?;
    Ok(Json(ApiResponse::data(token_response(renewed))))
}

/// me
///
/// [Authenticated Route] The caller's public profile.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current subject", body = Subject),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Subject>>, ApiError> {
    // Verification already proved the subject exists; a miss here means it vanished mid-request.
    let credential = state
        .credentials
        .find_credential(user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(ApiResponse::data(Subject::from(&credential))))
}

/// logout
///
/// [Authenticated Route] Acknowledges a logout. Tokens are discarded client-side; there is
/// no server-side revocation list, so the token stays valid until it expires.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout(user: AuthUser) -> Json<ApiResponse<()>> {
    tracing::info!(subject = user.id, "logout");
    Json(ApiResponse::message("Successfully logged out"))
}

// --- Event Handlers ---

/// list_events
///
/// [Public Route] Lists events; published only unless `status` says otherwise.
#[utoipa::path(
    get,
    path = "/events",
    params(EventFilter),
    responses((status = 200, description = "Page of events", body = [Event]))
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let page = state.repo.list_events(&EventQuery::public(filter)).await?;
    Ok(Json(ApiResponse::page(page)))
}

/// show_event
///
/// [Public Route] A single event by id.
#[utoipa::path(
    get,
    path = "/events/{id}",
    params(("id" = i64, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Found", body = Event),
        (status = 404, description = "Event not found")
    )
)]
pub async fn show_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    let event = state
        .repo
        .get_event(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    Ok(Json(ApiResponse::data(event)))
}

/// my_events
///
/// [Organizer Route] The caller's own events, drafts included.
#[utoipa::path(
    get,
    path = "/my-events",
    params(EventFilter),
    responses((status = 200, description = "Page of my events", body = [Event]))
)]
pub async fn my_events(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let page = state
        .repo
        .list_events(&EventQuery::owned_by(user.id, filter))
        .await?;
    Ok(Json(ApiResponse::page(page)))
}

/// create_event
///
/// [Organizer Route] Creates an event owned by the caller.
#[utoipa::path(
    post,
    path = "/events",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Created", body = Event),
        (status = 422, description = "Validation error")
    )
)]
pub async fn create_event(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Event>>), ApiError> {
    let Json(payload) = payload?;
    let new_event = validation::validate_create(payload, Utc::now())?;
    let event = state.repo.create_event(new_event, user.id).await?;
    tracing::info!(event = event.id, organizer = user.id, "event created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Event created successfully", event)),
    ))
}

/// update_event
///
/// [Organizer Route] Partially updates an event. Existence (404) and ownership (403) are
/// settled before the payload is validated (422) or anything is written.
#[utoipa::path(
    put,
    path = "/events/{id}",
    params(("id" = i64, Path, description = "Event ID")),
    request_body = UpdateEventRequest,
    responses(
        (status = 200, description = "Updated", body = Event),
        (status = 403, description = "Not owner"),
        (status = 404, description = "Event not found"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn update_event(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateEventRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    let current = state.repo.get_event(id).await?;
    authorize_owner(&user, current.as_ref().map(|e| e.organizer_id))?;
    // The body is only judged once the caller is known to be allowed to change the event.
    let Json(payload) = payload?;
    if let Some(current) = &current {
        validation::validate_update(&payload, current)?;
    }

    let event = state
        .repo
        .update_event(id, payload)
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    tracing::info!(event = id, subject = user.id, "event updated");
    Ok(Json(ApiResponse::with_message("Event updated successfully", event)))
}

/// delete_event
///
/// [Organizer Route] Deletes an event, unless orders already reference it.
#[utoipa::path(
    delete,
    path = "/events/{id}",
    params(("id" = i64, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not owner"),
        (status = 404, description = "Event not found"),
        (status = 422, description = "Event has orders")
    )
)]
pub async fn delete_event(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    authorize_owner(&user, state.repo.event_owner(id).await?)?;

    if state.repo.count_orders(id).await? > 0 {
        return Err(ApiError::rejected("Cannot delete event with existing orders"));
    }
    if !state.repo.delete_event(id).await? {
        return Err(ApiError::not_found("Event"));
    }
    tracing::info!(event = id, subject = user.id, "event deleted");
    Ok(Json(ApiResponse::message("Event deleted successfully")))
}
