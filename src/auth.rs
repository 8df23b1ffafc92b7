use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{error::ApiError, models::Role, token::TokenService};

/// Roles allowed to manage events.
pub const EVENT_MANAGERS: &[Role] = &[Role::Admin, Role::Organizer];

/// AuthUser
///
/// The authenticated context of one request: who is calling and with which role. It is
/// derived from a verified token and lives only for the duration of the request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    /// The credential id the token was issued for.
    pub id: i64,
    /// The role embedded in the token at issuance or last renewal.
    pub role: Role,
    pub name: String,
}

/// The one predicate every role check goes through.
pub fn has_role(user: &AuthUser, allowed: &[Role]) -> bool {
    allowed.contains(&user.role)
}

/// BearerToken
///
/// The raw token from `Authorization: Bearer <token>`, not yet verified. Only the renew
/// endpoint consumes it directly; everything else goes through `AuthUser`.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)?;
        Ok(BearerToken(token.to_string()))
    }
}

/// AuthUser Extractor Implementation
///
/// The authentication stage of the guard. A missing header or any verification failure
/// rejects with 401 before the handler runs. When a role gate already authenticated the
/// request, its context is reused from the request extensions instead of verifying twice.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let tokens = TokenService::from_ref(state);
        let user = tokens.verify(&token).await?;

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// RoleGate
///
/// State for the role stage: the token service (to authenticate) and the route's
/// allowed-role set.
#[derive(Clone)]
pub struct RoleGate {
    tokens: TokenService,
    allowed: &'static [Role],
}

impl RoleGate {
    pub fn new(tokens: TokenService, allowed: &'static [Role]) -> Self {
        Self { tokens, allowed }
    }
}

impl FromRef<RoleGate> for TokenService {
    fn from_ref(gate: &RoleGate) -> TokenService {
        gate.tokens.clone()
    }
}

/// require_role
///
/// Route-layer middleware for role-gated routes. Authentication runs first through the
/// `AuthUser` extractor (401 on failure); a caller outside the allowed set gets 403.
/// The approved context is stashed in the request extensions for the handler.
pub async fn require_role(
    State(gate): State<RoleGate>,
    user: AuthUser,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !has_role(&user, gate.allowed) {
        tracing::warn!(subject = user.id, role = %user.role, "role not permitted for route");
        return Err(ApiError::Forbidden);
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// authorize_owner
///
/// The ownership stage for mutations on one event. `owner` is the event's
/// `organizer_id`, or `None` if the event does not exist; absence is reported before
/// ownership. Admins may act on any event, organizers only on their own.
pub fn authorize_owner(user: &AuthUser, owner: Option<i64>) -> Result<i64, ApiError> {
    let owner = owner.ok_or_else(|| ApiError::not_found("Event"))?;
    let permitted = match user.role {
        Role::Admin => true,
        Role::Organizer => user.id == owner,
    };
    if !permitted {
        tracing::warn!(subject = user.id, owner, "ownership check failed");
        return Err(ApiError::Forbidden);
    }
    Ok(owner)
}
