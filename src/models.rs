use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

// --- Roles & Identity ---

/// Role
///
/// The closed set of roles a stored credential can carry. Anonymous viewers have no
/// credential and therefore no role at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Organizer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Organizer => "organizer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown value `{0}`")]
pub struct UnknownVariant(pub String);

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "organizer" => Ok(Role::Organizer),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Credential
///
/// The stored identity record (the `users` table). The id never changes; the password
/// hash is an Argon2 PHC string and is never serialized.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Credential {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

/// NewCredential
///
/// Input for registering a credential. The password is hashed before it reaches a store.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Subject
///
/// The public view of a credential, returned by login and `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&Credential> for Subject {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name.clone(),
            email: credential.email.clone(),
            role: credential.role,
        }
    }
}

// --- Auth Payloads ---

/// LoginRequest
///
/// Input payload for `POST /auth/login`. Both fields default to empty so that a missing
/// field is reported as a validation failure instead of a JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// TokenResponse
///
/// Issued access token, as returned by `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

/// LoginResponse
///
/// Issued access token plus the subject it was issued for.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: Subject,
}

// --- Events ---

/// EventStatus
///
/// Publication state of an event. Only `published` events are listed publicly by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for EventStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EventStatus::Draft),
            "published" => Ok(EventStatus::Published),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl TryFrom<String> for EventStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Event
///
/// An event record joined with its organizer's display name. `organizer_id` is the
/// ownership key checked before any update or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub venue: String,
    #[ts(type = "string")]
    pub start_datetime: DateTime<Utc>,
    #[ts(type = "string")]
    pub end_datetime: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: EventStatus,
    pub image_url: Option<String>,
    pub price: f64,
    pub max_participants: Option<i32>,
    pub organizer_id: i64,
    #[sqlx(default)]
    pub organizer_name: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// CreateEventRequest
///
/// Input payload for `POST /events`. The organizer is always the caller, never the payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateEventRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub venue: String,
    #[ts(type = "string | null")]
    pub start_datetime: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub end_datetime: Option<DateTime<Utc>>,
    pub status: Option<EventStatus>,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub max_participants: Option<i32>,
}

/// UpdateEventRequest
///
/// Partial update payload for `PUT /events/{id}`; only provided fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateEventRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub start_datetime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub end_datetime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<i32>,
}

// --- Listing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    StartDatetime,
    EndDatetime,
    CreatedAt,
    Title,
    Price,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::StartDatetime => "start_datetime",
            SortField::EndDatetime => "end_datetime",
            SortField::CreatedAt => "created_at",
            SortField::Title => "title",
            SortField::Price => "price",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// EventFilter
///
/// Query parameters accepted by `GET /events` and `GET /my-events`.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct EventFilter {
    /// Case-insensitive match against title and description.
    pub search: Option<String>,
    /// `draft`, `published`, `cancelled`, or `all`.
    pub status: Option<String>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub const MAX_PER_PAGE: i64 = 50;

/// EventQuery
///
/// A fully resolved listing query: defaults applied, limits clamped. Repositories only
/// ever see this form.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub organizer_id: Option<i64>,
    pub search: Option<String>,
    pub status: Option<EventStatus>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: i64,
    pub per_page: i64,
}

impl EventQuery {
    /// Public listing: published events unless `status=all` or another status is asked for.
    pub fn public(filter: EventFilter) -> Self {
        let status = match filter.status.as_deref() {
            None | Some("") => Some(EventStatus::Published),
            Some("all") => None,
            Some(other) => Some(other.parse().unwrap_or(EventStatus::Published)),
        };
        Self::resolve(filter, None, status, SortField::StartDatetime, SortOrder::Asc, 6)
    }

    /// An organizer's own events, every status unless one is asked for.
    pub fn owned_by(organizer_id: i64, filter: EventFilter) -> Self {
        let status = filter
            .status
            .as_deref()
            .and_then(|s| s.parse::<EventStatus>().ok());
        Self::resolve(filter, Some(organizer_id), status, SortField::CreatedAt, SortOrder::Desc, 10)
    }

    fn resolve(
        filter: EventFilter,
        organizer_id: Option<i64>,
        status: Option<EventStatus>,
        sort_by: SortField,
        sort_order: SortOrder,
        per_page: i64,
    ) -> Self {
        Self {
            organizer_id,
            search: filter.search.filter(|s| !s.trim().is_empty()),
            status,
            sort_by: filter.sort_by.unwrap_or(sort_by),
            sort_order: filter.sort_order.unwrap_or(sort_order),
            page: filter.page.unwrap_or(1).max(1),
            per_page: filter.per_page.unwrap_or(per_page).clamp(1, MAX_PER_PAGE),
        }
    }

    /// Rows to skip. Saturates, since `page` comes straight from the query string.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// PageMeta
///
/// Pagination metadata returned next to every listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageMeta {
    pub current_page: i64,
    pub last_page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl PageMeta {
    pub fn new(query: &EventQuery, total: i64) -> Self {
        Self {
            current_page: query.page,
            last_page: ((total + query.per_page - 1) / query.per_page).max(1),
            per_page: query.per_page,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

// --- Response Envelope ---

/// ApiResponse
///
/// The JSON envelope shared by every endpoint: `success` always, the rest when relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self { success: true, message: None, data: Some(data), meta: None }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: Some(message.into()), data: Some(data), meta: None }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn page(page: Page<T>) -> Self {
        Self { success: true, message: None, data: Some(page.items), meta: Some(page.meta) }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), data: None, meta: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_query_defaults_to_published_and_clamps_page_size() {
        let query = EventQuery::public(EventFilter {
            per_page: Some(500),
            page: Some(0),
            ..Default::default()
        });
        assert_eq!(query.status, Some(EventStatus::Published));
        assert_eq!(query.per_page, MAX_PER_PAGE);
        assert_eq!(query.page, 1);
        assert_eq!(query.sort_by, SortField::StartDatetime);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }

    #[test]
    fn status_all_lists_every_status() {
        let query = EventQuery::public(EventFilter {
            status: Some("all".into()),
            ..Default::default()
        });
        assert_eq!(query.status, None);
    }

    #[test]
    fn owned_query_uses_newest_first() {
        let query = EventQuery::owned_by(7, EventFilter::default());
        assert_eq!(query.organizer_id, Some(7));
        assert_eq!(query.status, None);
        assert_eq!(query.per_page, 10);
        assert_eq!(query.sort_by, SortField::CreatedAt);
        assert_eq!(query.sort_order, SortOrder::Desc);
    }

    #[test]
    fn offset_saturates_for_huge_pages() {
        let query = EventQuery::public(EventFilter {
            page: Some(i64::MAX),
            per_page: Some(50),
            ..Default::default()
        });
        assert_eq!(query.offset(), i64::MAX);
        assert_eq!(EventQuery::public(EventFilter::default()).offset(), 0);
    }

    #[test]
    fn last_page_rounds_up() {
        let query = EventQuery::public(EventFilter::default());
        assert_eq!(PageMeta::new(&query, 13).last_page, 3);
        assert_eq!(PageMeta::new(&query, 0).last_page, 1);
    }

    #[test]
    fn roles_parse_from_their_wire_names() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::try_from("organizer".to_string()).unwrap(), Role::Organizer);
        assert!("viewer".parse::<Role>().is_err());
    }
}
