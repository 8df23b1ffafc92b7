use crate::{
    credentials::CredentialStore,
    models::{
        Credential, Event, EventQuery, NewCredential, Page, PageMeta, Role, SortField, SortOrder,
        UpdateEventRequest,
    },
    validation::NewEvent,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::{cmp::Ordering, collections::HashMap, sync::Arc};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} already exists")]
    Conflict(String),
}

/// Repository Trait
///
/// The event data-access contract. Listing, searching and pagination live here; the
/// authorization guard only needs `event_owner` and `count_orders` from it.
///
/// **Send + Sync + async_trait** make the trait object (`Arc<dyn Repository>`) shareable
/// across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_events(&self, query: &EventQuery) -> Result<Page<Event>, RepositoryError>;
    async fn get_event(&self, id: i64) -> Result<Option<Event>, RepositoryError>;
    /// The `organizer_id` of an event, or `None` when the event does not exist.
    async fn event_owner(&self, id: i64) -> Result<Option<i64>, RepositoryError>;
    async fn create_event(&self, event: NewEvent, organizer_id: i64) -> Result<Event, RepositoryError>;
    /// Applies the provided fields only. Returns `None` when the event does not exist.
    async fn update_event(
        &self,
        id: i64,
        req: UpdateEventRequest,
    ) -> Result<Option<Event>, RepositoryError>;
    async fn delete_event(&self, id: i64) -> Result<bool, RepositoryError>;
    async fn count_orders(&self, event_id: i64) -> Result<i64, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the event repository across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres ---

/// PostgresRepository
///
/// Implements both the event repository and the credential store on one connection pool.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const EVENT_COLUMNS: &str = r#"
    e.id, e.title, e.description, e.venue, e.start_datetime, e.end_datetime,
    e.status, e.image_url, e.price, e.max_participants, e.organizer_id,
    u.name AS organizer_name, e.created_at, e.updated_at
"#;

/// Appends the WHERE clause shared by the listing and its count query.
fn push_event_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &EventQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(organizer_id) = query.organizer_id {
        builder.push(" AND e.organizer_id = ");
        builder.push_bind(organizer_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND e.status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search);
        builder.push(" AND (e.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR e.description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(what.to_string())
        }
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// list_events
    ///
    /// Builds the filter with QueryBuilder so every user-supplied value is a bound parameter.
    /// Sort columns come from the closed `SortField` enum, never from raw input.
    async fn list_events(&self, query: &EventQuery) -> Result<Page<Event>, RepositoryError> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM events e");
        push_event_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN users u ON u.id = e.organizer_id"
        ));
        push_event_filters(&mut builder, query);
        builder.push(format!(
            " ORDER BY e.{} {}, e.id ASC",
            query.sort_by.column(),
            match query.sort_order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            }
        ));
        builder.push(" LIMIT ");
        builder.push_bind(query.per_page);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset());

        let items = builder.build_query_as::<Event>().fetch_all(&self.pool).await?;
        Ok(Page { items, meta: PageMeta::new(query, total) })
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>, RepositoryError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN users u ON u.id = e.organizer_id WHERE e.id = $1"
        );
        Ok(sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn event_owner(&self, id: i64) -> Result<Option<i64>, RepositoryError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT organizer_id FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_event
    ///
    /// Inserts and joins the organizer name in one round trip via a CTE.
    async fn create_event(&self, event: NewEvent, organizer_id: i64) -> Result<Event, RepositoryError> {
        let sql = r#"
            WITH inserted AS (
                INSERT INTO events (title, description, venue, start_datetime, end_datetime,
                                    status, image_url, price, max_participants, organizer_id,
                                    created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
                RETURNING *
            )
            SELECT i.id, i.title, i.description, i.venue, i.start_datetime, i.end_datetime,
                   i.status, i.image_url, i.price, i.max_participants, i.organizer_id,
                   u.name AS organizer_name, i.created_at, i.updated_at
            FROM inserted i JOIN users u ON u.id = i.organizer_id
        "#;
        Ok(sqlx::query_as::<_, Event>(sql)
            .bind(event.title)
            .bind(event.description)
            .bind(event.venue)
            .bind(event.start_datetime)
            .bind(event.end_datetime)
            .bind(event.status.as_str())
            .bind(event.image_url)
            .bind(event.price)
            .bind(event.max_participants)
            .bind(organizer_id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_event
    ///
    /// Uses `COALESCE` so that only the fields present in `req` are written.
    async fn update_event(
        &self,
        id: i64,
        req: UpdateEventRequest,
    ) -> Result<Option<Event>, RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE events
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                venue = COALESCE($4, venue),
                start_datetime = COALESCE($5, start_datetime),
                end_datetime = COALESCE($6, end_datetime),
                status = COALESCE($7, status),
                image_url = COALESCE($8, image_url),
                price = COALESCE($9, price),
                max_participants = COALESCE($10, max_participants),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(req.title)
        .bind(req.description)
        .bind(req.venue)
        .bind(req.start_datetime)
        .bind(req.end_datetime)
        .bind(req.status.map(|s| s.as_str()))
        .bind(req.image_url)
        .bind(req.price)
        .bind(req.max_participants)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_event(id).await
    }

    async fn delete_event(&self, id: i64) -> Result<bool, RepositoryError> {
        let res = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_orders(&self, event_id: i64) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl CredentialStore for PostgresRepository {
    async fn find_credential(&self, id: i64) -> Result<Option<Credential>, RepositoryError> {
        Ok(sqlx::query_as::<_, Credential>(
            "SELECT id, name, email, password_hash, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credential>, RepositoryError> {
        Ok(sqlx::query_as::<_, Credential>(
            "SELECT id, name, email, password_hash, role FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_credential(&self, new: NewCredential) -> Result<Credential, RepositoryError> {
        sqlx::query_as::<_, Credential>(
            r#"
            INSERT INTO users (name, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id, name, email, password_hash, role
            "#,
        )
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email"))
    }
}

// --- In-Memory ---

#[derive(Default)]
struct MemoryTables {
    credentials: Vec<Credential>,
    events: Vec<Event>,
    orders: HashMap<i64, i64>,
    next_credential_id: i64,
    next_event_id: i64,
}

/// InMemoryRepository
///
/// A process-local implementation of both the event repository and the credential store.
/// Used by the test suites and the end-to-end session client test; it applies the same
/// filtering, sorting and pagination rules as the Postgres queries.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an order against an event.
    pub fn add_order(&self, event_id: i64) {
        *self.tables.write().orders.entry(event_id).or_insert(0) += 1;
    }

    /// Administrative role change. Outstanding tokens keep their embedded role until renewal.
    pub fn set_role(&self, credential_id: i64, role: Role) -> bool {
        let mut tables = self.tables.write();
        match tables.credentials.iter_mut().find(|c| c.id == credential_id) {
            Some(credential) => {
                credential.role = role;
                true
            }
            None => false,
        }
    }

    /// Removes a credential outright, so its tokens stop resolving.
    pub fn remove_credential(&self, credential_id: i64) -> bool {
        let mut tables = self.tables.write();
        let before = tables.credentials.len();
        tables.credentials.retain(|c| c.id != credential_id);
        tables.credentials.len() != before
    }
}

fn compare_events(a: &Event, b: &Event, field: SortField) -> Ordering {
    match field {
        SortField::StartDatetime => a.start_datetime.cmp(&b.start_datetime),
        SortField::EndDatetime => a.end_datetime.cmp(&b.end_datetime),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Title => a.title.cmp(&b.title),
        SortField::Price => a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal),
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_events(&self, query: &EventQuery) -> Result<Page<Event>, RepositoryError> {
        let tables = self.tables.read();
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut matching: Vec<Event> = tables
            .events
            .iter()
            .filter(|e| query.organizer_id.is_none_or(|id| e.organizer_id == id))
            .filter(|e| query.status.is_none_or(|s| e.status == s))
            .filter(|e| {
                needle.as_ref().is_none_or(|n| {
                    e.title.to_lowercase().contains(n) || e.description.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare_events(a, b, query.sort_by);
            let ordering = match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.per_page as usize)
            .collect();
        Ok(Page { items, meta: PageMeta::new(query, total) })
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>, RepositoryError> {
        Ok(self.tables.read().events.iter().find(|e| e.id == id).cloned())
    }

    async fn event_owner(&self, id: i64) -> Result<Option<i64>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .events
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.organizer_id))
    }

    async fn create_event(&self, event: NewEvent, organizer_id: i64) -> Result<Event, RepositoryError> {
        let mut tables = self.tables.write();
        let organizer_name = tables
            .credentials
            .iter()
            .find(|c| c.id == organizer_id)
            .map(|c| c.name.clone());
        tables.next_event_id += 1;
        let now = Utc::now();
        let created = Event {
            id: tables.next_event_id,
            title: event.title,
            description: event.description,
            venue: event.venue,
            start_datetime: event.start_datetime,
            end_datetime: event.end_datetime,
            status: event.status,
            image_url: event.image_url,
            price: event.price,
            max_participants: event.max_participants,
            organizer_id,
            organizer_name,
            created_at: now,
            updated_at: now,
        };
        tables.events.push(created.clone());
        Ok(created)
    }

    async fn update_event(
        &self,
        id: i64,
        req: UpdateEventRequest,
    ) -> Result<Option<Event>, RepositoryError> {
        let mut tables = self.tables.write();
        let Some(event) = tables.events.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            event.title = title;
        }
        if let Some(description) = req.description {
            event.description = description;
        }
        if let Some(venue) = req.venue {
            event.venue = venue;
        }
        if let Some(start) = req.start_datetime {
            event.start_datetime = start;
        }
        if let Some(end) = req.end_datetime {
            event.end_datetime = end;
        }
        if let Some(status) = req.status {
            event.status = status;
        }
        if req.image_url.is_some() {
            event.image_url = req.image_url;
        }
        if let Some(price) = req.price {
            event.price = price;
        }
        if req.max_participants.is_some() {
            event.max_participants = req.max_participants;
        }
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn delete_event(&self, id: i64) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write();
        let before = tables.events.len();
        tables.events.retain(|e| e.id != id);
        Ok(tables.events.len() != before)
    }

    async fn count_orders(&self, event_id: i64) -> Result<i64, RepositoryError> {
        Ok(self.tables.read().orders.get(&event_id).copied().unwrap_or(0))
    }
}

#[async_trait]
impl CredentialStore for InMemoryRepository {
    async fn find_credential(&self, id: i64) -> Result<Option<Credential>, RepositoryError> {
        Ok(self.tables.read().credentials.iter().find(|c| c.id == id).cloned())
    }

    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credential>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .credentials
            .iter()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_credential(&self, new: NewCredential) -> Result<Credential, RepositoryError> {
        let mut tables = self.tables.write();
        if tables.credentials.iter().any(|c| c.email.eq_ignore_ascii_case(&new.email)) {
            return Err(RepositoryError::Conflict("email".to_string()));
        }
        tables.next_credential_id += 1;
        let credential = Credential {
            id: tables.next_credential_id,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
        };
        tables.credentials.push(credential.clone());
        Ok(credential)
    }
}
