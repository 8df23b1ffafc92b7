use chrono::{DateTime, Utc};

use crate::{
    error::{ApiError, FieldErrors},
    models::{CreateEventRequest, Event, EventStatus, LoginRequest, UpdateEventRequest},
};

const MAX_TEXT_LEN: usize = 255;

/// NewEvent
///
/// A create payload that passed validation: required fields present, defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub venue: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub status: EventStatus,
    pub image_url: Option<String>,
    pub price: f64,
    pub max_participants: Option<i32>,
}

#[derive(Default)]
struct Collector(FieldErrors);

impl Collector {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    fn bounded_text(&mut self, field: &str, value: &str, required: bool) {
        if value.trim().is_empty() {
            if required {
                self.push(field, format!("The {field} field is required."));
            }
        } else if value.chars().count() > MAX_TEXT_LEN {
            self.push(field, format!("The {field} may not be greater than {MAX_TEXT_LEN} characters."));
        }
    }

    fn optional_extras(&mut self, image_url: Option<&str>, price: Option<f64>, max_participants: Option<i32>) {
        if let Some(url) = image_url {
            if !is_http_url(url) {
                self.push("image_url", "The image url format is invalid.");
            }
        }
        if let Some(price) = price {
            if !price.is_finite() || price < 0.0 {
                self.push("price", "The price must be at least 0.");
            }
        }
        if let Some(max) = max_participants {
            if max < 1 {
                self.push("max_participants", "The max participants must be at least 1.");
            }
        }
    }

    fn finish(self) -> Result<(), ApiError> {
        if self.0.is_empty() { Ok(()) } else { Err(ApiError::validation(self.0)) }
    }
}

fn is_http_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host())
        .unwrap_or(false)
}

/// Checks a create payload against the event rules and fills in defaults.
pub fn validate_create(req: CreateEventRequest, now: DateTime<Utc>) -> Result<NewEvent, ApiError> {
    let mut errors = Collector::default();
    errors.bounded_text("title", &req.title, true);
    if req.description.trim().is_empty() {
        errors.push("description", "The description field is required.");
    }
    errors.bounded_text("venue", &req.venue, true);

    match req.start_datetime {
        None => errors.push("start_datetime", "The start datetime field is required."),
        Some(start) if start <= now => {
            errors.push("start_datetime", "The start datetime must be a date after now.")
        }
        Some(_) => {}
    }
    match (req.start_datetime, req.end_datetime) {
        (_, None) => errors.push("end_datetime", "The end datetime field is required."),
        (Some(start), Some(end)) if end <= start => {
            errors.push("end_datetime", "The end datetime must be a date after start datetime.")
        }
        _ => {}
    }
    errors.optional_extras(req.image_url.as_deref(), req.price, req.max_participants);
    errors.finish()?;

    match (req.start_datetime, req.end_datetime) {
        (Some(start_datetime), Some(end_datetime)) => Ok(NewEvent {
            title: req.title,
            description: req.description,
            venue: req.venue,
            start_datetime,
            end_datetime,
            status: req.status.unwrap_or_default(),
            image_url: req.image_url,
            price: req.price.unwrap_or(0.0),
            max_participants: req.max_participants,
        }),
        // Both were checked for presence above.
        _ => Err(ApiError::Internal),
    }
}

/// Checks a partial update against the event rules. The end must still follow the start
/// once the update is merged onto the stored event.
pub fn validate_update(req: &UpdateEventRequest, current: &Event) -> Result<(), ApiError> {
    let mut errors = Collector::default();
    if let Some(title) = &req.title {
        errors.bounded_text("title", title, true);
    }
    if let Some(description) = &req.description {
        if description.trim().is_empty() {
            errors.push("description", "The description field must not be empty.");
        }
    }
    if let Some(venue) = &req.venue {
        errors.bounded_text("venue", venue, true);
    }
    let start = req.start_datetime.unwrap_or(current.start_datetime);
    let end = req.end_datetime.unwrap_or(current.end_datetime);
    if (req.start_datetime.is_some() || req.end_datetime.is_some()) && end <= start {
        errors.push("end_datetime", "The end datetime must be a date after start datetime.");
    }
    errors.optional_extras(req.image_url.as_deref(), req.price, req.max_participants);
    errors.finish()
}

pub fn validate_login(req: &LoginRequest) -> Result<(), ApiError> {
    let mut errors = Collector::default();
    if req.email.trim().is_empty() {
        errors.push("email", "The email field is required.");
    } else if !req.email.contains('@') {
        errors.push("email", "The email must be a valid email address.");
    }
    if req.password.is_empty() {
        errors.push("password", "The password field is required.");
    }
    errors.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn valid_request(now: DateTime<Utc>) -> CreateEventRequest {
        CreateEventRequest {
            title: "RustConf".into(),
            description: "Talks".into(),
            venue: "Hall A".into(),
            start_datetime: Some(now + Duration::days(1)),
            end_datetime: Some(now + Duration::days(2)),
            ..Default::default()
        }
    }

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::ValidationFailed { errors, .. } => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn create_applies_defaults() {
        let now = Utc::now();
        let event = validate_create(valid_request(now), now).unwrap();
        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(event.price, 0.0);
    }

    #[test]
    fn create_rejects_past_start_and_inverted_range() {
        let now = Utc::now();
        let mut req = valid_request(now);
        req.start_datetime = Some(now - Duration::hours(1));
        req.end_datetime = Some(now - Duration::hours(2));
        let errors = field_errors(validate_create(req, now).unwrap_err());
        assert!(errors.contains_key("start_datetime"));
        assert!(errors.contains_key("end_datetime"));
    }

    #[test]
    fn create_reports_every_missing_field() {
        let errors = field_errors(validate_create(CreateEventRequest::default(), Utc::now()).unwrap_err());
        for field in ["title", "description", "venue", "start_datetime", "end_datetime"] {
            assert!(errors.contains_key(field), "missing error for {field}");
        }
    }

    #[test]
    fn extras_are_range_checked() {
        let now = Utc::now();
        let mut req = valid_request(now);
        req.price = Some(-1.0);
        req.max_participants = Some(0);
        req.image_url = Some("ftp://example.com/a.png".into());
        let errors = field_errors(validate_create(req, now).unwrap_err());
        assert!(errors.contains_key("price"));
        assert!(errors.contains_key("max_participants"));
        assert!(errors.contains_key("image_url"));

        for malformed in ["http://[", "https://exa%mple", "http://:::", "mailto:a@b.c"] {
            let mut req = valid_request(now);
            req.image_url = Some(malformed.into());
            let errors = field_errors(validate_create(req, now).unwrap_err());
            assert!(errors.contains_key("image_url"), "{malformed} should be rejected");
        }

        let mut req = valid_request(now);
        req.image_url = Some("https://cdn.example.com/poster.png?v=2".into());
        assert!(validate_create(req, now).is_ok());
    }

    #[test]
    fn login_requires_both_fields() {
        let errors = field_errors(validate_login(&LoginRequest::default()).unwrap_err());
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("password"));
    }
}
