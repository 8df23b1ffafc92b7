use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

/// ApiCall
///
/// One outgoing request, described independently of the HTTP client so that it can be
/// replayed verbatim after a renewal. The bearer token is attached by the session client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, bearer: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The path without its query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }
}

/// ApiReply
///
/// The status and JSON body of a response. Bodies that are empty or not JSON become `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiReply {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// The envelope's `data` member, decoded.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// The envelope's `message` member, or the status reason.
    pub fn message(&self) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("unknown").to_string())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

/// Transport
///
/// Delivers one call and returns whatever the server answered. Non-2xx statuses are
/// replies, not errors; only failures to get an answer at all are `TransportError`s.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: &ApiCall) -> Result<ApiReply, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, call: &ApiCall) -> Result<ApiReply, TransportError> {
        (**self).send(call).await
    }
}

/// HttpTransport
///
/// `reqwest`-backed transport against a base URL such as `http://localhost:3000`. The
/// timeout applies to every call, renewals and replays included.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, call: &ApiCall) -> Result<ApiReply, TransportError> {
        let url = format!("{}{}", self.base_url, call.path);
        let mut request = self.client.request(call.method.clone(), url);
        if let Some(token) = &call.bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(ApiReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn route_drops_the_query_string() {
        assert_eq!(ApiCall::get("/events?page=2&search=x").route(), "/events");
        assert_eq!(ApiCall::post("/auth/refresh").route(), "/auth/refresh");
    }

    #[test]
    fn message_falls_back_to_the_status_reason() {
        let with_message = ApiReply::new(StatusCode::FORBIDDEN, json!({ "message": "Forbidden" }));
        assert_eq!(with_message.message(), "Forbidden");

        let bare = ApiReply::new(StatusCode::BAD_GATEWAY, Value::Null);
        assert_eq!(bare.message(), "Bad Gateway");
    }

    #[test]
    fn data_reads_the_envelope_member() {
        let reply = ApiReply::new(StatusCode::OK, json!({ "success": true, "data": [1, 2, 3] }));
        assert_eq!(reply.data::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
        assert!(reply.data::<String>().is_err());
    }
}
