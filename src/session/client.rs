use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::watch;

use super::{
    store::{Session, Tier},
    transport::{ApiCall, ApiReply, Transport, TransportError},
};
use crate::models::{LoginResponse, Subject, TokenResponse};

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh";
const LOGOUT_PATH: &str = "/auth/logout";
const ME_PATH: &str = "/auth/me";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The held token could not be renewed (or the replay was still refused); the client
    /// has logged out.
    #[error("session expired")]
    SessionExpired,
    #[error("request failed with {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    fn from_reply(reply: &ApiReply) -> Self {
        ClientError::Api { status: reply.status, message: reply.message() }
    }
}

/// SessionStatus
///
/// Observable state of the client. `LoggedOut` is also entered from `LoggedIn` when the
/// session expires irrecoverably.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    LoggedOut,
    LoggedIn(Option<Subject>),
}

/// SessionClient
///
/// Makes token renewal invisible to the rest of the calling application:
///
/// 1. every call carries the held token (login excepted);
/// 2. a `401` on any call other than login or refresh triggers exactly one renewal with
///    the held token, the renewed token is written back to its tier, and the call is
///    replayed once;
/// 3. a failed renewal (refused or unreachable) or a replay that is refused again clears
///    the session and moves the client to `LoggedOut`. Nothing is retried further.
///
/// The retry budget is per call. Concurrent calls failing on the same expired token each
/// renew on their own; renewals are not de-duplicated.
pub struct SessionClient<T> {
    transport: T,
    session: Session,
    status: watch::Sender<SessionStatus>,
}

impl<T: Transport> SessionClient<T> {
    pub fn new(transport: T, session: Session) -> Self {
        let initial = if session.current().is_some() {
            SessionStatus::LoggedIn(None)
        } else {
            SessionStatus::LoggedOut
        };
        let (status, _) = watch::channel(initial);
        Self { transport, session, status }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watches status transitions, e.g. to send the user back to a login screen.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.status(), SessionStatus::LoggedIn(_))
    }

    /// login
    ///
    /// Authenticates and starts a session. `remember` selects the durable tier.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<Subject, ClientError> {
        let call = ApiCall::post(LOGIN_PATH).json(json!({ "email": email, "password": password }));
        let reply = self.transport.send(&call).await?;
        if !reply.status.is_success() {
            return Err(ClientError::from_reply(&reply));
        }

        let login: LoginResponse = reply.data()?;
        self.session.establish(&login.access_token, Tier::from_remember(remember));
        self.status.send_replace(SessionStatus::LoggedIn(Some(login.user.clone())));
        tracing::debug!(subject = login.user.id, remember, "session established");
        Ok(login.user)
    }

    /// restore
    ///
    /// Resumes a session found in the stores at startup by resolving the current user.
    /// Returns `None` (logged out) when there is no token or it cannot be renewed.
    pub async fn restore(&self) -> Result<Option<Subject>, ClientError> {
        if self.session.current().is_none() {
            self.status.send_replace(SessionStatus::LoggedOut);
            return Ok(None);
        }
        match self.me().await {
            Ok(subject) => Ok(Some(subject)),
            Err(ClientError::SessionExpired) => Ok(None),
            Err(ClientError::Api { status, message }) => {
                tracing::debug!(%status, %message, "stored session rejected");
                self.expire();
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// The current user, refreshed from the server.
    pub async fn me(&self) -> Result<Subject, ClientError> {
        let subject: Subject = self.fetch(ApiCall::get(ME_PATH)).await?;
        if self.session.current().is_some() {
            self.status.send_replace(SessionStatus::LoggedIn(Some(subject.clone())));
        }
        Ok(subject)
    }

    /// logout
    ///
    /// Tells the server (best effort, no renewal) and clears the session regardless.
    pub async fn logout(&self) {
        if let Some(token) = self.session.current() {
            let mut call = ApiCall::post(LOGOUT_PATH);
            call.bearer = Some(token);
            if let Err(err) = self.transport.send(&call).await {
                tracing::debug!(error = %err, "logout notification failed");
            }
        }
        self.session.clear();
        self.status.send_replace(SessionStatus::LoggedOut);
    }

    /// Sends `call` and decodes the envelope's `data` on success.
    pub async fn fetch<R: DeserializeOwned>(&self, call: ApiCall) -> Result<R, ClientError> {
        let reply = self.call(call).await?;
        if !reply.status.is_success() {
            return Err(ClientError::from_reply(&reply));
        }
        Ok(reply.data()?)
    }

    /// call
    ///
    /// Sends `call` with the held token, recovering once from an expired token. Any
    /// status other than a `401` that leads to logout is returned to the caller as is.
    pub async fn call(&self, call: ApiCall) -> Result<ApiReply, ClientError> {
        let first = self.attempt(&call).await?;
        if first.status != StatusCode::UNAUTHORIZED || !Self::renewable(&call) {
            return Ok(first);
        }

        // Nothing to renew: an anonymous call hit a protected route.
        let Some(held) = self.session.current() else {
            return Ok(first);
        };

        match self.renew(&held).await {
            Ok(renewed) => {
                if !self.session.replace(&renewed) {
                    // Logged out while the renewal was in flight.
                    return Err(ClientError::SessionExpired);
                }
            }
            Err(err) => {
                tracing::info!(error = %err, "token renewal failed, logging out");
                self.expire();
                return Err(ClientError::SessionExpired);
            }
        }

        let retried = self.attempt(&call).await?;
        if retried.status == StatusCode::UNAUTHORIZED {
            tracing::info!(path = %call.route(), "call refused after renewal, logging out");
            self.expire();
            return Err(ClientError::SessionExpired);
        }
        Ok(retried)
    }

    async fn attempt(&self, call: &ApiCall) -> Result<ApiReply, TransportError> {
        let mut outgoing = call.clone();
        outgoing.bearer = self.session.current();
        self.transport.send(&outgoing).await
    }

    async fn renew(&self, held: &str) -> Result<String, ClientError> {
        let mut call = ApiCall::post(REFRESH_PATH);
        call.bearer = Some(held.to_string());
        let reply = self.transport.send(&call).await?;
        if !reply.status.is_success() {
            return Err(ClientError::from_reply(&reply));
        }
        let renewed: TokenResponse = reply.data()?;
        Ok(renewed.access_token)
    }

    fn renewable(call: &ApiCall) -> bool {
        !matches!(call.route(), LOGIN_PATH | REFRESH_PATH)
    }

    fn expire(&self) {
        self.session.clear();
        self.status.send_replace(SessionStatus::LoggedOut);
    }
}
