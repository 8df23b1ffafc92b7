use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    config::AppConfig,
    credentials::CredentialState,
    models::{Credential, Role},
    repository::RepositoryError,
};

/// Clock
///
/// The token service's only source of time. Production uses `SystemClock`; tests pin
/// time with `FixedClock` to reach expiry boundaries exactly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Claims
///
/// The signed payload of an access token. Role and display name are embedded so that
/// authorizing a call needs no role lookup; they are refreshed only on renewal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the credential id, as a string.
    pub sub: String,
    pub role: Role,
    pub name: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds. The token is rejected from this instant on.
    pub exp: i64,
    /// Unique per issuance, so two tokens minted in the same second still differ.
    pub jti: Uuid,
}

impl Claims {
    fn subject_id(&self) -> Result<i64, VerificationError> {
        self.sub.parse().map_err(|_| VerificationError::Malformed)
    }
}

/// AccessToken
///
/// A freshly signed token together with the validity window it was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Lifetime in whole seconds, as reported to clients in `expires_in`.
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("token has expired")]
    Expired,
    #[error("token is malformed or its signature does not verify")]
    Malformed,
    #[error("token subject no longer exists")]
    UnknownSubject,
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

/// TokenService
///
/// Issues, verifies and renews HS256 access tokens. It holds no per-session state: the
/// signing secret, the expiry policy, a clock and a read handle on the credential store
/// are all it needs, so one instance is shared by every request without locking.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
    ttl: Duration,
    renewal_grace: Duration,
    clock: Arc<dyn Clock>,
    credentials: CredentialState,
}

impl TokenService {
    pub fn new(
        secret: &str,
        ttl: Duration,
        credentials: CredentialState,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged against the injected clock, not the library's wall clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
                validation,
            }),
            ttl,
            renewal_grace: Duration::zero(),
            clock,
            credentials,
        }
    }

    /// Builds the production service: configured secret, TTL and grace, system clock.
    pub fn from_config(config: &AppConfig, credentials: CredentialState) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.jwt_ttl_minutes),
            credentials,
            Arc::new(SystemClock),
        )
        .with_renewal_grace(Duration::minutes(config.jwt_refresh_grace_minutes))
    }

    /// Lets `renew` accept tokens up to `grace` past their expiry.
    pub fn with_renewal_grace(mut self, grace: Duration) -> Self {
        self.renewal_grace = grace.max(Duration::zero());
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// issue
    ///
    /// Signs a token for a credential whose password has already been checked.
    pub fn issue(&self, credential: &Credential) -> Result<AccessToken, VerificationError> {
        let now = self.clock.now();
        let iat = now.timestamp();
        let exp = iat + self.ttl.num_seconds();
        let claims = Claims {
            sub: credential.id.to_string(),
            role: credential.role,
            name: credential.name.clone(),
            iat,
            exp,
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| VerificationError::Signing(e.to_string()))?;

        tracing::debug!(subject = credential.id, role = %credential.role, exp, "issued access token");
        Ok(AccessToken {
            token,
            issued_at: DateTime::from_timestamp(iat, 0).unwrap_or(now),
            expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(now + self.ttl),
        })
    }

    /// verify
    ///
    /// Resolves a presented token into the caller's identity. Checks, in order: signature
    /// and structure (`Malformed`), expiry against the clock (`Expired`), and that the
    /// subject still exists (`UnknownSubject`). Role and name are taken from the token.
    pub async fn verify(&self, token: &str) -> Result<AuthUser, VerificationError> {
        let claims = self.decode(token)?;
        if self.clock.now().timestamp() >= claims.exp {
            return Err(VerificationError::Expired);
        }
        let subject_id = claims.subject_id()?;
        if self.credentials.find_credential(subject_id).await?.is_none() {
            return Err(VerificationError::UnknownSubject);
        }
        Ok(AuthUser {
            id: subject_id,
            role: claims.role,
            name: claims.name,
        })
    }

    /// renew
    ///
    /// Trades a still-trusted token for a fresh one. The subject's role and name are
    /// re-read from the credential store, so administrative changes take effect here.
    pub async fn renew(&self, token: &str) -> Result<AccessToken, VerificationError> {
        let claims = self.decode(token)?;
        let cutoff = claims.exp + self.renewal_grace.num_seconds();
        if self.clock.now().timestamp() >= cutoff {
            return Err(VerificationError::Expired);
        }
        let subject_id = claims.subject_id()?;
        let credential = self
            .credentials
            .find_credential(subject_id)
            .await?
            .ok_or(VerificationError::UnknownSubject)?;

        if credential.role != claims.role {
            tracing::info!(subject = subject_id, from = %claims.role, to = %credential.role, "role changed since issuance");
        }
        self.issue(&credential)
    }

    fn decode(&self, token: &str) -> Result<Claims, VerificationError> {
        decode::<Claims>(token, &self.keys.decoding, &self.keys.validation)
            .map(|data| data.claims)
            .map_err(|_| VerificationError::Malformed)
    }
}
