use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    models::{Credential, NewCredential},
    repository::RepositoryError,
};

/// CredentialStore
///
/// The identity records every other component depends on. The token service resolves
/// token subjects through it; login looks credentials up by email.
///
/// Implementations must be safe to call from any number of concurrent requests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(&self, id: i64) -> Result<Option<Credential>, RepositoryError>;

    /// Email comparison is case-insensitive.
    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credential>, RepositoryError>;

    /// Registers a new identity. Fails with `RepositoryError::Conflict` when the email is taken.
    async fn create_credential(&self, new: NewCredential) -> Result<Credential, RepositoryError>;
}

/// CredentialState
///
/// The shared handle to the credential store held in the application state.
pub type CredentialState = Arc<dyn CredentialStore>;
