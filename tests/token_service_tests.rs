use chrono::{Duration, TimeZone, Utc};
use event_portal::{
    CredentialStore, InMemoryRepository,
    credentials::CredentialState,
    models::{Credential, NewCredential, Role},
    token::{FixedClock, TokenService, VerificationError},
};
use std::sync::Arc;

const SECRET: &str = "token-service-test-secret";

// --- Setup Utilities ---

struct Fixture {
    store: Arc<InMemoryRepository>,
    clock: Arc<FixedClock>,
    tokens: TokenService,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryRepository::new());
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()));
    let tokens = TokenService::new(
        SECRET,
        Duration::minutes(60),
        store.clone() as CredentialState,
        clock.clone(),
    );
    Fixture { store, clock, tokens }
}

async fn seed(store: &InMemoryRepository, email: &str, role: Role) -> Credential {
    // Token tests never check passwords; any PHC-looking string will do.
    store
        .create_credential(NewCredential {
            name: format!("User {email}"),
            email: email.to_string(),
            password_hash: "$argon2id$unused".to_string(),
            role,
        })
        .await
        .unwrap()
}

// --- Issue & Verify ---

#[tokio::test]
async fn test_issued_token_verifies_to_its_subject() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;

    let issued = f.tokens.issue(&credential).unwrap();
    assert_eq!(issued.expires_in(), 3600);

    let user = f.tokens.verify(&issued.token).await.unwrap();
    assert_eq!(user.id, credential.id);
    assert_eq!(user.role, Role::Organizer);
    assert_eq!(user.name, credential.name);
}

#[tokio::test]
async fn test_token_is_valid_until_the_last_second() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;
    let issued = f.tokens.issue(&credential).unwrap();

    f.clock.advance(Duration::seconds(3599));
    assert!(f.tokens.verify(&issued.token).await.is_ok());

    // Rejected from the expiry instant on, not one second after it.
    f.clock.advance(Duration::seconds(1));
    assert!(matches!(
        f.tokens.verify(&issued.token).await,
        Err(VerificationError::Expired)
    ));
}

#[tokio::test]
async fn test_foreign_or_garbled_tokens_are_malformed() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;

    let foreign = TokenService::new(
        "some-other-secret",
        Duration::minutes(60),
        f.store.clone() as CredentialState,
        f.clock.clone(),
    )
    .issue(&credential)
    .unwrap();

    for token in [foreign.token.as_str(), "not-a-jwt", ""] {
        assert!(
            matches!(f.tokens.verify(token).await, Err(VerificationError::Malformed)),
            "expected {token:?} to be malformed"
        );
    }
}

#[tokio::test]
async fn test_tampered_token_is_malformed() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;
    let issued = f.tokens.issue(&credential).unwrap();

    let mut tampered = issued.token.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'A' { 'B' } else { 'A' });

    assert!(matches!(
        f.tokens.verify(&tampered).await,
        Err(VerificationError::Malformed)
    ));
}

#[tokio::test]
async fn test_removed_subject_no_longer_verifies() {
    let f = fixture();
    let credential = seed(&f.store, "gone@example.com", Role::Admin).await;
    let issued = f.tokens.issue(&credential).unwrap();

    assert!(f.store.remove_credential(credential.id));
    assert!(matches!(
        f.tokens.verify(&issued.token).await,
        Err(VerificationError::UnknownSubject)
    ));
}

#[tokio::test]
async fn test_role_is_read_from_the_token_until_renewal() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;
    let issued = f.tokens.issue(&credential).unwrap();

    f.store.set_role(credential.id, Role::Admin);
    let user = f.tokens.verify(&issued.token).await.unwrap();
    assert_eq!(user.role, Role::Organizer);
}

// --- Renew ---

#[tokio::test]
async fn test_renew_extends_expiry_and_picks_up_role_changes() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;
    let issued = f.tokens.issue(&credential).unwrap();

    f.clock.advance(Duration::minutes(30));
    f.store.set_role(credential.id, Role::Admin);

    let renewed = f.tokens.renew(&issued.token).await.unwrap();
    assert_ne!(renewed.token, issued.token);
    assert_eq!(renewed.expires_at, issued.expires_at + Duration::minutes(30));

    let user = f.tokens.verify(&renewed.token).await.unwrap();
    assert_eq!(user.id, credential.id);
    assert_eq!(user.role, Role::Admin);
}

#[tokio::test]
async fn test_renewal_does_not_revoke_the_old_token() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;
    let issued = f.tokens.issue(&credential).unwrap();

    f.tokens.renew(&issued.token).await.unwrap();
    assert!(f.tokens.verify(&issued.token).await.is_ok());
}

#[tokio::test]
async fn test_expired_token_cannot_be_renewed_without_grace() {
    let f = fixture();
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;
    let issued = f.tokens.issue(&credential).unwrap();

    f.clock.advance(Duration::minutes(60));
    assert!(matches!(
        f.tokens.renew(&issued.token).await,
        Err(VerificationError::Expired)
    ));
}

#[tokio::test]
async fn test_grace_window_allows_renewal_just_after_expiry() {
    let f = fixture();
    let tokens = f.tokens.clone().with_renewal_grace(Duration::minutes(5));
    let credential = seed(&f.store, "org@example.com", Role::Organizer).await;
    let issued = tokens.issue(&credential).unwrap();

    f.clock.advance(Duration::minutes(62));
    // Past expiry: ordinary verification refuses, renewal still accepts.
    assert!(matches!(
        tokens.verify(&issued.token).await,
        Err(VerificationError::Expired)
    ));
    let renewed = tokens.renew(&issued.token).await.unwrap();
    assert!(tokens.verify(&renewed.token).await.is_ok());

    f.clock.advance(Duration::minutes(3));
    assert!(matches!(
        tokens.renew(&issued.token).await,
        Err(VerificationError::Expired)
    ));
}

#[tokio::test]
async fn test_renew_for_removed_subject_fails() {
    let f = fixture();
    let credential = seed(&f.store, "gone@example.com", Role::Organizer).await;
    let issued = f.tokens.issue(&credential).unwrap();

    f.store.remove_credential(credential.id);
    assert!(matches!(
        f.tokens.renew(&issued.token).await,
        Err(VerificationError::UnknownSubject)
    ));
}
