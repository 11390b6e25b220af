//! Refresh-token rotation: the local delete-then-reissue branch and the
//! Google provider-refresh branch.

use blue_papaya_auth::cache::{SessionCache, refresh_token_key};
use blue_papaya_auth::models::SignUpParams;
use blue_papaya_auth::{AuthError, AuthService};
use blue_papaya_core::{AuthProvider, Email};
use blue_papaya_integration_tests::Harness;

async fn signed_up(h: &Harness) -> (AuthService, blue_papaya_auth::AuthResult) {
    let service = AuthService::new(h.deps.clone());
    let result = service
        .sign_up(SignUpParams {
            name: "alice".to_string(),
            email: Email::parse("alice@x.com").unwrap(),
            password: "pw-alice-1".to_string(),
        })
        .await
        .unwrap();
    (service, result)
}

#[tokio::test]
async fn test_local_rotation_replaces_exactly_one_value() {
    let h = Harness::default();
    let (service, signup) = signed_up(&h).await;
    let key = refresh_token_key(signup.user_id);

    let rotated = service
        .refresh_token(
            &signup.user_id.to_string(),
            AuthProvider::Local,
            &signup.refresh_token,
        )
        .await
        .unwrap();

    // The old token is gone; exactly the new one is present.
    let cached = h.cache.get(&key).await.unwrap().unwrap();
    assert_ne!(cached, signup.refresh_token);
    assert_eq!(cached, rotated.refresh_token);
    assert!(!rotated.is_new_user);
}

#[tokio::test]
async fn test_stale_presented_token_is_refused() {
    let h = Harness::default();
    let (service, signup) = signed_up(&h).await;
    let user_id = signup.user_id.to_string();

    // First rotation wins; replaying the sign-up token must now fail.
    service
        .refresh_token(&user_id, AuthProvider::Local, &signup.refresh_token)
        .await
        .unwrap();

    let err = service
        .refresh_token(&user_id, AuthProvider::Local, &signup.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoRefreshToken));
}

#[tokio::test]
async fn test_sign_out_revokes_and_blocks_rotation() {
    let h = Harness::default();
    let (service, signup) = signed_up(&h).await;
    let key = refresh_token_key(signup.user_id);
    let user_id = signup.user_id.to_string();

    service
        .sign_out(&user_id, AuthProvider::Local)
        .await
        .unwrap();
    assert_eq!(h.cache.get(&key).await.unwrap(), None);

    let err = service
        .refresh_token(&user_id, AuthProvider::Local, &signup.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoRefreshToken));

    // Sign-out is idempotent.
    service
        .sign_out(&user_id, AuthProvider::Local)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_malformed_user_id_is_a_parse_error() {
    let h = Harness::default();
    let service = AuthService::new(h.deps.clone());

    let err = service
        .refresh_token("not-a-uuid", AuthProvider::Local, "whatever")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::IdParse(_)));
    assert_eq!(err.code(), "id_parse_error");
}

#[tokio::test]
async fn test_google_rotation_keeps_stored_refresh_token() {
    let h = Harness::default();
    let service = AuthService::new(h.deps.clone());

    service.generate_google_auth_url("st-1").await.unwrap();
    let result = service.handle_google_auth("good-code", "st-1").await.unwrap();
    let key = refresh_token_key(result.user_id);
    let stored_before = h.cache.get(&key).await.unwrap().unwrap();

    let rotated = service
        .refresh_token(
            &result.user_id.to_string(),
            AuthProvider::Google,
            &result.refresh_token,
        )
        .await
        .unwrap();

    // Google's refresh token is not rotated; only the access token is new.
    assert_eq!(rotated.refresh_token, stored_before);
    assert_eq!(h.cache.get(&key).await.unwrap().unwrap(), stored_before);
    assert!(rotated.access_token.starts_with("refreshed-from-"));
}

#[tokio::test]
async fn test_google_rotation_with_implausible_expiry_fails_closed() {
    let mut google = blue_papaya_integration_tests::FakeGoogleClient::for_user(
        "g-7",
        "erin@example.com",
        "Erin",
    );
    google.expires_in = u64::MAX;
    let h = Harness::with_google(google);
    let service = AuthService::new(h.deps.clone());

    service.generate_google_auth_url("st-1").await.unwrap();
    let result = service.handle_google_auth("good-code", "st-1").await.unwrap();

    // A provider expiry the calendar cannot hold is refused, not a panic,
    // and the stored session survives untouched.
    let key = refresh_token_key(result.user_id);
    let stored_before = h.cache.get(&key).await.unwrap();
    let err = service
        .refresh_token(
            &result.user_id.to_string(),
            AuthProvider::Google,
            &result.refresh_token,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::GoogleToken(_)));
    assert_eq!(h.cache.get(&key).await.unwrap(), stored_before);
}

#[tokio::test]
async fn test_google_rotation_without_stored_token_fails_closed() {
    let h = Harness::default();
    let service = AuthService::new(h.deps.clone());

    let err = service
        .refresh_token(
            &blue_papaya_core::UserId::generate().to_string(),
            AuthProvider::Google,
            "anything",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoRefreshToken));
}
