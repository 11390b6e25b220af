//! End-to-end account lifecycle for one user.

use blue_papaya_auth::cache::{SessionCache, refresh_token_key};
use blue_papaya_auth::models::{SignInParams, SignUpParams};
use blue_papaya_auth::{AuthError, AuthService};
use blue_papaya_core::{AuthProvider, Email};
use blue_papaya_integration_tests::Harness;

#[tokio::test]
async fn test_alice_lifecycle() {
    let h = Harness::default();
    let service = AuthService::new(h.deps.clone());

    // Sign up.
    let signup = service
        .sign_up(SignUpParams {
            name: "alice".to_string(),
            email: Email::parse("alice@x.com").unwrap(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();
    assert!(signup.is_new_user);

    // Second sign-up with the same email is refused.
    let err = service
        .sign_up(SignUpParams {
            name: "alice2".to_string(),
            email: Email::parse("alice@x.com").unwrap(),
            password: "pw2".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "email_exists");

    // Wrong password.
    let err = service
        .sign_in(SignInParams {
            email: Email::parse("alice@x.com").unwrap(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_password");

    // Correct password: a fresh session with a new refresh token.
    let signin = service
        .sign_in(SignInParams {
            email: Email::parse("alice@x.com").unwrap(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();
    assert!(!signin.is_new_user);
    assert_eq!(signin.user_id, signup.user_id);
    assert_ne!(signin.refresh_token, signup.refresh_token);

    // Sign out: the cache entry is gone and rotation is refused.
    let user_id = signup.user_id.to_string();
    service
        .sign_out(&user_id, AuthProvider::Local)
        .await
        .unwrap();
    assert_eq!(
        h.cache
            .get(&refresh_token_key(signup.user_id))
            .await
            .unwrap(),
        None
    );

    let err = service
        .refresh_token(&user_id, AuthProvider::Local, &signin.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoRefreshToken));
}
