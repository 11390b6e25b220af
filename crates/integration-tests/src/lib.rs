//! Test harness for the Blue Papaya auth subsystem.
//!
//! Provides in-memory fakes for the external collaborators so the full
//! authentication flows run hermetically: a staging [`MemoryUserStore`]
//! whose transactions buffer writes until commit, and a scripted
//! [`FakeGoogleClient`]. The session cache and token issuer are the real
//! implementations (`MemoryCache`, `JwtIssuer`) since both are in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blue_papaya_auth::cache::MemoryCache;
use blue_papaya_auth::config::{AuthConfig, GoogleOAuthConfig};
use blue_papaya_auth::models::User;
use blue_papaya_auth::oauth::{GoogleClient, GoogleProfile, GoogleToken, OAuthError};
use blue_papaya_auth::service::AuthDeps;
use blue_papaya_auth::store::{StoreError, UserStore, UserTxn};
use blue_papaya_auth::token::JwtIssuer;
use blue_papaya_core::{AuthProvider, Email, UserId};
use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// Access-token TTL used across the harness.
pub const ACCESS_TTL: Duration = Duration::from_secs(900);

/// Refresh-token TTL used across the harness.
pub const REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// A config with valid-looking secrets for constructing a real `JwtIssuer`.
#[must_use]
pub fn test_config() -> AuthConfig {
    AuthConfig {
        database_url: SecretString::from("postgres://localhost/bp_auth_test"),
        jwt_secret: SecretString::from("kJ8#mN2$pQ5&rT9!vX3@zB6^cD0*fG4%"),
        access_token_ttl: ACCESS_TTL,
        refresh_token_ttl: REFRESH_TTL,
        google: GoogleOAuthConfig {
            client_id: "client-id.apps.googleusercontent.com".to_string(),
            client_secret: SecretString::from("client-secret-value"),
            redirect_uri: "https://shop.example.com/auth/google/callback".to_string(),
        },
    }
}

/// In-memory user store with commit-staged transactions.
///
/// Writes made inside a transaction are invisible until `commit`; dropping
/// the transaction discards them, mirroring the production rollback-on-drop
/// contract.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: Arc<Mutex<HashMap<UserId, User>>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed user rows.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Committed row by email, if any.
    #[must_use]
    pub fn get_by_email(&self, email: &str) -> Option<User> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email.as_str() == email)
            .cloned()
    }

    /// Committed row by ID, if any.
    #[must_use]
    pub fn get(&self, id: UserId) -> Option<User> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

enum StagedWrite {
    Insert(User),
    UpdateSignIn {
        user_id: UserId,
        provider: AuthProvider,
        provider_id: Option<String>,
        at: DateTime<Utc>,
    },
}

struct MemoryTxn {
    rows: Arc<Mutex<HashMap<UserId, User>>>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn name_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.rows.lock().unwrap().values().any(|u| u.name == name))
    }

    async fn email_exists(&self, email: &Email) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .any(|u| u.email == *email))
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == *email)
            .cloned())
    }

    async fn begin(&self) -> Result<Box<dyn UserTxn>, StoreError> {
        Ok(Box::new(MemoryTxn {
            rows: Arc::clone(&self.rows),
            staged: Vec::new(),
        }))
    }
}

#[async_trait]
impl UserTxn for MemoryTxn {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        let rows = self.rows.lock().unwrap();
        if rows.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }
        if rows.values().any(|u| u.name == user.name) {
            return Err(StoreError::Conflict("users_name_key".to_string()));
        }
        drop(rows);
        self.staged.push(StagedWrite::Insert(user.clone()));
        Ok(())
    }

    async fn update_sign_in(
        &mut self,
        user_id: UserId,
        provider: AuthProvider,
        provider_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let staged_insert = self
            .staged
            .iter()
            .any(|w| matches!(w, StagedWrite::Insert(u) if u.id == user_id));
        if !staged_insert && !self.rows.lock().unwrap().contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        self.staged.push(StagedWrite::UpdateSignIn {
            user_id,
            provider,
            provider_id: provider_id.map(str::to_owned),
            at: now,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        for write in self.staged {
            match write {
                StagedWrite::Insert(user) => {
                    rows.insert(user.id, user);
                }
                StagedWrite::UpdateSignIn {
                    user_id,
                    provider,
                    provider_id,
                    at,
                } => {
                    if let Some(user) = rows.get_mut(&user_id) {
                        user.provider = provider;
                        user.provider_id = provider_id;
                        user.updated_at = at;
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Scripted Google client.
///
/// `exchange_code` hands back a fixed token (with or without a refresh
/// token), `fetch_profile` a fixed profile, and `refresh_access_token` a
/// fresh access token.
#[derive(Clone)]
pub struct FakeGoogleClient {
    pub profile: GoogleProfile,
    pub grants_refresh_token: bool,
    pub expires_in: u64,
}

impl FakeGoogleClient {
    #[must_use]
    pub fn for_user(id: &str, email: &str, name: &str) -> Self {
        Self {
            profile: GoogleProfile {
                id: id.to_string(),
                email: email.to_string(),
                name: Some(name.to_string()),
            },
            grants_refresh_token: true,
            expires_in: 3599,
        }
    }
}

#[async_trait]
impl GoogleClient for FakeGoogleClient {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.google.com/o/oauth2/v2/auth?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<GoogleToken, OAuthError> {
        if code == "bad-code" {
            return Err(OAuthError::Api {
                status: 400,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(GoogleToken {
            access_token: format!("google-access-for-{code}"),
            refresh_token: self
                .grants_refresh_token
                .then(|| format!("google-refresh-for-{}", self.profile.id)),
            expires_in: self.expires_in,
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<GoogleToken, OAuthError> {
        Ok(GoogleToken {
            access_token: format!("refreshed-from-{refresh_token}"),
            refresh_token: None,
            expires_in: self.expires_in,
        })
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<GoogleProfile, OAuthError> {
        Ok(self.profile.clone())
    }
}

/// Everything a behavioral test needs: the wired dependencies plus direct
/// handles on the store and cache for state assertions.
pub struct Harness {
    pub deps: AuthDeps,
    pub store: Arc<MemoryUserStore>,
    pub cache: Arc<MemoryCache>,
    pub issuer: Arc<JwtIssuer>,
}

impl Harness {
    /// Full set of working collaborators with the given Google script.
    #[must_use]
    pub fn with_google(google: FakeGoogleClient) -> Self {
        let store = Arc::new(MemoryUserStore::new());
        let cache = Arc::new(MemoryCache::new(1024));
        let issuer = Arc::new(JwtIssuer::new(&test_config()));
        let deps = AuthDeps {
            store: Some(store.clone()),
            cache: Some(cache.clone()),
            issuer: Some(issuer.clone()),
            google: Some(Arc::new(google)),
            refresh_token_ttl: REFRESH_TTL,
        };
        Self {
            deps,
            store,
            cache,
            issuer,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::with_google(FakeGoogleClient::for_user(
            "g-1001",
            "someone@example.com",
            "Someone",
        ))
    }
}
