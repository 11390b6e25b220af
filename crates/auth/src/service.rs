//! Authentication orchestration.
//!
//! [`AuthService`] owns every transactional and rotation decision: sign-up,
//! sign-in, sign-out, refresh-token rotation, and the Google OAuth callback.
//! Collaborators arrive as optional trait objects so the locator can hand out
//! a degraded instance when configuration is incomplete; a degraded instance
//! answers every call with [`AuthError::NotInitialized`] instead of panicking.

use std::sync::Arc;
use std::time::Duration;

use blue_papaya_core::{AuthProvider, Email, Role, UserId};
use chrono::Utc;
use tracing::{debug, info};

use crate::cache::{OAUTH_STATE_VALID, SessionCache, oauth_state_key, refresh_token_key};
use crate::config::OAUTH_STATE_TTL;
use crate::error::AuthError;
use crate::models::{AuthResult, SignInParams, SignUpParams, User};
use crate::oauth::{GoogleClient, OAuthError};
use crate::store::{StoreError, UserStore};
use crate::token::TokenIssuer;

/// Collaborators for [`AuthService`], all optional.
///
/// Missing entries produce a degraded service rather than a construction
/// failure; the locator decides which behavior the caller gets.
#[derive(Clone, Default)]
pub struct AuthDeps {
    /// Relational user store.
    pub store: Option<Arc<dyn UserStore>>,
    /// TTL session cache.
    pub cache: Option<Arc<dyn SessionCache>>,
    /// Password hashing and token signing.
    pub issuer: Option<Arc<dyn TokenIssuer>>,
    /// Google OAuth client.
    pub google: Option<Arc<dyn GoogleClient>>,
    /// Lifetime of a refresh-token cache record.
    pub refresh_token_ttl: Duration,
}

impl std::fmt::Debug for AuthDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthDeps")
            .field("store", &self.store.is_some())
            .field("cache", &self.cache.is_some())
            .field("issuer", &self.issuer.is_some())
            .field("google", &self.google.is_some())
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

/// The authentication service.
pub struct AuthService {
    deps: AuthDeps,
}

impl AuthService {
    /// Build a service over whatever collaborators are present.
    #[must_use]
    pub const fn new(deps: AuthDeps) -> Self {
        Self { deps }
    }

    /// Whether every collaborator is present.
    #[must_use]
    pub const fn is_fully_initialized(&self) -> bool {
        self.deps.store.is_some()
            && self.deps.cache.is_some()
            && self.deps.issuer.is_some()
            && self.deps.google.is_some()
    }

    fn store(&self) -> Result<&dyn UserStore, AuthError> {
        self.deps
            .store
            .as_deref()
            .ok_or(AuthError::NotInitialized("user store"))
    }

    fn cache(&self) -> Result<&dyn SessionCache, AuthError> {
        self.deps
            .cache
            .as_deref()
            .ok_or(AuthError::NotInitialized("session cache"))
    }

    fn issuer(&self) -> Result<&dyn TokenIssuer, AuthError> {
        self.deps
            .issuer
            .as_deref()
            .ok_or(AuthError::NotInitialized("token issuer"))
    }

    fn google(&self) -> Result<&dyn GoogleClient, AuthError> {
        self.deps
            .google
            .as_deref()
            .ok_or(AuthError::NotInitialized("google client"))
    }

    /// Register a local account.
    ///
    /// Uniqueness checks run first; the row insert, token issuance, and
    /// refresh-token cache write then share one transaction scope, so no
    /// user row survives any mid-flight failure.
    ///
    /// # Errors
    ///
    /// [`AuthError::NameExists`] / [`AuthError::EmailExists`] when the
    /// identity is taken; infrastructure failures are classified per step.
    pub async fn sign_up(&self, params: SignUpParams) -> Result<AuthResult, AuthError> {
        let store = self.store()?;
        let cache = self.cache()?;
        let issuer = self.issuer()?;

        if store
            .name_exists(&params.name)
            .await
            .map_err(AuthError::Database)?
        {
            return Err(AuthError::NameExists);
        }
        if store
            .email_exists(&params.email)
            .await
            .map_err(AuthError::Database)?
        {
            return Err(AuthError::EmailExists);
        }

        let password_hash = issuer
            .hash_password(&params.password)
            .map_err(|_| AuthError::Hash)?;

        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            name: params.name,
            email: params.email,
            password_hash: Some(password_hash),
            provider: AuthProvider::Local,
            provider_id: None,
            role: Role::User,
            created_at: now,
            updated_at: now,
        };

        // Dropping the transaction on any early return rolls it back.
        let mut txn = store.begin().await.map_err(AuthError::Transaction)?;
        txn.insert_user(&user).await.map_err(classify_conflict)?;

        let pair = issuer
            .issue_pair(user.id, AuthProvider::Local, now)
            .map_err(AuthError::TokenGeneration)?;
        cache
            .set(
                &refresh_token_key(user.id),
                &pair.refresh_token,
                self.deps.refresh_token_ttl,
            )
            .await
            .map_err(AuthError::Cache)?;

        txn.commit().await.map_err(AuthError::Commit)?;

        info!(user_id = %user.id, "user signed up");
        Ok(AuthResult::from_pair(user.id, pair, true))
    }

    /// Authenticate a local account.
    ///
    /// # Errors
    ///
    /// [`AuthError::UserNotFound`] and [`AuthError::InvalidPassword`] carry
    /// an identical public message so callers cannot probe for accounts.
    pub async fn sign_in(&self, params: SignInParams) -> Result<AuthResult, AuthError> {
        let store = self.store()?;
        let cache = self.cache()?;
        let issuer = self.issuer()?;

        let user = store
            .find_by_email(&params.email)
            .await
            .map_err(AuthError::Database)?
            .ok_or(AuthError::UserNotFound)?;

        // Provider-only accounts have no hash; a local sign-in against one
        // fails the same way a wrong password does.
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidPassword)?;
        if !issuer
            .verify_password(&params.password, hash)
            .map_err(|_| AuthError::Hash)?
        {
            return Err(AuthError::InvalidPassword);
        }

        let now = Utc::now();
        let mut txn = store.begin().await.map_err(AuthError::Transaction)?;
        txn.update_sign_in(user.id, AuthProvider::Local, None, now)
            .await
            .map_err(AuthError::Update)?;

        let pair = issuer
            .issue_pair(user.id, AuthProvider::Local, now)
            .map_err(AuthError::TokenGeneration)?;
        cache
            .set(
                &refresh_token_key(user.id),
                &pair.refresh_token,
                self.deps.refresh_token_ttl,
            )
            .await
            .map_err(AuthError::Cache)?;

        txn.commit().await.map_err(AuthError::Commit)?;

        Ok(AuthResult::from_pair(user.id, pair, false))
    }

    /// Revoke a user's session by deleting the cached refresh token.
    ///
    /// Idempotent and provider-agnostic.
    ///
    /// # Errors
    ///
    /// [`AuthError::IdParse`] for a malformed ID, [`AuthError::Cache`] when
    /// the cache rejects the delete.
    pub async fn sign_out(&self, user_id: &str, provider: AuthProvider) -> Result<(), AuthError> {
        let cache = self.cache()?;
        let user_id = UserId::parse(user_id)?;

        cache
            .delete(&refresh_token_key(user_id))
            .await
            .map_err(AuthError::Cache)?;

        debug!(%user_id, %provider, "user signed out");
        Ok(())
    }

    /// Rotate a session's tokens.
    ///
    /// Local sessions revoke the old cached token before issuing a
    /// replacement, so two refresh tokens are never simultaneously valid.
    /// Google sessions refresh the provider access token; the stored Google
    /// refresh token is not rotated, only its local record is re-aged.
    ///
    /// Either branch fails closed: any error aborts rotation with the
    /// session in its prior state.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoRefreshToken`] when no cached record exists or the
    /// presented token does not match it.
    pub async fn refresh_token(
        &self,
        user_id: &str,
        provider: AuthProvider,
        current_refresh_token: &str,
    ) -> Result<AuthResult, AuthError> {
        let cache = self.cache()?;
        let user_id = UserId::parse(user_id)?;
        let key = refresh_token_key(user_id);

        let stored = cache
            .get(&key)
            .await
            .map_err(AuthError::Cache)?
            .ok_or(AuthError::NoRefreshToken)?;

        match provider {
            AuthProvider::Local => {
                let issuer = self.issuer()?;
                // A stale presented token means a concurrent rotation or
                // revocation already won; refuse rather than fork the session.
                if stored != current_refresh_token {
                    return Err(AuthError::NoRefreshToken);
                }

                // Revocation must be confirmed before a replacement exists.
                cache.delete(&key).await.map_err(AuthError::Cache)?;

                let now = Utc::now();
                let pair = issuer
                    .issue_pair(user_id, AuthProvider::Local, now)
                    .map_err(AuthError::TokenGeneration)?;
                cache
                    .set(&key, &pair.refresh_token, self.deps.refresh_token_ttl)
                    .await
                    .map_err(AuthError::Cache)?;

                Ok(AuthResult::from_pair(user_id, pair, false))
            }
            AuthProvider::Google => {
                let google = self.google()?;
                let token = google
                    .refresh_access_token(&stored)
                    .await
                    .map_err(AuthError::GoogleToken)?;

                let now = Utc::now();
                // An expiry the calendar cannot represent is a malformed
                // provider response, not a reason to panic the worker.
                let access_token_expires = i64::try_from(token.expires_in)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|delta| now.checked_add_signed(delta))
                    .ok_or_else(|| {
                        AuthError::GoogleToken(OAuthError::Parse(format!(
                            "implausible expires_in: {}",
                            token.expires_in
                        )))
                    })?;
                let refresh_token_expires = now + refresh_delta(self.deps.refresh_token_ttl);

                // Re-age the stored record; Google's token itself is unchanged.
                cache
                    .set(&key, &stored, self.deps.refresh_token_ttl)
                    .await
                    .map_err(AuthError::Cache)?;

                Ok(AuthResult {
                    user_id,
                    access_token: token.access_token,
                    refresh_token: stored,
                    access_token_expires,
                    refresh_token_expires,
                    is_new_user: false,
                })
            }
        }
    }

    /// Persist anti-forgery state and build the Google authorization URL.
    ///
    /// If the state cannot be persisted no URL is returned; redirecting
    /// would strand the user at an unverifiable callback.
    ///
    /// # Errors
    ///
    /// [`AuthError::Cache`] when the state write fails.
    pub async fn generate_google_auth_url(&self, state: &str) -> Result<String, AuthError> {
        let cache = self.cache()?;
        let google = self.google()?;

        cache
            .set(&oauth_state_key(state), OAUTH_STATE_VALID, OAUTH_STATE_TTL)
            .await
            .map_err(AuthError::Cache)?;

        Ok(google.authorization_url(state))
    }

    /// Complete the Google OAuth callback.
    ///
    /// Users are merged by email: a profile email matching an existing
    /// account signs into that account regardless of how it was created.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidState`] for absent/expired/forged state;
    /// [`AuthError::NoRefreshToken`] when Google omits a refresh token,
    /// since rotation policy depends on holding one.
    pub async fn handle_google_auth(
        &self,
        code: &str,
        state: &str,
    ) -> Result<AuthResult, AuthError> {
        let store = self.store()?;
        let cache = self.cache()?;
        let issuer = self.issuer()?;
        let google = self.google()?;

        let cached_state = cache
            .get(&oauth_state_key(state))
            .await
            .map_err(AuthError::Cache)?;
        if cached_state.as_deref() != Some(OAUTH_STATE_VALID) {
            return Err(AuthError::InvalidState);
        }

        let token = google
            .exchange_code(code)
            .await
            .map_err(AuthError::TokenExchange)?;
        let profile = google
            .fetch_profile(&token.access_token)
            .await
            .map_err(AuthError::GoogleApi)?;

        let email = Email::parse(&profile.email)
            .map_err(|e| AuthError::GoogleApi(OAuthError::Parse(e.to_string())))?;

        let existing = store
            .find_by_email(&email)
            .await
            .map_err(AuthError::Database)?;
        let is_new_user = existing.is_none();

        let now = Utc::now();
        let user_id = match existing {
            Some(user) => {
                if user.provider != AuthProvider::Google {
                    info!(user_id = %user.id, from = %user.provider, "merging account into google sign-in by email");
                }
                user.id
            }
            None => UserId::generate(),
        };

        let mut txn = store.begin().await.map_err(AuthError::Transaction)?;
        if is_new_user {
            let user = User {
                id: user_id,
                name: profile.name.clone().unwrap_or_else(|| profile.email.clone()),
                email,
                password_hash: None,
                provider: AuthProvider::Google,
                provider_id: Some(profile.id.clone()),
                role: Role::User,
                created_at: now,
                updated_at: now,
            };
            txn.insert_user(&user).await.map_err(classify_conflict)?;
        }

        let (access_token, access_token_expires) = issuer
            .issue_access(user_id, AuthProvider::Google, now)
            .map_err(AuthError::TokenGeneration)?;

        let refresh_token = token
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoRefreshToken)?;
        cache
            .set(
                &refresh_token_key(user_id),
                &refresh_token,
                self.deps.refresh_token_ttl,
            )
            .await
            .map_err(AuthError::Cache)?;

        txn.update_sign_in(user_id, AuthProvider::Google, Some(&profile.id), now)
            .await
            .map_err(AuthError::Update)?;
        txn.commit().await.map_err(AuthError::Commit)?;

        let refresh_token_expires = now + refresh_delta(self.deps.refresh_token_ttl);

        Ok(AuthResult {
            user_id,
            access_token,
            refresh_token,
            access_token_expires,
            refresh_token_expires,
            is_new_user,
        })
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").field("deps", &self.deps).finish()
    }
}

/// Refresh-record lifetime as a calendar delta, clamped so expiry
/// arithmetic cannot overflow on an extreme configured TTL.
fn refresh_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl)
        .unwrap_or(chrono::Duration::MAX)
        .min(chrono::Duration::days(36500))
}

/// Map an insert failure, turning unique-constraint violations into the
/// matching identity error. Races past the pre-checks land here.
fn classify_conflict(err: StoreError) -> AuthError {
    match err {
        StoreError::Conflict(ref constraint) if constraint.contains("email") => {
            AuthError::EmailExists
        }
        StoreError::Conflict(_) => AuthError::NameExists,
        other => AuthError::Transaction(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_delta_clamps_extreme_ttl() {
        assert_eq!(
            refresh_delta(Duration::from_secs(u64::MAX)),
            chrono::Duration::days(36500)
        );
        assert_eq!(
            refresh_delta(Duration::from_secs(604_800)),
            chrono::Duration::days(7)
        );
    }

    #[test]
    fn test_classify_conflict() {
        assert!(matches!(
            classify_conflict(StoreError::Conflict("users_email_key".into())),
            AuthError::EmailExists
        ));
        assert!(matches!(
            classify_conflict(StoreError::Conflict("users_name_key".into())),
            AuthError::NameExists
        ));
        assert!(matches!(
            classify_conflict(StoreError::NotFound),
            AuthError::Transaction(_)
        ));
    }
}
