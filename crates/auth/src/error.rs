//! Classified authentication errors.
//!
//! Every failure inside the auth service is wrapped into an [`AuthError`]
//! at the point of detection - never left as a raw store/cache/provider
//! error. The boundary layer consumes each error exactly once through
//! [`AuthError::kind`], [`AuthError::code`] and [`AuthError::public_message`];
//! that mapping is the single source of truth for status-code translation.

use blue_papaya_core::UserIdError;
use thiserror::Error;

use crate::cache::CacheError;
use crate::oauth::OAuthError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Errors produced by authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The requested name is already taken.
    #[error("name already exists")]
    NameExists,

    /// The requested email is already registered.
    #[error("email already exists")]
    EmailExists,

    /// No user with the given email.
    #[error("user not found")]
    UserNotFound,

    /// Password verification failed.
    #[error("invalid password")]
    InvalidPassword,

    /// Password hashing failed.
    #[error("password hashing failed")]
    Hash,

    /// A store query outside a transaction failed.
    #[error("database error: {0}")]
    Database(#[source] StoreError),

    /// Opening a transaction or a statement inside it failed.
    #[error("transaction error: {0}")]
    Transaction(#[source] StoreError),

    /// The final commit failed.
    #[error("commit failed: {0}")]
    Commit(#[source] StoreError),

    /// Updating the user's sign-in status failed.
    #[error("user update failed: {0}")]
    Update(#[source] StoreError),

    /// Token generation failed.
    #[error("token generation failed: {0}")]
    TokenGeneration(#[source] TokenError),

    /// The session cache was unavailable or rejected the operation.
    #[error("cache error: {0}")]
    Cache(#[source] CacheError),

    /// A user ID arriving as a string could not be parsed.
    #[error(transparent)]
    IdParse(#[from] UserIdError),

    /// OAuth state was absent, expired, replayed, or forged.
    #[error("invalid oauth state")]
    InvalidState,

    /// Exchanging the authorization code failed.
    #[error("token exchange failed: {0}")]
    TokenExchange(#[source] OAuthError),

    /// Fetching profile info from the provider failed.
    #[error("google api error: {0}")]
    GoogleApi(#[source] OAuthError),

    /// Google did not return a refresh token and local policy requires one.
    #[error("google returned no refresh token")]
    NoRefreshToken,

    /// Refreshing the provider access token failed.
    #[error("google token refresh failed: {0}")]
    GoogleToken(#[source] OAuthError),

    /// The service was constructed without a required dependency.
    #[error("auth service not initialized: missing {0}")]
    NotInitialized(&'static str),
}

/// Boundary-facing category of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-correctable input error; surfaced verbatim, cause not logged.
    UserInput,
    /// Infrastructure or contract error; generic message, cause logged.
    Internal,
    /// OAuth-flow error; client-addressable, cause logged.
    OAuthFlow,
}

impl AuthError {
    /// Category for status-code mapping at the boundary.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NameExists | Self::EmailExists | Self::UserNotFound | Self::InvalidPassword => {
                ErrorKind::UserInput
            }
            Self::Hash
            | Self::Database(_)
            | Self::Transaction(_)
            | Self::Commit(_)
            | Self::Update(_)
            | Self::TokenGeneration(_)
            | Self::Cache(_)
            | Self::IdParse(_)
            | Self::NotInitialized(_) => ErrorKind::Internal,
            Self::InvalidState
            | Self::TokenExchange(_)
            | Self::GoogleApi(_)
            | Self::NoRefreshToken
            | Self::GoogleToken(_) => ErrorKind::OAuthFlow,
        }
    }

    /// Stable code consumed by the boundary's error-to-response mapping.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NameExists => "name_exists",
            Self::EmailExists => "email_exists",
            Self::UserNotFound => "user_not_found",
            Self::InvalidPassword => "invalid_password",
            Self::Hash => "hash_error",
            Self::Database(_) => "db_error",
            Self::Transaction(_) => "transaction_error",
            Self::Commit(_) => "commit_error",
            Self::Update(_) => "update_error",
            Self::TokenGeneration(_) => "token_generation_error",
            Self::Cache(_) => "redis_error",
            Self::IdParse(_) => "id_parse_error",
            Self::InvalidState => "invalid_state",
            Self::TokenExchange(_) => "token_exchange_error",
            Self::GoogleApi(_) => "google_api_error",
            Self::NoRefreshToken => "no_refresh_token",
            Self::GoogleToken(_) => "google_token_error",
            Self::NotInitialized(_) => "not_initialized",
        }
    }

    /// Message safe to show the end user.
    ///
    /// `UserNotFound` and `InvalidPassword` intentionally share one message
    /// so sign-in failures don't reveal which accounts exist.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::UserInput => match self {
                Self::UserNotFound | Self::InvalidPassword => {
                    "invalid email or password".to_owned()
                }
                other => other.to_string(),
            },
            ErrorKind::Internal => "internal server error".to_owned(),
            ErrorKind::OAuthFlow => match self {
                Self::InvalidState => {
                    "sign-in session expired or invalid, please try again".to_owned()
                }
                Self::NoRefreshToken => {
                    "google did not grant offline access, please re-authorize".to_owned()
                }
                _ => "google sign-in failed, please try again".to_owned(),
            },
        }
    }

    /// Emit the error through tracing per its category.
    ///
    /// User-input errors log at debug without a cause; internal and OAuth
    /// errors log their full cause chain.
    pub fn log(&self) {
        match self.kind() {
            ErrorKind::UserInput => {
                tracing::debug!(code = self.code(), "auth request rejected");
            }
            ErrorKind::Internal => {
                tracing::error!(code = self.code(), error = %self, "auth internal error");
            }
            ErrorKind::OAuthFlow => {
                tracing::warn!(code = self.code(), error = %self, "oauth flow error");
            }
        }
    }
}
