//! User store capability traits.
//!
//! The auth service talks to the relational store through [`UserStore`] and
//! [`UserTxn`] so it can be tested against in-memory fakes. The production
//! implementation lives in [`postgres`].
//!
//! A [`UserTxn`] is a scoped resource: every mutating flow acquires one,
//! and either [`commit`](UserTxn::commit) or [`rollback`](UserTxn::rollback)
//! consumes it. Dropping an uncommitted transaction rolls back, so no early
//! return can leak an open transaction.

pub mod postgres;

use async_trait::async_trait;
use blue_papaya_core::Email;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::User;

/// Errors from the user store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique name or email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The store is unreachable or refused the operation.
    ///
    /// Production code maps driver failures through [`StoreError::Database`];
    /// this variant exists so test fakes can inject failures without
    /// constructing driver errors.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Point queries and transaction entry for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Whether a user with this name exists.
    async fn name_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Whether a user with this email exists.
    async fn email_exists(&self, email: &Email) -> Result<bool, StoreError>;

    /// Look up a user by email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    /// Open a transaction scope.
    async fn begin(&self) -> Result<Box<dyn UserTxn>, StoreError>;
}

/// Mutations inside one transaction scope.
#[async_trait]
pub trait UserTxn: Send {
    /// Insert a fully-populated user row.
    ///
    /// Fails with [`StoreError::Conflict`] if the name or email is taken.
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Reassert the user's last-used provider, provider ID, and timestamp.
    async fn update_sign_in(
        &mut self,
        user_id: blue_papaya_core::UserId,
        provider: blue_papaya_core::AuthProvider,
        provider_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Commit the transaction, consuming it.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Roll the transaction back explicitly, consuming it.
    ///
    /// Dropping an uncommitted transaction has the same effect; this method
    /// exists for the paths that want to surface a rollback failure.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
