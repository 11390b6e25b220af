//! `PostgreSQL` implementation of the user store.
//!
//! # Database: `bp_auth`
//!
//! ## Tables
//!
//! - `auth.users` - user identities for local and Google sign-in
//!
//! Queries are bound at runtime (no compile-time database required).
//! Refresh tokens and OAuth state never touch this database; they live in
//! the session cache.

use std::time::Duration;

use async_trait::async_trait;
use blue_papaya_core::{AuthProvider, Email, Role, UserId};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{StoreError, UserStore, UserTxn};
use crate::models::User;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// User store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_USER: &str = "SELECT id, name, email, password_hash, provider, provider_id, \
     role, created_at, updated_at FROM auth.users";

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, StoreError> {
    let provider: String = row.try_get("provider")?;
    let role: String = row.try_get("role")?;

    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        provider: provider
            .parse::<AuthProvider>()
            .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
        provider_id: row.try_get("provider_id")?,
        role: role
            .parse::<Role>()
            .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_unique_violation(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        // Constraint names ("users_email_key", "users_name_key") let the
        // service tell which identity collided.
        let constraint = db_err.constraint().unwrap_or("unique constraint");
        return StoreError::Conflict(constraint.to_string());
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn name_exists(&self, name: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM auth.users WHERE name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &Email) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM auth.users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn UserTxn>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUserTxn { tx }))
    }
}

/// A live `PostgreSQL` transaction.
///
/// sqlx rolls back on drop, which is what gives [`UserTxn`]'s
/// rollback-on-early-return guarantee.
struct PgUserTxn {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UserTxn for PgUserTxn {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO auth.users \
             (id, name, email, password_hash, provider, provider_id, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.provider.as_str())
        .bind(&user.provider_id)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn update_sign_in(
        &mut self,
        user_id: UserId,
        provider: AuthProvider,
        provider_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE auth.users SET provider = $1, provider_id = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .bind(now)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
