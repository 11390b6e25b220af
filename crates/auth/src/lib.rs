//! Blue Papaya authentication subsystem.
//!
//! Authenticates end users with local credentials or Google OAuth, issues
//! and rotates short-lived access tokens and longer-lived refresh tokens,
//! and coordinates state between the user store and the session cache.
//!
//! # Architecture
//!
//! The [`AuthService`] orchestrates every flow and owns all transactional
//! and rotation logic. Its collaborators sit behind capability traits so
//! the service can be tested with in-memory fakes:
//!
//! - [`UserStore`](store::UserStore) - relational user records with
//!   transaction scopes
//! - [`SessionCache`](cache::SessionCache) - TTL key/value storage for
//!   refresh tokens and OAuth anti-forgery state
//! - [`TokenIssuer`](token::TokenIssuer) - password hashing and JWT
//!   issuance
//! - [`GoogleClient`](oauth::GoogleClient) - the OAuth authorization-code
//!   exchange and profile fetch
//!
//! The [`ServiceLocator`](locator::ServiceLocator) lazily builds the
//! service at the composition root; with dependencies missing it hands out
//! a degraded instance that fails every operation with a classified error
//! instead of panicking.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod error;
pub mod locator;
pub mod models;
pub mod oauth;
pub mod service;
pub mod store;
pub mod token;

pub use error::{AuthError, ErrorKind};
pub use locator::ServiceLocator;
pub use models::{AuthResult, SignInParams, SignUpParams, TokenPair, User};
pub use service::{AuthDeps, AuthService};
