//! Core types for Blue Papaya.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod provider;

pub use email::{Email, EmailError};
pub use id::{UserId, UserIdError};
pub use provider::{AuthProvider, Role, UnknownProvider, UnknownRole};
