//! Blue Papaya Core - Shared types library.
//!
//! This crate provides common types used across all Blue Papaya components:
//! - `auth` - Authentication subsystem (token issuance, OAuth)
//! - future API and worker crates
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, providers, and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
