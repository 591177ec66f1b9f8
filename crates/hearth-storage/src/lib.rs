//! # hearth-storage
//!
//! File-backed credential store for the hearth authentication service:
//! a keyed map of principal identifiers to key material and admin
//! flags, persisted as an owner-only JSON document with atomic
//! replacement on every write.

#![forbid(unsafe_code)]

mod error;
mod store;

pub use error::{Result, StorageError};
pub use store::{set_restrictive_permissions, CredentialStore, SERVICE_SERVER_ID};
