//! # hearth-server
//!
//! The authenticator controller: wires the credential store, the
//! long-lived server secrets and the protocol handlers together behind
//! the remote-callable [`AuthenticationService`] surface, and manages
//! the bootstrap lifecycle (service-server key pair, initial
//! password).
//!
//! [`AuthenticationService`]: hearth_core::AuthenticationService

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;

pub use config::Config;
pub use controller::{
    AuthenticatorController, ControllerState, SERVICE_SERVER_SECRET_KEY, TICKET_GRANTING_KEY,
};
