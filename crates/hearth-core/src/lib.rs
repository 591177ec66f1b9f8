//! # hearth-core
//!
//! The ticket-granting protocol at the heart of the hearth
//! authentication service: the wire records exchanged between clients
//! and the authenticator, the pure KDC/TGS/SS request handlers with
//! ticket validation, the shared error type, and the remote-callable
//! service trait.

#![forbid(unsafe_code)]

pub mod error;
pub mod handler;
pub mod messages;
pub mod service;

pub use error::{AuthError, Result};
pub use handler::{
    handle_kdc_request, handle_ss_request, handle_tgs_request, is_timestamp_in_interval,
    now_nanos, validate_ticket, validity_interval, MAX_TIME_DIFF_SERVER_CLIENT,
};
pub use messages::{
    Authenticator, AuthenticatedValue, Interval, LoginCredentialsChange, Principal, Ticket,
    TicketAuthenticatorWrapper, TicketSessionKeyWrapper,
};
pub use service::AuthenticationService;
