//! Protocol records exchanged between clients and the authenticator.
//!
//! Sealed fields hold raw ciphertext over the canonical tagged record
//! bytes; which long-lived key seals which field is fixed by the
//! protocol (tickets under a server secret, authenticators under the
//! ticket's session key).

use hearth_crypto::WireMessage;
use serde::{Deserialize, Serialize};

/// Closed validity interval, nanosecond timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Interval start, nanoseconds since the epoch.
    pub begin: u64,
    /// Interval end, nanoseconds since the epoch.
    pub end: u64,
}

impl Interval {
    /// Whether `timestamp` lies inside the interval (inclusive).
    pub fn contains(&self, timestamp: u64) -> bool {
        timestamp >= self.begin && timestamp <= self.end
    }
}

/// A ticket binding a principal to a session key for a validity
/// period. Immutable once sealed; renewal produces a new ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Principal the ticket was issued for. Never empty in a valid
    /// ticket.
    pub client_id: String,
    /// Network address of the client. Preserved on the wire but
    /// currently always populated with the empty string.
    pub client_ip: String,
    /// Period during which authenticators against this ticket are
    /// accepted.
    pub validity_period: Interval,
    /// Session key bound to this ticket, 16 bytes.
    pub session_key: Vec<u8>,
}

impl WireMessage for Ticket {
    const TAG: u8 = 1;
}

/// Client-generated proof of session-key possession at a moment in
/// time. The server echoes it back with `timestamp + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticator {
    /// Principal claiming the session.
    pub client_id: String,
    /// Nanosecond timestamp, freshly minted per request.
    pub timestamp: u64,
}

impl WireMessage for Authenticator {
    const TAG: u8 = 2;
}

/// A sealed ticket together with a sealed authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAuthenticatorWrapper {
    /// Ticket sealed under a long-lived server secret.
    pub ticket: Vec<u8>,
    /// Authenticator sealed under the ticket's session key.
    pub authenticator: Vec<u8>,
}

/// A sealed ticket together with its session key wrapped for the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSessionKeyWrapper {
    /// Ticket sealed under a long-lived server secret.
    pub ticket: Vec<u8>,
    /// Session key wrapped under the caller's key material.
    pub session_key: Vec<u8>,
}

/// A value encrypted to a validated session, together with the renewed
/// wrapper proving the validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedValue {
    /// The re-sealed wrapper returned by service-server validation.
    pub ticket_authenticator_wrapper: TicketAuthenticatorWrapper,
    /// Payload sealed under the session key.
    pub value: Vec<u8>,
}

/// Request payload for the administrative credential operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentialsChange {
    /// Principal the change applies to.
    pub id: String,
    /// Current credentials, sealed under the session key. Empty when
    /// the operation does not verify them.
    pub old_credentials: Vec<u8>,
    /// New credentials, sealed under the session key (or under the
    /// hashed initial password during bootstrap).
    pub new_credentials: Vec<u8>,
    /// Requested admin flag.
    pub admin: bool,
    /// Session proof; absent only for the bootstrap registration.
    pub ticket_authenticator_wrapper: Option<TicketAuthenticatorWrapper>,
}

/// A `user@client` principal identifier, either half optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal<'a> {
    /// User half, absent for pure clients.
    pub user: Option<&'a str>,
    /// Client half, absent for pure users.
    pub client: Option<&'a str>,
}

impl<'a> Principal<'a> {
    /// Split an identifier on the first `@`.
    pub fn parse(id: &'a str) -> Self {
        let (user, client) = match id.split_once('@') {
            Some((user, client)) => (user, client),
            None => (id, ""),
        };
        Self {
            user: non_empty(user),
            client: non_empty(client),
        }
    }

    /// The user half, or the empty string.
    pub fn user_or_empty(&self) -> &'a str {
        self.user.unwrap_or("")
    }
}

fn non_empty(part: &str) -> Option<&str> {
    let part = part.trim();
    if part.is_empty() {
        None
    } else {
        Some(part)
    }
}
