//! Pure handlers for the three protocol hops.
//!
//! KDC issues ticket granting tickets, TGS exchanges them for client
//! server tickets, and the service-server path revalidates a session on
//! every request. The handlers are stateless: all secret material is
//! passed in, so they are thread-safe by construction.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hearth_crypto::{
    decrypt_symmetric, encrypt_bytes, encrypt_symmetric, generate_key, wrap_session_key,
};
use tracing::warn;

use crate::error::{AuthError, Result};
use crate::messages::{Authenticator, Interval, Ticket, TicketAuthenticatorWrapper, TicketSessionKeyWrapper};

/// Maximum tolerated difference between an authenticator timestamp and
/// the server wall clock: ±2 minutes, in nanoseconds.
pub const MAX_TIME_DIFF_SERVER_CLIENT: u64 = 2 * 60 * 1_000_000_000;

/// Current wall-clock time in nanoseconds since the epoch.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Interval starting now and ending `validity` from now.
pub fn validity_interval(validity: Duration) -> Interval {
    let begin = now_nanos();
    Interval {
        begin,
        end: begin.saturating_add(validity.as_nanos() as u64),
    }
}

/// Whether `timestamp` lies inside `interval` (inclusive bounds).
pub fn is_timestamp_in_interval(timestamp: u64, interval: &Interval) -> bool {
    interval.contains(timestamp)
}

/// Handle a Key Distribution Center login request.
///
/// Creates a ticket granting ticket sealed under the TGS secret key
/// and a fresh TGS session key wrapped for the caller: symmetrically
/// under `user_key` when present, then asymmetrically under
/// `client_key` when present. Clients must unwrap in the reverse
/// order.
pub fn handle_kdc_request(
    id: &str,
    user_key: Option<&[u8]>,
    client_key: Option<&[u8]>,
    client_address: &str,
    ticket_granting_service_secret_key: &[u8],
    validity: Duration,
) -> Result<TicketSessionKeyWrapper> {
    let session_key = generate_key()?;

    let ticket_granting_ticket = Ticket {
        client_id: id.to_string(),
        client_ip: client_address.to_string(),
        validity_period: validity_interval(validity),
        session_key: session_key.to_vec(),
    };
    let sealed_ticket =
        encrypt_symmetric(&ticket_granting_ticket, ticket_granting_service_secret_key)?;

    let mut wrapped_session_key = session_key.to_vec();
    if let Some(user_key) = user_key {
        wrapped_session_key = wrap_session_key(&wrapped_session_key, user_key, true)?;
    }
    if let Some(client_key) = client_key {
        wrapped_session_key = wrap_session_key(&wrapped_session_key, client_key, false)?;
    }

    Ok(TicketSessionKeyWrapper {
        ticket: sealed_ticket,
        session_key: wrapped_session_key,
    })
}

/// Handle a Ticket Granting Server request.
///
/// Validates the presented ticket granting ticket and authenticator,
/// then issues a client server ticket carrying a fresh session key.
/// The new session key travels sealed under the old TGS session key.
pub fn handle_tgs_request(
    ticket_granting_service_secret_key: &[u8],
    service_server_secret_key: &[u8],
    wrapper: &TicketAuthenticatorWrapper,
    validity: Duration,
) -> Result<TicketSessionKeyWrapper> {
    let ticket_granting_ticket: Ticket =
        decrypt_symmetric(&wrapper.ticket, ticket_granting_service_secret_key)?;
    let session_key = ticket_granting_ticket.session_key.clone();
    let authenticator: Authenticator = decrypt_symmetric(&wrapper.authenticator, &session_key)?;

    validate_ticket(&ticket_granting_ticket, &authenticator)?;

    let service_server_session_key = generate_key()?;
    let client_server_ticket = Ticket {
        validity_period: validity_interval(validity),
        session_key: service_server_session_key.to_vec(),
        ..ticket_granting_ticket
    };

    Ok(TicketSessionKeyWrapper {
        ticket: encrypt_symmetric(&client_server_ticket, service_server_secret_key)?,
        session_key: encrypt_bytes(&service_server_session_key, &session_key)?,
    })
}

/// Handle a service-server request.
///
/// Validates the presented client server ticket and authenticator,
/// renews the ticket's validity period (same session key), and returns
/// the authenticator with `timestamp + 1` to prove the server
/// responded.
pub fn handle_ss_request(
    service_server_secret_key: &[u8],
    wrapper: &TicketAuthenticatorWrapper,
    validity: Duration,
) -> Result<TicketAuthenticatorWrapper> {
    let client_server_ticket: Ticket =
        decrypt_symmetric(&wrapper.ticket, service_server_secret_key)?;
    let session_key = client_server_ticket.session_key.clone();
    let authenticator: Authenticator = decrypt_symmetric(&wrapper.authenticator, &session_key)?;

    validate_ticket(&client_server_ticket, &authenticator)?;

    let renewed_ticket = Ticket {
        validity_period: validity_interval(validity),
        ..client_server_ticket
    };
    let response_authenticator = Authenticator {
        timestamp: authenticator.timestamp + 1,
        ..authenticator
    };

    Ok(TicketAuthenticatorWrapper {
        ticket: encrypt_symmetric(&renewed_ticket, service_server_secret_key)?,
        authenticator: encrypt_symmetric(&response_authenticator, &session_key)?,
    })
}

/// Validate an authenticator against a decrypted ticket.
///
/// Rejects on missing or mismatching client ids; reports
/// [`AuthError::SessionExpired`] when the timestamp falls outside the
/// ticket validity period or differs from the server wall clock by
/// more than [`MAX_TIME_DIFF_SERVER_CLIENT`].
pub fn validate_ticket(ticket: &Ticket, authenticator: &Authenticator) -> Result<()> {
    if ticket.client_id.is_empty() {
        return Err(AuthError::Rejected(
            "Ticket does not contain a client id".to_string(),
        ));
    }
    if authenticator.client_id.is_empty() {
        return Err(AuthError::Rejected(
            "Authenticator does not contain a client id".to_string(),
        ));
    }
    if authenticator.client_id != ticket.client_id {
        warn!(
            expected = %ticket.client_id,
            received = %authenticator.client_id,
            "received an erroneous request regarding the client id"
        );
        return Err(AuthError::Rejected("ClientIds do not match".to_string()));
    }

    if !is_timestamp_in_interval(authenticator.timestamp, &ticket.validity_period) {
        return Err(AuthError::SessionExpired);
    }

    let now = now_nanos();
    if authenticator.timestamp < now.saturating_sub(MAX_TIME_DIFF_SERVER_CLIENT)
        || authenticator.timestamp > now + MAX_TIME_DIFF_SERVER_CLIENT
    {
        return Err(AuthError::SessionExpired);
    }

    Ok(())
}
