//! The remote-callable surface of the authenticator.

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::{
    AuthenticatedValue, LoginCredentialsChange, TicketAuthenticatorWrapper,
    TicketSessionKeyWrapper,
};

/// Operations exposed to remote clients by the authenticator
/// controller. The transport carrying these calls is out of scope;
/// implementations complete each call on a worker pool.
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    /// KDC hop: issue a ticket granting ticket for `id`, with the
    /// session key wrapped under the principal's stored key material.
    async fn request_ticket_granting_ticket(&self, id: &str) -> Result<TicketSessionKeyWrapper>;

    /// TGS hop: exchange a ticket granting ticket for a client server
    /// ticket.
    async fn request_client_server_ticket(
        &self,
        wrapper: TicketAuthenticatorWrapper,
    ) -> Result<TicketSessionKeyWrapper>;

    /// SS hop: revalidate a session, renewing the ticket and proving
    /// server liveness via `timestamp + 1`.
    async fn validate_client_server_ticket(
        &self,
        wrapper: TicketAuthenticatorWrapper,
    ) -> Result<TicketAuthenticatorWrapper>;

    /// Replace a principal's credentials after verifying the old ones.
    async fn change_credentials(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper>;

    /// Register a new principal. Returns `None` on the bootstrap path
    /// (first user, authorized by the initial password instead of a
    /// ticket).
    async fn register(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<Option<TicketAuthenticatorWrapper>>;

    /// Remove a principal. Admin only; self-removal is refused.
    async fn remove_user(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper>;

    /// Set or clear a principal's admin flag. Admin only; changing
    /// one's own flag is refused.
    async fn set_administrator(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper>;

    /// Release the service-server secret key to a verified
    /// service-server principal.
    async fn request_service_server_secret_key(
        &self,
        wrapper: TicketAuthenticatorWrapper,
    ) -> Result<AuthenticatedValue>;

    /// Whether `id` exists and carries the admin flag.
    async fn is_admin(&self, id: &str) -> Result<bool>;

    /// Whether `id` exists in the credential store.
    async fn has_user(&self, id: &str) -> Result<bool>;
}
