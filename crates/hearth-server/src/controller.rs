//! The authenticator controller.
//!
//! Owns the credential store, the two long-lived server secrets and
//! the bootstrap lifecycle, and exposes the remote-callable protocol
//! operations. Every operation runs on the blocking worker pool; the
//! credential store mutex linearizes concurrent mutations.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::task::spawn_blocking;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use hearth_core::{
    handle_kdc_request, handle_ss_request, handle_tgs_request, AuthError, AuthenticatedValue,
    AuthenticationService, Authenticator, LoginCredentialsChange, Principal, Result, Ticket,
    TicketAuthenticatorWrapper, TicketSessionKeyWrapper,
};
use hearth_crypto::{
    decrypt_bytes, decrypt_symmetric, encrypt_bytes, generate_key, hash_password, RsaKeyPair,
};
use hearth_storage::{set_restrictive_permissions, CredentialStore, SERVICE_SERVER_ID};

use crate::config::Config;

/// Store entry holding the ticket granting service secret key.
pub const TICKET_GRANTING_KEY: &str = "ticket_granting_key";

/// Store entry holding the service server secret key.
pub const SERVICE_SERVER_SECRET_KEY: &str = "service_server_secret_key";

const INITIAL_PASSWORD_LENGTH: usize = 15;

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed; the store has not been loaded.
    Uninitialized,
    /// Store loaded, bootstrap entries present, secrets in memory.
    Initialized,
    /// Serving requests; service-server identity and initial password
    /// established.
    Active,
    /// Shut down; the store has been flushed.
    Inactive,
}

/// Store handle and secrets shared by every operation.
#[derive(Clone)]
struct Runtime {
    store: Arc<CredentialStore>,
    ticket_granting_service_secret_key: Vec<u8>,
    service_server_secret_key: Vec<u8>,
}

enum State {
    Uninitialized,
    Initialized(Runtime),
    Active(Runtime),
    Inactive,
}

impl State {
    fn phase(&self) -> ControllerState {
        match self {
            State::Uninitialized => ControllerState::Uninitialized,
            State::Initialized(_) => ControllerState::Initialized,
            State::Active(_) => ControllerState::Active,
            State::Inactive => ControllerState::Inactive,
        }
    }
}

/// The authenticator controller. Cheap to clone; all state lives
/// behind an `Arc`.
#[derive(Clone)]
pub struct AuthenticatorController {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    state: Mutex<State>,
    initial_password: Mutex<Option<Zeroizing<String>>>,
}

impl AuthenticatorController {
    /// Construct an uninitialized controller.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::Uninitialized),
                initial_password: Mutex::new(None),
            }),
        }
    }

    /// Load or create the credential store and the bootstrap secret
    /// entries. `Uninitialized → Initialized`.
    pub async fn init(&self) -> anyhow::Result<()> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || inner.init()).await?
    }

    /// Establish the service-server identity and, on a pristine store,
    /// the initial password. `Initialized → Active`.
    pub async fn activate(&self) -> anyhow::Result<()> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || inner.activate()).await?
    }

    /// Flush the store and stop serving. `Active → Inactive`.
    pub async fn deactivate(&self) -> anyhow::Result<()> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || inner.deactivate()).await?
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> ControllerState {
        self.inner.state.lock().phase()
    }

    /// Whether the controller is serving requests.
    pub fn is_active(&self) -> bool {
        self.state() == ControllerState::Active
    }

    /// The bootstrap password, present only between activation on a
    /// pristine store and the registration of the first user.
    pub fn initial_password(&self) -> Option<String> {
        self.inner
            .initial_password
            .lock()
            .as_ref()
            .map(|password| password.to_string())
    }
}

#[async_trait]
impl AuthenticationService for AuthenticatorController {
    async fn request_ticket_granting_ticket(&self, id: &str) -> Result<TicketSessionKeyWrapper> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        spawn_blocking(move || inner.request_ticket_granting_ticket(&id))
            .await
            .map_err(join_fault)?
    }

    async fn request_client_server_ticket(
        &self,
        wrapper: TicketAuthenticatorWrapper,
    ) -> Result<TicketSessionKeyWrapper> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || inner.request_client_server_ticket(&wrapper))
            .await
            .map_err(join_fault)?
    }

    async fn validate_client_server_ticket(
        &self,
        wrapper: TicketAuthenticatorWrapper,
    ) -> Result<TicketAuthenticatorWrapper> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || inner.validate_client_server_ticket(&wrapper))
            .await
            .map_err(join_fault)?
    }

    async fn change_credentials(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || {
            inner
                .change_credentials(&change)
                .map_err(|err| inner.remote(err, "change credentials"))
        })
        .await
        .map_err(join_fault)?
    }

    async fn register(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<Option<TicketAuthenticatorWrapper>> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || {
            inner
                .register(&change)
                .map_err(|err| inner.remote(err, "register"))
        })
        .await
        .map_err(join_fault)?
    }

    async fn remove_user(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || {
            inner
                .remove_user(&change)
                .map_err(|err| inner.remote(err, "remove user"))
        })
        .await
        .map_err(join_fault)?
    }

    async fn set_administrator(
        &self,
        change: LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || {
            inner
                .set_administrator(&change)
                .map_err(|err| inner.remote(err, "set administrator"))
        })
        .await
        .map_err(join_fault)?
    }

    async fn request_service_server_secret_key(
        &self,
        wrapper: TicketAuthenticatorWrapper,
    ) -> Result<AuthenticatedValue> {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || {
            inner
                .request_service_server_secret_key(&wrapper)
                .map_err(|err| inner.remote(err, "service server secret key request"))
        })
        .await
        .map_err(join_fault)?
    }

    async fn is_admin(&self, id: &str) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        spawn_blocking(move || Ok(inner.runtime()?.store.is_admin(&id)))
            .await
            .map_err(join_fault)?
    }

    async fn has_user(&self, id: &str) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        spawn_blocking(move || Ok(inner.runtime()?.store.has_entry(&id)))
            .await
            .map_err(join_fault)?
    }
}

impl Inner {
    fn init(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        anyhow::ensure!(
            matches!(*state, State::Uninitialized),
            "controller is already initialized"
        );

        let store = CredentialStore::init(self.config.store_path())?;
        if !store.has_entry(TICKET_GRANTING_KEY) {
            store.add_credentials(TICKET_GRANTING_KEY, &generate_key()?, false, false)?;
        }
        if !store.has_entry(SERVICE_SERVER_SECRET_KEY) {
            store.add_credentials(SERVICE_SERVER_SECRET_KEY, &generate_key()?, false, false)?;
        }

        let runtime = Runtime {
            ticket_granting_service_secret_key: store.get_credentials(TICKET_GRANTING_KEY)?,
            service_server_secret_key: store.get_credentials(SERVICE_SERVER_SECRET_KEY)?,
            store: Arc::new(store),
        };
        info!(entries = runtime.store.size(), "authenticator initialized");

        *state = State::Initialized(runtime);
        Ok(())
    }

    fn activate(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let runtime = match &*state {
            State::Initialized(runtime) => runtime.clone(),
            _ => anyhow::bail!("controller must be initialized before activation"),
        };

        if !runtime.store.has_entry(SERVICE_SERVER_ID) {
            let key_pair = RsaKeyPair::generate()?;
            runtime
                .store
                .add_credentials(SERVICE_SERVER_ID, &key_pair.public_key_der()?, false, false)?;

            let path = self.config.private_key_path();
            fs::write(&path, key_pair.private_key_der()?)?;
            set_restrictive_permissions(&path)?;
            info!(path = %path.display(), "service server key pair generated");
        }

        if initial_password_required(&runtime.store) {
            let password: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(INITIAL_PASSWORD_LENGTH)
                .map(char::from)
                .collect();
            // Bootstrap contract: operator-visible on stdout, exactly
            // once; never persisted.
            println!("Initial password: {password}");
            *self.initial_password.lock() = Some(Zeroizing::new(password));
        }

        *state = State::Active(runtime);
        info!("authenticator activated");
        Ok(())
    }

    fn deactivate(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let runtime = match &*state {
            State::Active(runtime) => runtime.clone(),
            _ => anyhow::bail!("controller is not active"),
        };

        runtime.store.shutdown()?;
        *state = State::Inactive;
        info!("authenticator deactivated");
        Ok(())
    }

    fn runtime(&self) -> Result<Runtime> {
        match &*self.state.lock() {
            State::Initialized(runtime) | State::Active(runtime) => Ok(runtime.clone()),
            _ => Err(AuthError::Rejected(
                "Authenticator service is not available".to_string(),
            )),
        }
    }

    fn request_ticket_granting_ticket(&self, id: &str) -> Result<TicketSessionKeyWrapper> {
        let runtime = self.runtime()?;
        let principal = Principal::parse(id);

        let user_key = match principal.user {
            Some(user) => Some(self.principal_key(&runtime, id, user)?),
            None => None,
        };
        let client_key = match principal.client {
            Some(client) => Some(self.principal_key(&runtime, id, client)?),
            None => None,
        };
        if user_key.is_none() && client_key.is_none() {
            warn!(id, "ticket granting ticket requested for empty principal");
            return Err(AuthError::NotAvailable(id.to_string()));
        }

        handle_kdc_request(
            id,
            user_key.as_deref(),
            client_key.as_deref(),
            "",
            &runtime.ticket_granting_service_secret_key,
            self.config.session_timeout,
        )
        .map_err(|err| self.rejected(err, "ticket granting ticket request"))
    }

    fn principal_key(&self, runtime: &Runtime, id: &str, part: &str) -> Result<Vec<u8>> {
        runtime.store.get_credentials(part).map_err(|err| {
            warn!(id, part, %err, "ticket granting ticket requested for unknown principal");
            AuthError::NotAvailable(id.to_string())
        })
    }

    fn request_client_server_ticket(
        &self,
        wrapper: &TicketAuthenticatorWrapper,
    ) -> Result<TicketSessionKeyWrapper> {
        let runtime = self.runtime()?;
        handle_tgs_request(
            &runtime.ticket_granting_service_secret_key,
            &runtime.service_server_secret_key,
            wrapper,
            self.config.session_timeout,
        )
        .map_err(|err| self.rejected(err, "client server ticket request"))
    }

    fn validate_client_server_ticket(
        &self,
        wrapper: &TicketAuthenticatorWrapper,
    ) -> Result<TicketAuthenticatorWrapper> {
        let runtime = self.runtime()?;
        handle_ss_request(
            &runtime.service_server_secret_key,
            wrapper,
            self.config.session_timeout,
        )
        .map_err(|err| match err {
            AuthError::SessionExpired => AuthError::SessionExpired,
            other => self.rejected(other, "client server ticket validation"),
        })
    }

    fn change_credentials(
        &self,
        change: &LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper> {
        let runtime = self.runtime()?;
        let (response, session_key, authenticator) =
            self.validate_session(&runtime, session_wrapper(change)?)?;

        let old_credentials = decrypt_bytes(&change.old_credentials, &session_key)?;
        let new_credentials = decrypt_bytes(&change.new_credentials, &session_key)?;
        let authenticator_user = Principal::parse(&authenticator.client_id).user_or_empty();

        // Users may change their own password, admins anybody's.
        if change.id != authenticator_user && !runtime.store.is_admin(authenticator_user) {
            return Err(self.permission_denied(
                "change credentials",
                authenticator_user,
                "You are not permitted to perform this action.",
            ));
        }

        if old_credentials != runtime.store.get_credentials(&change.id)? {
            return Err(AuthError::Rejected("The old password is wrong.".to_string()));
        }

        runtime.store.set_credentials(&change.id, &new_credentials)?;
        info!(id = %change.id, "credentials updated");
        Ok(response)
    }

    fn register(&self, change: &LoginCredentialsChange) -> Result<Option<TicketAuthenticatorWrapper>> {
        let runtime = self.runtime()?;

        let mut initial_password = self.initial_password.lock();
        if let Some(password) = initial_password.as_ref() {
            if initial_password_required(&runtime.store) {
                if change.id.is_empty() || change.new_credentials.is_empty() {
                    return Err(AuthError::Rejected(
                        "Cannot register first user, id and/or new credentials empty".to_string(),
                    ));
                }

                let key = decrypt_bytes(&change.new_credentials, &hash_password(password.as_str()))?;
                runtime.store.add_credentials(&change.id, &key, true, false)?;

                *initial_password = None;
                info!(id = %change.id, "initial administrator registered");
                return Ok(None);
            }
        }
        drop(initial_password);

        let (response, session_key, authenticator) =
            self.validate_session(&runtime, session_wrapper(change)?)?;
        let authenticator_user = Principal::parse(&authenticator.client_id).user_or_empty();

        if !runtime.store.is_admin(authenticator_user) && change.admin {
            return Err(self.permission_denied(
                "register",
                authenticator_user,
                "You are not permitted to register an admin.",
            ));
        }

        // Administrators may neither overwrite themselves nor anybody
        // else.
        if change.id == authenticator_user || runtime.store.has_entry(&change.id) {
            return Err(AuthError::Rejected(
                "You cannot register an existing user.".to_string(),
            ));
        }

        let key = decrypt_bytes(&change.new_credentials, &session_key)?;
        runtime.store.add_credentials(&change.id, &key, change.admin, false)?;
        info!(id = %change.id, admin = change.admin, "user registered");
        Ok(Some(response))
    }

    fn remove_user(&self, change: &LoginCredentialsChange) -> Result<TicketAuthenticatorWrapper> {
        let runtime = self.runtime()?;
        let (response, _session_key, authenticator) =
            self.validate_session(&runtime, session_wrapper(change)?)?;
        let authenticator_user = Principal::parse(&authenticator.client_id).user_or_empty();

        if !runtime.store.is_admin(authenticator_user) {
            return Err(self.permission_denied(
                "remove user",
                authenticator_user,
                "You are not permitted to perform this action.",
            ));
        }
        if change.id == authenticator_user {
            return Err(AuthError::Rejected("You cannot remove yourself.".to_string()));
        }
        if !runtime.store.has_entry(&change.id) {
            return Err(AuthError::Rejected("Given user does not exist.".to_string()));
        }

        runtime.store.remove_entry(&change.id)?;
        info!(id = %change.id, "user removed");
        Ok(response)
    }

    fn set_administrator(
        &self,
        change: &LoginCredentialsChange,
    ) -> Result<TicketAuthenticatorWrapper> {
        let runtime = self.runtime()?;
        let (response, _session_key, authenticator) =
            self.validate_session(&runtime, session_wrapper(change)?)?;
        let authenticator_user = Principal::parse(&authenticator.client_id).user_or_empty();

        if !runtime.store.is_admin(authenticator_user) {
            return Err(self.permission_denied(
                "set administrator",
                authenticator_user,
                "You are not permitted to perform this action.",
            ));
        }
        if change.id == authenticator_user {
            return Err(AuthError::Rejected(
                "You cannot change your own administrator status.".to_string(),
            ));
        }
        if !runtime.store.has_entry(&change.id) {
            return Err(AuthError::Rejected("Given user does not exist.".to_string()));
        }

        runtime.store.set_admin(&change.id, change.admin)?;
        info!(id = %change.id, admin = change.admin, "administrator flag updated");
        Ok(response)
    }

    fn request_service_server_secret_key(
        &self,
        wrapper: &TicketAuthenticatorWrapper,
    ) -> Result<AuthenticatedValue> {
        let runtime = self.runtime()?;
        let (response, session_key, authenticator) = self.validate_session(&runtime, wrapper)?;

        if authenticator.client_id != format!("@{SERVICE_SERVER_ID}") {
            warn!(client_id = %authenticator.client_id, "unauthorized service server key request");
            return Err(AuthError::Rejected(format!(
                "Client[{}] is not authorized to request the service server secret key",
                authenticator.client_id
            )));
        }

        Ok(AuthenticatedValue {
            ticket_authenticator_wrapper: response,
            value: encrypt_bytes(&runtime.service_server_secret_key, &session_key)?,
        })
    }

    /// Run service-server validation on `wrapper` and hand back the
    /// renewed wrapper together with the session key and decrypted
    /// authenticator of the presented session.
    fn validate_session(
        &self,
        runtime: &Runtime,
        wrapper: &TicketAuthenticatorWrapper,
    ) -> Result<(TicketAuthenticatorWrapper, Vec<u8>, Authenticator)> {
        let response = handle_ss_request(
            &runtime.service_server_secret_key,
            wrapper,
            self.config.session_timeout,
        )?;

        let ticket: Ticket =
            decrypt_symmetric(&wrapper.ticket, &runtime.service_server_secret_key)?;
        let session_key = ticket.session_key;
        let authenticator: Authenticator = decrypt_symmetric(&wrapper.authenticator, &session_key)?;

        Ok((response, session_key, authenticator))
    }

    fn permission_denied(&self, operation: &'static str, user: &str, reason: &str) -> AuthError {
        warn!(operation, user, "permission denied");
        AuthError::PermissionDenied(reason.to_string())
    }

    /// Apply the RPC-boundary translation to an operation result:
    /// fatal faults are logged here, then [`AuthError::into_remote`]
    /// collapses them and permission denials to plain rejections.
    /// The trait methods are the remote surface, so nothing past this
    /// point sees the internal error kinds.
    fn remote(&self, err: AuthError, operation: &'static str) -> AuthError {
        if let AuthError::CryptoFault(reason) = &err {
            error!(operation, %reason, "cryptographic fault");
        }
        err.into_remote()
    }

    fn rejected(&self, err: AuthError, operation: &'static str) -> AuthError {
        match err {
            AuthError::CryptoFault(reason) => {
                error!(operation, %reason, "cryptographic fault");
                AuthError::Rejected("Internal server error. Please try again.".to_string())
            }
            other => {
                warn!(operation, error = %other, "request rejected");
                AuthError::Rejected(other.to_string())
            }
        }
    }
}

fn session_wrapper(change: &LoginCredentialsChange) -> Result<&TicketAuthenticatorWrapper> {
    change
        .ticket_authenticator_wrapper
        .as_ref()
        .ok_or_else(|| AuthError::Rejected("Request carries no ticket".to_string()))
}

/// Whether the store is in its pristine bootstrap shape: exactly the
/// three bootstrap entries and nothing else.
fn initial_password_required(store: &CredentialStore) -> bool {
    store.size() == 3
        && store.has_entry(SERVICE_SERVER_ID)
        && store.has_entry(TICKET_GRANTING_KEY)
        && store.has_entry(SERVICE_SERVER_SECRET_KEY)
}

fn join_fault(err: tokio::task::JoinError) -> AuthError {
    AuthError::CryptoFault(format!("worker pool task failed: {err}"))
}
