//! End-to-end tests driving the controller through the full
//! three-hop protocol the way a client-side session manager would.

use std::time::Duration;

use tempfile::TempDir;

use hearth_core::{
    now_nanos, AuthError, AuthenticationService, Authenticator, LoginCredentialsChange,
    TicketAuthenticatorWrapper,
};
use hearth_crypto::{
    decrypt_bytes, decrypt_symmetric, encrypt_bytes, encrypt_symmetric, hash_password, RsaKeyPair,
};
use hearth_server::{AuthenticatorController, Config, ControllerState};
use hearth_storage::SERVICE_SERVER_ID;

/// An established session: the client-side result of the KDC and TGS
/// hops.
struct Session {
    id: String,
    ticket: Vec<u8>,
    session_key: Vec<u8>,
}

impl Session {
    /// Build a wrapper with a fresh authenticator, like a client does
    /// for every service request.
    fn wrapper(&self) -> TicketAuthenticatorWrapper {
        self.wrapper_at(now_nanos())
    }

    fn wrapper_at(&self, timestamp: u64) -> TicketAuthenticatorWrapper {
        let authenticator = Authenticator {
            client_id: self.id.clone(),
            timestamp,
        };
        TicketAuthenticatorWrapper {
            ticket: self.ticket.clone(),
            authenticator: encrypt_symmetric(&authenticator, &self.session_key).unwrap(),
        }
    }

    /// Seal raw bytes under the session key.
    fn seal(&self, payload: &[u8]) -> Vec<u8> {
        encrypt_bytes(payload, &self.session_key).unwrap()
    }
}

async fn setup() -> (AuthenticatorController, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Config {
        credentials_directory: dir.path().to_path_buf(),
        session_timeout: Duration::from_secs(15 * 60),
    };
    let controller = AuthenticatorController::new(config);
    controller.init().await.unwrap();
    controller.activate().await.unwrap();
    (controller, dir)
}

/// Register the first admin through the bootstrap path.
async fn bootstrap_admin(controller: &AuthenticatorController, id: &str, password: &str) {
    let initial_password = controller.initial_password().unwrap();
    let change = LoginCredentialsChange {
        id: id.to_string(),
        old_credentials: Vec::new(),
        new_credentials: encrypt_bytes(
            &hash_password(password),
            &hash_password(&initial_password),
        )
        .unwrap(),
        admin: true,
        ticket_authenticator_wrapper: None,
    };
    assert!(controller.register(change).await.unwrap().is_none());
}

/// Run the KDC and TGS hops for a password-only user principal.
async fn login(controller: &AuthenticatorController, id: &str, password: &str) -> Session {
    let user_key = hash_password(password);

    let kdc = controller.request_ticket_granting_ticket(id).await.unwrap();
    let tgs_session_key = decrypt_bytes(&kdc.session_key, &user_key).unwrap();

    let wrapper = TicketAuthenticatorWrapper {
        ticket: kdc.ticket,
        authenticator: encrypt_symmetric(
            &Authenticator {
                client_id: id.to_string(),
                timestamp: now_nanos(),
            },
            &tgs_session_key,
        )
        .unwrap(),
    };
    let tgs = controller
        .request_client_server_ticket(wrapper)
        .await
        .unwrap();

    Session {
        id: id.to_string(),
        session_key: decrypt_bytes(&tgs.session_key, &tgs_session_key).unwrap(),
        ticket: tgs.ticket,
    }
}

/// Register a user through the normal, ticket-authorized path.
async fn register_user(
    controller: &AuthenticatorController,
    session: &Session,
    id: &str,
    password: &str,
    admin: bool,
) -> Result<Option<TicketAuthenticatorWrapper>, AuthError> {
    let change = LoginCredentialsChange {
        id: id.to_string(),
        old_credentials: Vec::new(),
        new_credentials: session.seal(&hash_password(password)),
        admin,
        ticket_authenticator_wrapper: Some(session.wrapper()),
    };
    controller.register(change).await
}

#[tokio::test]
async fn test_bootstrap_register_clears_initial_password() {
    let (controller, _dir) = setup().await;
    assert!(controller.initial_password().is_some());

    bootstrap_admin(&controller, "root", "root_pw").await;

    assert!(controller.has_user("root").await.unwrap());
    assert!(controller.is_admin("root").await.unwrap());
    assert!(controller.initial_password().is_none());
}

#[tokio::test]
async fn test_second_bootstrap_attempt_fails() {
    let (controller, _dir) = setup().await;
    let initial_password = controller.initial_password().unwrap();
    bootstrap_admin(&controller, "root", "root_pw").await;

    // The password is cleared and the store is no longer pristine, so
    // a second ticketless registration falls through to the normal
    // path and is refused.
    let change = LoginCredentialsChange {
        id: "intruder".to_string(),
        old_credentials: Vec::new(),
        new_credentials: encrypt_bytes(
            &hash_password("intruder_pw"),
            &hash_password(&initial_password),
        )
        .unwrap(),
        admin: true,
        ticket_authenticator_wrapper: None,
    };
    assert!(matches!(
        controller.register(change).await,
        Err(AuthError::Rejected(_))
    ));
    assert!(!controller.has_user("intruder").await.unwrap());
}

#[tokio::test]
async fn test_full_login_round_trip() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;

    let session = login(&controller, "admin@", "admin_pw").await;
    assert_eq!(session.session_key.len(), 16);

    // Each validation renews the ticket and echoes timestamp + 1.
    let timestamp = now_nanos();
    let response = controller
        .validate_client_server_ticket(session.wrapper_at(timestamp))
        .await
        .unwrap();

    let echoed: Authenticator =
        decrypt_symmetric(&response.authenticator, &session.session_key).unwrap();
    assert_eq!(echoed.timestamp, timestamp + 1);
    assert_eq!(echoed.client_id, "admin@");
}

#[tokio::test]
async fn test_unknown_principal_is_not_available() {
    let (controller, _dir) = setup().await;

    let result = controller.request_ticket_granting_ticket("ghost@").await;
    assert!(matches!(result, Err(AuthError::NotAvailable(id)) if id == "ghost@"));

    let empty = controller.request_ticket_granting_ticket("@").await;
    assert!(matches!(empty, Err(AuthError::NotAvailable(_))));
}

#[tokio::test]
async fn test_skewed_authenticator_expires_session() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let session = login(&controller, "admin@", "admin_pw").await;

    // Three minutes ahead of the server clock.
    let skewed = now_nanos() + 3 * 60 * 1_000_000_000;
    let result = controller
        .validate_client_server_ticket(session.wrapper_at(skewed))
        .await;
    assert!(matches!(result, Err(AuthError::SessionExpired)));
}

#[tokio::test]
async fn test_foreign_authenticator_is_rejected() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let session = login(&controller, "admin@", "admin_pw").await;

    // Authenticator sealed with the right session key but claiming a
    // different principal.
    let forged = TicketAuthenticatorWrapper {
        ticket: session.ticket.clone(),
        authenticator: encrypt_symmetric(
            &Authenticator {
                client_id: "bob@".to_string(),
                timestamp: now_nanos(),
            },
            &session.session_key,
        )
        .unwrap(),
    };
    let result = controller.validate_client_server_ticket(forged).await;
    assert!(matches!(result, Err(AuthError::Rejected(_))));
}

#[tokio::test]
async fn test_non_admin_cannot_register_admin() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let admin = login(&controller, "admin@", "admin_pw").await;

    register_user(&controller, &admin, "alice", "alice_pw", false)
        .await
        .unwrap();
    let alice = login(&controller, "alice@", "alice_pw").await;

    // The denial reaches remote callers as a plain rejection.
    let result = register_user(&controller, &alice, "bob", "bob_pw", true).await;
    assert!(matches!(
        result,
        Err(AuthError::Rejected(reason)) if reason == "You are not permitted to register an admin."
    ));
    assert!(!controller.has_user("bob").await.unwrap());

    // Registering a plain user does not require the admin flag.
    register_user(&controller, &alice, "bob", "bob_pw", false)
        .await
        .unwrap();
    assert!(controller.has_user("bob").await.unwrap());
    assert!(!controller.is_admin("bob").await.unwrap());
}

#[tokio::test]
async fn test_register_refuses_existing_user() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let admin = login(&controller, "admin@", "admin_pw").await;

    let result = register_user(&controller, &admin, "admin", "other_pw", false).await;
    assert!(matches!(result, Err(AuthError::Rejected(_))));
}

#[tokio::test]
async fn test_change_credentials_authorization() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let admin = login(&controller, "admin@", "admin_pw").await;
    register_user(&controller, &admin, "alice", "alice_pw", false)
        .await
        .unwrap();

    // Alice changes her own password.
    let alice = login(&controller, "alice@", "alice_pw").await;
    let change = LoginCredentialsChange {
        id: "alice".to_string(),
        old_credentials: alice.seal(&hash_password("alice_pw")),
        new_credentials: alice.seal(&hash_password("alice_pw2")),
        admin: false,
        ticket_authenticator_wrapper: Some(alice.wrapper()),
    };
    controller.change_credentials(change).await.unwrap();
    login(&controller, "alice@", "alice_pw2").await;

    // A wrong old password is refused.
    let alice = login(&controller, "alice@", "alice_pw2").await;
    let wrong_old = LoginCredentialsChange {
        id: "alice".to_string(),
        old_credentials: alice.seal(&hash_password("not_the_password")),
        new_credentials: alice.seal(&hash_password("alice_pw3")),
        admin: false,
        ticket_authenticator_wrapper: Some(alice.wrapper()),
    };
    assert!(matches!(
        controller.change_credentials(wrong_old).await,
        Err(AuthError::Rejected(reason)) if reason == "The old password is wrong."
    ));

    // Alice may not change the admin's password.
    let foreign = LoginCredentialsChange {
        id: "admin".to_string(),
        old_credentials: alice.seal(&hash_password("admin_pw")),
        new_credentials: alice.seal(&hash_password("hijacked")),
        admin: false,
        ticket_authenticator_wrapper: Some(alice.wrapper()),
    };
    assert!(matches!(
        controller.change_credentials(foreign).await,
        Err(AuthError::Rejected(reason)) if reason == "You are not permitted to perform this action."
    ));

    // The admin may change Alice's password.
    let admin = login(&controller, "admin@", "admin_pw").await;
    let by_admin = LoginCredentialsChange {
        id: "alice".to_string(),
        old_credentials: admin.seal(&hash_password("alice_pw2")),
        new_credentials: admin.seal(&hash_password("reset_pw")),
        admin: false,
        ticket_authenticator_wrapper: Some(admin.wrapper()),
    };
    controller.change_credentials(by_admin).await.unwrap();
    login(&controller, "alice@", "reset_pw").await;
}

#[tokio::test]
async fn test_remove_user_rules() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let admin = login(&controller, "admin@", "admin_pw").await;
    register_user(&controller, &admin, "alice", "alice_pw", false)
        .await
        .unwrap();

    // Non-admins may not remove anybody.
    let alice = login(&controller, "alice@", "alice_pw").await;
    let by_alice = LoginCredentialsChange {
        id: "admin".to_string(),
        old_credentials: Vec::new(),
        new_credentials: Vec::new(),
        admin: false,
        ticket_authenticator_wrapper: Some(alice.wrapper()),
    };
    assert!(matches!(
        controller.remove_user(by_alice).await,
        Err(AuthError::Rejected(reason)) if reason == "You are not permitted to perform this action."
    ));

    // Admins may not remove themselves.
    let self_removal = LoginCredentialsChange {
        id: "admin".to_string(),
        old_credentials: Vec::new(),
        new_credentials: Vec::new(),
        admin: false,
        ticket_authenticator_wrapper: Some(admin.wrapper()),
    };
    assert!(matches!(
        controller.remove_user(self_removal).await,
        Err(AuthError::Rejected(reason)) if reason == "You cannot remove yourself."
    ));

    // Removing an unknown user is refused.
    let unknown = LoginCredentialsChange {
        id: "ghost".to_string(),
        old_credentials: Vec::new(),
        new_credentials: Vec::new(),
        admin: false,
        ticket_authenticator_wrapper: Some(admin.wrapper()),
    };
    assert!(matches!(
        controller.remove_user(unknown).await,
        Err(AuthError::Rejected(_))
    ));

    // And the straightforward removal works.
    let removal = LoginCredentialsChange {
        id: "alice".to_string(),
        old_credentials: Vec::new(),
        new_credentials: Vec::new(),
        admin: false,
        ticket_authenticator_wrapper: Some(admin.wrapper()),
    };
    controller.remove_user(removal).await.unwrap();
    assert!(!controller.has_user("alice").await.unwrap());
}

#[tokio::test]
async fn test_set_administrator_rules() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let admin = login(&controller, "admin@", "admin_pw").await;
    register_user(&controller, &admin, "alice", "alice_pw", false)
        .await
        .unwrap();

    let promote = LoginCredentialsChange {
        id: "alice".to_string(),
        old_credentials: Vec::new(),
        new_credentials: Vec::new(),
        admin: true,
        ticket_authenticator_wrapper: Some(admin.wrapper()),
    };
    controller.set_administrator(promote).await.unwrap();
    assert!(controller.is_admin("alice").await.unwrap());

    // Changing one's own flag is refused.
    let self_change = LoginCredentialsChange {
        id: "admin".to_string(),
        old_credentials: Vec::new(),
        new_credentials: Vec::new(),
        admin: false,
        ticket_authenticator_wrapper: Some(admin.wrapper()),
    };
    assert!(matches!(
        controller.set_administrator(self_change).await,
        Err(AuthError::Rejected(_))
    ));

    let demote = LoginCredentialsChange {
        id: "alice".to_string(),
        old_credentials: Vec::new(),
        new_credentials: Vec::new(),
        admin: false,
        ticket_authenticator_wrapper: Some(admin.wrapper()),
    };
    controller.set_administrator(demote).await.unwrap();
    assert!(!controller.is_admin("alice").await.unwrap());
}

#[tokio::test]
async fn test_service_server_key_release() {
    let (controller, dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;

    // The service server authenticates with the private key the
    // controller wrote during activation.
    let private_key_der = std::fs::read(dir.path().join("service_server_private_key")).unwrap();
    let key_pair = RsaKeyPair::from_private_key_der(&private_key_der).unwrap();

    let id = format!("@{SERVICE_SERVER_ID}");
    let kdc = controller.request_ticket_granting_ticket(&id).await.unwrap();
    let tgs_session_key = key_pair.unwrap(&kdc.session_key).unwrap();

    let wrapper = TicketAuthenticatorWrapper {
        ticket: kdc.ticket,
        authenticator: encrypt_symmetric(
            &Authenticator {
                client_id: id.clone(),
                timestamp: now_nanos(),
            },
            &tgs_session_key,
        )
        .unwrap(),
    };
    let tgs = controller
        .request_client_server_ticket(wrapper)
        .await
        .unwrap();
    let session = Session {
        id: id.clone(),
        session_key: decrypt_bytes(&tgs.session_key, &tgs_session_key).unwrap(),
        ticket: tgs.ticket,
    };

    let authenticated = controller
        .request_service_server_secret_key(session.wrapper())
        .await
        .unwrap();
    let released_key = decrypt_bytes(&authenticated.value, &session.session_key).unwrap();
    assert_eq!(released_key.len(), 16);

    // The released key is the real service-server secret: it opens the
    // session's own client server ticket.
    let ticket: hearth_core::Ticket = decrypt_symmetric(&session.ticket, &released_key).unwrap();
    assert_eq!(ticket.client_id, id);
}

#[tokio::test]
async fn test_ordinary_users_cannot_obtain_service_server_key() {
    let (controller, _dir) = setup().await;
    bootstrap_admin(&controller, "admin", "admin_pw").await;
    let session = login(&controller, "admin@", "admin_pw").await;

    let result = controller
        .request_service_server_secret_key(session.wrapper())
        .await;
    assert!(matches!(result, Err(AuthError::Rejected(_))));
}

#[tokio::test]
async fn test_lifecycle_state_machine() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        credentials_directory: dir.path().to_path_buf(),
        session_timeout: Duration::from_secs(15 * 60),
    };
    let controller = AuthenticatorController::new(config);
    assert_eq!(controller.state(), ControllerState::Uninitialized);

    // Activation without initialization is refused.
    assert!(controller.activate().await.is_err());

    controller.init().await.unwrap();
    assert_eq!(controller.state(), ControllerState::Initialized);
    assert!(controller.init().await.is_err());

    controller.activate().await.unwrap();
    assert_eq!(controller.state(), ControllerState::Active);
    assert!(controller.is_active());

    controller.deactivate().await.unwrap();
    assert_eq!(controller.state(), ControllerState::Inactive);
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        credentials_directory: dir.path().to_path_buf(),
        session_timeout: Duration::from_secs(15 * 60),
    };

    {
        let controller = AuthenticatorController::new(config.clone());
        controller.init().await.unwrap();
        controller.activate().await.unwrap();
        bootstrap_admin(&controller, "admin", "admin_pw").await;
        controller.deactivate().await.unwrap();
    }

    // A fresh controller over the same directory sees the registered
    // admin and generates no new initial password.
    let controller = AuthenticatorController::new(config);
    controller.init().await.unwrap();
    controller.activate().await.unwrap();
    assert!(controller.initial_password().is_none());
    assert!(controller.is_admin("admin").await.unwrap());

    login(&controller, "admin@", "admin_pw").await;
}
