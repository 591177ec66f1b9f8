use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Credential store filename inside the credentials directory.
pub const STORE_FILENAME: &str = "server_credential_store.json";

/// Service-server private key filename inside the credentials
/// directory.
pub const SERVICE_SERVER_PRIVATE_KEY_FILENAME: &str = "service_server_private_key";

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the credential store and the service-server
    /// private key
    pub credentials_directory: PathBuf,

    /// How long issued tickets stay valid
    pub session_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let credentials_directory = std::env::var("CREDENTIALS_DIRECTORY")
            .unwrap_or_else(|_| "./credentials".to_string())
            .into();

        let session_timeout_secs: u64 = std::env::var("SESSION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "900".to_string()) // 15 minutes
            .parse()?;

        Ok(Config {
            credentials_directory,
            session_timeout: Duration::from_secs(session_timeout_secs),
        })
    }

    /// Path of the credential store file.
    pub fn store_path(&self) -> PathBuf {
        self.credentials_directory.join(STORE_FILENAME)
    }

    /// Path of the service-server private key file.
    pub fn private_key_path(&self) -> PathBuf {
        self.credentials_directory.join(SERVICE_SERVER_PRIVATE_KEY_FILENAME)
    }
}
