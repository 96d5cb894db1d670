use crate::domain::models::OAuthToken;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single keyed slot holding the serialized credential bundle.
///
/// Backends only move raw payloads; decoding and validation live in the
/// provided methods so every backend purges corrupt bundles the same way.
pub trait CredentialStore: Send + Sync {
    fn read_slot(&self) -> Result<Option<String>, InfraError>;
    fn write_slot(&self, payload: &str) -> Result<(), InfraError>;
    fn clear_slot(&self) -> Result<(), InfraError>;

    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        token.validate().map_err(InfraError::CorruptState)?;
        let payload =
            serde_json::to_string(token).map_err(|error| InfraError::Credential(error.to_string()))?;
        self.write_slot(&payload)
    }

    /// Corrupt payloads are purged and reported as absent.
    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        let Some(payload) = self.read_slot()? else {
            return Ok(None);
        };
        match decode_token(&payload) {
            Ok(token) => Ok(Some(token)),
            Err(InfraError::CorruptState(_)) => {
                self.clear_slot()?;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        self.clear_slot()
    }
}

pub fn decode_token(payload: &str) -> Result<OAuthToken, InfraError> {
    let token = serde_json::from_str::<OAuthToken>(payload)
        .map_err(|error| InfraError::CorruptState(format!("stored token is not valid JSON: {error}")))?;
    token.validate().map_err(InfraError::CorruptState)?;
    Ok(token)
}

#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("hoursheet.oauth.google", "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn read_slot(&self) -> Result<Option<String>, InfraError> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => {
                self.clear_slot()?;
                Ok(None)
            }
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }

    fn write_slot(&self, payload: &str) -> Result<(), InfraError> {
        self.entry()?
            .set_password(payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn clear_slot(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn read_slot(&self) -> Result<Option<String>, InfraError> {
        match fs::read_to_string(&self.path) {
            Ok(payload) => Ok(Some(payload)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(InfraError::Io(error)),
        }
    }

    fn write_slot(&self, payload: &str) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, payload)?;
        Ok(())
    }

    fn clear_slot(&self) -> Result<(), InfraError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(InfraError::Io(error)),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    payload: Mutex<Option<String>>,
}

impl InMemoryCredentialStore {
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Mutex::new(Some(payload.into())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, InfraError> {
        self.payload
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn read_slot(&self) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.clone())
    }

    fn write_slot(&self, payload: &str) -> Result<(), InfraError> {
        *self.lock()? = Some(payload.to_string());
        Ok(())
    }

    fn clear_slot(&self) -> Result<(), InfraError> {
        *self.lock()? = None;
        Ok(())
    }
}
