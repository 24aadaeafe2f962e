//! Source of inventory API credentials.
//!
//! Loaded per verification so a rotated file takes effect without a
//! restart.

use std::path::PathBuf;

use fleetgate_common::{CredentialBundle, CredentialError};

pub trait CredentialSource: Send + Sync {
    fn load(&self) -> Result<CredentialBundle, CredentialError>;
}

/// Reads a JSON credential file on every call.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    path: PathBuf,
}

impl FileCredentialSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileCredentialSource {
    fn load(&self) -> Result<CredentialBundle, CredentialError> {
        CredentialBundle::load(&self.path)
    }
}

/// Fixed credentials, for wiring tests and embedding.
impl CredentialSource for CredentialBundle {
    fn load(&self) -> Result<CredentialBundle, CredentialError> {
        Ok(self.clone())
    }
}
