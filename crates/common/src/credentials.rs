//! # Credential Bundles
//!
//! JSON credential files dropped on the control-plane host by provisioning.
//!
//! | File | Type | Required keys |
//! |------|------|---------------|
//! | cloud inventory API | [`CredentialBundle`] | `secret_key`, `zone` (`project_id` optional) |
//! | secret store | [`SecretStoreCredentials`] | `client_id`, `client_secret`, `project_id` |
//!
//! Loading never logs secret material; `Debug` output redacts it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Default location of the cloud inventory API credentials.
pub const DEFAULT_INVENTORY_CREDENTIALS_PATH: &str = "/etc/salt/credentials/scaleway-api.json";

/// Default location of the secret-store machine identity.
pub const DEFAULT_SECRET_STORE_CREDENTIALS_PATH: &str =
    "/etc/salt/credentials/infisical-runtime.json";

const REDACTED: &str = "<redacted>";

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

/// Why a credential file could not produce a usable bundle.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse credentials from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("credentials at {path} are missing required key '{key}'")]
    MissingKey { path: PathBuf, key: &'static str },
}

// ════════════════════════════════════════════════════════════════════════════════
// INVENTORY CREDENTIALS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RawCredentialBundle {
    #[serde(default)]
    secret_key: Option<String>,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

/// Validated access parameters for the cloud inventory API.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub secret_key: String,
    pub zone: String,
    /// Project scope; `None` means the lookup is unscoped.
    pub project_id: Option<String>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("secret_key", &REDACTED)
            .field("zone", &self.zone)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl CredentialBundle {
    /// Reads and validates a credential file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let raw: RawCredentialBundle = read_json(path)?;

        let secret_key = required(raw.secret_key, path, "secret_key")?;
        let zone = required(raw.zone, path, "zone")?;
        let project_id = raw.project_id.filter(|p| !p.trim().is_empty());

        Ok(Self {
            secret_key,
            zone,
            project_id,
        })
    }

    pub fn project_scope(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SECRET STORE CREDENTIALS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RawSecretStoreCredentials {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

/// Machine identity for the secret store.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretStoreCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Workspace (project) holding the secrets.
    pub workspace_id: String,
}

impl fmt::Debug for SecretStoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStoreCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}

impl SecretStoreCredentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let raw: RawSecretStoreCredentials = read_json(path)?;
        Ok(Self {
            client_id: required(raw.client_id, path, "client_id")?,
            client_secret: required(raw.client_secret, path, "client_secret")?,
            workspace_id: required(raw.project_id, path, "project_id")?,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════════

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CredentialError> {
    let text = fs::read_to_string(path).map_err(|source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CredentialError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn required(
    value: Option<String>,
    path: &Path,
    key: &'static str,
) -> Result<String, CredentialError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CredentialError::MissingKey {
            path: path.to_path_buf(),
            key,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_scoped_bundle() {
        let f = write_file(r#"{"secret_key":"sk","zone":"fr-par-2","project_id":"p1"}"#);
        let b = CredentialBundle::load(f.path()).unwrap();
        assert_eq!(b.zone, "fr-par-2");
        assert_eq!(b.project_scope(), Some("p1"));
    }

    #[test]
    fn blank_project_is_unscoped() {
        let f = write_file(r#"{"secret_key":"sk","zone":"fr-par-2","project_id":""}"#);
        let b = CredentialBundle::load(f.path()).unwrap();
        assert_eq!(b.project_scope(), None);
    }

    #[test]
    fn missing_secret_key_is_rejected() {
        let f = write_file(r#"{"secret_key":"  ","zone":"fr-par-2"}"#);
        match CredentialBundle::load(f.path()) {
            Err(CredentialError::MissingKey { key, .. }) => assert_eq!(key, "secret_key"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_zone_is_rejected() {
        let f = write_file(r#"{"secret_key":"sk"}"#);
        assert!(matches!(
            CredentialBundle::load(f.path()),
            Err(CredentialError::MissingKey { key: "zone", .. })
        ));
    }

    #[test]
    fn unreadable_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CredentialBundle::load(dir.path().join("absent.json")),
            Err(CredentialError::Io { .. })
        ));

        let f = write_file("not json");
        assert!(matches!(
            CredentialBundle::load(f.path()),
            Err(CredentialError::Parse { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let b = CredentialBundle {
            secret_key: "super-secret".into(),
            zone: "fr-par-2".into(),
            project_id: None,
        };
        let out = format!("{b:?}");
        assert!(!out.contains("super-secret"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn loads_secret_store_credentials() {
        let f = write_file(r#"{"client_id":"cid","client_secret":"cs","project_id":"ws"}"#);
        let c = SecretStoreCredentials::load(f.path()).unwrap();
        assert_eq!(c.workspace_id, "ws");
        assert!(!format!("{c:?}").contains("\"cs\""));

        let f = write_file(r#"{"client_id":"cid","client_secret":"cs"}"#);
        assert!(matches!(
            SecretStoreCredentials::load(f.path()),
            Err(CredentialError::MissingKey { key: "project_id", .. })
        ));
    }
}
