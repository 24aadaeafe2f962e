//! # Key Store Inspector and Controller
//!
//! The admission queue holds public keys of nodes that asked to join. A key
//! is either pending, accepted, or absent. This module answers "is this
//! node pending?" and moves keys out of the queue (admit) or out of the
//! system (revoke).
//!
//! ## Salt implementation
//!
//! | Operation | Command |
//! |-----------|---------|
//! | list pending | `salt-key --list=pre --out=json` (falls back to `salt-key -l pre --out=json`) |
//! | admit | `salt-key -ya <id>` |
//! | revoke | `salt-key -yd <id>` |
//!
//! Pending listings are JSON objects keyed by state; the pending set is the
//! `minions_pre` array. Empty stdout means an empty queue.
//!
//! ## Failure semantics
//!
//! [`KeyStore`] folds errors into booleans for the admission flow:
//! a listing failure counts as "not pending", an admit failure as "not
//! admitted", and revoke never raises (failures are logged at error).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::command::{CommandError, CommandOutput, CommandRunner};

const PENDING_KEY: &str = "minions_pre";

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("'{command}' timed out")]
    Timeout { command: String },

    #[error("'{command}' exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unparseable key listing: {0}")]
    Parse(String),
}

// ════════════════════════════════════════════════════════════════════════════════
// TRAIT
// ════════════════════════════════════════════════════════════════════════════════

/// Admission queue backend.
#[async_trait]
pub trait AdmissionQueue: Send + Sync {
    /// Identifiers currently awaiting admission.
    async fn list_pending(&self) -> Result<BTreeSet<String>, KeyStoreError>;

    /// Moves a pending key to accepted.
    async fn admit(&self, identifier: &str) -> Result<(), KeyStoreError>;

    /// Deletes the key regardless of state.
    async fn revoke(&self, identifier: &str) -> Result<(), KeyStoreError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// SALT IMPLEMENTATION
// ════════════════════════════════════════════════════════════════════════════════

/// `salt-key` backed admission queue.
pub struct SaltKeyQueue {
    runner: Arc<dyn CommandRunner>,
    program: String,
    limit: Duration,
}

impl SaltKeyQueue {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, limit: Duration) -> Self {
        Self {
            runner,
            program: program.into(),
            limit,
        }
    }

    async fn exec(&self, args: &[&str]) -> Result<CommandOutput, KeyStoreError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let out = self.runner.run(&self.program, &args, self.limit).await?;
        let command = || format!("{} {}", self.program, args.join(" "));

        if out.timed_out {
            return Err(KeyStoreError::Timeout { command: command() });
        }
        if !out.success() {
            return Err(KeyStoreError::Failed {
                command: command(),
                code: out.exit_code,
                stderr: out.stderr_str().trim().to_string(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl AdmissionQueue for SaltKeyQueue {
    async fn list_pending(&self) -> Result<BTreeSet<String>, KeyStoreError> {
        // Older salt-key releases only accept the short form. A timeout or
        // spawn failure is not retried so the check stays within one limit.
        let out = match self.exec(&["--list=pre", "--out=json"]).await {
            Ok(out) => out,
            Err(e @ KeyStoreError::Failed { .. }) => {
                debug!(error = %e, "long-form key listing failed, retrying short form");
                self.exec(&["-l", "pre", "--out=json"]).await?
            }
            Err(e) => return Err(e),
        };
        parse_pending(&out.stdout_str())
    }

    async fn admit(&self, identifier: &str) -> Result<(), KeyStoreError> {
        self.exec(&["-ya", identifier]).await.map(|_| ())
    }

    async fn revoke(&self, identifier: &str) -> Result<(), KeyStoreError> {
        self.exec(&["-yd", identifier]).await.map(|_| ())
    }
}

/// Extracts the pending set from a key listing.
pub(crate) fn parse_pending(stdout: &str) -> Result<BTreeSet<String>, KeyStoreError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(BTreeSet::new());
    }

    let listing: Value =
        serde_json::from_str(trimmed).map_err(|e| KeyStoreError::Parse(e.to_string()))?;
    let object = listing
        .as_object()
        .ok_or_else(|| KeyStoreError::Parse("listing is not a JSON object".to_string()))?;

    let pending = match object.get(PENDING_KEY) {
        None | Some(Value::Null) => return Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(KeyStoreError::Parse(format!("'{PENDING_KEY}' is not a list")));
        }
    };

    Ok(pending
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

// ════════════════════════════════════════════════════════════════════════════════
// KEY STORE
// ════════════════════════════════════════════════════════════════════════════════

/// Boolean-facing wrapper used by the admission state machine.
#[derive(Clone)]
pub struct KeyStore {
    queue: Arc<dyn AdmissionQueue>,
}

impl KeyStore {
    pub fn new(queue: Arc<dyn AdmissionQueue>) -> Self {
        Self { queue }
    }

    /// Raw listing, errors included. Used by the `pending` command.
    pub async fn pending(&self) -> Result<BTreeSet<String>, KeyStoreError> {
        self.queue.list_pending().await
    }

    /// True only when the identifier is in the pending set.
    pub async fn is_pending(&self, identifier: &str) -> bool {
        match self.queue.list_pending().await {
            Ok(pending) => pending.contains(identifier),
            Err(e) => {
                warn!(minion_id = identifier, error = %e, "pending key listing failed");
                false
            }
        }
    }

    /// True when the key was moved to accepted.
    pub async fn admit(&self, identifier: &str) -> bool {
        match self.queue.admit(identifier).await {
            Ok(()) => {
                info!(minion_id = identifier, "key accepted");
                true
            }
            Err(e) => {
                error!(minion_id = identifier, error = %e, "key accept failed");
                false
            }
        }
    }

    /// Best-effort removal. Returns whether the backend reported success.
    pub async fn revoke(&self, identifier: &str) -> bool {
        match self.queue.revoke(identifier).await {
            Ok(()) => {
                info!(minion_id = identifier, "key revoked");
                true
            }
            Err(e) => {
                error!(minion_id = identifier, error = %e, "key revoke failed");
                false
            }
        }
    }
}
