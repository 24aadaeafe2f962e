//! # GateKeeper Module
//!
//! Provides the [`GateKeeper`] struct, [`GateKeeperConfig`], and the
//! collaborators it drives to verify a joining node before it becomes a
//! fleet member.
//!
//! ## Modules
//!
//! - **key_store**: [`AdmissionQueue`] trait, the Salt key implementation,
//!   and [`KeyStore`], the inspector/controller wrapper (pending check,
//!   admit, best-effort revoke).
//! - **inventory**: [`InventoryResolver`] trait and the Scaleway bare-metal
//!   implementation.
//! - **credential_source**: [`CredentialSource`] trait and the JSON file
//!   implementation.
//! - **identity_query**: [`IdentityQuery`] trait and the Salt grains
//!   implementation.
//! - **confirmation**: [`ConfirmationPoller`], the bounded post-admission
//!   polling loop with an injectable [`Sleeper`].
//! - **admission**: [`GateKeeper::verify`], the state machine sequencing
//!   all of the above.
//!
//! ## Protocol
//!
//! ```text
//! Start ─► Validated ─► PendingConfirmed ─► InventoryResolved ─► Admitted ─► Confirmed
//!   │          │               │                    │                │
//!   └──────────┴───────────────┴────────────────────┴──► Rejected    └──► RevokedRejected
//! ```
//!
//! Every stage is a hard gate. Admission is optimistic: the key is accepted
//! before the node's self-reported identity is confirmed, and revoked if
//! confirmation never arrives.
//!
//! ## Safety Properties
//!
//! - `GateKeeper` is `Send + Sync`; it holds no mutable state, so
//!   concurrent verifications of different nodes are independent.
//! - Invalid identifiers are rejected before any collaborator is touched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetgate_common::{
    IdentityPolicy, DEFAULT_IDENTIFIER_PATTERN, DEFAULT_INVENTORY_CREDENTIALS_PATH,
    DEFAULT_RESERVED_IDENTIFIER,
};

use crate::command::{CommandRunner, TokioCommandRunner};
use crate::config::ConfigError;

// Admission state machine
pub mod admission;
pub use admission::{AdmissionOutcome, AdmissionStage, Rejection};

// Admission queue (inspector + controller)
pub mod key_store;
pub use key_store::{AdmissionQueue, KeyStore, KeyStoreError, SaltKeyQueue};

// Cloud inventory
pub mod inventory;
pub use inventory::{InventoryError, InventoryResolver, ScalewayInventory};

// Credential input
pub mod credential_source;
pub use credential_source::{CredentialSource, FileCredentialSource};

// Self-reported identity
pub mod identity_query;
pub use identity_query::{IdentityQuery, IdentityQueryError, SaltGrainsQuery};

// Post-admission polling
pub mod confirmation;
pub use confirmation::{
    ConfirmationPoller, ConfirmationResult, PollSchedule, Sleeper, TokioSleeper,
};


// ════════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ════════════════════════════════════════════════════════════════════════════════

/// Configuration for the [`GateKeeper`].
///
/// ## Defaults
///
/// | Field | Default Value |
/// |-------|---------------|
/// | `reserved_identifier` | `"production-control-plane"` |
/// | `identifier_pattern` | `^[a-z0-9][a-z0-9-]{1,62}$` |
/// | `credentials_path` | `/etc/salt/credentials/scaleway-api.json` |
/// | `inventory_api_base` | `https://api.scaleway.com` |
/// | `inventory_timeout_secs` | `5` |
/// | `key_store_timeout_secs` | `30` |
/// | `identity_query_timeout_secs` | `10` |
/// | `confirm_attempts` | `3` |
/// | `confirm_interval_ms` | `2000` |
/// | `instance_id_grain` | `"scw_instance_id"` |
/// | `salt_key_bin` | `"salt-key"` |
/// | `salt_bin` | `"salt"` |
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateKeeperConfig {
    /// Control-plane identifier; never eligible for admission.
    pub reserved_identifier: String,

    /// Pattern a claimed identifier must fully match.
    pub identifier_pattern: String,

    /// JSON file holding the inventory API credentials.
    pub credentials_path: PathBuf,

    /// Base URL of the cloud inventory API.
    pub inventory_api_base: String,

    /// Request timeout for the inventory lookup. Sits on the critical path
    /// of a synchronous admission decision, so keep it short.
    pub inventory_timeout_secs: u64,

    /// Hard limit for each key-store command.
    pub key_store_timeout_secs: u64,

    /// Timeout handed to the identity query tool.
    pub identity_query_timeout_secs: u64,

    /// Confirmation rounds after admission.
    pub confirm_attempts: u32,

    /// Delay before each confirmation round, in milliseconds.
    pub confirm_interval_ms: u64,

    /// Grain carrying the node's cloud instance id.
    pub instance_id_grain: String,

    /// Key-store tool.
    pub salt_key_bin: String,

    /// Identity query tool.
    pub salt_bin: String,
}

impl Default for GateKeeperConfig {
    fn default() -> Self {
        Self {
            reserved_identifier: DEFAULT_RESERVED_IDENTIFIER.to_string(),
            identifier_pattern: DEFAULT_IDENTIFIER_PATTERN.to_string(),
            credentials_path: PathBuf::from(DEFAULT_INVENTORY_CREDENTIALS_PATH),
            inventory_api_base: "https://api.scaleway.com".to_string(),
            inventory_timeout_secs: 5,
            key_store_timeout_secs: 30,
            identity_query_timeout_secs: 10,
            confirm_attempts: 3,
            confirm_interval_ms: 2000,
            instance_id_grain: "scw_instance_id".to_string(),
            salt_key_bin: "salt-key".to_string(),
            salt_bin: "salt".to_string(),
        }
    }
}

impl GateKeeperConfig {
    pub fn inventory_timeout(&self) -> Duration {
        Duration::from_secs(self.inventory_timeout_secs)
    }

    pub fn key_store_timeout(&self) -> Duration {
        Duration::from_secs(self.key_store_timeout_secs)
    }

    pub fn identity_query_timeout(&self) -> Duration {
        Duration::from_secs(self.identity_query_timeout_secs)
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            attempts: self.confirm_attempts,
            interval: Duration::from_millis(self.confirm_interval_ms),
        }
    }

    /// Compiles the identifier policy described by this config.
    pub fn identity_policy(&self) -> Result<IdentityPolicy, ConfigError> {
        IdentityPolicy::new(self.reserved_identifier.clone(), &self.identifier_pattern)
            .map_err(|e| ConfigError::InvalidPattern(e.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ════════════════════════════════════════════════════════════════════════════════

/// External systems the gatekeeper talks to.
///
/// Production wiring comes from [`Collaborators::salt_scaleway`]; tests
/// build this struct directly with in-memory fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn AdmissionQueue>,
    pub inventory: Arc<dyn InventoryResolver>,
    pub identity: Arc<dyn IdentityQuery>,
    pub credentials: Arc<dyn CredentialSource>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Collaborators {
    /// Salt key store, Salt grains, Scaleway inventory, credentials file.
    pub fn salt_scaleway(config: &GateKeeperConfig) -> Result<Self, ConfigError> {
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner);
        Self::salt_scaleway_with_runner(config, runner)
    }

    /// As [`salt_scaleway`](Self::salt_scaleway) with a caller-supplied runner.
    pub fn salt_scaleway_with_runner(
        config: &GateKeeperConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ConfigError> {
        let inventory = ScalewayInventory::new(
            config.inventory_api_base.clone(),
            config.inventory_timeout(),
        )
        .map_err(|e| ConfigError::Invalid(format!("inventory client: {e}")))?;

        Ok(Self {
            queue: Arc::new(SaltKeyQueue::new(
                runner.clone(),
                config.salt_key_bin.clone(),
                config.key_store_timeout(),
            )),
            inventory: Arc::new(inventory),
            identity: Arc::new(SaltGrainsQuery::new(
                runner,
                config.salt_bin.clone(),
                config.identity_query_timeout(),
                config.instance_id_grain.clone(),
            )),
            credentials: Arc::new(FileCredentialSource::new(config.credentials_path.clone())),
            sleeper: Arc::new(TokioSleeper),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// GATEKEEPER
// ════════════════════════════════════════════════════════════════════════════════

/// Control-plane gatekeeper for node admission.
///
/// ## Construction
///
/// [`GateKeeper::new`] validates the config, compiles the identifier
/// policy, and wires the collaborators. No I/O happens at construction.
///
/// ## Verification
///
/// [`GateKeeper::verify`] runs the full protocol and returns an
/// [`AdmissionOutcome`]; [`GateKeeper::accept`] reduces it to the boolean
/// contract (true only when the node reached `Confirmed`).
pub struct GateKeeper {
    config: GateKeeperConfig,
    policy: IdentityPolicy,
    key_store: KeyStore,
    inventory: Arc<dyn InventoryResolver>,
    credentials: Arc<dyn CredentialSource>,
    poller: ConfirmationPoller,
}

impl std::fmt::Debug for GateKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateKeeper")
            .field("config", &self.config)
            .field("reserved", &self.policy.reserved())
            .finish_non_exhaustive()
    }
}

impl GateKeeper {
    pub fn new(config: GateKeeperConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.identity_policy()?;
        let poller = ConfirmationPoller::new(
            collaborators.identity,
            collaborators.sleeper,
            config.poll_schedule(),
        );

        Ok(Self {
            policy,
            key_store: KeyStore::new(collaborators.queue),
            inventory: collaborators.inventory,
            credentials: collaborators.credentials,
            poller,
            config,
        })
    }

    /// Production gatekeeper (Salt + Scaleway + credentials file).
    pub fn from_config(config: GateKeeperConfig) -> Result<Self, ConfigError> {
        let collaborators = Collaborators::salt_scaleway(&config)?;
        Self::new(config, collaborators)
    }

    pub fn config(&self) -> &GateKeeperConfig {
        &self.config
    }

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    /// Identity validator: pure syntactic check, no I/O.
    pub fn validate(&self, identifier: &str) -> bool {
        self.policy.validate(identifier)
    }
}
