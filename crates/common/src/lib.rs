//! # fleetgate Common Crate
//!
//! Shared types for node admission verification.
//!
//! ## Modules
//! - `identifier`: identifier policy and the validated [`NodeIdentifier`]
//! - `inventory`: cloud inventory records and self-reported identity
//! - `credentials`: credential bundles loaded from JSON files
//! - `secret_store`: runtime secret-store HTTP client
//!
//! ## Usage
//! ```rust,ignore
//! let policy = IdentityPolicy::standard()?;
//! let id = policy.parse("node-7")?;
//! let creds = CredentialBundle::load(DEFAULT_INVENTORY_CREDENTIALS_PATH)?;
//! ```

pub mod credentials;
pub mod identifier;
pub mod inventory;
pub mod secret_store;

pub use credentials::{
    CredentialBundle, CredentialError, SecretStoreCredentials,
    DEFAULT_INVENTORY_CREDENTIALS_PATH, DEFAULT_SECRET_STORE_CREDENTIALS_PATH,
};
pub use identifier::{
    IdentityError, IdentityPolicy, NodeIdentifier, DEFAULT_IDENTIFIER_PATTERN,
    DEFAULT_RESERVED_IDENTIFIER,
};
pub use inventory::{select_record, InventoryRecord, SelfReportedIdentity};
pub use secret_store::{
    release_for, SecretQuery, SecretStoreClient, SecretStoreError, DEFAULT_ENVIRONMENT,
    DEFAULT_SECRET_PATH, DEFAULT_SECRET_STORE_HOST,
};
