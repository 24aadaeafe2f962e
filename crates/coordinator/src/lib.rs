//! # fleetgate Coordinator Crate
//!
//! Control-plane side of node admission. A node that wants to join the
//! fleet leaves its key in the admission queue; the coordinator decides
//! whether to accept it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             GATEKEEPER                               │
//! │                                                                      │
//! │   IdentityPolicy ──▶ KeyStore ──▶ InventoryResolver ──▶ KeyStore     │
//! │   (validate id)     (pending?)    (cloud record)        (admit)      │
//! │                                                            │         │
//! │                                                            ▼         │
//! │                      KeyStore ◀── exhausted ── ConfirmationPoller    │
//! │                      (revoke)                  (self-reported id)    │
//! └──────────────────────────────────────────────────────────────────────┘
//!          │                     │                         │
//!          ▼                     ▼                         ▼
//!     salt-key              Scaleway API              salt grains
//!   (CommandRunner)          (reqwest)              (CommandRunner)
//! ```
//!
//! ## Modules
//!
//! - `command`: [`CommandRunner`] trait and the tokio subprocess runner
//! - `config`: layered [`GateKeeperConfig`] loading (defaults, TOML, env)
//! - `gatekeeper`: collaborators and the admission state machine
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = fleetgate_coordinator::load_config(None)?;
//! let gatekeeper = GateKeeper::from_config(config)?;
//! let accepted = gatekeeper.accept("node-7").await;
//! ```

pub mod command;
pub mod config;
pub mod gatekeeper;

pub use command::{CommandError, CommandOutput, CommandRunner, TokioCommandRunner};
pub use config::{apply_env, from_toml_str, load_config, ConfigError};
pub use gatekeeper::{
    AdmissionOutcome, AdmissionQueue, AdmissionStage, Collaborators, ConfirmationPoller,
    ConfirmationResult, CredentialSource, FileCredentialSource, GateKeeper, GateKeeperConfig,
    IdentityQuery, IdentityQueryError, InventoryError, InventoryResolver, KeyStore,
    KeyStoreError, PollSchedule, Rejection, SaltGrainsQuery, SaltKeyQueue, ScalewayInventory,
    Sleeper, TokioSleeper,
};
