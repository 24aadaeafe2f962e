//! # Admission State Machine
//!
//! [`GateKeeper::verify`] sequences the gates for one joining node:
//!
//! 1. Identifier policy (no I/O)
//! 2. Pending check against the admission queue
//! 3. Credentials + inventory lookup
//! 4. Admit
//! 5. Confirmation polling, with revoke on exhaustion
//!
//! Each stage returns `Result<_, Rejection>`. The first rejection ends the
//! run; nothing after it is touched. Only a rejection raised after admission
//! triggers the revoke.
//!
//! ## Logging
//!
//! Every rejection is logged once at the point of failure with `minion_id`,
//! `stage` and `reason`. Revoke failures are logged by [`KeyStore`].
//!
//! [`KeyStore`]: super::KeyStore

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use fleetgate_common::{InventoryRecord, NodeIdentifier};

use super::confirmation::ConfirmationResult;
use super::GateKeeper;

// ════════════════════════════════════════════════════════════════════════════════
// STAGES
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStage {
    Start,
    Validated,
    PendingConfirmed,
    InventoryResolved,
    Admitted,
    Confirmed,
    Rejected,
    RevokedRejected,
}

impl AdmissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStage::Start => "start",
            AdmissionStage::Validated => "validated",
            AdmissionStage::PendingConfirmed => "pending_confirmed",
            AdmissionStage::InventoryResolved => "inventory_resolved",
            AdmissionStage::Admitted => "admitted",
            AdmissionStage::Confirmed => "confirmed",
            AdmissionStage::Rejected => "rejected",
            AdmissionStage::RevokedRejected => "revoked_rejected",
        }
    }
}

impl std::fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// REJECTIONS
// ════════════════════════════════════════════════════════════════════════════════

/// Why a node was not admitted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Rejection {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("no pending key for this identifier")]
    NotPending,

    #[error("inventory credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("inventory lookup failed: {0}")]
    InventoryLookupFailed(String),

    #[error("no inventory record matches this identifier")]
    InventoryNoMatch,

    #[error("key-store admit failed")]
    AdmitFailed,

    #[error("self-reported identity not confirmed after {rounds} rounds")]
    ConfirmationTimedOut { rounds: u32 },
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::InvalidIdentity(_) => "invalid_identity",
            Rejection::NotPending => "not_pending",
            Rejection::CredentialsUnavailable(_) => "credentials_unavailable",
            Rejection::InventoryLookupFailed(_) => "inventory_lookup_failed",
            Rejection::InventoryNoMatch => "inventory_no_match",
            Rejection::AdmitFailed => "admit_failed",
            Rejection::ConfirmationTimedOut { .. } => "confirmation_timed_out",
        }
    }

    /// Terminal stage this rejection leads to.
    pub fn terminal_stage(&self) -> AdmissionStage {
        match self {
            Rejection::ConfirmationTimedOut { .. } => AdmissionStage::RevokedRejected,
            _ => AdmissionStage::Rejected,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// OUTCOME
// ════════════════════════════════════════════════════════════════════════════════

/// Full record of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionOutcome {
    pub minion_id: String,
    pub final_stage: AdmissionStage,
    /// Every stage visited, in order, ending with `final_stage`.
    pub path: Vec<AdmissionStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    /// Inventory record id, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub poll_rounds: u32,
    /// Whether the revoke succeeded; `None` when no revoke was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<bool>,
}

impl AdmissionOutcome {
    fn start(minion_id: &str) -> Self {
        Self {
            minion_id: minion_id.to_string(),
            final_stage: AdmissionStage::Start,
            path: vec![AdmissionStage::Start],
            rejection: None,
            instance_id: None,
            poll_rounds: 0,
            revoked: None,
        }
    }

    fn advance(&mut self, stage: AdmissionStage) {
        self.final_stage = stage;
        self.path.push(stage);
    }

    /// True only when the node reached `Confirmed`.
    pub fn accepted(&self) -> bool {
        self.final_stage == AdmissionStage::Confirmed
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// ORCHESTRATION
// ════════════════════════════════════════════════════════════════════════════════

impl GateKeeper {
    /// Runs the admission protocol for `minion_id`.
    pub async fn verify(&self, minion_id: &str) -> AdmissionOutcome {
        let mut outcome = AdmissionOutcome::start(minion_id);

        match self.run_stages(minion_id, &mut outcome).await {
            Ok(()) => {
                outcome.advance(AdmissionStage::Confirmed);
                info!(
                    minion_id = %outcome.minion_id,
                    instance_id = outcome.instance_id.as_deref().unwrap_or(""),
                    round = outcome.poll_rounds,
                    "node admitted and confirmed"
                );
            }
            Err(rejection) => {
                let failed_at = outcome.final_stage;
                if rejection.terminal_stage() == AdmissionStage::RevokedRejected {
                    let target = outcome.minion_id.clone();
                    outcome.revoked = Some(self.key_store.revoke(&target).await);
                }
                warn!(
                    minion_id = %outcome.minion_id,
                    stage = %failed_at,
                    reason = rejection.kind(),
                    detail = %rejection,
                    "node admission rejected"
                );
                outcome.advance(rejection.terminal_stage());
                outcome.rejection = Some(rejection);
            }
        }

        outcome
    }

    /// Boolean contract: true only when the node reached `Confirmed`.
    pub async fn accept(&self, minion_id: &str) -> bool {
        self.verify(minion_id).await.accepted()
    }

    async fn run_stages(
        &self,
        minion_id: &str,
        outcome: &mut AdmissionOutcome,
    ) -> Result<(), Rejection> {
        let id = self.check_identity(minion_id)?;
        outcome.minion_id = id.to_string();
        outcome.advance(AdmissionStage::Validated);

        self.check_pending(&id).await?;
        outcome.advance(AdmissionStage::PendingConfirmed);

        let record = self.resolve_inventory(&id).await?;
        outcome.instance_id = Some(record.record_id.clone());
        outcome.advance(AdmissionStage::InventoryResolved);

        self.admit(&id).await?;
        outcome.advance(AdmissionStage::Admitted);

        let result = self.poller.confirm(id.as_str(), &record.record_id).await;
        outcome.poll_rounds = result.rounds();
        match result {
            ConfirmationResult::Confirmed { .. } => Ok(()),
            ConfirmationResult::Exhausted { rounds } => {
                Err(Rejection::ConfirmationTimedOut { rounds })
            }
        }
    }

    fn check_identity(&self, minion_id: &str) -> Result<NodeIdentifier, Rejection> {
        self.policy
            .parse(minion_id)
            .map_err(|e| Rejection::InvalidIdentity(e.to_string()))
    }

    async fn check_pending(&self, id: &NodeIdentifier) -> Result<(), Rejection> {
        if self.key_store.is_pending(id.as_str()).await {
            Ok(())
        } else {
            Err(Rejection::NotPending)
        }
    }

    async fn resolve_inventory(&self, id: &NodeIdentifier) -> Result<InventoryRecord, Rejection> {
        let credentials = self
            .credentials
            .load()
            .map_err(|e| Rejection::CredentialsUnavailable(e.to_string()))?;

        let record = self
            .inventory
            .resolve(id.as_str(), &credentials)
            .await
            .map_err(|e| Rejection::InventoryLookupFailed(e.to_string()))?
            .ok_or(Rejection::InventoryNoMatch)?;

        // Resolvers are pluggable; hold every one to the matching rule.
        let scope = credentials.project_scope();
        if !record.matches(id.as_str(), scope) || !record.has_record_id() {
            return Err(Rejection::InventoryNoMatch);
        }
        Ok(record)
    }

    async fn admit(&self, id: &NodeIdentifier) -> Result<(), Rejection> {
        if self.key_store.admit(id.as_str()).await {
            Ok(())
        } else {
            Err(Rejection::AdmitFailed)
        }
    }
}
