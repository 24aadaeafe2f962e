//! # Confirmation Poller
//!
//! After admission the node must report an identity matching its inventory
//! record. The poller asks up to `attempts` times, sleeping `interval`
//! before every round, and stops at the first match.
//!
//! ## Design
//!
//! - Worst-case latency is `attempts * interval` plus query time.
//! - Query errors count as "no match" for that round; the loop never
//!   aborts early on an error.
//! - Sleeping goes through [`Sleeper`] so tests run without real delays.
//! - `attempts == 0` means no round runs and the result is `Exhausted`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::identity_query::IdentityQuery;

// ════════════════════════════════════════════════════════════════════════════════
// SLEEPER
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delay via `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TYPES
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// Matched on round `round` (1-indexed).
    Confirmed { round: u32 },
    /// No round matched.
    Exhausted { rounds: u32 },
}

impl ConfirmationResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationResult::Confirmed { .. })
    }

    pub fn rounds(&self) -> u32 {
        match self {
            ConfirmationResult::Confirmed { round } => *round,
            ConfirmationResult::Exhausted { rounds } => *rounds,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// POLLER
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ConfirmationPoller {
    identity: Arc<dyn IdentityQuery>,
    sleeper: Arc<dyn Sleeper>,
    schedule: PollSchedule,
}

impl ConfirmationPoller {
    pub fn new(
        identity: Arc<dyn IdentityQuery>,
        sleeper: Arc<dyn Sleeper>,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            identity,
            sleeper,
            schedule,
        }
    }

    /// Polls with the configured schedule.
    pub async fn confirm(&self, identifier: &str, expected_instance_id: &str) -> ConfirmationResult {
        self.confirm_with(identifier, expected_instance_id, self.schedule)
            .await
    }

    /// Polls with an explicit schedule.
    pub async fn confirm_with(
        &self,
        identifier: &str,
        expected_instance_id: &str,
        schedule: PollSchedule,
    ) -> ConfirmationResult {
        for round in 1..=schedule.attempts {
            self.sleeper.sleep(schedule.interval).await;

            match self.identity.query(identifier).await {
                Ok(Some(reported)) if reported.confirms(identifier, expected_instance_id) => {
                    debug!(minion_id = identifier, round, "self-reported identity confirmed");
                    return ConfirmationResult::Confirmed { round };
                }
                Ok(Some(reported)) => {
                    debug!(
                        minion_id = identifier,
                        round,
                        reported_id = ?reported.reported_id,
                        reported_instance_id = ?reported.reported_instance_id,
                        "self-reported identity does not match"
                    );
                }
                Ok(None) => {
                    debug!(minion_id = identifier, round, "node has not reported yet");
                }
                Err(e) => {
                    debug!(minion_id = identifier, round, error = %e, "identity query failed");
                }
            }
        }

        ConfirmationResult::Exhausted {
            rounds: schedule.attempts,
        }
    }
}
