//! # Self-Reported Identity Query
//!
//! Asks an admitted node for its own identity attributes. Salt answers with
//! a JSON object keyed by minion id:
//!
//! ```text
//! salt --timeout=10 --out=json node-7 grains.item id scw_instance_id
//! {"node-7": {"id": "node-7", "scw_instance_id": "srv-123"}}
//! ```
//!
//! A node that has not answered yet shows up as a non-object value (or not
//! at all); both are reported as "no identity yet", not as an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use fleetgate_common::SelfReportedIdentity;

use crate::command::{CommandError, CommandRunner};

/// Slack added to the tool's own timeout before the runner kills it.
const RUNNER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum IdentityQueryError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("identity query timed out")]
    Timeout,

    #[error("identity query exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("unparseable identity response: {0}")]
    Parse(String),
}

/// Source of a node's self-reported identity.
#[async_trait]
pub trait IdentityQuery: Send + Sync {
    /// `Ok(None)` when the node has not reported yet.
    async fn query(
        &self,
        identifier: &str,
    ) -> Result<Option<SelfReportedIdentity>, IdentityQueryError>;
}

/// `salt ... grains.item` backed identity query.
pub struct SaltGrainsQuery {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
    instance_grain: String,
}

impl SaltGrainsQuery {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        timeout: Duration,
        instance_grain: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            timeout,
            instance_grain: instance_grain.into(),
        }
    }

    fn args(&self, identifier: &str) -> Vec<String> {
        vec![
            format!("--timeout={}", self.timeout.as_secs().max(1)),
            "--out=json".to_string(),
            identifier.to_string(),
            "grains.item".to_string(),
            "id".to_string(),
            self.instance_grain.clone(),
        ]
    }
}

#[async_trait]
impl IdentityQuery for SaltGrainsQuery {
    async fn query(
        &self,
        identifier: &str,
    ) -> Result<Option<SelfReportedIdentity>, IdentityQueryError> {
        let out = self
            .runner
            .run(&self.program, &self.args(identifier), self.timeout + RUNNER_GRACE)
            .await?;

        if out.timed_out {
            return Err(IdentityQueryError::Timeout);
        }
        if !out.success() {
            return Err(IdentityQueryError::Failed {
                code: out.exit_code,
                stderr: out.stderr_str().trim().to_string(),
            });
        }
        parse_identity(&out.stdout_str(), identifier, &self.instance_grain)
    }
}

pub(crate) fn parse_identity(
    stdout: &str,
    identifier: &str,
    instance_grain: &str,
) -> Result<Option<SelfReportedIdentity>, IdentityQueryError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let payload: Value =
        serde_json::from_str(trimmed).map_err(|e| IdentityQueryError::Parse(e.to_string()))?;

    let grains = match payload.get(identifier) {
        Some(Value::Object(grains)) => grains,
        _ => return Ok(None),
    };

    let text = |key: &str| grains.get(key).and_then(Value::as_str).map(str::to_string);
    Ok(Some(SelfReportedIdentity {
        reported_id: text("id"),
        reported_instance_id: text(instance_grain),
    }))
}
