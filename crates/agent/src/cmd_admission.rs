//! # Admission Commands
//!
//! - `verify <id> [--config <toml>] [--json]`
//! - `check-id <id> [--config <toml>]`
//! - `pending [--config <toml>] [--json]`
//!
//! Exit codes: 0 accepted / valid / listed, 1 rejected / invalid. Errors
//! loading configuration surface as `anyhow` errors (exit code 1 with a
//! message on stderr).

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;

use fleetgate_coordinator::{load_config, AdmissionOutcome, GateKeeper};

// ════════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Serialize, Debug)]
struct PendingOutput {
    pending: Vec<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ════════════════════════════════════════════════════════════════════════════════

fn gatekeeper(config: Option<&Path>) -> Result<GateKeeper> {
    let config = load_config(config).context("failed to load configuration")?;
    GateKeeper::from_config(config).context("failed to build gatekeeper")
}

pub async fn handle_verify(minion_id: &str, config: Option<&Path>, json: bool) -> Result<ExitCode> {
    let gk = gatekeeper(config)?;
    let outcome = gk.verify(minion_id).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(exit_code(outcome.accepted()))
}

pub fn handle_check_id(minion_id: &str, config: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config).context("failed to load configuration")?;
    let policy = config.identity_policy()?;

    match policy.parse(minion_id) {
        Ok(_) => {
            println!("{minion_id}: valid");
            Ok(exit_code(true))
        }
        Err(e) => {
            println!("{minion_id}: invalid ({e})");
            Ok(exit_code(false))
        }
    }
}

pub async fn handle_pending(config: Option<&Path>, json: bool) -> Result<ExitCode> {
    let gk = gatekeeper(config)?;
    let pending = gk
        .key_store()
        .pending()
        .await
        .context("failed to list pending keys")?;

    if json {
        let output = PendingOutput {
            pending: pending.into_iter().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if pending.is_empty() {
        println!("no pending keys");
    } else {
        for id in &pending {
            println!("{id}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ════════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════════

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn print_outcome(outcome: &AdmissionOutcome) {
    let path: Vec<&str> = outcome.path.iter().map(|s| s.as_str()).collect();

    println!("Minion:   {}", outcome.minion_id);
    println!("Result:   {}", if outcome.accepted() { "ACCEPTED" } else { "REJECTED" });
    println!("Stage:    {}", outcome.final_stage);
    println!("Path:     {}", path.join(" -> "));
    if let Some(instance) = &outcome.instance_id {
        println!("Instance: {instance}");
    }
    if outcome.poll_rounds > 0 {
        println!("Rounds:   {}", outcome.poll_rounds);
    }
    if let Some(rejection) = &outcome.rejection {
        println!("Reason:   {} ({})", rejection.kind(), rejection);
    }
    if let Some(revoked) = outcome.revoked {
        println!("Revoked:  {}", if revoked { "yes" } else { "FAILED" });
    }
}
