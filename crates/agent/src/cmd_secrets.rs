//! # Secret Store Command
//!
//! `secrets --credentials <json> [--host <url>] [--env <slug>] [--path <folder>]
//!   [--minion <id>] [--json] [--reveal]`
//!
//! Values are masked unless `--reveal` is given. With `--minion`, only the
//! secrets that node would receive are shown: all of them for the
//! control-plane node, none for anyone else.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;

use fleetgate_common::{release_for, SecretQuery, SecretStoreClient, SecretStoreCredentials};
use fleetgate_coordinator::load_config;

const MASK: &str = "********";

pub struct SecretsArgs {
    pub credentials: PathBuf,
    pub host: String,
    pub environment: String,
    pub secret_path: String,
    pub minion: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub reveal: bool,
}

pub async fn handle_secrets(args: SecretsArgs) -> Result<ExitCode> {
    let credentials = SecretStoreCredentials::load(&args.credentials)
        .with_context(|| format!("cannot use {}", args.credentials.display()))?;
    let client = SecretStoreClient::new(&args.host)?;
    let query = SecretQuery {
        environment: args.environment,
        secret_path: args.secret_path,
    };

    let mut secrets = client
        .fetch(&credentials, &query)
        .await
        .context("failed to fetch secrets")?;

    if let Some(minion) = &args.minion {
        let config = load_config(args.config.as_deref()).context("failed to load configuration")?;
        secrets = release_for(minion, &config.reserved_identifier, secrets);
        info!(minion_id = %minion, count = secrets.len(), "secrets released");
    }

    let shown = present(secrets, args.reveal);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else if shown.is_empty() {
        println!("no secrets");
    } else {
        for (key, value) in &shown {
            println!("{key}={value}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn present(secrets: BTreeMap<String, String>, reveal: bool) -> BTreeMap<String, String> {
    if reveal {
        return secrets;
    }
    secrets
        .into_keys()
        .map(|k| (k, MASK.to_string()))
        .collect()
}
