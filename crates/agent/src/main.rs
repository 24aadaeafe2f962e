//! # fleetgate CLI
//!
//! Operator and automation entry point for node admission.
//!
//! ## Commands
//!
//! ### Admission
//! - `verify <MINION_ID>`: run the full admission protocol; exit 0 when the
//!   node is accepted and confirmed, 1 otherwise
//!   - `--config`: TOML config file
//!   - `--json`: print the admission outcome as JSON
//! - `check-id <MINION_ID>`: identifier policy only, no I/O
//! - `pending`: list keys waiting in the admission queue
//!
//! ### Secrets
//! - `secrets`: fetch runtime secrets from the secret store
//!   - `--credentials`: machine identity JSON file
//!   - `--minion`: only print what this node would receive
//!   - `--reveal`: print values instead of masking them
//!
//! ## Environment Variables
//!
//! - `FLEETGATE_ENV_FILE`: env file loaded at startup (default: `.env`)
//! - `FLEETGATE_*`: config overrides (see `fleetgate_coordinator::config`)
//! - `RUST_LOG`: log filter (default: `info`); logs go to stderr

mod cmd_admission;
mod cmd_secrets;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fleetgate_common::{
    DEFAULT_ENVIRONMENT, DEFAULT_SECRET_PATH, DEFAULT_SECRET_STORE_CREDENTIALS_PATH,
    DEFAULT_SECRET_STORE_HOST,
};

#[derive(Parser)]
#[command(version, about = "fleetgate: control-plane node admission")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a joining node and admit it if its identity checks out
    Verify {
        /// Identifier the node claims
        minion_id: String,
        /// TOML config file
        #[arg(long, env = "FLEETGATE_CONFIG")]
        config: Option<PathBuf>,
        /// Print the admission outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check an identifier against the policy without touching any system
    CheckId {
        minion_id: String,
        #[arg(long, env = "FLEETGATE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// List keys waiting in the admission queue
    Pending {
        #[arg(long, env = "FLEETGATE_CONFIG")]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Fetch runtime secrets from the secret store
    Secrets {
        /// Machine identity file ({client_id, client_secret, project_id})
        #[arg(long, default_value = DEFAULT_SECRET_STORE_CREDENTIALS_PATH)]
        credentials: PathBuf,
        #[arg(long, env = "FLEETGATE_SECRETS_HOST", default_value = DEFAULT_SECRET_STORE_HOST)]
        host: String,
        #[arg(long = "env", env = "FLEETGATE_SECRETS_ENV", default_value = DEFAULT_ENVIRONMENT)]
        environment: String,
        #[arg(long = "path", env = "FLEETGATE_SECRETS_PATH", default_value = DEFAULT_SECRET_PATH)]
        secret_path: String,
        /// Only show what this node would receive
        #[arg(long)]
        minion: Option<String>,
        #[arg(long, env = "FLEETGATE_CONFIG")]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        /// Print secret values instead of masking them
        #[arg(long)]
        reveal: bool,
    },
}

fn load_env_file() {
    let env_file = std::env::var("FLEETGATE_ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    if let Err(e) = dotenvy::from_filename(&env_file) {
        // A missing file is fine; anything else deserves a warning.
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("warning: failed to load {env_file}: {e}");
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_env_file();
    let cli = Cli::parse();
    init_tracing();

    match cli.cmd {
        Commands::Verify {
            minion_id,
            config,
            json,
        } => cmd_admission::handle_verify(&minion_id, config.as_deref(), json).await,

        Commands::CheckId { minion_id, config } => {
            cmd_admission::handle_check_id(&minion_id, config.as_deref())
        }

        Commands::Pending { config, json } => {
            cmd_admission::handle_pending(config.as_deref(), json).await
        }

        Commands::Secrets {
            credentials,
            host,
            environment,
            secret_path,
            minion,
            config,
            json,
            reveal,
        } => {
            let args = cmd_secrets::SecretsArgs {
                credentials,
                host,
                environment,
                secret_path,
                minion,
                config,
                json,
                reveal,
            };
            cmd_secrets::handle_secrets(args).await
        }
    }
}
