//! # Inventory Resolver
//!
//! Looks up the authoritative cloud record for a claimed node name.
//!
//! ## Scaleway bare-metal
//!
//! ```text
//! GET {api_base}/baremetal/v1/zones/{zone}/servers?name={id}[&project_id={project}]
//! X-Auth-Token: <secret_key>
//! Accept: application/json
//! ```
//!
//! The response carries a `servers` array (a bare array is accepted too).
//! Entries that fail to decode, e.g. with a `null` name, are skipped.
//! The API's `name` filter is a substring match, so the result is filtered
//! locally with the exact matching rule from
//! [`InventoryRecord::matches`](fleetgate_common::InventoryRecord::matches).
//!
//! ## Failure semantics
//!
//! Transport errors, timeouts, non-success statuses and malformed bodies are
//! all [`InventoryError`]s. The admission flow treats every one of them as a
//! rejection; there is no retry on this path.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use fleetgate_common::{select_record, CredentialBundle, InventoryRecord};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory request timed out")]
    Timeout,

    #[error("inventory request failed: {0}")]
    Transport(String),

    #[error("inventory API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed inventory response: {0}")]
    Decode(String),

    #[error("invalid inventory url '{0}'")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for InventoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InventoryError::Timeout
        } else if e.is_decode() {
            InventoryError::Decode(e.to_string())
        } else {
            InventoryError::Transport(e.to_string())
        }
    }
}

/// Authoritative record lookup.
#[async_trait]
pub trait InventoryResolver: Send + Sync {
    /// `Ok(None)` when no record matches the identifier within scope.
    async fn resolve(
        &self,
        identifier: &str,
        credentials: &CredentialBundle,
    ) -> Result<Option<InventoryRecord>, InventoryError>;
}

/// Splits a listing body into candidate records.
///
/// Only the envelope is strict: the body must be an object (with an optional
/// `servers` array) or a bare array. Entries that do not decode as a record
/// are skipped, so one partial sibling never hides the real match.
fn parse_listing(body: &str) -> Result<Vec<InventoryRecord>, InventoryError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|e| InventoryError::Decode(e.to_string()))?;
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("servers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(InventoryError::Decode(format!(
                    "`servers` is not an array: {}",
                    truncate_body(&other.to_string(), 80)
                )))
            }
        },
        other => {
            return Err(InventoryError::Decode(format!(
                "expected object or array, got {}",
                truncate_body(&other.to_string(), 80)
            )))
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<InventoryRecord>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "skipping undecodable inventory entry");
                None
            }
        })
        .collect())
}

/// Scaleway bare-metal API client.
#[derive(Clone, Debug)]
pub struct ScalewayInventory {
    api_base: String,
    client: Client,
}

impl ScalewayInventory {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InventoryError::Transport(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn servers_url(&self, identifier: &str, credentials: &CredentialBundle) -> Result<Url, InventoryError> {
        let base = format!(
            "{}/baremetal/v1/zones/{}/servers",
            self.api_base, credentials.zone
        );
        let mut params = vec![("name", identifier)];
        if let Some(project) = credentials.project_scope() {
            params.push(("project_id", project));
        }
        Url::parse_with_params(&base, &params).map_err(|_| InventoryError::InvalidUrl(base))
    }
}

#[async_trait]
impl InventoryResolver for ScalewayInventory {
    async fn resolve(
        &self,
        identifier: &str,
        credentials: &CredentialBundle,
    ) -> Result<Option<InventoryRecord>, InventoryError> {
        let url = self.servers_url(identifier, credentials)?;

        let resp = self
            .client
            .get(url)
            .header("X-Auth-Token", &credentials.secret_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(InventoryError::Status {
                status: status.as_u16(),
                body: truncate_body(&body, 200),
            });
        }

        let records = parse_listing(&body)?;
        debug!(minion_id = identifier, candidates = records.len(), "inventory listing received");

        Ok(select_record(&records, identifier, credentials.project_scope()).map(|mut record| {
            // The listing endpoint is zonal; fill the zone when the API omits it.
            if record.zone.is_none() {
                record.zone = Some(credentials.zone.clone());
            }
            record
        }))
    }
}

fn truncate_body(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len).collect();
        format!("{cut}...")
    }
}
