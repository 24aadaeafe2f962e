//! # Secret Store Client
//!
//! HTTP client for the runtime secret store (Infisical universal-auth API).
//!
//! ## Endpoints
//!
//! - login: `POST {host}/api/v1/auth/universal-auth/login`
//!   body `{clientId, clientSecret}` → `{accessToken}`
//! - list: `GET {host}/api/v3/secrets/raw?workspaceId&environment&secretPath&includeImports=true&recursive=true`
//!   with `Authorization: Bearer <token>` → `{secrets: [{secretKey, secretValue}]}`
//!
//! Secrets are released only to the control-plane node; see
//! [`release_for`].
//!
//! The admission protocol does not depend on this module.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::credentials::SecretStoreCredentials;

/// Default secret-store host.
pub const DEFAULT_SECRET_STORE_HOST: &str = "https://app.infisical.com";

/// Default environment slug.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Default secret folder.
pub const DEFAULT_SECRET_PATH: &str = "/projects/rawkode-cloud";

const LOGIN_PATH: &str = "/api/v1/auth/universal-auth/login";
const SECRETS_PATH: &str = "/api/v3/secrets/raw";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("invalid secret store url '{0}'")]
    InvalidUrl(String),

    #[error("secret store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("secret store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("secret store login did not return an access token")]
    MissingToken,

    #[error("no secrets found at {0}")]
    Empty(String),
}

// ════════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct SecretListResponse {
    #[serde(default)]
    secrets: Vec<Value>,
}

/// Where to read secrets from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretQuery {
    pub environment: String,
    pub secret_path: String,
}

impl Default for SecretQuery {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            secret_path: DEFAULT_SECRET_PATH.to_string(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct SecretStoreClient {
    host: String,
    client: Client,
}

impl SecretStoreClient {
    pub fn new(host: impl Into<String>) -> Result<Self, SecretStoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Exchanges machine credentials for an access token.
    pub async fn login(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, SecretStoreError> {
        let url = format!("{}{}", self.host, LOGIN_PATH);
        let resp = self
            .client
            .post(&url)
            .json(&LoginRequest {
                client_id,
                client_secret,
            })
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let body: LoginResponse = resp.json().await?;
        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or(SecretStoreError::MissingToken)
    }

    /// Lists secrets under `query`, recursively, including imports.
    ///
    /// Entries without a key or with a null value are skipped.
    pub async fn list_secrets(
        &self,
        access_token: &str,
        workspace_id: &str,
        query: &SecretQuery,
    ) -> Result<BTreeMap<String, String>, SecretStoreError> {
        let base = format!("{}{}", self.host, SECRETS_PATH);
        let url = Url::parse_with_params(
            &base,
            &[
                ("workspaceId", workspace_id),
                ("environment", query.environment.as_str()),
                ("secretPath", query.secret_path.as_str()),
                ("includeImports", "true"),
                ("recursive", "true"),
            ],
        )
        .map_err(|_| SecretStoreError::InvalidUrl(base.clone()))?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let body: SecretListResponse = resp.json().await?;

        let values: BTreeMap<String, String> =
            body.secrets.iter().filter_map(secret_entry).collect();
        debug!(count = values.len(), path = %query.secret_path, "listed secrets");
        Ok(values)
    }

    /// Login followed by listing. An empty result is an error.
    pub async fn fetch(
        &self,
        credentials: &SecretStoreCredentials,
        query: &SecretQuery,
    ) -> Result<BTreeMap<String, String>, SecretStoreError> {
        let token = self
            .login(&credentials.client_id, &credentials.client_secret)
            .await?;
        let values = self
            .list_secrets(&token, &credentials.workspace_id, query)
            .await?;
        if values.is_empty() {
            error!(path = %query.secret_path, "no secrets found in secret store");
            return Err(SecretStoreError::Empty(query.secret_path.clone()));
        }
        Ok(values)
    }
}

/// Secrets visible to `node`: everything for the control plane, nothing
/// for any other node.
pub fn release_for(
    node: &str,
    control_plane: &str,
    secrets: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    if node == control_plane {
        secrets
    } else {
        BTreeMap::new()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════════

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SecretStoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SecretStoreError::Status {
        status: status.as_u16(),
        body: truncate(&body, 200),
    })
}

// The API has used several spellings over time. A blank spelling falls
// through to the next one; an entry with no usable value is dropped.
fn secret_entry(entry: &Value) -> Option<(String, String)> {
    let key = ["secretKey", "secret_key", "key"]
        .iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))?;
    let value = ["secretValue", "secret_value", "value"]
        .iter()
        .find_map(|k| entry.get(*k).filter(|v| is_present(v)))?;
    let value = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some((key.to_string(), value))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> SecretStoreCredentials {
        SecretStoreCredentials {
            client_id: "cid".into(),
            client_secret: "cs".into(),
            workspace_id: "ws-1".into(),
        }
    }

    async fn mount_login(server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({"clientId": "cid", "clientSecret": "cs"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": token})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetch_logs_in_and_lists_secrets() {
        let server = MockServer::start().await;
        mount_login(&server, "tok-1").await;

        Mock::given(method("GET"))
            .and(path(SECRETS_PATH))
            .and(header("authorization", "Bearer tok-1"))
            .and(query_param("workspaceId", "ws-1"))
            .and(query_param("environment", "production"))
            .and(query_param("secretPath", "/projects/rawkode-cloud"))
            .and(query_param("recursive", "true"))
            .and(query_param("includeImports", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secrets": [
                    {"secretKey": "GITHUB_CLIENT_ID", "secretValue": "gh-id"},
                    {"secret_key": "LEGACY", "secret_value": "old"},
                    {"key": "PORT", "value": 8080},
                    {"secretKey": "NULL_VALUE", "secretValue": null},
                    {"secretValue": "orphan"}
                ]
            })))
            .mount(&server)
            .await;

        let client = SecretStoreClient::new(server.uri()).unwrap();
        let values = client.fetch(&creds(), &SecretQuery::default()).await.unwrap();

        assert_eq!(values.len(), 3);
        assert_eq!(values["GITHUB_CLIENT_ID"], "gh-id");
        assert_eq!(values["LEGACY"], "old");
        assert_eq!(values["PORT"], "8080");
    }

    #[tokio::test]
    async fn login_without_token_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = SecretStoreClient::new(server.uri()).unwrap();
        let err = client.login("cid", "cs").await.unwrap_err();
        assert!(matches!(err, SecretStoreError::MissingToken));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let client = SecretStoreClient::new(server.uri()).unwrap();
        match client.login("cid", "cs").await {
            Err(SecretStoreError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad credentials"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_listing_is_an_error() {
        let server = MockServer::start().await;
        mount_login(&server, "tok-1").await;
        Mock::given(method("GET"))
            .and(path(SECRETS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"secrets": []})))
            .mount(&server)
            .await;

        let client = SecretStoreClient::new(format!("{}/", server.uri())).unwrap();
        let err = client.fetch(&creds(), &SecretQuery::default()).await.unwrap_err();
        assert!(matches!(err, SecretStoreError::Empty(_)));
    }

    #[test]
    fn secrets_released_only_to_control_plane() {
        let mut secrets = BTreeMap::new();
        secrets.insert("K".to_string(), "V".to_string());

        let cp = release_for("production-control-plane", "production-control-plane", secrets.clone());
        assert_eq!(cp.len(), 1);

        let other = release_for("node-7", "production-control-plane", secrets);
        assert!(other.is_empty());
    }

    #[test]
    fn blank_values_fall_through_to_next_spelling() {
        assert_eq!(secret_entry(&json!({"secretKey": "EMPTY", "secretValue": ""})), None);
        assert_eq!(secret_entry(&json!({"secretKey": "OFF", "value": false})), None);
        assert_eq!(secret_entry(&json!({"secretKey": "ZERO", "value": 0})), None);
        assert_eq!(
            secret_entry(&json!({"secretKey": "K", "secretValue": "", "value": "fallback"})),
            Some(("K".to_string(), "fallback".to_string()))
        );
        assert_eq!(
            secret_entry(&json!({"secretKey": "ON", "value": true})),
            Some(("ON".to_string(), "true".to_string()))
        );
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
