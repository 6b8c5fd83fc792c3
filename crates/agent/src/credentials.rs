//! Token credentials for the remote agent service.
//!
//! Which credential is used depends on the deployment mode:
//! development chains the Azure CLI and Azure Developer CLI logins,
//! production pins a managed identity when a client id is configured and
//! otherwise falls back to the default chain.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use mailrelay_core::config::DeploymentMode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
// off Azure the IMDS address hangs instead of refusing
const IMDS_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;
// used when a source reports no expiry
const UNKNOWN_EXPIRY_LIFETIME_SECS: i64 = 600;

#[derive(Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_on: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("`{command}` is not installed or not on PATH")]
    CommandUnavailable { command: &'static str },
    #[error("`{command}` failed: {message}")]
    CommandFailed { command: &'static str, message: String },
    #[error("{credential} is not configured: {reason}")]
    NotConfigured { credential: &'static str, reason: String },
    #[error("{credential} token endpoint returned status {status}: {body}")]
    Status { credential: &'static str, status: u16, body: String },
    #[error("could not parse token response: {0}")]
    Parse(String),
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no credential in the chain produced a token: {}", .attempts.join("; "))]
    ChainExhausted { attempts: Vec<String> },
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    fn name(&self) -> &'static str;
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Azure CLI, then Azure Developer CLI.
    DeveloperChain,
    ManagedIdentity { client_id: String },
    /// Environment, managed identity, Azure CLI, Azure Developer CLI.
    DefaultChain,
}

impl CredentialStrategy {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::DeveloperChain => "developer chain (azure cli -> azure developer cli)",
            Self::ManagedIdentity { .. } => "managed identity",
            Self::DefaultChain => "default chain (environment -> managed identity -> azure cli -> azure developer cli)",
        }
    }
}

pub fn select_credential_strategy(
    mode: DeploymentMode,
    managed_identity_client_id: Option<&str>,
) -> CredentialStrategy {
    match (mode, managed_identity_client_id.map(str::trim).filter(|id| !id.is_empty())) {
        (DeploymentMode::Development, _) => CredentialStrategy::DeveloperChain,
        (DeploymentMode::Production, Some(client_id)) => {
            CredentialStrategy::ManagedIdentity { client_id: client_id.to_string() }
        }
        (DeploymentMode::Production, None) => CredentialStrategy::DefaultChain,
    }
}

pub fn build_credential(
    strategy: &CredentialStrategy,
    http: reqwest::Client,
) -> Arc<dyn TokenCredential> {
    info!(
        event_name = "system.credential.selected",
        strategy = strategy.describe(),
        "selected token credential"
    );

    let source: Arc<dyn TokenCredential> = match strategy {
        CredentialStrategy::DeveloperChain => Arc::new(ChainedTokenCredential::new(vec![
            Arc::new(AzureCliCredential),
            Arc::new(AzureDeveloperCliCredential),
        ])),
        CredentialStrategy::ManagedIdentity { client_id } => Arc::new(
            ManagedIdentityCredential::from_env(http, Some(client_id.clone())),
        ),
        CredentialStrategy::DefaultChain => Arc::new(ChainedTokenCredential::new(vec![
            Arc::new(EnvironmentCredential::from_env(http.clone())),
            Arc::new(ManagedIdentityCredential::from_env(http, None)),
            Arc::new(AzureCliCredential),
            Arc::new(AzureDeveloperCliCredential),
        ])),
    };
    Arc::new(CachingTokenCredential::new(source))
}

struct CachedAccessToken {
    token: AccessToken,
    refresh_at: DateTime<Utc>,
}

/// Reuses each scope's token until shortly before it expires.
pub struct CachingTokenCredential {
    inner: Arc<dyn TokenCredential>,
    refresh_margin: chrono::Duration,
    cached: Mutex<HashMap<String, CachedAccessToken>>,
}

impl CachingTokenCredential {
    pub fn new(inner: Arc<dyn TokenCredential>) -> Self {
        Self::with_refresh_margin(inner, chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS))
    }

    pub fn with_refresh_margin(
        inner: Arc<dyn TokenCredential>,
        refresh_margin: chrono::Duration,
    ) -> Self {
        Self { inner, refresh_margin, cached: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl TokenCredential for CachingTokenCredential {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        // held across the fetch so concurrent callers share one refresh
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(entry) = cached.get(scope).filter(|entry| entry.refresh_at > now) {
            return Ok(entry.token.clone());
        }

        let token = self.inner.get_token(scope).await?;
        let refresh_at = match token.expires_on {
            Some(expires_on) => expires_on - self.refresh_margin,
            None => now + chrono::Duration::seconds(UNKNOWN_EXPIRY_LIFETIME_SECS),
        };
        debug!(
            event_name = "credential.token_refreshed",
            credential = self.inner.name(),
            scope,
            refresh_at = %refresh_at,
            "token refreshed"
        );
        cached.insert(scope.to_string(), CachedAccessToken { token: token.clone(), refresh_at });
        Ok(token)
    }
}

/// Tries each credential in order; the first token wins.
pub struct ChainedTokenCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedTokenCredential {
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    fn name(&self) -> &'static str {
        "ChainedTokenCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let mut attempts = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    debug!(
                        event_name = "credential.chain.selected",
                        credential = source.name(),
                        "credential produced a token"
                    );
                    return Ok(token);
                }
                Err(error) => {
                    debug!(
                        event_name = "credential.chain.skipped",
                        credential = source.name(),
                        error = %error,
                        "credential unavailable, trying next"
                    );
                    attempts.push(format!("{}: {error}", source.name()));
                }
            }
        }
        Err(CredentialError::ChainExhausted { attempts })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AzureCliCredential;

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let stdout = run_cli(
            "az",
            &["account", "get-access-token", "--scope", scope, "--output", "json"],
        )
        .await?;
        parse_az_output(&stdout)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AzureDeveloperCliCredential;

#[async_trait]
impl TokenCredential for AzureDeveloperCliCredential {
    fn name(&self) -> &'static str {
        "AzureDeveloperCliCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let stdout = run_cli("azd", &["auth", "token", "--scope", scope, "--output", "json"]).await?;
        parse_azd_output(&stdout)
    }
}

async fn run_cli(command: &'static str, args: &[&str]) -> Result<Vec<u8>, CredentialError> {
    let output = Command::new(command).args(args).output().await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            CredentialError::CommandUnavailable { command }
        } else {
            CredentialError::CommandFailed { command, message: error.to_string() }
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CredentialError::CommandFailed {
            command,
            message: stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzCliToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

fn parse_az_output(stdout: &[u8]) -> Result<AccessToken, CredentialError> {
    let parsed: AzCliToken =
        serde_json::from_slice(stdout).map_err(|error| CredentialError::Parse(error.to_string()))?;

    // newer az releases add a unix `expires_on`; older ones only print local time
    let expires_on = parsed
        .expires_on_epoch
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .or_else(|| {
            parsed.expires_on.as_deref().and_then(|raw| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
        });

    Ok(AccessToken { token: SecretString::from(parsed.access_token), expires_on })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzdToken {
    token: String,
    #[serde(default)]
    expires_on: Option<String>,
}

fn parse_azd_output(stdout: &[u8]) -> Result<AccessToken, CredentialError> {
    let parsed: AzdToken =
        serde_json::from_slice(stdout).map_err(|error| CredentialError::Parse(error.to_string()))?;
    let expires_on = parsed
        .expires_on
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|timestamp| timestamp.with_timezone(&Utc));

    Ok(AccessToken { token: SecretString::from(parsed.token), expires_on })
}

/// Where a managed identity token comes from.
#[derive(Clone, Debug)]
pub enum ManagedIdentitySource {
    /// App Service and Container Apps expose a local endpoint guarded by a header secret.
    AppService { endpoint: String, header: SecretString },
    Imds { endpoint: String },
}

impl ManagedIdentitySource {
    pub fn from_env() -> Self {
        match (read_env("IDENTITY_ENDPOINT"), read_env("IDENTITY_HEADER")) {
            (Some(endpoint), Some(header)) => {
                Self::AppService { endpoint, header: SecretString::from(header) }
            }
            _ => Self::Imds { endpoint: IMDS_ENDPOINT.to_string() },
        }
    }
}

pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    client_id: Option<String>,
    source: ManagedIdentitySource,
}

impl ManagedIdentityCredential {
    pub fn new(
        http: reqwest::Client,
        client_id: Option<String>,
        source: ManagedIdentitySource,
    ) -> Self {
        Self { http, client_id, source }
    }

    pub fn from_env(http: reqwest::Client, client_id: Option<String>) -> Self {
        Self::new(http, client_id, ManagedIdentitySource::from_env())
    }
}

#[derive(Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<Value>,
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let resource = scope_to_resource(scope);
        let mut query = vec![("resource", resource)];
        if let Some(client_id) = self.client_id.as_deref() {
            query.push(("client_id", client_id));
        }

        let request = match &self.source {
            ManagedIdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.http
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header.expose_secret())
                    .query(&query)
            }
            ManagedIdentitySource::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
                    .timeout(IMDS_REQUEST_TIMEOUT)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Status {
                credential: self.name(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ManagedIdentityToken =
            response.json().await.map_err(|error| CredentialError::Parse(error.to_string()))?;
        Ok(AccessToken {
            token: SecretString::from(parsed.access_token),
            expires_on: parsed.expires_on.as_ref().and_then(epoch_from_value),
        })
    }
}

/// Client-secret credential read from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
/// and `AZURE_CLIENT_SECRET`.
pub struct EnvironmentCredential {
    http: reqwest::Client,
    authority: String,
    settings: Option<ClientSecretSettings>,
}

#[derive(Clone)]
struct ClientSecretSettings {
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
}

impl EnvironmentCredential {
    pub fn from_env(http: reqwest::Client) -> Self {
        let settings = match (
            read_env("AZURE_TENANT_ID"),
            read_env("AZURE_CLIENT_ID"),
            read_env("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(ClientSecretSettings {
                tenant_id,
                client_id,
                client_secret: SecretString::from(client_secret),
            }),
            _ => None,
        };
        let authority = read_env("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY.to_string());
        Self { http, authority, settings }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_some()
    }
}

#[derive(Deserialize)]
struct ClientSecretToken {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &'static str {
        "EnvironmentCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let settings = self.settings.as_ref().ok_or_else(|| CredentialError::NotConfigured {
            credential: self.name(),
            reason: "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET must all be set"
                .to_string(),
        })?;

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            settings.tenant_id
        );
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.expose_secret()),
                ("scope", scope),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Status {
                credential: self.name(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClientSecretToken =
            response.json().await.map_err(|error| CredentialError::Parse(error.to_string()))?;
        Ok(AccessToken {
            token: SecretString::from(parsed.access_token),
            expires_on: parsed
                .expires_in
                .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds)),
        })
    }
}

fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Managed identity endpoints report `expires_on` as epoch seconds, either
/// as a number or a string.
fn epoch_from_value(value: &Value) -> Option<DateTime<Utc>> {
    let seconds = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    Utc.timestamp_opt(seconds, 0).single()
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::{Duration, Utc};
    use mailrelay_core::config::DeploymentMode;
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::{json, Value};

    use super::{
        epoch_from_value, parse_az_output, parse_azd_output, scope_to_resource,
        select_credential_strategy, AccessToken, CachingTokenCredential, ChainedTokenCredential,
        CredentialError, CredentialStrategy, ManagedIdentityCredential, ManagedIdentitySource, TokenCredential,
    };

    struct FixedCredential {
        name: &'static str,
        token: Option<&'static str>,
        lifetime: Option<chrono::Duration>,
        calls: AtomicU32,
    }

    impl FixedCredential {
        fn new(name: &'static str, token: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self { name, token, lifetime: None, calls: AtomicU32::new(0) })
        }

        fn expiring_in(name: &'static str, lifetime: chrono::Duration) -> Arc<Self> {
            Arc::new(Self { name, token: Some("fresh"), lifetime: Some(lifetime), calls: AtomicU32::new(0) })
        }
    }

    #[async_trait]
    impl TokenCredential for FixedCredential {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn get_token(&self, _scope: &str) -> Result<AccessToken, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.token {
                Some(token) => Ok(AccessToken {
                    token: SecretString::from(token.to_string()),
                    expires_on: self.lifetime.map(|lifetime| Utc::now() + lifetime),
                }),
                None => Err(CredentialError::CommandUnavailable { command: "az" }),
            }
        }
    }

    #[test]
    fn development_selects_developer_chain_even_with_client_id() {
        assert_eq!(
            select_credential_strategy(DeploymentMode::Development, None),
            CredentialStrategy::DeveloperChain
        );
        assert_eq!(
            select_credential_strategy(DeploymentMode::Development, Some("mi-123")),
            CredentialStrategy::DeveloperChain
        );
    }

    #[test]
    fn production_with_client_id_pins_managed_identity() {
        assert_eq!(
            select_credential_strategy(DeploymentMode::Production, Some("mi-123")),
            CredentialStrategy::ManagedIdentity { client_id: "mi-123".to_string() }
        );
    }

    #[test]
    fn production_without_client_id_uses_default_chain() {
        assert_eq!(
            select_credential_strategy(DeploymentMode::Production, None),
            CredentialStrategy::DefaultChain
        );
        assert_eq!(
            select_credential_strategy(DeploymentMode::Production, Some("  ")),
            CredentialStrategy::DefaultChain
        );
    }

    #[tokio::test]
    async fn chain_returns_first_success_and_stops() {
        let cli = FixedCredential::new("cli", None);
        let developer_cli = FixedCredential::new("azd", Some("azd-token"));
        let never = FixedCredential::new("never", Some("unused"));
        let chain =
            ChainedTokenCredential::new(vec![cli.clone(), developer_cli.clone(), never.clone()]);

        let token = chain.get_token("scope/.default").await.expect("token");

        assert_eq!(token.token.expose_secret(), "azd-token");
        assert_eq!(cli.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_lists_every_attempt() {
        let chain = ChainedTokenCredential::new(vec![
            FixedCredential::new("first", None),
            FixedCredential::new("second", None),
        ]);

        let error = chain.get_token("scope").await.expect_err("chain should fail");
        let CredentialError::ChainExhausted { attempts } = &error else {
            panic!("unexpected error: {error}");
        };
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].starts_with("first:"));
        assert!(error.to_string().contains("second:"));
    }

    #[tokio::test]
    async fn cache_reuses_token_per_scope_until_refresh_margin() {
        let source = FixedCredential::expiring_in("az", Duration::hours(1));
        let credential = CachingTokenCredential::new(source.clone());

        for _ in 0..3 {
            credential.get_token("scope/.default").await.expect("token");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        credential.get_token("other/.default").await.expect("token");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(credential.name(), "az");
    }

    #[tokio::test]
    async fn cache_refetches_tokens_inside_refresh_margin() {
        let source = FixedCredential::expiring_in("az", Duration::minutes(2));
        let credential = CachingTokenCredential::with_refresh_margin(source.clone(), Duration::minutes(5));

        credential.get_token("scope").await.expect("token");
        credential.get_token("scope").await.expect("token");

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_keeps_tokens_without_expiry_and_never_caches_failures() {
        let fixed = FixedCredential::new("static", Some("t"));
        let credential = CachingTokenCredential::new(fixed.clone());
        credential.get_token("scope").await.expect("token");
        credential.get_token("scope").await.expect("token");
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 1);

        let failing = FixedCredential::new("cli", None);
        let credential = CachingTokenCredential::new(failing.clone());
        assert!(credential.get_token("scope").await.is_err());
        assert!(credential.get_token("scope").await.is_err());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn parses_az_cli_output_with_epoch() {
        let token = parse_az_output(
            br#"{"accessToken":"az-token","expiresOn":"2026-01-01 10:00:00.000000","expires_on":1767261600,"tokenType":"Bearer"}"#,
        )
        .expect("parse az output");

        assert_eq!(token.token.expose_secret(), "az-token");
        assert_eq!(token.expires_on.map(|at| at.timestamp()), Some(1_767_261_600));
    }

    #[test]
    fn parses_legacy_az_cli_output() {
        let token =
            parse_az_output(br#"{"accessToken":"az-token","expiresOn":"2026-01-01 10:00:00.123456"}"#)
                .expect("parse az output");
        assert!(token.expires_on.is_some());
    }

    #[test]
    fn parses_azd_output() {
        let token = parse_azd_output(br#"{"token":"azd-token","expiresOn":"2026-01-01T10:00:00Z"}"#)
            .expect("parse azd output");

        assert_eq!(token.token.expose_secret(), "azd-token");
        assert_eq!(token.expires_on.map(|at| at.timestamp()), Some(1_767_261_600));
    }

    #[test]
    fn malformed_cli_output_is_a_parse_error() {
        assert!(matches!(parse_az_output(b"not json"), Err(CredentialError::Parse(_))));
    }

    #[test]
    fn scope_and_expiry_helpers() {
        assert_eq!(
            scope_to_resource("https://cognitiveservices.azure.com/.default"),
            "https://cognitiveservices.azure.com"
        );
        assert_eq!(epoch_from_value(&json!("1767261600")).map(|at| at.timestamp()), Some(1_767_261_600));
        assert_eq!(epoch_from_value(&json!(1_767_261_600)).map(|at| at.timestamp()), Some(1_767_261_600));
        assert!(epoch_from_value(&json!(null)).is_none());
    }

    #[test]
    fn access_token_debug_redacts_secret() {
        let token = AccessToken { token: SecretString::from("super-secret".to_string()), expires_on: None };
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn managed_identity_queries_imds_with_client_id() {
        async fn imds(
            headers: HeaderMap,
            Query(query): Query<std::collections::HashMap<String, String>>,
        ) -> Json<Value> {
            assert_eq!(headers.get("metadata").and_then(|v| v.to_str().ok()), Some("true"));
            assert_eq!(query.get("resource").map(String::as_str), Some("https://cognitiveservices.azure.com"));
            assert_eq!(query.get("client_id").map(String::as_str), Some("mi-123"));
            Json(json!({"access_token": "mi-token", "expires_on": "1767261600"}))
        }

        let app = Router::new().route("/metadata/identity/oauth2/token", get(imds));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let address = listener.local_addr().expect("mock address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        let credential = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            Some("mi-123".to_string()),
            ManagedIdentitySource::Imds {
                endpoint: format!("http://{address}/metadata/identity/oauth2/token"),
            },
        );
        let token = credential
            .get_token("https://cognitiveservices.azure.com/.default")
            .await
            .expect("managed identity token");

        assert_eq!(token.token.expose_secret(), "mi-token");
        assert_eq!(token.expires_on.map(|at| at.timestamp()), Some(1_767_261_600));
    }
}
