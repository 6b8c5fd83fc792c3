//! Outbound replies through the Bot Connector REST API.
//!
//! Replies are posted to `{serviceUrl}/v3/conversations/{id}/activities/{replyToId}`.
//! When bot credentials are configured the request carries a bearer token
//! obtained with the client-credentials grant and cached until shortly before
//! it expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::activity::{Activity, ChannelAccount};
use crate::cards::{AdaptiveCard, ADAPTIVE_CARD_CONTENT_TYPE};

pub const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";
pub const BOT_FRAMEWORK_TENANT: &str = "botframework.com";
pub const BOT_FRAMEWORK_SCOPE: &str = "https://api.botframework.com/.default";

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Card(AdaptiveCard),
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Card(_) => None,
        }
    }

    pub fn as_card(&self) -> Option<&AdaptiveCard> {
        match self {
            Self::Card(card) => Some(card),
            Self::Text(_) => None,
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::Text(text) => json!({ "type": "message", "text": text }),
            Self::Card(card) => json!({
                "type": "message",
                "attachments": [{
                    "contentType": ADAPTIVE_CARD_CONTENT_TYPE,
                    "content": card,
                }],
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("activity has no service url to reply to")]
    MissingServiceUrl,
    #[error("invalid service url `{0}`")]
    InvalidServiceUrl(String),
    #[error("bot token request failed with status {status}")]
    Token { status: u16 },
    #[error("connector rejected reply with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("connector request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The seam every reply to the user goes through.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

#[derive(Clone)]
pub struct BotCredentials {
    pub app_id: String,
    pub app_password: SecretString,
    pub tenant_id: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

struct BotAuthenticator {
    credentials: BotCredentials,
    login_base: String,
    cached: Mutex<Option<CachedToken>>,
}

impl BotAuthenticator {
    async fn bearer(&self, http: &reqwest::Client) -> Result<SecretString, TransportError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.refresh_at > Instant::now()) {
            return Ok(token.token.clone());
        }

        let tenant = self.credentials.tenant_id.as_deref().unwrap_or(BOT_FRAMEWORK_TENANT);
        let url = format!("{}/{tenant}/oauth2/v2.0/token", self.login_base.trim_end_matches('/'));
        let response = http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.app_id.as_str()),
                ("client_secret", self.credentials.app_password.expose_secret()),
                ("scope", BOT_FRAMEWORK_SCOPE),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::Token { status: response.status().as_u16() });
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3_600));
        let token = SecretString::from(body.access_token);
        *cached = Some(CachedToken {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        debug!(event_name = "connector.token_refreshed", tenant, "bot token refreshed");
        Ok(token)
    }
}

#[derive(Clone)]
pub struct ConnectorClient {
    http: reqwest::Client,
    auth: Option<Arc<BotAuthenticator>>,
}

impl ConnectorClient {
    /// Without credentials replies are sent unauthenticated, which only the
    /// local emulator accepts.
    pub fn new(http: reqwest::Client, credentials: Option<BotCredentials>) -> Self {
        Self::with_login_base(http, credentials, DEFAULT_LOGIN_BASE)
    }

    pub fn with_login_base(
        http: reqwest::Client,
        credentials: Option<BotCredentials>,
        login_base: impl Into<String>,
    ) -> Self {
        let login_base = login_base.into();
        let auth = credentials.map(|credentials| {
            Arc::new(BotAuthenticator { credentials, login_base, cached: Mutex::new(None) })
        });
        Self { http, auth }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    /// Binds a sink that replies into the conversation `activity` came from.
    pub fn reply_sink(&self, activity: &Activity) -> Result<ConnectorReplySink, TransportError> {
        let service_url =
            activity.service_url.as_deref().ok_or(TransportError::MissingServiceUrl)?;
        let url = reply_url(service_url, &activity.conversation.id, activity.id.as_deref())?;

        Ok(ConnectorReplySink {
            client: self.clone(),
            url,
            conversation_id: activity.conversation.id.clone(),
            reply_to_id: activity.id.clone(),
            from: activity.recipient.clone(),
            recipient: activity.from.clone(),
        })
    }
}

fn reply_url(
    service_url: &str,
    conversation_id: &str,
    reply_to_id: Option<&str>,
) -> Result<Url, TransportError> {
    let invalid = || TransportError::InvalidServiceUrl(service_url.to_string());
    let mut url = Url::parse(service_url).map_err(|_| invalid())?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
        segments.pop_if_empty().extend(["v3", "conversations", conversation_id, "activities"]);
        if let Some(reply_to_id) = reply_to_id {
            segments.push(reply_to_id);
        }
    }
    Ok(url)
}

pub struct ConnectorReplySink {
    client: ConnectorClient,
    url: Url,
    conversation_id: String,
    reply_to_id: Option<String>,
    from: Option<ChannelAccount>,
    recipient: ChannelAccount,
}

impl ConnectorReplySink {
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn activity(&self, message: &OutboundMessage) -> Value {
        let mut payload = message.payload();
        payload["conversation"] = json!({ "id": self.conversation_id });
        payload["recipient"] = json!(self.recipient);
        if let Some(from) = &self.from {
            payload["from"] = json!(from);
        }
        if let Some(reply_to_id) = &self.reply_to_id {
            payload["replyToId"] = json!(reply_to_id);
        }
        payload
    }
}

#[async_trait]
impl ReplySink for ConnectorReplySink {
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let mut request = self.client.http.post(self.url.clone()).json(&self.activity(&message));
        if let Some(auth) = &self.client.auth {
            let token = auth.bearer(&self.client.http).await?;
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }

        let kind = if message.as_card().is_some() { "card" } else { "text" };
        info!(
            event_name = "connector.reply_sent",
            correlation_id = %self.conversation_id,
            kind,
            "reply delivered"
        );
        Ok(())
    }
}

/// Collects replies in memory instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingReplySink {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingReplySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|message| message.as_text().map(str::to_owned))
            .collect()
    }
}

#[async_trait]
impl ReplySink for RecordingReplySink {
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}
