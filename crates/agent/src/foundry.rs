//! Client for the hosted agent service: conversations hold the history,
//! responses run the named agent against a conversation.

use std::sync::Arc;

use async_trait::async_trait;
use mailrelay_core::{ApprovalRequest, ApprovalRequestId, RemoteConversationId};
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::credentials::{CredentialError, TokenCredential};

/// Substring the service puts in errors raised when a connector has not
/// been authorized for the user.
pub const AUTH_FAILURE_MARKER: &str = "Failed to fetch access token";
pub const AUTH_FAILURE_CODE: &str = "tool_user_error";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message { role: String, content: String },
}

impl ConversationItem {
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::Message { role: "user".to_string(), content: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    McpApprovalResponse { approve: bool, approval_request_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReference {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl AgentReference {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: "agent_reference".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResponseRequest {
    pub conversation: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<InputItem>,
    pub agent: AgentReference,
}

impl ResponseRequest {
    /// Runs the agent over whatever the conversation already holds.
    pub fn continue_conversation(conversation: &RemoteConversationId, agent: AgentReference) -> Self {
        Self { conversation: conversation.0.clone(), input: Vec::new(), agent }
    }

    pub fn approval(
        conversation: &RemoteConversationId,
        request_id: &ApprovalRequestId,
        approve: bool,
        agent: AgentReference,
    ) -> Self {
        Self {
            conversation: conversation.0.clone(),
            input: vec![InputItem::McpApprovalResponse {
                approve,
                approval_request_id: request_id.0.clone(),
            }],
            agent,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct AgentResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    OauthConsentRequest {
        #[serde(default)]
        consent_link: Option<String>,
        #[serde(default)]
        service_name: Option<String>,
    },
    McpApprovalRequest {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<Value>,
        #[serde(default)]
        server_label: Option<String>,
    },
    Message {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: Vec<MessageContent>,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    OutputText {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsentRequest {
    pub consent_link: Option<String>,
    pub service_name: Option<String>,
}

impl AgentResponse {
    /// Top-level `output_text`, else the concatenated text parts of message
    /// items. Empty text counts as absent.
    pub fn output_text(&self) -> Option<String> {
        if let Some(text) = self.output_text.as_deref().filter(|text| !text.is_empty()) {
            return Some(text.to_string());
        }

        let joined = self
            .output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content, .. } => Some(content),
                _ => None,
            })
            .flatten()
            .filter_map(|part| match part {
                MessageContent::OutputText { text } => Some(text.as_str()),
                MessageContent::Other => None,
            })
            .collect::<String>();
        (!joined.is_empty()).then_some(joined)
    }

    pub fn consent_request(&self) -> Option<ConsentRequest> {
        self.output.iter().find_map(|item| match item {
            OutputItem::OauthConsentRequest { consent_link, service_name } => Some(ConsentRequest {
                consent_link: consent_link.clone().filter(|link| !link.is_empty()),
                service_name: service_name.clone(),
            }),
            _ => None,
        })
    }

    /// Missing fields fall back to an empty id, `Unknown Action` and `{}`.
    pub fn approval_request(&self) -> Option<ApprovalRequest> {
        self.output.iter().find_map(|item| match item {
            OutputItem::McpApprovalRequest { id, name, arguments, .. } => Some(ApprovalRequest {
                id: ApprovalRequestId(id.clone().unwrap_or_default()),
                name: name.clone().unwrap_or_else(|| "Unknown Action".to_string()),
                arguments: arguments.clone().unwrap_or_else(|| json!({})),
            }),
            _ => None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Connect,
    Timeout,
    Status,
    Decode,
    Credential,
}

#[derive(Debug, Error)]
#[error("{}", describe_remote_error(.status, .code, .message))]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

fn describe_remote_error(status: &Option<u16>, code: &Option<String>, message: &str) -> String {
    match (status, code.as_deref()) {
        (Some(status), Some(code)) => format!("{status} {code}: {message}"),
        (Some(status), None) => format!("{status}: {message}"),
        (None, Some(code)) => format!("{code}: {message}"),
        (None, None) => message.to_string(),
    }
}

impl RemoteError {
    pub fn status(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self { kind: RemoteErrorKind::Status, status: Some(status), code, message: message.into() }
    }

    pub fn with_kind(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self { kind, status: None, code: None, message: message.into() }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            RemoteErrorKind::Timeout
        } else if error.is_connect() {
            RemoteErrorKind::Connect
        } else if error.is_decode() {
            RemoteErrorKind::Decode
        } else {
            RemoteErrorKind::Connect
        };
        let mut remote = Self::with_kind(kind, error.to_string());
        remote.status = error.status().map(|status| status.as_u16());
        remote
    }
}

impl From<CredentialError> for RemoteError {
    fn from(error: CredentialError) -> Self {
        Self::with_kind(RemoteErrorKind::Credential, error.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteErrorClass {
    /// A connector needs the user's authorization; retrying will not help.
    AuthRequired,
    Transient,
    Fatal,
}

/// The remote error taxonomy is not documented, so these rules are a
/// heuristic built from observed failures and may need extending.
pub fn classify_remote_error(error: &RemoteError) -> RemoteErrorClass {
    if error.message.contains(AUTH_FAILURE_MARKER)
        || error.code.as_deref() == Some(AUTH_FAILURE_CODE)
    {
        return RemoteErrorClass::AuthRequired;
    }

    match (error.kind, error.status) {
        (RemoteErrorKind::Connect | RemoteErrorKind::Timeout, _) => RemoteErrorClass::Transient,
        (_, Some(408 | 429 | 500..=599)) => RemoteErrorClass::Transient,
        _ => RemoteErrorClass::Fatal,
    }
}

#[async_trait]
pub trait AgentService: Send + Sync {
    async fn create_conversation(
        &self,
        items: Vec<ConversationItem>,
    ) -> Result<RemoteConversationId, RemoteError>;

    async fn create_response(&self, request: ResponseRequest) -> Result<AgentResponse, RemoteError>;
}

#[derive(Deserialize)]
struct CreatedConversation {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`AgentService`] over the project's OpenAI-compatible endpoints.
pub struct FoundryClient {
    http: reqwest::Client,
    endpoint: Url,
    api_version: String,
    token_scope: String,
    credential: Arc<dyn TokenCredential>,
}

impl FoundryClient {
    pub fn new(
        http: reqwest::Client,
        project_endpoint: &str,
        api_version: impl Into<String>,
        token_scope: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, RemoteError> {
        let endpoint = Url::parse(project_endpoint).map_err(|error| {
            RemoteError::with_kind(
                RemoteErrorKind::Connect,
                format!("invalid project endpoint `{project_endpoint}`: {error}"),
            )
        })?;
        Ok(Self {
            http,
            endpoint,
            api_version: api_version.into(),
            token_scope: token_scope.into(),
            credential,
        })
    }

    fn url(&self, resource: &str) -> Result<Url, RemoteError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::with_kind(RemoteErrorKind::Connect, "project endpoint cannot be a base")
            })?
            .pop_if_empty()
            .extend(["openai", resource]);
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(url)
    }

    async fn post<B, T>(&self, resource: &str, body: &B) -> Result<T, RemoteError>
    where
        B: Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let token = self.credential.get_token(&self.token_scope).await?;
        let response = self
            .http
            .post(self.url(resource)?)
            .bearer_auth(token.token.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &raw));
        }

        response.json::<T>().await.map_err(RemoteError::from)
    }
}

fn error_from_body(status: u16, raw: &str) -> RemoteError {
    match serde_json::from_str::<ErrorEnvelope>(raw) {
        Ok(envelope) => RemoteError::status(
            status,
            envelope.error.code,
            envelope.error.message.unwrap_or_else(|| raw.to_string()),
        ),
        Err(_) => RemoteError::status(status, None, raw.to_string()),
    }
}

#[async_trait]
impl AgentService for FoundryClient {
    async fn create_conversation(
        &self,
        items: Vec<ConversationItem>,
    ) -> Result<RemoteConversationId, RemoteError> {
        let created: CreatedConversation =
            self.post("conversations", &json!({ "items": items })).await?;
        debug!(event_name = "foundry.conversation_created", conversation_id = %created.id, "conversation created");
        Ok(RemoteConversationId(created.id))
    }

    async fn create_response(&self, request: ResponseRequest) -> Result<AgentResponse, RemoteError> {
        let response: AgentResponse = self.post("responses", &request).await?;
        debug!(
            event_name = "foundry.response_created",
            response_id = response.id.as_deref().unwrap_or_default(),
            output_items = response.output.len(),
            "response created"
        );
        Ok(response)
    }
}
