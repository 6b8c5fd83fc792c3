//! The conversation relay: one inbound activity in, one or more replies out.
//!
//! Each message is classified once and then handled by exactly one branch:
//! an approval card submission, a `retry` that resumes a conversation paused
//! on OAuth consent, or a fresh message sent to the remote agent. Failures
//! never escape [`ConversationRelay::handle`]; the user gets an apology
//! instead.

use std::sync::Arc;

use chrono::Utc;
use mailrelay_core::config::AppConfig;
use mailrelay_core::{
    retry_with_backoff_if, ApprovalDecision, ConversationKey, PendingAuthorization,
    PendingAuthorizationStore, RemoteConversationId, RetryPolicy, Sleeper, TokioSleeper,
};
use mailrelay_teams::activity::{classify_message, Activity, ActivityKind, InboundMessage};
use mailrelay_teams::cards::{approval_card, oauth_consent_card};
use mailrelay_teams::{OutboundMessage, ReplySink, TransportError};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::credentials::{CredentialError, TokenCredential};
use crate::foundry::{
    classify_remote_error, AgentReference, AgentResponse, AgentService, ConversationItem,
    RemoteError, RemoteErrorClass, ResponseRequest,
};

pub const GREETING: &str = "Hi there! I'm an AI agent that can help you with your mail.";
pub const APPROVED_ACKNOWLEDGEMENT: &str = "✓ Approved - Processing your request...";
pub const DENIED_ACKNOWLEDGEMENT: &str = "✗ Denied - Processing your request...";
pub const APPROVAL_PROCESSING: &str = "Processing your request...";
pub const ACTION_APPROVED: &str = "✓ Action approved!";
pub const ACTION_DENIED: &str = "✗ Action denied.";
pub const RETRY_FAILED: &str = "Failed to retry the request. Please try again.";
pub const NO_RESPONSE: &str = "I'm sorry, I couldn't generate a response.";
pub const GENERIC_ERROR: &str =
    "I'm sorry, I encountered an error while processing your request.";
pub const CONSENT_LINK_MISSING: &str = "⚠️ Authorization is required, but the authorization link is missing. Please authorize the connections manually in Azure AI Foundry Studio.";
pub const AUTHORIZATION_INSTRUCTIONS: &str = "⚠️ **Authorization Required**\n\n\
The agent needs authorization to access Microsoft SharePoint and OneDrive to help you with mail-related tasks.\n\n\
**How to fix this:**\n\
1. Go to [Azure AI Foundry Studio](https://ai.azure.com)\n\
2. Navigate to your project: `agent-dev-project`\n\
3. Go to **Connections** section\n\
4. Find the **MicrosoftSharePointand** connection\n\
5. Click **Authorize** and sign in with your Microsoft 365 account\n\n\
After authorizing, try your request again!";
pub const DEFAULT_SERVICE_NAME: &str = "Service";

const PREVIEW_CHARS: usize = 80;

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub agent_name: String,
    pub token_scope: String,
    pub retry: RetryPolicy,
}

impl RelaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            agent_name: config.foundry.agent_name.clone(),
            token_scope: config.foundry.token_scope.clone(),
            retry: config.retry_policy(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("credential check failed: {0}")]
    Credential(#[from] CredentialError),
    #[error("remote agent call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("reply could not be delivered: {0}")]
    Transport(#[from] TransportError),
}

/// How handling a single activity ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    Greeted,
    Ignored,
    /// `confirmed` is false when the remote submission failed and the user
    /// got the canned acknowledgement instead.
    ApprovalRelayed { approved: bool, confirmed: bool },
    Resumed,
    ResumeFailed,
    Replied,
    ConsentRequested,
    ConsentLinkMissing,
    ApprovalRequested,
    AuthorizationRequired,
    Failed,
}

pub struct ConversationRelay {
    agent: Arc<dyn AgentService>,
    credential: Arc<dyn TokenCredential>,
    pending: Arc<PendingAuthorizationStore>,
    sleeper: Arc<dyn Sleeper>,
    settings: RelaySettings,
}

impl ConversationRelay {
    pub fn new(
        agent: Arc<dyn AgentService>,
        credential: Arc<dyn TokenCredential>,
        pending: Arc<PendingAuthorizationStore>,
        settings: RelaySettings,
    ) -> Self {
        Self { agent, credential, pending, sleeper: Arc::new(TokioSleeper), settings }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn pending(&self) -> &Arc<PendingAuthorizationStore> {
        &self.pending
    }

    /// Handles one activity to completion. Never fails: any error is logged
    /// and answered with [`GENERIC_ERROR`].
    pub async fn handle(&self, activity: &Activity, sink: &dyn ReplySink) -> RelayOutcome {
        let correlation_id = activity.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        match self.dispatch(activity, sink, &correlation_id).await {
            Ok(outcome) => {
                debug!(
                    event_name = "relay.completed",
                    correlation_id = %correlation_id,
                    outcome = ?outcome,
                    "activity handled"
                );
                outcome
            }
            Err(relay_error) => {
                error!(
                    event_name = "relay.failed",
                    correlation_id = %correlation_id,
                    error = %relay_error,
                    "activity handling failed"
                );
                if let Err(send_error) = sink.send(OutboundMessage::text(GENERIC_ERROR)).await {
                    error!(
                        event_name = "relay.apology_undelivered",
                        correlation_id = %correlation_id,
                        error = %send_error,
                        "could not deliver error reply"
                    );
                }
                RelayOutcome::Failed
            }
        }
    }

    async fn dispatch(
        &self,
        activity: &Activity,
        sink: &dyn ReplySink,
        correlation_id: &str,
    ) -> Result<RelayOutcome, RelayError> {
        match activity.kind() {
            ActivityKind::ConversationUpdate => self.greet(activity, sink, correlation_id).await,
            ActivityKind::Message => self.on_message(activity, sink, correlation_id).await,
            ActivityKind::Other(kind) => {
                debug!(
                    event_name = "relay.activity_ignored",
                    correlation_id = %correlation_id,
                    activity_type = %kind,
                    "ignoring unsupported activity type"
                );
                Ok(RelayOutcome::Ignored)
            }
        }
    }

    async fn greet(
        &self,
        activity: &Activity,
        sink: &dyn ReplySink,
        correlation_id: &str,
    ) -> Result<RelayOutcome, RelayError> {
        if activity.added_users().next().is_none() {
            return Ok(RelayOutcome::Ignored);
        }

        sink.send(OutboundMessage::text(GREETING)).await?;
        info!(event_name = "relay.greeting.sent", correlation_id = %correlation_id, "greeted new member");
        Ok(RelayOutcome::Greeted)
    }

    async fn on_message(
        &self,
        activity: &Activity,
        sink: &dyn ReplySink,
        correlation_id: &str,
    ) -> Result<RelayOutcome, RelayError> {
        match classify_message(activity) {
            InboundMessage::ApprovalSubmission(decision) => {
                self.relay_approval(decision, sink, correlation_id).await
            }
            InboundMessage::RetryKeyword { text } => {
                let key = activity.conversation_key();
                match self.pending.pop(&key).await {
                    Some(pending) => self.resume(pending, sink, correlation_id).await,
                    None => {
                        debug!(
                            event_name = "relay.retry.nothing_pending",
                            correlation_id = %correlation_id,
                            conversation_key = %key,
                            "retry keyword without a paused conversation"
                        );
                        self.relay_fresh(activity, &text, sink, correlation_id).await
                    }
                }
            }
            InboundMessage::Text(text) => self.relay_fresh(activity, &text, sink, correlation_id).await,
            InboundMessage::Empty => {
                debug!(
                    event_name = "relay.message.empty",
                    correlation_id = %correlation_id,
                    "message has no text, skipping"
                );
                Ok(RelayOutcome::Ignored)
            }
        }
    }

    async fn relay_approval(
        &self,
        decision: ApprovalDecision,
        sink: &dyn ReplySink,
        correlation_id: &str,
    ) -> Result<RelayOutcome, RelayError> {
        let approved = decision.action.is_approve();
        info!(
            event_name = "relay.approval.received",
            correlation_id = %correlation_id,
            action = decision.action.label(),
            request_id = %decision.request_id.0,
            remote_conversation_id = %decision.conversation_id.0,
            "approval decision received"
        );

        let acknowledgement =
            if approved { APPROVED_ACKNOWLEDGEMENT } else { DENIED_ACKNOWLEDGEMENT };
        sink.send(OutboundMessage::text(acknowledgement)).await?;

        let request = ResponseRequest::approval(
            &decision.conversation_id,
            &decision.request_id,
            approved,
            self.agent_reference(),
        );

        let (reply, confirmed) = match self.create_response(request).await {
            Ok(response) => {
                info!(
                    event_name = "relay.approval.submitted",
                    correlation_id = %correlation_id,
                    approved,
                    "approval decision accepted by agent"
                );
                let reply = if approved {
                    response.output_text().unwrap_or_else(|| APPROVAL_PROCESSING.to_string())
                } else {
                    ACTION_DENIED.to_string()
                };
                (reply, true)
            }
            Err(remote_error) => {
                // the user still gets an answer; the remote failure stays in the logs
                warn!(
                    event_name = "relay.approval.submit_failed",
                    correlation_id = %correlation_id,
                    error = %remote_error,
                    "approval submission failed, sending fallback acknowledgement"
                );
                let fallback = if approved { ACTION_APPROVED } else { ACTION_DENIED };
                (fallback.to_string(), false)
            }
        };

        sink.send(OutboundMessage::Text(reply)).await?;
        Ok(RelayOutcome::ApprovalRelayed { approved, confirmed })
    }

    /// The popped entry is not restored on failure; a retry is single-shot.
    async fn resume(
        &self,
        pending: PendingAuthorization,
        sink: &dyn ReplySink,
        correlation_id: &str,
    ) -> Result<RelayOutcome, RelayError> {
        info!(
            event_name = "relay.retry.resuming",
            correlation_id = %correlation_id,
            conversation_key = %pending.conversation_key,
            remote_conversation_id = %pending.remote_conversation_id.0,
            paused_at = pending.created_at_millis(),
            "resuming conversation after authorization"
        );

        let request = ResponseRequest::continue_conversation(
            &pending.remote_conversation_id,
            self.agent_reference(),
        );
        match self.create_response(request).await {
            Ok(response) => {
                info!(
                    event_name = "relay.retry.response_created",
                    correlation_id = %correlation_id,
                    output_items = response.output.len(),
                    "resumed conversation answered"
                );
                let answer = response.output_text().unwrap_or_else(|| NO_RESPONSE.to_string());
                sink.send(OutboundMessage::Text(answer)).await?;
                Ok(RelayOutcome::Resumed)
            }
            Err(remote_error) => {
                warn!(
                    event_name = "relay.retry.failed",
                    correlation_id = %correlation_id,
                    error = %remote_error,
                    "resuming conversation failed"
                );
                sink.send(OutboundMessage::text(RETRY_FAILED)).await?;
                Ok(RelayOutcome::ResumeFailed)
            }
        }
    }

    async fn relay_fresh(
        &self,
        activity: &Activity,
        text: &str,
        sink: &dyn ReplySink,
        correlation_id: &str,
    ) -> Result<RelayOutcome, RelayError> {
        info!(
            event_name = "relay.fresh.received",
            correlation_id = %correlation_id,
            agent = %self.settings.agent_name,
            preview = %preview(text),
            "processing message"
        );
        debug!(
            event_name = "relay.fresh.user_context",
            correlation_id = %correlation_id,
            user_id = %activity.from.id,
            user_name = activity.from.name.as_deref().unwrap_or_default(),
            aad_object_id = activity.from.aad_object_id.as_deref().unwrap_or_default(),
            channel_id = %activity.channel_id,
            tenant_id = activity.tenant_id().unwrap_or("unavailable"),
            "user context"
        );

        let token = self.credential.get_token(&self.settings.token_scope).await?;
        debug!(
            event_name = "relay.fresh.token_ok",
            correlation_id = %correlation_id,
            expires_on = ?token.expires_on,
            "credential check passed"
        );

        let remote_conversation_id = self.create_conversation(text).await?;
        info!(
            event_name = "relay.fresh.conversation_created",
            correlation_id = %correlation_id,
            remote_conversation_id = %remote_conversation_id.0,
            "remote conversation created"
        );

        let request = ResponseRequest::continue_conversation(
            &remote_conversation_id,
            self.agent_reference(),
        );
        let response = match self.create_response(request).await {
            Ok(response) => response,
            Err(remote_error)
                if classify_remote_error(&remote_error) == RemoteErrorClass::AuthRequired =>
            {
                warn!(
                    event_name = "relay.fresh.authorization_required",
                    correlation_id = %correlation_id,
                    error = %remote_error,
                    "agent connector needs authorization"
                );
                sink.send(OutboundMessage::text(AUTHORIZATION_INSTRUCTIONS)).await?;
                return Ok(RelayOutcome::AuthorizationRequired);
            }
            Err(remote_error) => return Err(remote_error.into()),
        };
        info!(
            event_name = "relay.fresh.response_created",
            correlation_id = %correlation_id,
            output_items = response.output.len(),
            "agent response received"
        );

        self.relay_response(activity, text, remote_conversation_id, response, sink, correlation_id)
            .await
    }

    async fn relay_response(
        &self,
        activity: &Activity,
        text: &str,
        remote_conversation_id: RemoteConversationId,
        response: AgentResponse,
        sink: &dyn ReplySink,
        correlation_id: &str,
    ) -> Result<RelayOutcome, RelayError> {
        if let Some(consent) = response.consent_request() {
            let Some(consent_link) = consent.consent_link else {
                warn!(
                    event_name = "relay.consent.link_missing",
                    correlation_id = %correlation_id,
                    "consent request without a link"
                );
                sink.send(OutboundMessage::text(CONSENT_LINK_MISSING)).await?;
                return Ok(RelayOutcome::ConsentLinkMissing);
            };
            let service_name = consent
                .service_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

            let conversation_key = activity.conversation_key();
            self.pause_for_consent(conversation_key.clone(), remote_conversation_id, text).await;
            sink.send(OutboundMessage::Card(oauth_consent_card(&consent_link, &service_name)))
                .await?;
            info!(
                event_name = "relay.consent.requested",
                correlation_id = %correlation_id,
                conversation_key = %conversation_key,
                service_name = %service_name,
                "sent consent card, awaiting authorization"
            );
            return Ok(RelayOutcome::ConsentRequested);
        }

        if let Some(approval) = response.approval_request() {
            sink.send(OutboundMessage::Card(approval_card(
                &approval.name,
                &approval.arguments,
                &approval.id,
                &remote_conversation_id,
            )))
            .await?;
            info!(
                event_name = "relay.approval.requested",
                correlation_id = %correlation_id,
                request_id = %approval.id.0,
                action_name = %approval.name,
                "sent approval card, awaiting decision"
            );
            return Ok(RelayOutcome::ApprovalRequested);
        }

        let answer = response.output_text().unwrap_or_else(|| NO_RESPONSE.to_string());
        sink.send(OutboundMessage::Text(answer)).await?;
        Ok(RelayOutcome::Replied)
    }

    async fn pause_for_consent(
        &self,
        conversation_key: ConversationKey,
        remote_conversation_id: RemoteConversationId,
        text: &str,
    ) {
        let replaced = self
            .pending
            .insert(PendingAuthorization {
                conversation_key,
                remote_conversation_id,
                original_message_text: text.to_string(),
                created_at: Utc::now(),
            })
            .await;
        if let Some(previous) = replaced {
            debug!(
                event_name = "relay.consent.replaced",
                conversation_key = %previous.conversation_key,
                "replaced earlier paused conversation"
            );
        }
    }

    fn agent_reference(&self) -> AgentReference {
        AgentReference::named(self.settings.agent_name.clone())
    }

    async fn create_conversation(&self, text: &str) -> Result<RemoteConversationId, RemoteError> {
        self.with_retry(|| self.agent.create_conversation(vec![ConversationItem::user_message(text)]))
            .await
    }

    async fn create_response(&self, request: ResponseRequest) -> Result<AgentResponse, RemoteError> {
        self.with_retry(|| self.agent.create_response(request.clone())).await
    }

    /// Every remote call goes through the retry policy, except that an
    /// authorization failure is returned at once: retrying cannot fix it.
    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RemoteError>>,
    {
        retry_with_backoff_if(&self.settings.retry, self.sleeper.as_ref(), operation, |error| {
            classify_remote_error(error) != RemoteErrorClass::AuthRequired
        })
        .await
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head = chars.by_ref().take(PREVIEW_CHARS).collect::<String>();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
