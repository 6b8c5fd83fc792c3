//! `POST /api/messages`: the Bot Framework messaging endpoint.
//!
//! The activity is acknowledged with `202 Accepted` straight away and handled
//! on its own task, so slow agent calls never hold the channel's request open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use mailrelay_agent::relay::{ConversationRelay, RelayOutcome};
use mailrelay_teams::activity::Activity;
use mailrelay_teams::{ConnectorClient, ReplySink};
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Resolves the sink replies for an activity are sent through.
pub trait SinkFactory: Send + Sync {
    fn sink_for(&self, activity: &Activity) -> Option<Arc<dyn ReplySink>>;
}

impl SinkFactory for ConnectorClient {
    fn sink_for(&self, activity: &Activity) -> Option<Arc<dyn ReplySink>> {
        match self.reply_sink(activity) {
            Ok(sink) => Some(Arc::new(sink)),
            Err(transport_error) => {
                error!(
                    event_name = "messages.reply_target_invalid",
                    correlation_id = activity.id.as_deref().unwrap_or("unknown"),
                    error = %transport_error,
                    "cannot reply to activity"
                );
                None
            }
        }
    }
}

/// Counts handler tasks still running so shutdown can wait for them.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn running(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { tracker: self.clone() }
    }

    /// Waits until no handler is running, or `grace` elapses. Returns the
    /// number of handlers still running.
    pub async fn drain(&self, grace: Duration) -> usize {
        let wait = async {
            loop {
                let notified = self.idle.notified();
                if self.running() == 0 {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(grace, wait).await;
        self.running()
    }
}

struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct MessagesState {
    relay: Arc<ConversationRelay>,
    sinks: Arc<dyn SinkFactory>,
    in_flight: Arc<InFlight>,
}

impl MessagesState {
    pub fn new(
        relay: Arc<ConversationRelay>,
        sinks: Arc<dyn SinkFactory>,
        in_flight: Arc<InFlight>,
    ) -> Self {
        Self { relay, sinks, in_flight }
    }
}

pub fn router(state: MessagesState) -> Router {
    Router::new().route("/api/messages", post(receive_activity)).with_state(state)
}

pub async fn receive_activity(
    State(state): State<MessagesState>,
    Json(activity): Json<Activity>,
) -> StatusCode {
    let correlation_id = activity.id.clone().unwrap_or_else(|| "unknown".to_string());
    debug!(
        event_name = "messages.received",
        correlation_id = %correlation_id,
        activity_type = %activity.activity_type,
        channel_id = %activity.channel_id,
        "activity received"
    );

    let Some(sink) = state.sinks.sink_for(&activity) else {
        return StatusCode::BAD_REQUEST;
    };

    let guard = state.in_flight.enter();
    let relay = state.relay.clone();
    tokio::spawn(async move {
        let outcome = relay.handle(&activity, sink.as_ref()).await;
        if outcome == RelayOutcome::Failed {
            info!(
                event_name = "messages.handled_with_apology",
                correlation_id = %correlation_id,
                "activity handling ended in an apology"
            );
        }
        drop(guard);
    });

    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mailrelay_agent::credentials::{AccessToken, CredentialError, TokenCredential};
    use mailrelay_agent::foundry::{
        AgentResponse, AgentService, ConversationItem, RemoteError, ResponseRequest,
    };
    use mailrelay_agent::relay::{ConversationRelay, RelaySettings, GREETING};
    use mailrelay_core::{PendingAuthorizationStore, RemoteConversationId, RetryPolicy};
    use mailrelay_teams::activity::Activity;
    use mailrelay_teams::{RecordingReplySink, ReplySink};
    use secrecy::SecretString;
    use serde_json::json;
    use tower::ServiceExt;

    use super::{router, InFlight, MessagesState, SinkFactory};

    struct EchoAgent;

    #[async_trait]
    impl AgentService for EchoAgent {
        async fn create_conversation(
            &self,
            items: Vec<ConversationItem>,
        ) -> Result<RemoteConversationId, RemoteError> {
            let ConversationItem::Message { content, .. } = &items[0];
            Ok(RemoteConversationId(format!("conv:{content}")))
        }

        async fn create_response(
            &self,
            request: ResponseRequest,
        ) -> Result<AgentResponse, RemoteError> {
            Ok(AgentResponse {
                output_text: Some(format!("echo {}", request.conversation)),
                ..AgentResponse::default()
            })
        }
    }

    struct StaticCredential;

    #[async_trait]
    impl TokenCredential for StaticCredential {
        fn name(&self) -> &'static str {
            "StaticCredential"
        }

        async fn get_token(&self, _scope: &str) -> Result<AccessToken, CredentialError> {
            Ok(AccessToken { token: SecretString::from("t".to_string()), expires_on: None })
        }
    }

    struct SharedSink(Arc<RecordingReplySink>);

    impl SinkFactory for SharedSink {
        fn sink_for(&self, _activity: &Activity) -> Option<Arc<dyn ReplySink>> {
            Some(self.0.clone())
        }
    }

    fn state(sink: Arc<RecordingReplySink>, in_flight: Arc<InFlight>) -> MessagesState {
        let relay = ConversationRelay::new(
            Arc::new(EchoAgent),
            Arc::new(StaticCredential),
            Arc::new(PendingAuthorizationStore::new()),
            RelaySettings {
                agent_name: "mail-assistant".to_string(),
                token_scope: "scope".to_string(),
                retry: RetryPolicy::default(),
            },
        );
        MessagesState::new(Arc::new(relay), Arc::new(SharedSink(sink)), in_flight)
    }

    fn post_activity(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn message_is_accepted_and_answered_in_background() {
        let sink = Arc::new(RecordingReplySink::new());
        let in_flight = Arc::new(InFlight::default());
        let app = router(state(sink.clone(), in_flight.clone()));

        let response = app
            .oneshot(post_activity(json!({
                "type": "message",
                "id": "act-1",
                "text": "Hello",
                "channelId": "msteams",
                "serviceUrl": "https://smba.example.net/",
                "from": {"id": "29:user"},
                "conversation": {"id": "a:conv"}
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(in_flight.drain(Duration::from_secs(5)).await, 0);
        assert_eq!(sink.texts().await, vec!["echo conv:Hello".to_string()]);
    }

    #[tokio::test]
    async fn conversation_update_is_greeted() {
        let sink = Arc::new(RecordingReplySink::new());
        let in_flight = Arc::new(InFlight::default());
        let app = router(state(sink.clone(), in_flight.clone()));

        let response = app
            .oneshot(post_activity(json!({
                "type": "conversationUpdate",
                "channelId": "msteams",
                "recipient": {"id": "28:bot"},
                "membersAdded": [{"id": "29:user"}],
                "conversation": {"id": "a:conv"}
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        in_flight.drain(Duration::from_secs(5)).await;
        assert_eq!(sink.texts().await, vec![GREETING.to_string()]);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let sink = Arc::new(RecordingReplySink::new());
        let app = router(state(sink, Arc::new(InFlight::default())));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/messages")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn drain_returns_immediately_when_idle() {
        let in_flight = InFlight::default();
        assert_eq!(in_flight.drain(Duration::from_millis(10)).await, 0);
    }
}
