use mailrelay_core::{
    ApprovalAction, ApprovalDecision, ApprovalRequestId, ConversationKey, RemoteConversationId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RETRY_KEYWORD: &str = "retry";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type", default)]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default)]
    pub from: ChannelAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    Message,
    ConversationUpdate,
    Other(String),
}

impl Activity {
    pub fn kind(&self) -> ActivityKind {
        match self.activity_type.as_str() {
            "message" => ActivityKind::Message,
            "conversationUpdate" => ActivityKind::ConversationUpdate,
            other => ActivityKind::Other(other.to_string()),
        }
    }

    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(&self.channel_id, &self.from.id)
    }

    /// Tenant from the conversation, falling back to Teams channel data.
    pub fn tenant_id(&self) -> Option<&str> {
        self.conversation.tenant_id.as_deref().or_else(|| {
            self.channel_data
                .as_ref()
                .and_then(|data| data.get("tenant"))
                .and_then(|tenant| tenant.get("id"))
                .and_then(Value::as_str)
        })
    }

    /// Members added by this update, excluding the bot itself.
    pub fn added_users(&self) -> impl Iterator<Item = &ChannelAccount> {
        let bot_id = self.recipient.as_ref().map(|recipient| recipient.id.as_str());
        self.members_added.iter().filter(move |member| Some(member.id.as_str()) != bot_id)
    }
}

/// The shape of an inbound message, decided once before any handling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    ApprovalSubmission(ApprovalDecision),
    /// The text was the retry keyword; whether a paused exchange exists is
    /// decided by the relay, which falls back to a fresh message otherwise.
    RetryKeyword { text: String },
    Text(String),
    Empty,
}

pub fn classify_message(activity: &Activity) -> InboundMessage {
    if let Some(decision) = activity.value.as_ref().and_then(approval_submission) {
        return InboundMessage::ApprovalSubmission(decision);
    }

    let Some(text) = activity.text.as_deref().filter(|text| !text.is_empty()) else {
        return InboundMessage::Empty;
    };

    if is_retry_keyword(text) {
        return InboundMessage::RetryKeyword { text: text.to_string() };
    }

    InboundMessage::Text(text.to_string())
}

pub fn is_retry_keyword(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(RETRY_KEYWORD)
}

fn approval_submission(value: &Value) -> Option<ApprovalDecision> {
    let action = non_empty_str(value, "action")?;
    let request_id = non_empty_str(value, "requestId")?;
    let conversation_id = value.get("conversationId").and_then(Value::as_str).unwrap_or_default();

    // anything other than an explicit approve is treated as a denial
    let action = if action == ApprovalAction::Approve.label() {
        ApprovalAction::Approve
    } else {
        ApprovalAction::Deny
    };

    Some(ApprovalDecision {
        action,
        request_id: ApprovalRequestId(request_id.to_string()),
        conversation_id: RemoteConversationId(conversation_id.to_string()),
    })
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str).filter(|text| !text.is_empty())
}
