use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::RemoteConversationId;

/// Correlates a paused remote exchange with the chat user who must resume it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey(pub String);

impl ConversationKey {
    pub fn new(channel_id: &str, user_id: &str) -> Self {
        Self(format!("{channel_id}:{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub conversation_key: ConversationKey,
    pub remote_conversation_id: RemoteConversationId,
    pub original_message_text: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    pub fn is_older_than(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }
}
