//! Shared building blocks for the mail relay bot: environment-sourced
//! configuration, conversation and approval domain types, the bounded retry
//! helper used for every remote call, and the in-memory store of
//! conversations paused on OAuth consent.

pub mod config;
pub mod domain;
pub mod pending;
pub mod retry;

pub use domain::approval::{
    ApprovalAction, ApprovalDecision, ApprovalRequest, ApprovalRequestId, RemoteConversationId,
};
pub use domain::conversation::{ConversationKey, PendingAuthorization};
pub use pending::PendingAuthorizationStore;
pub use retry::{retry_with_backoff, retry_with_backoff_if, RetryPolicy, Sleeper, TokioSleeper};
