//! Teams Integration - Bot Framework channel interface
//!
//! This crate provides the chat-facing half of the relay:
//! - **Activities** (`activity`) - inbound activity schema and message classification
//! - **Cards** (`cards`) - Adaptive Card builders (OAuth consent, action approval)
//! - **Connector** (`connector`) - outbound replies through the Bot Connector REST API
//!
//! # Architecture
//!
//! ```text
//! POST /api/messages → Activity → classify_message → Conversation Relay
//!                                                         ↓
//!                         Bot Connector ← ReplySink ← OutboundMessage
//! ```
//!
//! # Key Types
//!
//! - `InboundMessage` - the four shapes an inbound message can take
//! - `CardBuilder` - constructs Adaptive Card documents
//! - `ReplySink` - seam the relay sends replies through
//! - `ConnectorClient` - Bot Connector implementation of `ReplySink`

pub mod activity;
pub mod cards;
pub mod connector;

pub use activity::{classify_message, Activity, ActivityKind, InboundMessage};
pub use cards::{AdaptiveCard, CardBuilder, ADAPTIVE_CARD_CONTENT_TYPE};
pub use connector::{
    BotCredentials, ConnectorClient, OutboundMessage, RecordingReplySink, ReplySink, TransportError,
};
