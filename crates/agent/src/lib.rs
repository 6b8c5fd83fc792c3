//! Agent Relay - the remote half of the mail assistant
//!
//! This crate connects chat messages to the hosted agent service:
//! - Resolves a token credential for the deployment mode (`credentials`)
//! - Talks to the agent service's conversation and response APIs (`foundry`)
//! - Runs the per-message relay state machine (`relay`)
//!
//! # Architecture
//!
//! Every inbound message is classified once, then handled by one branch:
//! 1. **Approval submission** - forward the user's approve/deny decision
//! 2. **OAuth retry** - resume a conversation paused on connector consent
//! 3. **Fresh message** - start a remote conversation and run the agent
//!
//! Agent replies that ask for connector consent or tool approval are turned
//! into Adaptive Cards; anything else is relayed as text.
//!
//! # Key Types
//!
//! - `ConversationRelay` - the state machine (see `relay` module)
//! - `AgentService` - seam over the remote agent service
//! - `TokenCredential` - bearer tokens for the agent service
//! - `classify_remote_error` - sorts remote failures into auth/transient/fatal

pub mod credentials;
pub mod foundry;
pub mod relay;

pub use credentials::{
    build_credential, select_credential_strategy, AccessToken, CachingTokenCredential,
    CredentialError, CredentialStrategy, TokenCredential,
};
pub use foundry::{
    classify_remote_error, AgentReference, AgentResponse, AgentService, ConversationItem,
    FoundryClient, RemoteError, RemoteErrorClass, RemoteErrorKind, ResponseRequest,
};
pub use relay::{ConversationRelay, RelayError, RelayOutcome, RelaySettings};
