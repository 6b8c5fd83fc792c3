use std::sync::Arc;
use std::time::Duration;

use mailrelay_agent::credentials::{build_credential, select_credential_strategy};
use mailrelay_agent::foundry::{FoundryClient, RemoteError};
use mailrelay_agent::relay::{ConversationRelay, RelaySettings};
use mailrelay_core::config::{AppConfig, BotConfig, ConfigError};
use mailrelay_core::PendingAuthorizationStore;
use mailrelay_teams::{BotCredentials, ConnectorClient};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub pending: Arc<PendingAuthorizationStore>,
    pub relay: Arc<ConversationRelay>,
    pub connector: ConnectorClient,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("agent service client construction failed: {0}")]
    AgentService(#[source] RemoteError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        environment = config.identity.mode.as_str(),
        "starting application bootstrap"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.foundry.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let strategy = select_credential_strategy(
        config.identity.mode,
        config.identity.managed_identity_client_id.as_deref(),
    );
    let credential = build_credential(&strategy, http.clone());

    let agent = FoundryClient::new(
        http.clone(),
        &config.foundry.project_endpoint,
        config.foundry.api_version.clone(),
        config.foundry.token_scope.clone(),
        credential.clone(),
    )
    .map_err(BootstrapError::AgentService)?;
    info!(
        event_name = "system.bootstrap.agent_client_ready",
        correlation_id = "bootstrap",
        agent_name = %config.foundry.agent_name,
        api_version = %config.foundry.api_version,
        "agent service client initialized"
    );

    let pending = Arc::new(PendingAuthorizationStore::new());
    let relay = Arc::new(ConversationRelay::new(
        Arc::new(agent),
        credential,
        pending.clone(),
        RelaySettings::from_config(&config),
    ));

    let connector = ConnectorClient::new(http, bot_credentials(&config.bot));
    info!(
        event_name = "system.bootstrap.connector_ready",
        correlation_id = "bootstrap",
        authenticated = connector.is_authenticated(),
        "bot connector client initialized"
    );

    Ok(Application { config, pending, relay, connector })
}

fn bot_credentials(bot: &BotConfig) -> Option<BotCredentials> {
    match (&bot.app_id, &bot.app_password) {
        (Some(app_id), Some(app_password)) => Some(BotCredentials {
            app_id: app_id.clone(),
            app_password: app_password.clone(),
            tenant_id: bot.tenant_id.clone(),
        }),
        _ => None,
    }
}
