use std::env;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_AGENT_NAME: &str = "mail-assistant";
pub const DEFAULT_TOKEN_SCOPE: &str = "https://cognitiveservices.azure.com/.default";
pub const DEFAULT_API_VERSION: &str = "2025-11-15-preview";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub foundry: FoundryConfig,
    pub retry: RetryConfig,
    pub pending: PendingConfig,
    pub bot: BotConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub mode: DeploymentMode,
    pub managed_identity_client_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FoundryConfig {
    pub project_endpoint: String,
    pub agent_name: String,
    pub token_scope: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct PendingConfig {
    pub ttl_secs: u64,
    pub eviction_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub app_id: Option<String>,
    pub app_password: Option<SecretString>,
    pub tenant_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Development,
    Production,
}

impl DeploymentMode {
    /// Only the literal `development` selects local developer credentials;
    /// every other value (including `test` or `staging`) runs as production.
    pub fn from_env_value(value: &str) -> Self {
        if value == "development" {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub deployment_mode: Option<DeploymentMode>,
    pub managed_identity_client_id: Option<String>,
    pub foundry_project_endpoint: Option<String>,
    pub foundry_agent_name: Option<String>,
    pub retry_max_attempts: Option<u32>,
    pub retry_initial_delay_ms: Option<u64>,
    pub bot_app_id: Option<String>,
    pub bot_app_password: Option<String>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig {
                mode: DeploymentMode::Production,
                managed_identity_client_id: None,
            },
            foundry: FoundryConfig {
                project_endpoint: String::new(),
                agent_name: DEFAULT_AGENT_NAME.to_string(),
                token_scope: DEFAULT_TOKEN_SCOPE.to_string(),
                api_version: DEFAULT_API_VERSION.to_string(),
                timeout_secs: 60,
            },
            retry: RetryConfig { max_attempts: 3, initial_delay_ms: 1_000 },
            pending: PendingConfig { ttl_secs: 3_600, eviction_interval_secs: 300 },
            bot: BotConfig { app_id: None, app_password: None, tenant_id: None },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3978,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
        )
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_any(&["MAILRELAY_ENVIRONMENT", "NODE_ENV"]) {
            self.identity.mode = DeploymentMode::from_env_value(&value);
        }
        if let Some(value) =
            read_env_any(&["MAILRELAY_MANAGED_IDENTITY_CLIENT_ID", "MI_CLIENT_ID"])
        {
            self.identity.managed_identity_client_id = Some(value);
        }

        if let Some(value) =
            read_env_any(&["MAILRELAY_FOUNDRY_PROJECT_ENDPOINT", "FOUNDRY_PROJECT_ENDPOINT"])
        {
            self.foundry.project_endpoint = value;
        }
        if let Some(value) =
            read_env_any(&["MAILRELAY_FOUNDRY_AGENT_NAME", "FOUNDRY_AGENT_NAME"])
        {
            self.foundry.agent_name = value;
        }
        if let Some(value) = read_env("MAILRELAY_FOUNDRY_TOKEN_SCOPE") {
            self.foundry.token_scope = value;
        }
        if let Some(value) = read_env("MAILRELAY_FOUNDRY_API_VERSION") {
            self.foundry.api_version = value;
        }
        if let Some(value) = read_env("MAILRELAY_FOUNDRY_TIMEOUT_SECS") {
            self.foundry.timeout_secs = parse_u64("MAILRELAY_FOUNDRY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MAILRELAY_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_u32("MAILRELAY_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("MAILRELAY_RETRY_INITIAL_DELAY_MS") {
            self.retry.initial_delay_ms = parse_u64("MAILRELAY_RETRY_INITIAL_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("MAILRELAY_PENDING_TTL_SECS") {
            self.pending.ttl_secs = parse_u64("MAILRELAY_PENDING_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("MAILRELAY_PENDING_EVICTION_INTERVAL_SECS") {
            self.pending.eviction_interval_secs =
                parse_u64("MAILRELAY_PENDING_EVICTION_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env_any(&["MAILRELAY_BOT_APP_ID", "MicrosoftAppId"]) {
            self.bot.app_id = Some(value);
        }
        if let Some(value) =
            read_env_any(&["MAILRELAY_BOT_APP_PASSWORD", "MicrosoftAppPassword"])
        {
            self.bot.app_password = Some(secret_value(value));
        }
        if let Some(value) =
            read_env_any(&["MAILRELAY_BOT_TENANT_ID", "MicrosoftAppTenantId"])
        {
            self.bot.tenant_id = Some(value);
        }

        if let Some(value) = read_env("MAILRELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MAILRELAY_SERVER_PORT") {
            self.server.port = parse_u16("MAILRELAY_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("MAILRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MAILRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env_any(&["MAILRELAY_LOGGING_LEVEL", "MAILRELAY_LOG_LEVEL"]) {
            self.logging.level = value;
        }
        if let Some(value) = read_env_any(&["MAILRELAY_LOGGING_FORMAT", "MAILRELAY_LOG_FORMAT"])
        {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(mode) = overrides.deployment_mode {
            self.identity.mode = mode;
        }
        if let Some(client_id) = overrides.managed_identity_client_id {
            self.identity.managed_identity_client_id = Some(client_id);
        }
        if let Some(endpoint) = overrides.foundry_project_endpoint {
            self.foundry.project_endpoint = endpoint;
        }
        if let Some(agent_name) = overrides.foundry_agent_name {
            self.foundry.agent_name = agent_name;
        }
        if let Some(max_attempts) = overrides.retry_max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(initial_delay_ms) = overrides.retry_initial_delay_ms {
            self.retry.initial_delay_ms = initial_delay_ms;
        }
        if let Some(app_id) = overrides.bot_app_id {
            self.bot.app_id = Some(app_id);
        }
        if let Some(app_password) = overrides.bot_app_password {
            self.bot.app_password = Some(secret_value(app_password));
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_foundry(&self.foundry)?;
        validate_retry(&self.retry)?;
        validate_pending(&self.pending)?;
        validate_bot(&self.bot)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn validate_foundry(foundry: &FoundryConfig) -> Result<(), ConfigError> {
    let endpoint = foundry.project_endpoint.trim();
    if endpoint.is_empty() {
        return Err(ConfigError::Validation(
            "foundry.project_endpoint is required. Copy it from the project overview page (set FOUNDRY_PROJECT_ENDPOINT)"
                .to_string(),
        ));
    }
    if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
        return Err(ConfigError::Validation(
            "foundry.project_endpoint must start with http:// or https://".to_string(),
        ));
    }

    if foundry.agent_name.trim().is_empty() {
        return Err(ConfigError::Validation("foundry.agent_name must not be blank".to_string()));
    }
    if foundry.token_scope.trim().is_empty() {
        return Err(ConfigError::Validation("foundry.token_scope must not be blank".to_string()));
    }

    if foundry.timeout_secs == 0 || foundry.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "foundry.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "retry.max_attempts must be greater than zero".to_string(),
        ));
    }
    if retry.initial_delay_ms > 60_000 {
        return Err(ConfigError::Validation(
            "retry.initial_delay_ms must be at most 60000".to_string(),
        ));
    }
    Ok(())
}

fn validate_pending(pending: &PendingConfig) -> Result<(), ConfigError> {
    if pending.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "pending.ttl_secs must be greater than zero".to_string(),
        ));
    }
    if pending.eviction_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "pending.eviction_interval_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    let has_password = bot
        .app_password
        .as_ref()
        .map(|value| !value.expose_secret().trim().is_empty())
        .unwrap_or(false);

    if bot.app_id.is_some() && !has_password {
        return Err(ConfigError::Validation(
            "bot.app_password is required when bot.app_id is set (MicrosoftAppPassword)"
                .to_string(),
        ));
    }
    if bot.app_id.is_none() && has_password {
        return Err(ConfigError::Validation(
            "bot.app_id is required when bot.app_password is set (MicrosoftAppId)".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| read_env(key))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, DeploymentMode, LoadOptions, LogFormat,
        DEFAULT_AGENT_NAME,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const ALL_VARS: &[&str] = &[
        "MAILRELAY_ENVIRONMENT",
        "NODE_ENV",
        "MAILRELAY_MANAGED_IDENTITY_CLIENT_ID",
        "MI_CLIENT_ID",
        "MAILRELAY_FOUNDRY_PROJECT_ENDPOINT",
        "FOUNDRY_PROJECT_ENDPOINT",
        "MAILRELAY_FOUNDRY_AGENT_NAME",
        "FOUNDRY_AGENT_NAME",
        "MAILRELAY_RETRY_MAX_ATTEMPTS",
        "MAILRELAY_BOT_APP_ID",
        "MAILRELAY_BOT_APP_PASSWORD",
        "MicrosoftAppId",
        "MicrosoftAppPassword",
        "MAILRELAY_SERVER_PORT",
        "PORT",
        "MAILRELAY_LOG_LEVEL",
        "MAILRELAY_LOG_FORMAT",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_apply_when_only_endpoint_is_set() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("FOUNDRY_PROJECT_ENDPOINT", "https://example.services.ai.azure.com/api/projects/p1");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.foundry.agent_name == DEFAULT_AGENT_NAME, "agent name should default")?;
            ensure(
                config.identity.mode == DeploymentMode::Production,
                "deployment mode should default to production",
            )?;
            ensure(config.retry.max_attempts == 3, "retry attempts should default to 3")?;
            ensure(config.server.port == 3978, "bot port should default to 3978")?;
            ensure(
                config.retry_policy().initial_delay == Duration::from_millis(1_000),
                "retry policy should start at one second",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn legacy_variable_names_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("FOUNDRY_PROJECT_ENDPOINT", "https://legacy.example.com");
        env::set_var("FOUNDRY_AGENT_NAME", "calendar-assistant");
        env::set_var("NODE_ENV", "development");
        env::set_var("MI_CLIENT_ID", "mi-123");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.foundry.agent_name == "calendar-assistant", "agent name from env")?;
            ensure(
                config.identity.mode == DeploymentMode::Development,
                "NODE_ENV=development should select development mode",
            )?;
            ensure(
                config.identity.managed_identity_client_id.as_deref() == Some("mi-123"),
                "MI_CLIENT_ID should populate the managed identity client id",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn prefixed_variables_win_over_legacy_names() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("FOUNDRY_PROJECT_ENDPOINT", "https://legacy.example.com");
        env::set_var("MAILRELAY_FOUNDRY_PROJECT_ENDPOINT", "https://prefixed.example.com");
        env::set_var("NODE_ENV", "development");
        env::set_var("MAILRELAY_ENVIRONMENT", "production");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.foundry.project_endpoint == "https://prefixed.example.com",
                "prefixed endpoint should win",
            )?;
            ensure(
                config.identity.mode == DeploymentMode::Production,
                "prefixed environment should win",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn overrides_win_over_environment() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("FOUNDRY_PROJECT_ENDPOINT", "https://from-env.example.com");
        env::set_var("MAILRELAY_LOG_LEVEL", "warn");
        env::set_var("MAILRELAY_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    foundry_project_endpoint: Some("https://from-override.example.com".to_string()),
                    log_level: Some("debug".to_string()),
                    retry_max_attempts: Some(5),
                    ..ConfigOverrides::default()
                },
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.foundry.project_endpoint == "https://from-override.example.com",
                "override endpoint should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "json format from env")?;
            ensure(config.retry_policy().max_attempts == 5, "override retry attempts")?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn missing_endpoint_fails_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("foundry.project_endpoint")
        );
        ensure(has_message, "validation failure should mention foundry.project_endpoint")
    }

    #[test]
    fn invalid_numeric_override_names_the_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("FOUNDRY_PROJECT_ENDPOINT", "https://example.com");
        env::set_var("MAILRELAY_RETRY_MAX_ATTEMPTS", "many");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override error".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "MAILRELAY_RETRY_MAX_ATTEMPTS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn bot_credentials_must_be_paired() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("FOUNDRY_PROJECT_ENDPOINT", "https://example.com");
        env::set_var("MicrosoftAppId", "00000000-0000-0000-0000-000000000001");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected validation failure".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("bot.app_password"), "error should name bot.app_password")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("FOUNDRY_PROJECT_ENDPOINT", "https://example.com");
        env::set_var("MicrosoftAppId", "app-id");
        env::set_var("MicrosoftAppPassword", "bot-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("bot-secret-value"), "debug output should not contain password")?;
            ensure(
                config.bot.app_password.as_ref().map(|value| value.expose_secret().to_string())
                    == Some("bot-secret-value".to_string()),
                "password should still be readable through expose_secret",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn deployment_mode_only_matches_development_literal() {
        assert_eq!(DeploymentMode::from_env_value("development"), DeploymentMode::Development);
        assert_eq!(DeploymentMode::from_env_value("Development"), DeploymentMode::Production);
        assert_eq!(DeploymentMode::from_env_value("DEVELOPMENT"), DeploymentMode::Production);
        assert_eq!(DeploymentMode::from_env_value("test"), DeploymentMode::Production);
        assert_eq!(DeploymentMode::from_env_value("production"), DeploymentMode::Production);
    }
}
