use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::classification::ClassificationFallback;
use crate::domain::validation::ValidationFallback;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub orchestrator: OrchestratorConfig,
    pub company: CompanyConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    /// Model that drafts replies and calls tools.
    pub main_model: String,
    /// Cheaper model used for classification and reply validation.
    pub guardrail_model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub round_limit: u32,
    pub step_timeout_secs: u64,
    pub order_lookback_days: u32,
    pub classification_fallback: ClassificationFallback,
    pub validation_fallback: ValidationFallback,
}

#[derive(Clone, Debug)]
pub struct CompanyConfig {
    pub name: String,
    pub description: String,
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
pub enum LlmProvider {
    Anthropic,
    /// Any OpenAI-compatible chat-completions endpoint (OpenAI, Ollama, vLLM).
    #[serde(rename = "openai")]
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_main_model: Option<String>,
    pub round_limit: Option<u32>,
    pub validation_fallback: Option<ValidationFallback>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://parceldesk.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Anthropic,
                api_key: None,
                base_url: None,
                main_model: "claude-sonnet-4-20250514".to_string(),
                guardrail_model: "claude-3-5-haiku-20241022".to_string(),
                timeout_secs: 60,
                max_tokens: 1024,
            },
            orchestrator: OrchestratorConfig {
                round_limit: 5,
                step_timeout_secs: 60,
                order_lookback_days: 14,
                classification_fallback: ClassificationFallback::Strict,
                validation_fallback: ValidationFallback::Strict,
            },
            company: CompanyConfig {
                name: "Northwind".to_string(),
                description: "An e-commerce platform specializing in fast delivery and excellent customer service".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" | "ollama" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected anthropic|openai)"
            ))),
        }
    }
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
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("parceldesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(main_model) = llm.main_model {
                self.llm.main_model = main_model;
            }
            if let Some(guardrail_model) = llm.guardrail_model {
                self.llm.guardrail_model = guardrail_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(round_limit) = orchestrator.round_limit {
                self.orchestrator.round_limit = round_limit;
            }
            if let Some(step_timeout_secs) = orchestrator.step_timeout_secs {
                self.orchestrator.step_timeout_secs = step_timeout_secs;
            }
            if let Some(order_lookback_days) = orchestrator.order_lookback_days {
                self.orchestrator.order_lookback_days = order_lookback_days;
            }
            if let Some(classification_fallback) = orchestrator.classification_fallback {
                self.orchestrator.classification_fallback = classification_fallback;
            }
            if let Some(validation_fallback) = orchestrator.validation_fallback {
                self.orchestrator.validation_fallback = validation_fallback;
            }
        }

        if let Some(company) = patch.company {
            if let Some(name) = company.name {
                self.company.name = name;
            }
            if let Some(description) = company.description {
                self.company.description = description;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARCELDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PARCELDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PARCELDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PARCELDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PARCELDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARCELDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let vendor_key = match self.llm.provider {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        };
        if let Some(value) = read_env("PARCELDESK_LLM_API_KEY").or_else(|| read_env(vendor_key)) {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARCELDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PARCELDESK_LLM_MAIN_MODEL") {
            self.llm.main_model = value;
        }
        if let Some(value) = read_env("PARCELDESK_LLM_GUARDRAIL_MODEL") {
            self.llm.guardrail_model = value;
        }
        if let Some(value) = read_env("PARCELDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PARCELDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARCELDESK_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("PARCELDESK_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("PARCELDESK_ORCHESTRATOR_ROUND_LIMIT") {
            self.orchestrator.round_limit =
                parse_u32("PARCELDESK_ORCHESTRATOR_ROUND_LIMIT", &value)?;
        }
        if let Some(value) = read_env("PARCELDESK_ORCHESTRATOR_STEP_TIMEOUT_SECS") {
            self.orchestrator.step_timeout_secs =
                parse_u64("PARCELDESK_ORCHESTRATOR_STEP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARCELDESK_ORCHESTRATOR_ORDER_LOOKBACK_DAYS") {
            self.orchestrator.order_lookback_days =
                parse_u32("PARCELDESK_ORCHESTRATOR_ORDER_LOOKBACK_DAYS", &value)?;
        }
        if let Some(value) = read_env("PARCELDESK_ORCHESTRATOR_CLASSIFICATION_FALLBACK") {
            self.orchestrator.classification_fallback =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "PARCELDESK_ORCHESTRATOR_CLASSIFICATION_FALLBACK".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = read_env("PARCELDESK_ORCHESTRATOR_VALIDATION_FALLBACK") {
            self.orchestrator.validation_fallback =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "PARCELDESK_ORCHESTRATOR_VALIDATION_FALLBACK".to_string(),
                    value: value.clone(),
                })?;
        }

        if let Some(value) = read_env("PARCELDESK_COMPANY_NAME") {
            self.company.name = value;
        }
        if let Some(value) = read_env("PARCELDESK_COMPANY_DESCRIPTION") {
            self.company.description = value;
        }

        if let Some(value) = read_env("PARCELDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARCELDESK_SERVER_PORT") {
            self.server.port = parse_u16("PARCELDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PARCELDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARCELDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("PARCELDESK_LOGGING_LEVEL").or_else(|| read_env("PARCELDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARCELDESK_LOGGING_FORMAT").or_else(|| read_env("PARCELDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_main_model) = overrides.llm_main_model {
            self.llm.main_model = llm_main_model;
        }
        if let Some(round_limit) = overrides.round_limit {
            self.orchestrator.round_limit = round_limit;
        }
        if let Some(validation_fallback) = overrides.validation_fallback {
            self.orchestrator.validation_fallback = validation_fallback;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_orchestrator(&self.orchestrator)?;
        validate_company(&self.company)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parceldesk.toml"), PathBuf::from("config/parceldesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.main_model.trim().is_empty() || llm.guardrail_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.main_model and llm.guardrail_model must not be empty".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the anthropic provider. Set PARCELDESK_LLM_API_KEY or ANTHROPIC_API_KEY".to_string(),
                ));
            }
        }
        LlmProvider::OpenAi => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the openai provider (e.g. http://localhost:11434/v1 for Ollama)".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_orchestrator(orchestrator: &OrchestratorConfig) -> Result<(), ConfigError> {
    if orchestrator.round_limit == 0 || orchestrator.round_limit > 20 {
        return Err(ConfigError::Validation(
            "orchestrator.round_limit must be in range 1..=20".to_string(),
        ));
    }

    if orchestrator.step_timeout_secs == 0 || orchestrator.step_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "orchestrator.step_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if orchestrator.order_lookback_days == 0 || orchestrator.order_lookback_days > 365 {
        return Err(ConfigError::Validation(
            "orchestrator.order_lookback_days must be in range 1..=365".to_string(),
        ));
    }

    Ok(())
}

fn validate_company(company: &CompanyConfig) -> Result<(), ConfigError> {
    if company.name.trim().is_empty() {
        return Err(ConfigError::Validation("company.name must not be empty".to_string()));
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    orchestrator: Option<OrchestratorPatch>,
    company: Option<CompanyPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    main_model: Option<String>,
    guardrail_model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    round_limit: Option<u32>,
    step_timeout_secs: Option<u64>,
    order_lookback_days: Option<u32>,
    classification_fallback: Option<ClassificationFallback>,
    validation_fallback: Option<ValidationFallback>,
}

#[derive(Debug, Default, Deserialize)]
struct CompanyPatch {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
