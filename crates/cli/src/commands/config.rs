use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parceldesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Effective configuration with the source of every value. Secrets are
/// never printed.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let entries: Vec<(&str, String, Vec<&str>)> = vec![
        ("database.url", config.database.url.clone(), vec!["PARCELDESK_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            vec!["PARCELDESK_DATABASE_MAX_CONNECTIONS"],
        ),
        ("llm.provider", config.llm.provider.as_str().to_string(), vec!["PARCELDESK_LLM_PROVIDER"]),
        (
            "llm.api_key",
            api_key.to_string(),
            vec!["PARCELDESK_LLM_API_KEY", vendor_key_env(&config)],
        ),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            vec!["PARCELDESK_LLM_BASE_URL"],
        ),
        ("llm.main_model", config.llm.main_model.clone(), vec!["PARCELDESK_LLM_MAIN_MODEL"]),
        (
            "llm.guardrail_model",
            config.llm.guardrail_model.clone(),
            vec!["PARCELDESK_LLM_GUARDRAIL_MODEL"],
        ),
        (
            "orchestrator.round_limit",
            config.orchestrator.round_limit.to_string(),
            vec!["PARCELDESK_ORCHESTRATOR_ROUND_LIMIT"],
        ),
        (
            "orchestrator.step_timeout_secs",
            config.orchestrator.step_timeout_secs.to_string(),
            vec!["PARCELDESK_ORCHESTRATOR_STEP_TIMEOUT_SECS"],
        ),
        (
            "orchestrator.order_lookback_days",
            config.orchestrator.order_lookback_days.to_string(),
            vec!["PARCELDESK_ORCHESTRATOR_ORDER_LOOKBACK_DAYS"],
        ),
        (
            "orchestrator.classification_fallback",
            config.orchestrator.classification_fallback.as_str().to_string(),
            vec!["PARCELDESK_ORCHESTRATOR_CLASSIFICATION_FALLBACK"],
        ),
        (
            "orchestrator.validation_fallback",
            config.orchestrator.validation_fallback.as_str().to_string(),
            vec!["PARCELDESK_ORCHESTRATOR_VALIDATION_FALLBACK"],
        ),
        ("company.name", config.company.name.clone(), vec!["PARCELDESK_COMPANY_NAME"]),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            vec!["PARCELDESK_SERVER_BIND_ADDRESS"],
        ),
        ("server.port", config.server.port.to_string(), vec!["PARCELDESK_SERVER_PORT"]),
        (
            "logging.level",
            config.logging.level.clone(),
            vec!["PARCELDESK_LOGGING_LEVEL", "PARCELDESK_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            vec!["PARCELDESK_LOGGING_FORMAT", "PARCELDESK_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, &env_keys))),
    );
    lines.join("\n")
}

fn vendor_key_env(config: &AppConfig) -> &'static str {
    match config.llm.provider {
        parceldesk_core::config::LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        parceldesk_core::config::LlmProvider::OpenAi => "OPENAI_API_KEY",
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("parceldesk.toml"), PathBuf::from("config/parceldesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
