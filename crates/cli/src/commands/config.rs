use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use promissory_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    let catalog = &config.catalog;
    lines.push(format!(
        "- catalog: {} franchise(s), {} tenant mapping(s), {} level type(s), {} location alias(es), {} level alias(es)",
        catalog.franchises.len(),
        catalog.tenant_franchises.len(),
        catalog.level_types.len(),
        catalog.location_aliases.len(),
        catalog.level_aliases.len(),
    ));

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let detection = &config.detection;
    let phone_floor = detection
        .phone_number_floor
        .map(|floor| floor.to_string())
        .unwrap_or_else(|| "<disabled>".to_string());
    let api_token = config
        .delivery
        .api_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        field("database.url", &["PROMISSORY_DATABASE_URL"], &config.database.url),
        field(
            "database.max_connections",
            &["PROMISSORY_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections,
        ),
        field(
            "database.timeout_secs",
            &["PROMISSORY_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs,
        ),
        field("detection.base_confidence", &[], detection.base_confidence),
        field("detection.canonical_domain_floor", &[], detection.canonical_domain_floor),
        field(
            "detection.phone_number_floor",
            &["PROMISSORY_DETECTION_PHONE_NUMBER_FLOOR"],
            phone_floor,
        ),
        field(
            "detection.min_action_confidence",
            &["PROMISSORY_DETECTION_MIN_ACTION_CONFIDENCE"],
            detection.min_action_confidence,
        ),
        field("dedup.ttl_secs", &["PROMISSORY_DEDUP_TTL_SECS"], config.dedup.ttl_secs),
        field(
            "dedup.failure_strategy",
            &["PROMISSORY_DEDUP_FAILURE_STRATEGY"],
            format!("{:?}", config.dedup.failure_strategy),
        ),
        field(
            "delivery.gateway_url",
            &["PROMISSORY_DELIVERY_GATEWAY_URL"],
            config.delivery.gateway_url.as_deref().unwrap_or("<unset>"),
        ),
        field("delivery.api_token", &["PROMISSORY_DELIVERY_API_TOKEN"], api_token),
        field(
            "delivery.timeout_secs",
            &["PROMISSORY_DELIVERY_TIMEOUT_SECS"],
            config.delivery.timeout_secs,
        ),
        field(
            "delivery.max_message_chars",
            &["PROMISSORY_DELIVERY_MAX_MESSAGE_CHARS"],
            config.delivery.max_message_chars,
        ),
        field(
            "logging.level",
            &["PROMISSORY_LOGGING_LEVEL", "PROMISSORY_LOG_LEVEL"],
            &config.logging.level,
        ),
        field(
            "logging.format",
            &["PROMISSORY_LOGGING_FORMAT", "PROMISSORY_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn field(
    key: &'static str,
    env_keys: &'static [&'static str],
    value: impl ToString,
) -> ConfigField {
    ConfigField { key, env_keys, value: value.to_string() }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
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

/// Keeps at most a four-character prefix so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix = trimmed.chars().take(4).collect::<String>();
    format!("{prefix}***")
}
