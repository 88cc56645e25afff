use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::AssetUrlBuilder;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub detection: DetectionConfig,
    pub dedup: DedupConfig,
    pub delivery: DeliveryConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Confidence scoring knobs shared by the promise and request detectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub base_confidence: f64,
    pub explicit_phrase_boost: f64,
    pub direct_address_boost: f64,
    pub intent_phrase_boost: f64,
    pub keyword_hit_boost: f64,
    pub keyword_boost_cap: f64,
    pub canonical_domain_floor: f64,
    /// `None` disables the phone-number floor entirely.
    pub phone_number_floor: Option<f64>,
    pub min_action_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            base_confidence: 0.5,
            explicit_phrase_boost: 0.2,
            direct_address_boost: 0.1,
            intent_phrase_boost: 0.1,
            keyword_hit_boost: 0.05,
            keyword_boost_cap: 0.15,
            canonical_domain_floor: 0.75,
            phone_number_floor: Some(0.85),
            min_action_confidence: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DedupConfig {
    pub ttl_secs: u64,
    pub failure_strategy: GuardFailureStrategy,
}

#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub gateway_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
    pub max_message_chars: usize,
    pub truncation_marker: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FranchiseConfig {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// Franchise, level and alias tables. Loaded once and handed to the URL
/// builder and context resolver as immutable values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub franchises: Vec<FranchiseConfig>,
    #[serde(default)]
    pub tenant_franchises: BTreeMap<String, String>,
    #[serde(default)]
    pub level_types: Vec<String>,
    /// alias phrase → location code
    #[serde(default)]
    pub location_aliases: BTreeMap<String, String>,
    /// alias phrase → level name (as listed in `level_types`)
    #[serde(default)]
    pub level_aliases: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardFailureStrategy {
    /// Permit the send when the guard store cannot be reached.
    FailOpen,
    /// Skip the send when the guard store cannot be reached.
    FailClosed,
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
    pub dedup_ttl_secs: Option<u64>,
    pub delivery_gateway_url: Option<String>,
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
                url: "sqlite://promissory.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            detection: DetectionConfig::default(),
            dedup: DedupConfig { ttl_secs: 86_400, failure_strategy: GuardFailureStrategy::FailOpen },
            delivery: DeliveryConfig {
                gateway_url: None,
                api_token: None,
                timeout_secs: 10,
                max_message_chars: 320,
                truncation_marker: "...".to_string(),
            },
            catalog: CatalogConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for GuardFailureStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" => Ok(Self::FailOpen),
            "fail_closed" => Ok(Self::FailClosed),
            other => Err(ConfigError::Validation(format!(
                "unsupported dedup failure strategy `{other}` (expected fail_open|fail_closed)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("promissory.toml"));
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

        if let Some(detection) = patch.detection {
            let target = &mut self.detection;
            if let Some(value) = detection.base_confidence {
                target.base_confidence = value;
            }
            if let Some(value) = detection.explicit_phrase_boost {
                target.explicit_phrase_boost = value;
            }
            if let Some(value) = detection.direct_address_boost {
                target.direct_address_boost = value;
            }
            if let Some(value) = detection.intent_phrase_boost {
                target.intent_phrase_boost = value;
            }
            if let Some(value) = detection.keyword_hit_boost {
                target.keyword_hit_boost = value;
            }
            if let Some(value) = detection.keyword_boost_cap {
                target.keyword_boost_cap = value;
            }
            if let Some(value) = detection.canonical_domain_floor {
                target.canonical_domain_floor = value;
            }
            if let Some(enabled) = detection.phone_number_floor_enabled {
                if !enabled {
                    target.phone_number_floor = None;
                }
            }
            if let Some(value) = detection.phone_number_floor {
                target.phone_number_floor = Some(value);
            }
            if let Some(value) = detection.min_action_confidence {
                target.min_action_confidence = value;
            }
        }

        if let Some(dedup) = patch.dedup {
            if let Some(ttl_secs) = dedup.ttl_secs {
                self.dedup.ttl_secs = ttl_secs;
            }
            if let Some(failure_strategy) = dedup.failure_strategy {
                self.dedup.failure_strategy = failure_strategy;
            }
        }

        if let Some(delivery) = patch.delivery {
            if let Some(gateway_url) = delivery.gateway_url {
                self.delivery.gateway_url = Some(gateway_url);
            }
            if let Some(api_token_value) = delivery.api_token {
                self.delivery.api_token = Some(secret_value(api_token_value));
            }
            if let Some(timeout_secs) = delivery.timeout_secs {
                self.delivery.timeout_secs = timeout_secs;
            }
            if let Some(max_message_chars) = delivery.max_message_chars {
                self.delivery.max_message_chars = max_message_chars;
            }
            if let Some(truncation_marker) = delivery.truncation_marker {
                self.delivery.truncation_marker = truncation_marker;
            }
        }

        if let Some(catalog) = patch.catalog {
            self.catalog = catalog;
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
        if let Some(value) = read_env("PROMISSORY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PROMISSORY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PROMISSORY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PROMISSORY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PROMISSORY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROMISSORY_DETECTION_MIN_ACTION_CONFIDENCE") {
            self.detection.min_action_confidence =
                parse_f64("PROMISSORY_DETECTION_MIN_ACTION_CONFIDENCE", &value)?;
        }
        if let Some(value) = read_env("PROMISSORY_DETECTION_PHONE_NUMBER_FLOOR") {
            self.detection.phone_number_floor = match value.trim().to_ascii_lowercase().as_str() {
                "off" | "none" | "disabled" => None,
                _ => Some(parse_f64("PROMISSORY_DETECTION_PHONE_NUMBER_FLOOR", &value)?),
            };
        }

        if let Some(value) = read_env("PROMISSORY_DEDUP_TTL_SECS") {
            self.dedup.ttl_secs = parse_u64("PROMISSORY_DEDUP_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PROMISSORY_DEDUP_FAILURE_STRATEGY") {
            self.dedup.failure_strategy = value.parse()?;
        }

        if let Some(value) = read_env("PROMISSORY_DELIVERY_GATEWAY_URL") {
            self.delivery.gateway_url = Some(value);
        }
        if let Some(value) = read_env("PROMISSORY_DELIVERY_API_TOKEN") {
            self.delivery.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("PROMISSORY_DELIVERY_TIMEOUT_SECS") {
            self.delivery.timeout_secs = parse_u64("PROMISSORY_DELIVERY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PROMISSORY_DELIVERY_MAX_MESSAGE_CHARS") {
            self.delivery.max_message_chars =
                parse_usize("PROMISSORY_DELIVERY_MAX_MESSAGE_CHARS", &value)?;
        }

        let log_level =
            read_env("PROMISSORY_LOGGING_LEVEL").or_else(|| read_env("PROMISSORY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROMISSORY_LOGGING_FORMAT").or_else(|| read_env("PROMISSORY_LOG_FORMAT"));
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
        if let Some(ttl_secs) = overrides.dedup_ttl_secs {
            self.dedup.ttl_secs = ttl_secs;
        }
        if let Some(gateway_url) = overrides.delivery_gateway_url {
            self.delivery.gateway_url = Some(gateway_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_detection(&self.detection)?;
        validate_dedup(&self.dedup)?;
        validate_delivery(&self.delivery)?;
        validate_catalog(&self.catalog)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `AppConfig::load` would read: the explicit path when it exists,
/// else `promissory.toml`, else `config/promissory.toml`.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("promissory.toml"), PathBuf::from("config/promissory.toml")]
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

fn validate_detection(detection: &DetectionConfig) -> Result<(), ConfigError> {
    let unit_fields = [
        ("detection.base_confidence", Some(detection.base_confidence)),
        ("detection.explicit_phrase_boost", Some(detection.explicit_phrase_boost)),
        ("detection.direct_address_boost", Some(detection.direct_address_boost)),
        ("detection.intent_phrase_boost", Some(detection.intent_phrase_boost)),
        ("detection.keyword_hit_boost", Some(detection.keyword_hit_boost)),
        ("detection.keyword_boost_cap", Some(detection.keyword_boost_cap)),
        ("detection.canonical_domain_floor", Some(detection.canonical_domain_floor)),
        ("detection.phone_number_floor", detection.phone_number_floor),
        ("detection.min_action_confidence", Some(detection.min_action_confidence)),
    ];

    for (field, value) in unit_fields {
        if let Some(value) = value {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!("{field} must be in range 0.0..=1.0")));
            }
        }
    }

    Ok(())
}

const MAX_DEDUP_TTL_SECS: u64 = 366 * 86_400;

fn validate_dedup(dedup: &DedupConfig) -> Result<(), ConfigError> {
    if dedup.ttl_secs == 0 || dedup.ttl_secs > MAX_DEDUP_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "dedup.ttl_secs must be in range 1..={MAX_DEDUP_TTL_SECS}"
        )));
    }
    Ok(())
}

fn validate_delivery(delivery: &DeliveryConfig) -> Result<(), ConfigError> {
    if delivery.timeout_secs == 0 || delivery.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "delivery.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    let marker_chars = delivery.truncation_marker.chars().count();
    if delivery.max_message_chars <= marker_chars {
        return Err(ConfigError::Validation(
            "delivery.max_message_chars must be longer than delivery.truncation_marker".to_string(),
        ));
    }

    if let Some(gateway_url) = &delivery.gateway_url {
        if !gateway_url.starts_with("http://") && !gateway_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "delivery.gateway_url must start with http:// or https://".to_string(),
            ));
        }
        let has_token = delivery
            .api_token
            .as_ref()
            .map(|token| !token.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if !has_token {
            return Err(ConfigError::Validation(
                "delivery.api_token is required when delivery.gateway_url is set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    let builder = AssetUrlBuilder::from_catalog(catalog)
        .map_err(|error| ConfigError::Validation(format!("catalog: {error}")))?;

    for (alias, code) in &catalog.location_aliases {
        if !builder.is_known_location(code) {
            return Err(ConfigError::Validation(format!(
                "catalog.location_aliases `{alias}` points at unknown location `{code}`"
            )));
        }
    }

    for (alias, level) in &catalog.level_aliases {
        if !builder.has_level_name(level) {
            return Err(ConfigError::Validation(format!(
                "catalog.level_aliases `{alias}` points at unknown level `{level}`"
            )));
        }
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    detection: Option<DetectionPatch>,
    dedup: Option<DedupPatch>,
    delivery: Option<DeliveryPatch>,
    catalog: Option<CatalogConfig>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectionPatch {
    base_confidence: Option<f64>,
    explicit_phrase_boost: Option<f64>,
    direct_address_boost: Option<f64>,
    intent_phrase_boost: Option<f64>,
    keyword_hit_boost: Option<f64>,
    keyword_boost_cap: Option<f64>,
    canonical_domain_floor: Option<f64>,
    phone_number_floor: Option<f64>,
    phone_number_floor_enabled: Option<bool>,
    min_action_confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DedupPatch {
    ttl_secs: Option<u64>,
    failure_strategy: Option<GuardFailureStrategy>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryPatch {
    gateway_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
    max_message_chars: Option<usize>,
    truncation_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, GuardFailureStrategy, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

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

    fn write_config(dir: &TempDir, body: &str) -> Result<std::path::PathBuf, String> {
        let path = dir.path().join("promissory.toml");
        fs::write(&path, body).map_err(|err| err.to_string())?;
        Ok(path)
    }

    #[test]
    fn defaults_validate_without_a_config_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.dedup.ttl_secs == 86_400, "default dedup ttl should be one day")?;
        ensure(
            config.dedup.failure_strategy == GuardFailureStrategy::FailOpen,
            "guard store outages should fail open by default",
        )?;
        ensure(
            config.detection.phone_number_floor == Some(0.85),
            "phone number floor should default to 0.85",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation_and_catalog_tables() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DELIVERY_TOKEN", "tok-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[delivery]
gateway_url = "https://sms-gateway.example/v1/messages"
api_token = "${TEST_DELIVERY_TOKEN}"

[catalog]
level_types = ["Starfish", "Adult Level 1"]

[[catalog.franchises]]
id = "laf"
base_url = "https://register.littleaquafins.example/enroll"
locations = ["LAFCypress"]

[catalog.location_aliases]
cypress = "LAFCypress"

[catalog.level_aliases]
starfish = "Starfish"
"adult level 1" = "Adult Level 1"
"#,
            )?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .delivery
                    .api_token
                    .as_ref()
                    .map(|token| token.expose_secret() == "tok-from-env")
                    .unwrap_or(false),
                "api token should be loaded from environment",
            )?;
            ensure(config.catalog.franchises.len() == 1, "one franchise should be loaded")?;
            ensure(
                config.catalog.location_aliases.get("cypress").map(String::as_str)
                    == Some("LAFCypress"),
                "location alias should be loaded",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DELIVERY_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROMISSORY_LOG_LEVEL", "warn");
        env::set_var("PROMISSORY_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["PROMISSORY_LOG_LEVEL", "PROMISSORY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROMISSORY_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("PROMISSORY_DEDUP_TTL_SECS", "600");
        env::set_var("PROMISSORY_DETECTION_PHONE_NUMBER_FLOOR", "off");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[database]
url = "sqlite://from-file.db"

[dedup]
ttl_secs = 120
failure_strategy = "fail_closed"

[logging]
level = "warn"
"#,
            )?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.dedup.ttl_secs == 600, "env dedup ttl should win over file")?;
            ensure(
                config.dedup.failure_strategy == GuardFailureStrategy::FailClosed,
                "file failure strategy should win over default",
            )?;
            ensure(
                config.detection.phone_number_floor.is_none(),
                "phone number floor should be disabled from env",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "PROMISSORY_DATABASE_URL",
            "PROMISSORY_DEDUP_TTL_SECS",
            "PROMISSORY_DETECTION_PHONE_NUMBER_FLOOR",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_on_dangling_alias() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = write_config(
            &dir,
            r#"
[[catalog.franchises]]
id = "laf"
base_url = "https://register.littleaquafins.example/enroll"
locations = ["LAFCypress"]

[catalog.location_aliases]
katy = "LAFKaty"
"#,
        )?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("catalog.location_aliases")
        );
        ensure(has_message, "validation failure should mention catalog.location_aliases")
    }

    #[test]
    fn gateway_without_token_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                delivery_gateway_url: Some("https://sms-gateway.example/v1/messages".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("delivery.api_token")),
            "missing api token should be reported",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROMISSORY_DELIVERY_GATEWAY_URL", "https://sms-gateway.example/v1");
        env::set_var("PROMISSORY_DELIVERY_API_TOKEN", "tok-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("tok-secret-value"), "debug output should not contain api token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["PROMISSORY_DELIVERY_GATEWAY_URL", "PROMISSORY_DELIVERY_API_TOKEN"]);
        result
    }

    #[test]
    fn dedup_ttl_is_bounded() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.dedup.ttl_secs = u64::MAX;

        ensure(
            matches!(config.validate(), Err(ConfigError::Validation(ref message)) if message.contains("dedup.ttl_secs")),
            "oversized dedup ttl should be rejected",
        )?;

        config.dedup.ttl_secs = 30 * 86_400;
        ensure(config.validate().is_ok(), "a thirty day ttl should be accepted")
    }
}
