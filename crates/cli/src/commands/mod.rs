pub mod config;
pub mod detect;
pub mod doctor;
pub mod migrate;
pub mod replay;
pub mod resolve;

use std::sync::Arc;

use promissory_core::config::{AppConfig, LoadOptions};
use promissory_core::errors::ApplicationError;
use promissory_core::AssetUrlBuilder;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_APPLICATION: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_application_error(command: &str, error: &ApplicationError) -> Self {
        let message = if error.is_retryable() {
            format!("{error} (retryable)")
        } else {
            error.to_string()
        };
        Self::failure(command, error.error_class(), message, EXIT_APPLICATION)
    }
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn asset_url_builder(
    command: &str,
    config: &AppConfig,
) -> Result<Arc<AssetUrlBuilder>, CommandResult> {
    AssetUrlBuilder::from_catalog(&config.catalog).map(Arc::new).map_err(|error| {
        CommandResult::from_application_error(command, &ApplicationError::from(error))
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use promissory_core::errors::{ApplicationError, DeliveryError};
    use serde_json::{json, Value};

    use super::{CommandResult, EXIT_APPLICATION};

    #[test]
    fn data_is_omitted_when_absent() {
        let result = CommandResult::success("migrate", "done");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["status"], "ok");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn application_errors_carry_their_class() {
        let error = ApplicationError::from(DeliveryError::Transient("gateway 503".to_string()));
        let result = CommandResult::from_application_error("replay", &error);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, EXIT_APPLICATION);
        assert_eq!(payload["error_class"], "delivery_transient");
        assert!(payload["message"].as_str().unwrap_or_default().ends_with("(retryable)"));
    }

    #[test]
    fn success_payload_embeds_data() {
        let result =
            CommandResult::success_with_data("detect", "no signal", Some(json!({"signal": null})));
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["data"]["signal"], Value::Null);
    }
}
