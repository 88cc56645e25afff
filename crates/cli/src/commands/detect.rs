use std::sync::Arc;

use clap::ValueEnum;
use promissory_agent::{PromiseSignalDetector, UserRequestSignalDetector};
use promissory_core::config::AppConfig;
use promissory_core::domain::signal::PromiseSignal;
use promissory_core::patterns::PatternTables;
use serde_json::json;

use crate::commands::{asset_url_builder, load_config, CommandResult, EXIT_APPLICATION};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DetectRole {
    /// Score the text as an assistant reply that may promise something.
    Assistant,
    /// Score the text as a user message that may request something.
    User,
}

impl DetectRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }
}

pub fn run(role: DetectRole, text: &str, context: Option<&str>) -> CommandResult {
    let config = match load_config("detect") {
        Ok(config) => config,
        Err(result) => return result,
    };
    detect_with_config(&config, role, text, context)
}

pub fn detect_with_config(
    config: &AppConfig,
    role: DetectRole,
    text: &str,
    context: Option<&str>,
) -> CommandResult {
    let patterns = match PatternTables::bilingual() {
        Ok(patterns) => Arc::new(patterns),
        Err(error) => {
            let message = error.to_string();
            return CommandResult::failure("detect", "pattern_compile", message, EXIT_APPLICATION);
        }
    };

    let signal = match role {
        DetectRole::Assistant => {
            let builder = match asset_url_builder("detect", config) {
                Ok(builder) => builder,
                Err(result) => return result,
            };
            PromiseSignalDetector::new(patterns, config.detection.clone())
                .with_canonical_hosts(builder.canonical_hosts())
                .detect_assistant_promise(text, context)
        }
        DetectRole::User => UserRequestSignalDetector::new(patterns, config.detection.clone())
            .detect_user_request(text)
            .map(PromiseSignal::from),
    };

    let threshold = config.detection.min_action_confidence;
    let message = match &signal {
        Some(signal) => format!(
            "{} signal for `{}` at confidence {:.2}",
            role.as_str(),
            signal.asset_type,
            signal.confidence
        ),
        None => format!("no {} signal", role.as_str()),
    };
    let actionable = signal.as_ref().is_some_and(|signal| signal.confidence >= threshold);

    CommandResult::success_with_data(
        "detect",
        message,
        Some(json!({
            "role": role.as_str(),
            "signal": signal,
            "actionable": actionable,
            "min_action_confidence": threshold,
        })),
    )
}
