use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use promissory_core::config::DetectionConfig;
use promissory_core::domain::asset::AssetType;
use promissory_core::domain::signal::{PromiseSignal, RequestSignal};
use promissory_core::patterns::PatternTables;

/// Scores assistant replies for a commitment to send something.
#[derive(Clone, Debug)]
pub struct PromiseSignalDetector {
    patterns: Arc<PatternTables>,
    config: DetectionConfig,
    canonical_hosts: Vec<String>,
}

impl PromiseSignalDetector {
    pub fn new(patterns: Arc<PatternTables>, config: DetectionConfig) -> Self {
        Self { patterns, config, canonical_hosts: Vec::new() }
    }

    /// Hosts whose presence in the conversation lifts confidence to
    /// `canonical_domain_floor`.
    pub fn with_canonical_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.canonical_hosts =
            hosts.into_iter().map(|host| host.into().to_ascii_lowercase()).collect();
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// `None` means the reply makes no promise. That is the common case and
    /// never an error.
    pub fn detect_assistant_promise(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> Option<PromiseSignal> {
        if text.trim().is_empty() {
            return None;
        }

        let phrase = self.patterns.first_promise_phrase(text)?;

        let combined = match context {
            Some(context) if !context.trim().is_empty() => format!("{text}\n{context}"),
            _ => text.to_string(),
        };

        let (asset_type, hits) =
            self.patterns.best_category(&combined).unwrap_or((AssetType::Info, 0));

        let mut confidence = self.config.base_confidence;
        if self.patterns.has_explicit_send(text) {
            confidence += self.config.explicit_phrase_boost;
        }
        if hits > 1 {
            confidence += (self.config.keyword_hit_boost * (hits - 1) as f64)
                .min(self.config.keyword_boost_cap);
        }
        if self.patterns.has_direct_address(text) {
            confidence += self.config.direct_address_boost;
        }
        let mut confidence = confidence.clamp(0.0, 1.0);

        let lowered = combined.to_lowercase();
        if self.canonical_hosts.iter().any(|host| lowered.contains(host.as_str())) {
            confidence = confidence.max(self.config.canonical_domain_floor);
        }
        if let Some(floor) = self.config.phone_number_floor {
            if self.patterns.contains_phone_number(&combined) {
                confidence = confidence.max(floor);
            }
        }

        debug!(
            event_name = "detect.promise.matched",
            asset_type = asset_type.as_str(),
            language = phrase.language.as_str(),
            keyword_hits = hits,
            confidence,
            "assistant promise detected"
        );

        Some(PromiseSignal {
            asset_type,
            confidence: confidence.clamp(0.0, 1.0),
            origin_text: text.to_string(),
            detected_at: Utc::now(),
        })
    }
}

/// Scores user messages that ask for something to be sent.
#[derive(Clone, Debug)]
pub struct UserRequestSignalDetector {
    patterns: Arc<PatternTables>,
    config: DetectionConfig,
}

impl UserRequestSignalDetector {
    pub fn new(patterns: Arc<PatternTables>, config: DetectionConfig) -> Self {
        Self { patterns, config }
    }

    pub fn detect_user_request(&self, text: &str) -> Option<RequestSignal> {
        if text.trim().is_empty() {
            return None;
        }

        let asset_type = self.patterns.first_request_family(text)?;
        let hits = self.patterns.keyword_hits(asset_type, text);

        let mut confidence = self.config.base_confidence;
        if self.patterns.has_send_me(text) {
            confidence += self.config.explicit_phrase_boost;
        }
        confidence +=
            (self.config.keyword_hit_boost * hits as f64).min(self.config.keyword_boost_cap);
        if self.patterns.has_intent_phrase(text) {
            confidence += self.config.intent_phrase_boost;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        debug!(
            event_name = "detect.request.matched",
            asset_type = asset_type.as_str(),
            keyword_hits = hits,
            confidence,
            "user request detected"
        );

        Some(RequestSignal {
            asset_type,
            confidence,
            origin_text: text.to_string(),
            detected_at: Utc::now(),
        })
    }
}
