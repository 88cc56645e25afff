use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::asset::AssetType;

/// An assistant utterance that commits to sending something.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromiseSignal {
    pub asset_type: AssetType,
    pub confidence: f64,
    pub origin_text: String,
    pub detected_at: DateTime<Utc>,
}

/// A user message asking for something to be sent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestSignal {
    pub asset_type: AssetType,
    pub confidence: f64,
    pub origin_text: String,
    pub detected_at: DateTime<Utc>,
}

impl From<RequestSignal> for PromiseSignal {
    fn from(request: RequestSignal) -> Self {
        Self {
            asset_type: request.asset_type,
            confidence: request.confidence,
            origin_text: request.origin_text,
            detected_at: request.detected_at,
        }
    }
}

/// A promise waiting for the lead's contact address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingPromise {
    pub asset_type: AssetType,
    pub confidence: f64,
    pub origin_text: String,
    pub detected_at: DateTime<Utc>,
}

impl From<&PromiseSignal> for PendingPromise {
    fn from(signal: &PromiseSignal) -> Self {
        Self {
            asset_type: signal.asset_type,
            confidence: signal.confidence,
            origin_text: signal.origin_text.clone(),
            detected_at: signal.detected_at,
        }
    }
}

impl From<PendingPromise> for PromiseSignal {
    fn from(pending: PendingPromise) -> Self {
        Self {
            asset_type: pending.asset_type,
            confidence: pending.confidence,
            origin_text: pending.origin_text,
            detected_at: pending.detected_at,
        }
    }
}
