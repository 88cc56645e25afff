use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::asset::AssetType;
use crate::domain::lead::{LeadId, TenantId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Sent,
    FailedFinal,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::FailedFinal => "failed_final",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sent" => Some(Self::Sent),
            "failed_final" => Some(Self::FailedFinal),
            _ => None,
        }
    }
}

/// Append-only audit entry on a lead's fulfillment history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRecord {
    pub asset_type: AssetType,
    pub status: FulfillmentStatus,
    pub message_id: Option<String>,
    pub destination: String,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RecentlySent,
    NotConfigured,
    Disabled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecentlySent => "recently_sent",
            Self::NotConfigured => "not_configured",
            Self::Disabled => "disabled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FulfillmentOutcome {
    Sent { asset_type: AssetType, message_id: Option<String>, destination: String, body: String },
    Deferred { asset_type: AssetType, newly_queued: bool },
    Skipped { asset_type: AssetType, reason: SkipReason },
    Failed { asset_type: AssetType, detail: String, retryable: bool },
}

impl FulfillmentOutcome {
    pub fn asset_type(&self) -> AssetType {
        match self {
            Self::Sent { asset_type, .. }
            | Self::Deferred { asset_type, .. }
            | Self::Skipped { asset_type, .. }
            | Self::Failed { asset_type, .. } => *asset_type,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Deferred { .. } => "deferred",
            Self::Skipped { .. } => "skipped",
            Self::Failed { retryable: true, .. } => "failed_retryable",
            Self::Failed { retryable: false, .. } => "failed_final",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Deferred { .. } | Self::Failed { retryable: true, .. })
    }
}

/// Dedup guard key for one `(tenant, lead, asset_type)` triple.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GuardKey(String);

impl GuardKey {
    pub fn new(tenant_id: &TenantId, lead_id: &LeadId, asset_type: AssetType) -> Self {
        Self(format!("fulfillment:{}:{}:{}", tenant_id.0, lead_id.0, asset_type.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub from: String,
    pub body: String,
}

/// Gateway acknowledgement. `message_id` is `None` when the gateway
/// accepted the message but its response carried no usable id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
    pub status: String,
}
