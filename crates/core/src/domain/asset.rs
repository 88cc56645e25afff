use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Closed set of deliverable content categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    RegistrationLink,
    Schedule,
    Pricing,
    Info,
}

impl AssetType {
    pub const ALL: [AssetType; 4] =
        [AssetType::RegistrationLink, AssetType::Schedule, AssetType::Pricing, AssetType::Info];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistrationLink => "registration_link",
            Self::Schedule => "schedule",
            Self::Pricing => "pricing",
            Self::Info => "info",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "registration_link" => Some(Self::RegistrationLink),
            "schedule" => Some(Self::Schedule),
            "pricing" => Some(Self::Pricing),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    pub url: String,
    pub message_template: String,
    pub enabled: bool,
}

/// Validated per-tenant asset configuration.
///
/// Built through [`TenantAssetConfig::new`], which rejects entries with a
/// non-http(s) URL or an empty template, so consumers never re-check shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAssetConfig {
    sender_id: String,
    assets: BTreeMap<AssetType, AssetSettings>,
}

impl TenantAssetConfig {
    pub fn new(
        sender_id: impl Into<String>,
        assets: BTreeMap<AssetType, AssetSettings>,
    ) -> Result<Self, DomainError> {
        let sender_id = sender_id.into();
        if sender_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "tenant asset config requires a sender id".to_string(),
            ));
        }

        for (asset_type, settings) in &assets {
            let url = settings.url.trim();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DomainError::InvariantViolation(format!(
                    "asset `{asset_type}` url must start with http:// or https://"
                )));
            }
            if settings.message_template.trim().is_empty() {
                return Err(DomainError::InvariantViolation(format!(
                    "asset `{asset_type}` message_template must not be empty"
                )));
            }
        }

        Ok(Self { sender_id, assets })
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn asset(&self, asset_type: AssetType) -> Option<&AssetSettings> {
        self.assets.get(&asset_type)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&AssetType, &AssetSettings)> {
        self.assets.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{AssetSettings, AssetType, TenantAssetConfig};

    #[test]
    fn asset_type_round_trips_from_storage_encoding() {
        for asset_type in AssetType::ALL {
            assert_eq!(AssetType::parse(asset_type.as_str()), Some(asset_type));
        }
        assert_eq!(AssetType::parse("brochure"), None);
    }

    #[test]
    fn tenant_config_rejects_non_http_urls() {
        let mut assets = BTreeMap::new();
        assets.insert(
            AssetType::Schedule,
            AssetSettings {
                url: "ftp://schedules.example.com".to_string(),
                message_template: "Here you go: {url}".to_string(),
                enabled: true,
            },
        );

        let error = TenantAssetConfig::new("+15550001111", assets).expect_err("invalid url");
        assert!(error.to_string().contains("schedule"));
    }

    #[test]
    fn tenant_config_rejects_blank_templates() {
        let mut assets = BTreeMap::new();
        assets.insert(
            AssetType::Pricing,
            AssetSettings {
                url: "https://example.com/pricing".to_string(),
                message_template: "   ".to_string(),
                enabled: true,
            },
        );

        assert!(TenantAssetConfig::new("+15550001111", assets).is_err());
    }
}
