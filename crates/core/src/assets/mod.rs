//! Canonical delivery-link construction.
//!
//! Links are only ever built from allow-listed location codes and level/type
//! tokens. Level names are percent-escaped exactly once, when the catalog is
//! loaded; lookups afterwards hand out the stored canonical token, so a value
//! that is already canonical is never escaped again.

use std::collections::{BTreeMap, BTreeSet};

use url::Url;

use crate::config::CatalogConfig;
use crate::domain::lead::TenantId;
use crate::errors::{AssetUrlError, DomainError};

pub const LOCATION_PARAM: &str = "loc";
pub const TYPE_PARAM: &str = "type";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Franchise {
    pub id: String,
    pub base_url: String,
    host: String,
    path: String,
    locations: BTreeSet<String>,
}

impl Franchise {
    pub fn owns_location(&self, location_code: &str) -> bool {
        self.locations.contains(location_code)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }
}

/// Human-readable level name → canonical pre-escaped token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelTypeTable {
    by_name: BTreeMap<String, String>,
    tokens: BTreeSet<String>,
}

impl LevelTypeTable {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::default();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let token = urlencoding::encode(name).into_owned();
            table.by_name.insert(name.to_lowercase(), token.clone());
            table.tokens.insert(token);
        }
        table
    }

    /// Resolves either a human-readable name or a canonical token to the
    /// canonical token. Canonical tokens pass through verbatim.
    pub fn normalize(&self, raw: &str) -> Result<String, AssetUrlError> {
        let trimmed = raw.trim();
        if self.tokens.contains(trimmed) {
            return Ok(trimmed.to_string());
        }
        self.by_name
            .get(&trimmed.to_lowercase())
            .cloned()
            .ok_or_else(|| AssetUrlError::InvalidTypeCode(raw.to_string()))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.trim().to_lowercase())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetUrlBuilder {
    franchises: Vec<Franchise>,
    tenant_franchises: BTreeMap<TenantId, usize>,
    levels: LevelTypeTable,
}

impl AssetUrlBuilder {
    pub fn from_catalog(catalog: &CatalogConfig) -> Result<Self, DomainError> {
        let mut franchises = Vec::with_capacity(catalog.franchises.len());
        let mut index_by_id = BTreeMap::new();

        for franchise in &catalog.franchises {
            let parsed = Url::parse(franchise.base_url.trim()).map_err(|error| {
                DomainError::InvariantViolation(format!(
                    "franchise `{}` base_url is not a valid URL: {error}",
                    franchise.id
                ))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(DomainError::InvariantViolation(format!(
                    "franchise `{}` base_url must use http or https",
                    franchise.id
                )));
            }
            let host = parsed.host_str().map(str::to_ascii_lowercase).ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "franchise `{}` base_url has no host",
                    franchise.id
                ))
            })?;

            let mut locations = BTreeSet::new();
            for code in &franchise.locations {
                if !is_url_safe_code(code) {
                    return Err(DomainError::InvariantViolation(format!(
                        "franchise `{}` location code `{code}` must be ASCII alphanumeric, `-` or `_`",
                        franchise.id
                    )));
                }
                locations.insert(code.clone());
            }

            if index_by_id.insert(franchise.id.clone(), franchises.len()).is_some() {
                return Err(DomainError::InvariantViolation(format!(
                    "franchise `{}` is declared more than once",
                    franchise.id
                )));
            }
            franchises.push(Franchise {
                id: franchise.id.clone(),
                base_url: franchise.base_url.trim().to_string(),
                host,
                path: normalized_path(parsed.path()),
                locations,
            });
        }

        let mut tenant_franchises = BTreeMap::new();
        for (tenant, franchise_id) in &catalog.tenant_franchises {
            let index = index_by_id.get(franchise_id).copied().ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "tenant `{tenant}` is mapped to unknown franchise `{franchise_id}`"
                ))
            })?;
            tenant_franchises.insert(TenantId(tenant.clone()), index);
        }

        Ok(Self { franchises, tenant_franchises, levels: LevelTypeTable::new(&catalog.level_types) })
    }

    /// Builds `{base}?loc={code}[&type={token}]` for the franchise that
    /// serves `tenant`, or else the first franchise owning the location.
    pub fn build_asset_url(
        &self,
        location_code: &str,
        type_code: Option<&str>,
        tenant: Option<&TenantId>,
    ) -> Result<String, AssetUrlError> {
        let location_code = location_code.trim();
        let franchise = self.franchise_for(location_code, tenant)?;
        let type_token = type_code.map(|raw| self.levels.normalize(raw)).transpose()?;

        let base = franchise.base_url.as_str();
        let joiner = match base.find('?') {
            None => "?",
            Some(_) if base.ends_with('?') || base.ends_with('&') => "",
            Some(_) => "&",
        };

        let mut url = format!("{base}{joiner}{LOCATION_PARAM}={location_code}");
        if let Some(token) = type_token {
            url.push('&');
            url.push_str(TYPE_PARAM);
            url.push('=');
            url.push_str(&token);
        }
        Ok(url)
    }

    /// Recovers `(location_code, type_token)` from a link this builder could
    /// have produced. The host and path must match a franchise base URL and
    /// that franchise must own the location; anything else yields `None`.
    /// Callers that forward the link should rebuild it from the returned
    /// codes rather than reuse `raw`.
    pub fn parse_canonical_url(&self, raw: &str) -> Option<(String, Option<String>)> {
        let parsed = Url::parse(raw).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let host = parsed.host_str()?.to_ascii_lowercase();
        let path = normalized_path(parsed.path());

        let mut location = None;
        let mut level = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                LOCATION_PARAM if location.is_none() => location = Some(value.into_owned()),
                TYPE_PARAM if level.is_none() => level = Some(value.into_owned()),
                _ => {}
            }
        }

        let location = location?;
        let owned = self.franchises.iter().any(|franchise| {
            franchise.host == host && franchise.path == path && franchise.owns_location(&location)
        });
        if !owned {
            return None;
        }
        let level = level.and_then(|raw| self.levels.normalize(&raw).ok());
        Some((location, level))
    }

    pub fn normalize_type(&self, raw: &str) -> Result<String, AssetUrlError> {
        self.levels.normalize(raw)
    }

    pub fn is_known_location(&self, location_code: &str) -> bool {
        self.franchises.iter().any(|franchise| franchise.owns_location(location_code))
    }

    pub fn has_level_name(&self, name: &str) -> bool {
        self.levels.contains_name(name)
    }

    pub fn canonical_hosts(&self) -> Vec<String> {
        let hosts =
            self.franchises.iter().map(|franchise| franchise.host.clone()).collect::<BTreeSet<_>>();
        hosts.into_iter().collect()
    }

    pub fn franchises(&self) -> &[Franchise] {
        &self.franchises
    }

    fn franchise_for(
        &self,
        location_code: &str,
        tenant: Option<&TenantId>,
    ) -> Result<&Franchise, AssetUrlError> {
        let mapped = tenant
            .and_then(|tenant| self.tenant_franchises.get(tenant))
            .map(|index| &self.franchises[*index]);

        let franchise = match mapped {
            Some(franchise) => Some(franchise),
            None => self.franchises.iter().find(|franchise| franchise.owns_location(location_code)),
        };

        franchise
            .filter(|franchise| franchise.owns_location(location_code))
            .ok_or_else(|| AssetUrlError::InvalidLocationCode(location_code.to_string()))
    }
}

fn normalized_path(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

fn is_url_safe_code(code: &str) -> bool {
    !code.is_empty()
        && code.chars().all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{AssetUrlBuilder, LevelTypeTable};
    use crate::config::{CatalogConfig, FranchiseConfig};
    use crate::domain::lead::TenantId;
    use crate::errors::AssetUrlError;

    fn catalog() -> CatalogConfig {
        CatalogConfig {
            franchises: vec![
                FranchiseConfig {
                    id: "laf".to_string(),
                    base_url: "https://register.littleaquafins.example/enroll".to_string(),
                    locations: vec!["LAFCypress".to_string(), "LAFKaty".to_string()],
                },
                FranchiseConfig {
                    id: "swimco".to_string(),
                    base_url: "https://book.swimco.example/signup?src=sms".to_string(),
                    locations: vec!["LAFCypress".to_string(), "SCSpring".to_string()],
                },
            ],
            tenant_franchises: BTreeMap::from([
                ("tenant-laf".to_string(), "laf".to_string()),
                ("tenant-swimco".to_string(), "swimco".to_string()),
            ]),
            level_types: vec![
                "Starfish".to_string(),
                "Adult Level 1".to_string(),
                "Adult".to_string(),
            ],
            ..CatalogConfig::default()
        }
    }

    #[test]
    fn builds_url_with_location_and_type() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");
        let url = builder.build_asset_url("LAFKaty", Some("Starfish"), None).expect("url");

        assert_eq!(url, "https://register.littleaquafins.example/enroll?loc=LAFKaty&type=Starfish");
    }

    #[test]
    fn human_readable_level_is_escaped_once_and_canonical_tokens_pass_through() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");

        let from_name =
            builder.build_asset_url("LAFKaty", Some("adult level 1"), None).expect("from name");
        let from_token =
            builder.build_asset_url("LAFKaty", Some("Adult%20Level%201"), None).expect("from token");

        assert!(from_name.ends_with("type=Adult%20Level%201"));
        assert_eq!(from_name, from_token);
        assert!(!from_token.contains("%2520"), "canonical token must not be re-escaped");
    }

    #[test]
    fn unlisted_location_is_rejected() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");

        assert_eq!(
            builder.build_asset_url("Atlantis", None, None),
            Err(AssetUrlError::InvalidLocationCode("Atlantis".to_string()))
        );
    }

    #[test]
    fn unlisted_level_is_rejected() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");

        assert_eq!(
            builder.build_asset_url("LAFKaty", Some("Shark"), None),
            Err(AssetUrlError::InvalidTypeCode("Shark".to_string()))
        );
    }

    #[test]
    fn tenants_in_different_franchises_get_their_own_base_url_for_shared_location() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");

        let laf = builder
            .build_asset_url("LAFCypress", None, Some(&TenantId("tenant-laf".to_string())))
            .expect("laf url");
        let swimco = builder
            .build_asset_url("LAFCypress", None, Some(&TenantId("tenant-swimco".to_string())))
            .expect("swimco url");

        assert_eq!(laf, "https://register.littleaquafins.example/enroll?loc=LAFCypress");
        assert_eq!(swimco, "https://book.swimco.example/signup?src=sms&loc=LAFCypress");
    }

    #[test]
    fn unmapped_tenant_falls_back_to_the_franchise_owning_the_location() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");

        let url = builder
            .build_asset_url("SCSpring", None, Some(&TenantId("tenant-unknown".to_string())))
            .expect("reverse lookup");

        assert!(url.starts_with("https://book.swimco.example/"));
    }

    #[test]
    fn mapped_tenant_cannot_use_a_location_outside_its_franchise() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");

        let result =
            builder.build_asset_url("SCSpring", None, Some(&TenantId("tenant-laf".to_string())));

        assert_eq!(result, Err(AssetUrlError::InvalidLocationCode("SCSpring".to_string())));
    }

    #[test]
    fn parse_recovers_codes_from_built_url() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");
        let url = builder.build_asset_url("LAFKaty", Some("Adult Level 1"), None).expect("url");

        assert_eq!(
            builder.parse_canonical_url(&url),
            Some(("LAFKaty".to_string(), Some("Adult%20Level%201".to_string())))
        );
        assert_eq!(builder.parse_canonical_url("https://elsewhere.example/?loc=LAFKaty"), None);
    }

    #[test]
    fn parse_rejects_links_off_the_franchise_base_path() {
        let builder = AssetUrlBuilder::from_catalog(&catalog()).expect("catalog");

        assert_eq!(
            builder.parse_canonical_url(
                "https://register.littleaquafins.example/phish?loc=LAFCypress&next=https://evil.example"
            ),
            None
        );
        assert_eq!(
            builder.parse_canonical_url("https://register.littleaquafins.example/enroll?loc=SCSpring"),
            None
        );
        assert_eq!(
            builder.parse_canonical_url(
                "https://register.littleaquafins.example/enroll/?loc=LAFKaty&next=https://evil.example"
            ),
            Some(("LAFKaty".to_string(), None))
        );
    }

    #[test]
    fn catalog_rejects_unsafe_location_codes_and_unknown_tenant_franchises() {
        let mut unsafe_code = catalog();
        unsafe_code.franchises[0].locations.push("Bad Code".to_string());
        assert!(AssetUrlBuilder::from_catalog(&unsafe_code).is_err());

        let mut dangling = catalog();
        dangling.tenant_franchises.insert("tenant-x".to_string(), "ghost".to_string());
        assert!(AssetUrlBuilder::from_catalog(&dangling).is_err());
    }

    #[test]
    fn level_table_escapes_reserved_characters_once() {
        let table = LevelTypeTable::new(["Parent & Tot"]);

        assert_eq!(table.normalize("parent & tot"), Ok("Parent%20%26%20Tot".to_string()));
        assert_eq!(table.normalize("Parent%20%26%20Tot"), Ok("Parent%20%26%20Tot".to_string()));
    }
}
