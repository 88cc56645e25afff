use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use promissory_core::assets::AssetUrlBuilder;
use promissory_core::config::CatalogConfig;
use promissory_core::domain::conversation::{ConversationContext, ConversationMessage};
use promissory_core::domain::lead::TenantId;
use promissory_core::errors::AssetUrlError;

/// Reconstructs the most specific delivery target from dialogue history.
///
/// A canonical link already present in the conversation wins over anything
/// inferred from free text. Resolution never fails: builder errors degrade the
/// result (drop the level, or return an empty context) and are logged.
#[derive(Clone, Debug)]
pub struct ConversationContextResolver {
    builder: Arc<AssetUrlBuilder>,
    location_aliases: Vec<(String, String)>,
    level_aliases: Vec<(String, String)>,
}

impl ConversationContextResolver {
    pub fn new(builder: Arc<AssetUrlBuilder>, catalog: &CatalogConfig) -> Self {
        let mut locations = BTreeMap::new();
        for franchise in &catalog.franchises {
            for code in &franchise.locations {
                locations.insert(code.to_lowercase(), code.clone());
            }
        }
        for (alias, code) in &catalog.location_aliases {
            locations.insert(alias.trim().to_lowercase(), code.clone());
        }

        let mut levels = BTreeMap::new();
        for name in &catalog.level_types {
            levels.insert(name.trim().to_lowercase(), name.trim().to_string());
        }
        for (alias, name) in &catalog.level_aliases {
            levels.insert(alias.trim().to_lowercase(), name.clone());
        }

        Self {
            builder,
            location_aliases: longest_first(locations),
            level_aliases: longest_first(levels),
        }
    }

    pub fn builder(&self) -> &AssetUrlBuilder {
        &self.builder
    }

    pub fn resolve_context(&self, messages: &[ConversationMessage]) -> ConversationContext {
        self.resolve_for_tenant(messages, None)
    }

    /// Same as [`resolve_context`](Self::resolve_context) but builds links
    /// against the franchise mapped to `tenant_id`.
    pub fn resolve_for_tenant(
        &self,
        messages: &[ConversationMessage],
        tenant_id: Option<&TenantId>,
    ) -> ConversationContext {
        if let Some(context) = self.recover_canonical_url(messages, tenant_id) {
            return context;
        }

        let text = messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();

        let Some(location_code) = find_alias(&self.location_aliases, &text) else {
            return ConversationContext::default();
        };
        let level_name = find_alias(&self.level_aliases, &text);

        match self.builder.build_asset_url(location_code, level_name, tenant_id) {
            Ok(url) => ConversationContext {
                location_code: Some(location_code.to_string()),
                level_type_code: level_name.and_then(|name| self.builder.normalize_type(name).ok()),
                canonical_url: Some(url),
            },
            Err(AssetUrlError::InvalidTypeCode(level)) => {
                warn!(
                    event_name = "context.resolve.level_dropped",
                    location_code,
                    level = %level,
                    "inferred level is not in the catalog; resolving location only"
                );
                self.location_only(location_code, tenant_id)
            }
            Err(error) => {
                warn!(
                    event_name = "context.resolve.degraded",
                    location_code,
                    error = %error,
                    "inferred location could not be turned into a link"
                );
                ConversationContext::default()
            }
        }
    }

    fn location_only(
        &self,
        location_code: &str,
        tenant_id: Option<&TenantId>,
    ) -> ConversationContext {
        match self.builder.build_asset_url(location_code, None, tenant_id) {
            Ok(url) => ConversationContext {
                location_code: Some(location_code.to_string()),
                level_type_code: None,
                canonical_url: Some(url),
            },
            Err(error) => {
                warn!(
                    event_name = "context.resolve.degraded",
                    location_code,
                    error = %error,
                    "inferred location could not be turned into a link"
                );
                ConversationContext::default()
            }
        }
    }

    /// Newest link in the history that parses as one of ours. The outbound
    /// link is rebuilt from the recovered codes, so nothing from the raw
    /// message text beyond `loc` and `type` survives.
    fn recover_canonical_url(
        &self,
        messages: &[ConversationMessage],
        tenant_id: Option<&TenantId>,
    ) -> Option<ConversationContext> {
        messages.iter().rev().find_map(|message| {
            message.text.split_whitespace().filter_map(link_candidate).find_map(|candidate| {
                let (location_code, level) = self.builder.parse_canonical_url(candidate)?;
                match self.builder.build_asset_url(&location_code, level.as_deref(), tenant_id) {
                    Ok(url) => Some(ConversationContext {
                        location_code: Some(location_code),
                        level_type_code: level,
                        canonical_url: Some(url),
                    }),
                    Err(error) => {
                        warn!(
                            event_name = "context.resolve.link_rejected",
                            location_code = %location_code,
                            error = %error,
                            "link in history cannot be rebuilt for this tenant"
                        );
                        None
                    }
                }
            })
        })
    }
}

/// Orders alias pairs longest first; equal lengths keep lexicographic order.
fn longest_first(aliases: BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut ordered =
        aliases.into_iter().filter(|(alias, _)| !alias.is_empty()).collect::<Vec<_>>();
    ordered.sort_by(|(left, _), (right, _)| {
        right.chars().count().cmp(&left.chars().count()).then_with(|| left.cmp(right))
    });
    ordered
}

fn find_alias<'a>(aliases: &'a [(String, String)], text: &str) -> Option<&'a str> {
    aliases
        .iter()
        .find(|(alias, _)| contains_on_word_boundary(text, alias))
        .map(|(_, target)| target.as_str())
}

fn contains_on_word_boundary(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn link_candidate(token: &str) -> Option<&str> {
    let trimmed = token
        .trim_start_matches(|c: char| matches!(c, '(' | '<' | '[' | '"' | '\''))
        .trim_end_matches(|c: char| {
            matches!(c, ')' | '>' | ']' | '"' | '\'' | '.' | ',' | ';' | ':' | '!' | '?')
        });
    (trimmed.starts_with("http://") || trimmed.starts_with("https://")).then_some(trimmed)
}
