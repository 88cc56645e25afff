//! Bilingual (English / Spanish) phrase tables used by the promise and
//! request detectors.
//!
//! Tables are plain ordered data. [`PatternTables::bilingual`] compiles them
//! once into an immutable value that callers share behind an `Arc`; nothing
//! here is global or mutable after construction.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::asset::AssetType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    Spanish,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
        }
    }
}

#[derive(Debug, Error)]
#[error("pattern `{pattern}` failed to compile: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

const APOSTROPHE: &str = "(?:'|’)";

/// Assistant phrasing that commits to sending something.
const PROMISE_PHRASES: &[(&str, Language)] = &[
    (r"\bi{A}ll\s+(?:text|send|email|share|forward|shoot)\b", Language::English),
    (r"\bi\s+will\s+(?:text|send|email|share|forward|shoot)\b", Language::English),
    (r"\bi{A}m\s+(?:going\s+to|gonna)\s+(?:text|send|email|share|forward)\b", Language::English),
    (r"\bi\s+am\s+going\s+to\s+(?:text|send|email|share|forward)\b", Language::English),
    (r"\blet\s+me\s+(?:text|send|email|share|forward)\b", Language::English),
    (r"\b(?:sending|texting)\s+(?:you|it|that|this|the|over)\b", Language::English),
    (r"\byou{A}ll\s+(?:get|receive)\s+(?:a|the|an)\s+(?:text|link|message|email)\b", Language::English),
    (r"\b(?:te|le|les)\s+(?:lo\s+|la\s+)?(?:env[ií]o|mando|paso|comparto)\b", Language::Spanish),
    (r"\b(?:te|le|les)\s+voy\s+a\s+(?:enviar|mandar|pasar|compartir)\b", Language::Spanish),
    (r"\b(?:te|le|les)\s+(?:lo\s+|la\s+)?(?:enviar[ée]|mandar[ée])\b", Language::Spanish),
    (r"\b(?:voy\s+a|puedo|d[ée]jame)\s+(?:enviar|mandar|pasar)(?:te|le|les)\b", Language::Spanish),
    (r"\brecibir[áa]s?\s+(?:un|el|la)\s+(?:mensaje|enlace|link|correo)\b", Language::Spanish),
];

/// First-person "I will send/text" commitments.
const EXPLICIT_SEND: &[&str] = &[
    r"\bi{A}ll\s+(?:send|text)\b",
    r"\bi\s+will\s+(?:send|text)\b",
    r"\b(?:te|le)\s+(?:lo\s+|la\s+)?(?:enviar[ée]|mandar[ée])\b",
    r"\b(?:te|le)\s+voy\s+a\s+(?:enviar|mandar)\b",
];

/// Phrasing that addresses the reader directly ("send you").
const DIRECT_ADDRESS: &[&str] = &[
    r"\b(?:send|text|email|forward)\s+(?:it\s+|that\s+|this\s+)?(?:over\s+)?(?:to\s+)?you\b",
    r"\b(?:enviarte|mandarte|pasarte)\b",
    r"\bte\s+(?:lo\s+|la\s+)?(?:env[ií]o|mando|enviar[ée]|mandar[ée])\b",
];

/// Category keywords, in tie-break order.
const CATEGORY_KEYWORDS: &[(AssetType, &[&str])] = &[
    (
        AssetType::RegistrationLink,
        &[
            "register",
            "registration",
            "sign up",
            "signup",
            "enroll",
            "enrollment",
            "link",
            "registro",
            "registrarse",
            "inscripción",
            "inscribir",
            "inscribirse",
            "enlace",
        ],
    ),
    (
        AssetType::Schedule,
        &[
            "schedule",
            "class times",
            "times",
            "calendar",
            "availability",
            "horario",
            "horarios",
            "calendario",
            "disponibilidad",
        ],
    ),
    (
        AssetType::Pricing,
        &[
            "price",
            "prices",
            "pricing",
            "cost",
            "costs",
            "tuition",
            "fee",
            "fees",
            "rates",
            "precio",
            "precios",
            "costo",
            "costos",
            "tarifa",
            "cuota",
        ],
    ),
    (
        AssetType::Info,
        &["info", "information", "details", "brochure", "información", "detalles", "folleto"],
    ),
];

/// User request families, in priority order.
const REQUEST_FAMILIES: &[(AssetType, &[&str])] = &[
    (
        AssetType::RegistrationLink,
        &[
            r"\b(?:register|registration|sign\s*up|enroll|enrol|enrollment)\b",
            r"\b(?:inscribir(?:me|nos|lo|la)?|inscripci[oó]n|registrar(?:me|nos)?|registro)\b",
        ],
    ),
    (
        AssetType::Schedule,
        &[
            r"\b(?:schedule|class\s+times?|what\s+times?|when\s+are|availability|calendar)\b",
            r"\b(?:horarios?|a\s+qu[eé]\s+hora|cu[aá]ndo\s+son|calendario)\b",
        ],
    ),
    (
        AssetType::Pricing,
        &[
            r"\b(?:prices?|pricing|costs?|how\s+much|tuition|fees?|rates?)\b",
            r"\b(?:precios?|costos?|cu[aá]nto\s+(?:cuesta|cobran|es)|tarifas?|cuotas?)\b",
        ],
    ),
    (
        AssetType::Info,
        &[
            r"\b(?:info|information|details|brochure|tell\s+me\s+more|learn\s+more)\b",
            r"\b(?:informaci[oó]n|detalles|m[aá]s\s+info|folleto)\b",
        ],
    ),
];

const SEND_ME: &[&str] = &[
    r"\b(?:send|text|email|forward)\s+(?:it\s+|that\s+|this\s+)?(?:to\s+)?me\b",
    r"\b(?:can|could)\s+you\s+(?:send|text|email)\b",
    r"\b(?:m[aá]nd(?:a|e)me|env[ií](?:a|e)me|p[aá]s(?:a|e)me)(?:lo|la)?\b",
    r"\b(?:me\s+(?:puedes|puede|podr[ií]as?)\s+(?:enviar|mandar|pasar))\b",
];

const INTENT_PHRASES: &[&str] = &[
    r"\bready\s+to\b",
    r"\binterested\s+in\b",
    r"\bwant\s+to\s+(?:sign\s+up|enroll|register|join|start)\b",
    r"\blooking\s+to\b",
    r"\blist[oa]s?\s+para\b",
    r"\binteresad[oa]s?\s+en\b",
    r"\bquiero\s+(?:inscribir|registrar|empezar)\w*\b",
];

const PHONE_NUMBER: &str = r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b";

#[derive(Clone, Debug)]
pub struct PhrasePattern {
    pub language: Language,
    regex: Regex,
}

impl PhrasePattern {
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

#[derive(Clone, Debug)]
struct CategoryTable {
    asset_type: AssetType,
    patterns: Vec<Regex>,
}

/// Compiled, read-only phrase tables.
#[derive(Clone, Debug)]
pub struct PatternTables {
    promise_phrases: Vec<PhrasePattern>,
    explicit_send: Vec<Regex>,
    direct_address: Vec<Regex>,
    category_keywords: Vec<CategoryTable>,
    request_families: Vec<CategoryTable>,
    send_me: Vec<Regex>,
    intent_phrases: Vec<Regex>,
    phone_number: Regex,
}

impl PatternTables {
    pub fn bilingual() -> Result<Self, PatternError> {
        let promise_phrases = PROMISE_PHRASES
            .iter()
            .map(|(pattern, language)| {
                compile(pattern).map(|regex| PhrasePattern { language: *language, regex })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let category_keywords = CATEGORY_KEYWORDS
            .iter()
            .map(|(asset_type, keywords)| {
                let patterns = keywords
                    .iter()
                    .map(|keyword| compile(&keyword_pattern(keyword)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CategoryTable { asset_type: *asset_type, patterns })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        let request_families = REQUEST_FAMILIES
            .iter()
            .map(|(asset_type, patterns)| {
                Ok(CategoryTable { asset_type: *asset_type, patterns: compile_all(patterns)? })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(Self {
            promise_phrases,
            explicit_send: compile_all(EXPLICIT_SEND)?,
            direct_address: compile_all(DIRECT_ADDRESS)?,
            category_keywords,
            request_families,
            send_me: compile_all(SEND_ME)?,
            intent_phrases: compile_all(INTENT_PHRASES)?,
            phone_number: Regex::new(PHONE_NUMBER).map_err(|source| PatternError {
                pattern: PHONE_NUMBER.to_string(),
                source,
            })?,
        })
    }

    /// First promise phrase matching `text`, in table order.
    pub fn first_promise_phrase(&self, text: &str) -> Option<&PhrasePattern> {
        self.promise_phrases.iter().find(|phrase| phrase.regex.is_match(text))
    }

    pub fn has_explicit_send(&self, text: &str) -> bool {
        any_match(&self.explicit_send, text)
    }

    pub fn has_direct_address(&self, text: &str) -> bool {
        any_match(&self.direct_address, text)
    }

    pub fn has_send_me(&self, text: &str) -> bool {
        any_match(&self.send_me, text)
    }

    pub fn has_intent_phrase(&self, text: &str) -> bool {
        any_match(&self.intent_phrases, text)
    }

    pub fn contains_phone_number(&self, text: &str) -> bool {
        self.phone_number.is_match(text)
    }

    /// Total keyword occurrences for `asset_type` in `text`.
    pub fn keyword_hits(&self, asset_type: AssetType, text: &str) -> usize {
        self.category_keywords
            .iter()
            .find(|table| table.asset_type == asset_type)
            .map(|table| table.patterns.iter().map(|regex| regex.find_iter(text).count()).sum())
            .unwrap_or(0)
    }

    /// Highest-scoring category; earlier table entries win ties. `None` when
    /// no keyword appears at all.
    pub fn best_category(&self, text: &str) -> Option<(AssetType, usize)> {
        let mut best: Option<(AssetType, usize)> = None;
        for table in &self.category_keywords {
            let hits = self.keyword_hits(table.asset_type, text);
            if hits == 0 {
                continue;
            }
            match best {
                Some((_, best_hits)) if best_hits >= hits => {}
                _ => best = Some((table.asset_type, hits)),
            }
        }
        best
    }

    /// First request family matching `text`, in priority order.
    pub fn first_request_family(&self, text: &str) -> Option<AssetType> {
        self.request_families
            .iter()
            .find(|family| any_match(&family.patterns, text))
            .map(|family| family.asset_type)
    }
}

fn keyword_pattern(keyword: &str) -> String {
    let escaped = regex::escape(keyword).replace(' ', r"\s+");
    format!(r"\b{escaped}\b")
}

fn compile(pattern: &str) -> Result<Regex, PatternError> {
    let expanded = format!("(?i){}", pattern.replace("{A}", APOSTROPHE));
    Regex::new(&expanded).map_err(|source| PatternError { pattern: pattern.to_string(), source })
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>, PatternError> {
    patterns.iter().map(|pattern| compile(pattern)).collect()
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|regex| regex.is_match(text))
}
