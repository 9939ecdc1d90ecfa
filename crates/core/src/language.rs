//! Response language selection.
//!
//! FarmBuddy answers in one of four Nigerian languages. The language code
//! space is closed: parsing an unknown code falls back to English rather
//! than erroring, so a bad `language` field in a request can never break
//! a conversation.

use serde::{Deserialize, Serialize};

/// Target language for model responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    #[default]
    En,
    /// Hausa
    Ha,
    /// Igbo
    Ig,
    /// Yoruba
    Yo,
}

impl Language {
    /// The two-letter code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ha => "ha",
            Language::Ig => "ig",
            Language::Yo => "yo",
        }
    }

    /// The instruction sentence injected into the system context.
    pub fn instruction(&self) -> &'static str {
        match self {
            Language::En => "Answer in English.",
            Language::Ha => "Answer in Hausa language (Harshen Hausa).",
            Language::Ig => "Answer in Igbo language (Asụsụ Igbo).",
            Language::Yo => "Answer in Yoruba language (Èdè Yorùbá).",
        }
    }

    /// Parse a language code, defaulting to English for anything unknown.
    pub fn from_code(code: &str) -> Self {
        match code {
            "ha" => Language::Ha,
            "ig" => Language::Ig,
            "yo" => Language::Yo,
            _ => Language::En,
        }
    }
}

impl std::str::FromStr for Language {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Language::from_code(s))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
