//! Localized text with language fallback.
//!
//! Data files write localized strings either as a map keyed by language
//! code or, for single-language packs, as a plain string (stored as `en`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Language used when the requested one is missing.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Text keyed by language code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TextRepr")]
pub struct LocalizedText(BTreeMap<String, String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum TextRepr {
    Plain(String),
    Map(BTreeMap<String, String>),
}

impl From<TextRepr> for LocalizedText {
    fn from(repr: TextRepr) -> Self {
        match repr {
            TextRepr::Plain(text) => Self::single(FALLBACK_LANGUAGE, text),
            TextRepr::Map(map) => Self(map),
        }
    }
}

impl LocalizedText {
    /// Text in one language.
    pub fn single(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self(BTreeMap::from([(language.into(), text.into())]))
    }

    /// Builder-style insert.
    pub fn with(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.0.insert(language.into(), text.into());
        self
    }

    /// Text in `language`, falling back to `en`, then to any language.
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0
            .get(language)
            .or_else(|| self.0.get(FALLBACK_LANGUAGE))
            .or_else(|| self.0.values().next())
            .map(String::as_str)
    }

    /// Like [`get`](Self::get) but never fails.
    pub fn get_or_empty(&self, language: &str) -> &str {
        self.get(language).unwrap_or_default()
    }

    /// Whether no language carries non-blank text.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|text| text.trim().is_empty())
    }

    /// Languages present.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_english_then_anything() {
        let text = LocalizedText::single("en", "Daily").with("de", "Täglich");
        assert_eq!(text.get("de"), Some("Täglich"));
        assert_eq!(text.get("fr"), Some("Daily"));

        let german_only = LocalizedText::single("de", "Täglich");
        assert_eq!(german_only.get("fr"), Some("Täglich"));
        assert_eq!(LocalizedText::default().get("en"), None);
    }

    #[test]
    fn plain_strings_deserialize_as_english() {
        let text: LocalizedText = serde_json::from_str("\"Daily\"").unwrap();
        assert_eq!(text, LocalizedText::single("en", "Daily"));
        let map: LocalizedText = serde_json::from_str(r#"{"en":"A","es":"B"}"#).unwrap();
        assert_eq!(map.get("es"), Some("B"));
    }

    #[test]
    fn blank_detection() {
        assert!(LocalizedText::default().is_blank());
        assert!(LocalizedText::single("en", "  ").is_blank());
        assert!(!LocalizedText::single("en", "x").is_blank());
    }
}
