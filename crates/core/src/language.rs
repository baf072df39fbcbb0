//! Language codes and canonicalization
//!
//! Participants speak a language identified by a short or regional code
//! (`he`, `en`, `en-US`, `ru-RU`, ...). The relay canonicalizes every code
//! to a regional form at the session boundary (spec §4.9, §4.6) so that
//! target-language grouping in the Recipient-Map and cache keys in the TTS
//! Cache never split on `he` vs `he-IL`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A canonical regional language code, e.g. `he-IL`, `en-US`, `ru-RU`.
///
/// Stored as a plain string rather than an enum: unlike a closed set of
/// scheduled languages, this system accepts any BCP-47-ish code a
/// participant's client reports, falling back to the code itself
/// (lowercased) when it isn't in the known table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

/// Short code -> canonical regional code. Not exhaustive; extend as new
/// client locales show up. Short codes not in this table canonicalize to
/// themselves (see `Language::canonicalize`).
const KNOWN_REGIONS: &[(&str, &str)] = &[
    ("en", "en-US"),
    ("he", "he-IL"),
    ("ru", "ru-RU"),
    ("es", "es-ES"),
    ("fr", "fr-FR"),
    ("de", "de-DE"),
    ("it", "it-IT"),
    ("pt", "pt-BR"),
    ("ar", "ar-SA"),
    ("zh", "zh-CN"),
    ("ja", "ja-JP"),
    ("ko", "ko-KR"),
    ("hi", "hi-IN"),
    ("tr", "tr-TR"),
    ("pl", "pl-PL"),
    ("nl", "nl-NL"),
    ("uk", "uk-UA"),
    ("el", "el-GR"),
    ("sv", "sv-SE"),
    ("fi", "fi-FI"),
];

impl Language {
    /// Canonicalize a code as reported by a client: trims, lowercases the
    /// language subtag, and expands a bare short code to its known
    /// regional form. Codes that already carry a region (contain `-`) are
    /// normalized to `lang-REGION` casing and passed through otherwise.
    pub fn canonicalize(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self("und".to_string());
        }

        if let Some((lang, region)) = raw.split_once('-') {
            return Self(format!("{}-{}", lang.to_lowercase(), region.to_uppercase()));
        }

        let lower = raw.to_lowercase();
        for (short, full) in KNOWN_REGIONS {
            if *short == lower {
                return Self(full.to_string());
            }
        }
        Self(lower)
    }

    /// The canonical code as a string slice.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// The bare language subtag (portion before `-`), used for
    /// sentence-boundary and display logic that doesn't vary by region.
    pub fn subtag(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Language {
    fn from(s: &str) -> Self {
        Self::canonicalize(s)
    }
}

impl From<String> for Language {
    fn from(s: String) -> Self {
        Self::canonicalize(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_code_expands_to_region() {
        assert_eq!(Language::canonicalize("he").code(), "he-IL");
        assert_eq!(Language::canonicalize("en").code(), "en-US");
        assert_eq!(Language::canonicalize("ru").code(), "ru-RU");
    }

    #[test]
    fn already_regional_is_normalized_not_relooked_up() {
        assert_eq!(Language::canonicalize("en-gb").code(), "en-GB");
        assert_eq!(Language::canonicalize("HE-il").code(), "he-IL");
    }

    #[test]
    fn unknown_short_code_passes_through_lowercased() {
        assert_eq!(Language::canonicalize("XX").code(), "xx");
    }

    #[test]
    fn empty_code_is_undetermined() {
        assert_eq!(Language::canonicalize("   ").code(), "und");
    }

    #[test]
    fn subtag_strips_region() {
        assert_eq!(Language::canonicalize("he").subtag(), "he");
        assert_eq!(Language::canonicalize("en-GB").subtag(), "en");
    }
}
