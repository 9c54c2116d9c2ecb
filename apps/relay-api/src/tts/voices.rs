//! Voice catalog and voice-selector resolution.

use serde::Serialize;
use utoipa::ToSchema;

/// Language used when a selector names nothing we recognize.
pub const DEFAULT_LANGUAGE: &str = "es";

const LANGUAGES: &[&str] = &[
    "es", "es-MX", "en", "pt", "fr", "de", "it", "ja", "ko", "zh-CN", "ru", "ar", "hi", "tr", "pl",
    "nl",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
    pub gender: String,
    pub provider: String,
}

// (id, display name)
const CATALOG: &[(&str, &str)] = &[
    ("es", "Español"),
    ("es-MX", "Español México"),
    ("en", "English"),
    ("pt", "Português"),
    ("fr", "Français"),
    ("de", "Deutsch"),
    ("it", "Italiano"),
    ("ja", "日本語"),
    ("ko", "한국어"),
    ("zh-CN", "中文"),
    ("ru", "Русский"),
];

pub fn catalog() -> Vec<VoiceInfo> {
    CATALOG
        .iter()
        .map(|(id, name)| VoiceInfo {
            id: id.to_string(),
            name: name.to_string(),
            language: id.to_string(),
            gender: "female".to_string(),
            provider: "google".to_string(),
        })
        .collect()
}

/// Map a voice selector (a named voice or a language code) to the language
/// the synthesizer understands. Unknown selectors fall back to Spanish.
pub fn language_for(selector: &str) -> &'static str {
    let selector = selector.trim();
    let named = match selector {
        "Brian" | "Amy" | "Emma" | "Joanna" | "Joey" | "Matthew" => Some("en"),
        "Conchita" | "Enrique" | "Lucia" | "Mia" | "Miguel" | "Penelope" | "Lupe" => Some("es"),
        "Camila" | "Vitoria" | "Ricardo" => Some("pt"),
        "Celine" | "Mathieu" => Some("fr"),
        "Hans" | "Marlene" | "Vicki" => Some("de"),
        "Giorgio" | "Carla" | "Bianca" => Some("it"),
        "Takumi" | "Mizuki" => Some("ja"),
        "Seoyeon" => Some("ko"),
        "Zhiyu" => Some("zh-CN"),
        _ => None,
    };

    named
        .or_else(|| LANGUAGES.iter().copied().find(|code| *code == selector))
        .unwrap_or(DEFAULT_LANGUAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_voices_map_to_languages() {
        assert_eq!(language_for("Lucia"), "es");
        assert_eq!(language_for("Brian"), "en");
        assert_eq!(language_for("Zhiyu"), "zh-CN");
    }

    #[test]
    fn language_codes_pass_through() {
        assert_eq!(language_for("nl"), "nl");
        assert_eq!(language_for(" fr "), "fr");
    }

    #[test]
    fn unknown_selector_falls_back_to_spanish() {
        assert_eq!(language_for("Klingon"), DEFAULT_LANGUAGE);
    }

    #[test]
    fn every_catalog_voice_renders_in_its_own_language() {
        for voice in catalog() {
            assert_eq!(language_for(&voice.id), voice.id);
        }
        assert_eq!(language_for("es-MX"), "es-MX");
    }

    #[test]
    fn catalog_lists_eleven_google_voices() {
        let voices = catalog();
        assert_eq!(voices.len(), 11);
        assert!(voices.iter().all(|v| v.provider == "google"));
    }
}
