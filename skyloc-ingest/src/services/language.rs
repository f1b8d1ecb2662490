//! Alt text language check

use once_cell::sync::Lazy;
use regex::Regex;
use whatlang::Lang;

/// Hashtags and mentions carry no language signal
static TAGS_AND_MENTIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[#@]\w+").expect("tag pattern is valid"));

pub trait LanguageDetector: Send + Sync {
    fn is_english(&self, text: &str) -> bool;
}

/// Remove `#tag` and `@mention` tokens and surrounding whitespace
pub fn strip_tags_and_mentions(text: &str) -> String {
    TAGS_AND_MENTIONS.replace_all(text, "").trim().to_string()
}

/// Trigram-based detection
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn is_english(&self, text: &str) -> bool {
        let stripped = strip_tags_and_mentions(text);
        if stripped.is_empty() {
            return false;
        }
        whatlang::detect_lang(&stripped) == Some(Lang::Eng)
    }
}
