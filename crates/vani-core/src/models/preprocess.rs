//! Preprocessor strategy selection

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TextPreprocessor;
use crate::model::Gender;

/// Languages normalized character by character
pub const CHARACTER_LANGUAGES: [&str; 2] = ["urdu", "punjabi"];

/// The one language whose text goes to the model as-is
pub const PASS_THROUGH_LANGUAGE: &str = "english";

/// Text normalization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessorKind {
    /// Character-level normalization
    Character,
    /// No phonetic normalization
    PassThrough,
    /// Duration-alignment normalization (default)
    DurationAligned,
}

impl PreprocessorKind {
    /// Strategy for `language`; anything not listed gets [`Self::DurationAligned`]
    pub fn for_language(language: &str) -> Self {
        if CHARACTER_LANGUAGES.contains(&language) {
            Self::Character
        } else if language == PASS_THROUGH_LANGUAGE {
            Self::PassThrough
        } else {
            Self::DurationAligned
        }
    }

    /// Snake-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::PassThrough => "pass_through",
            Self::DurationAligned => "duration_aligned",
        }
    }
}

impl fmt::Display for PreprocessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#\n\r]+").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static PHRASE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?;।]+").expect("valid regex"));

/// Minimal preprocessor used when a backend has no language-specific one
///
/// Strips `#` and line breaks, collapses whitespace and splits into phrases
/// on sentence punctuation (including the danda).
#[derive(Debug, Clone, Copy)]
pub struct PlainPreprocessor {
    kind: PreprocessorKind,
}

impl PlainPreprocessor {
    /// Create a plain preprocessor standing in for `kind`
    pub fn new(kind: PreprocessorKind) -> Self {
        Self { kind }
    }

    /// Strategy this instance stands in for
    pub fn kind(&self) -> PreprocessorKind {
        self.kind
    }
}

impl TextPreprocessor for PlainPreprocessor {
    fn preprocess(&self, text: &str, _language: &str, _gender: Gender) -> anyhow::Result<Vec<String>> {
        let cleaned = NOISE.replace_all(text, " ");
        let cleaned = WHITESPACE.replace_all(&cleaned, " ");

        Ok(PHRASE_BREAK
            .split(cleaned.trim())
            .map(str::trim)
            .filter(|phrase| !phrase.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("urdu", PreprocessorKind::Character)]
    #[case("punjabi", PreprocessorKind::Character)]
    #[case("english", PreprocessorKind::PassThrough)]
    #[case("hindi", PreprocessorKind::DurationAligned)]
    #[case("tamil", PreprocessorKind::DurationAligned)]
    #[case("English", PreprocessorKind::DurationAligned)]
    fn test_strategy_partition(#[case] language: &str, #[case] expected: PreprocessorKind) {
        assert_eq!(PreprocessorKind::for_language(language), expected);
    }

    #[test]
    fn test_plain_preprocessor_cleans_and_splits() {
        let pre = PlainPreprocessor::new(PreprocessorKind::DurationAligned);
        let phrases = pre
            .preprocess("# नमस्ते   दुनिया।\nकैसे हो? ठीक", "hindi", Gender::Female)
            .unwrap();
        assert_eq!(phrases, vec!["नमस्ते दुनिया", "कैसे हो", "ठीक"]);
    }

    #[test]
    fn test_plain_preprocessor_single_phrase() {
        let pre = PlainPreprocessor::new(PreprocessorKind::PassThrough);
        let phrases = pre.preprocess("Hello world", "english", Gender::Male).unwrap();
        assert_eq!(phrases, vec!["Hello world"]);
        assert_eq!(pre.kind(), PreprocessorKind::PassThrough);
    }

    #[test]
    fn test_plain_preprocessor_empty() {
        let pre = PlainPreprocessor::new(PreprocessorKind::Character);
        assert!(pre.preprocess("  ...  ", "urdu", Gender::Male).unwrap().is_empty());
    }
}
