//! Text analysis pipeline (§4.6): lowercase, Unicode-normalize, tokenize,
//! stop-word removal, suffix stemming.

use std::collections::HashSet;

use once_cell::sync::Lazy;

pub const DEFAULT_MIN_TOKEN_LENGTH: usize = 2;
pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 32;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "if", "then", "of", "in", "on", "at", "to", "for",
        "with", "is", "are", "was", "were", "be", "been", "being", "this", "that", "these",
        "those", "it", "its", "as", "by", "from", "into", "about", "not", "no", "do", "does",
        "did", "has", "have", "had",
    ]
    .into_iter()
    .collect()
});

/// Folds common typographic ligatures to their expanded ASCII form and
/// strips Unicode combining marks (i.e. approximates NFKD + mark removal
/// without pulling in a full normalization crate).
fn unicode_normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{0300}'..='\u{036F}' => {} // combining diacritical marks: drop
            other => out.push(other),
        }
    }
    out
}

/// Strips a small set of common English suffixes. This is intentionally a
/// simple suffix stemmer (no Porter-algorithm step cascade), matching the
/// "simple suffix stemming" the analysis pipeline calls for.
fn stem(token: &str) -> String {
    const SUFFIXES: &[&str] = &["ational", "tional", "ization", "ing", "edly", "ed", "es", "s"];
    for suffix in SUFFIXES {
        if token.len() > suffix.len() + 2 && token.ends_with(suffix) {
            return token[..token.len() - suffix.len()].to_string();
        }
    }
    token.to_string()
}

/// Full pipeline: lowercase → normalize → split on non-alphanumeric →
/// length filter → stop-word filter → stem.
pub fn analyze(text: &str) -> Vec<String> {
    analyze_with_bounds(text, DEFAULT_MIN_TOKEN_LENGTH, DEFAULT_MAX_TOKEN_LENGTH)
}

pub fn analyze_with_bounds(text: &str, min_len: usize, max_len: usize) -> Vec<String> {
    let normalized = unicode_normalize(&text.to_lowercase());
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .filter(|tok| tok.chars().count() >= min_len && tok.chars().count() <= max_len)
        .filter(|tok| !STOP_WORDS.contains(tok))
        .map(stem)
        .filter(|tok| !tok.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_lowercases_and_strips_punctuation() {
        let tokens = analyze("The Quick-Brown Fox!");
        assert_eq!(tokens, vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn analyze_removes_stop_words() {
        let tokens = analyze("a cat is on the mat");
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"cat".to_string()));
    }

    #[test]
    fn analyze_folds_ligatures() {
        let tokens = analyze("\u{FB01}ling"); // "filing" ligature
        assert!(tokens.iter().any(|t| t.starts_with("fil")));
    }

    #[test]
    fn analyze_strips_combining_marks() {
        let tokens = analyze("cafe\u{0301}"); // café decomposed
        assert_eq!(tokens, vec!["cafe"]);
    }

    #[test]
    fn stem_strips_plural_and_ing_suffixes() {
        assert_eq!(stem("running"), "runn");
        assert_eq!(stem("cats"), "cat");
    }
}
