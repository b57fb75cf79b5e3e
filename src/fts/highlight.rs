//! Result highlighting (§4.6): per-field snippets with matched tokens
//! wrapped in configurable pre/post tags.

use std::collections::HashSet;

pub const DEFAULT_SNIPPET_LENGTH: usize = 200;
pub const DEFAULT_PRE_TAG: &str = "<mark>";
pub const DEFAULT_POST_TAG: &str = "</mark>";

pub struct HighlightOptions {
    pub snippet_length: usize,
    pub pre_tag: String,
    pub post_tag: String,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            snippet_length: DEFAULT_SNIPPET_LENGTH,
            pre_tag: DEFAULT_PRE_TAG.to_string(),
            post_tag: DEFAULT_POST_TAG.to_string(),
        }
    }
}

/// Produces a length-bounded snippet around the first matched query term,
/// wrapping every whole-word match of any query term in the configured tags.
pub fn snippet(field_text: &str, query_terms: &[String], options: &HighlightOptions) -> String {
    if field_text.is_empty() || query_terms.is_empty() {
        return truncate(field_text, options.snippet_length);
    }

    let lower = field_text.to_lowercase();
    let terms: HashSet<&str> = query_terms.iter().map(String::as_str).collect();

    let first_match_byte = terms
        .iter()
        .filter_map(|t| lower.find(t.as_str()))
        .min();

    let window = match first_match_byte {
        Some(pos) => {
            let half = options.snippet_length / 2;
            let start = pos.saturating_sub(half);
            let start = floor_char_boundary(field_text, start);
            let end = (start + options.snippet_length).min(field_text.len());
            let end = floor_char_boundary(field_text, end);
            &field_text[start..end]
        }
        None => {
            let end = floor_char_boundary(field_text, options.snippet_length.min(field_text.len()));
            &field_text[..end]
        }
    };

    wrap_matches(window, &terms, options)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn truncate(text: &str, max_len: usize) -> String {
    let end = floor_char_boundary(text, max_len.min(text.len()));
    text[..end].to_string()
}

fn wrap_matches(window: &str, terms: &HashSet<&str>, options: &HighlightOptions) -> String {
    let mut out = String::with_capacity(window.len());
    for word in split_preserving_delimiters(window) {
        let lower = word.to_lowercase();
        if terms.contains(lower.as_str()) {
            out.push_str(&options.pre_tag);
            out.push_str(word);
            out.push_str(&options.post_tag);
        } else {
            out.push_str(word);
        }
    }
    out
}

/// Splits into alternating word/non-word spans without losing the
/// non-word separators, so the joined output reconstructs the original text.
fn split_preserving_delimiters(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        let is_word_char = c.is_alphanumeric();
        if i == 0 {
            in_word = is_word_char;
            continue;
        }
        if is_word_char != in_word {
            out.push(&text[start..i]);
            start = i;
            in_word = is_word_char;
        }
    }
    out.push(&text[start..]);
    out
}
