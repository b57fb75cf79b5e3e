//! Fuzzy term matching (§4.6): prefix + bounded Levenshtein distance.

pub const DEFAULT_MIN_TERM_LENGTH: usize = 4;
pub const DEFAULT_PREFIX_LENGTH: usize = 2;
pub const DEFAULT_MAX_DISTANCE: usize = 2;

/// Classic Wagner-Fischer edit distance, single-row rolling buffer.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

pub struct FuzzyOptions {
    pub min_term_length: usize,
    pub prefix_length: usize,
    pub max_distance: usize,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            min_term_length: DEFAULT_MIN_TERM_LENGTH,
            prefix_length: DEFAULT_PREFIX_LENGTH,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }
}

/// Finds every indexed term sharing the query term's first `prefixLength`
/// characters with Levenshtein distance ≤ `maxDistance`, returning
/// `(term, score_multiplier)` where `score_multiplier = 1 - dist/maxDistance`.
pub fn fuzzy_matches<'a>(
    query_term: &str,
    indexed_terms: impl Iterator<Item = &'a str>,
    options: &FuzzyOptions,
) -> Vec<(&'a str, f64)> {
    if query_term.chars().count() < options.min_term_length {
        return Vec::new();
    }
    let query_prefix: String = query_term.chars().take(options.prefix_length).collect();

    let mut out = Vec::new();
    for term in indexed_terms {
        let term_prefix: String = term.chars().take(options.prefix_length).collect();
        if term_prefix != query_prefix {
            continue;
        }
        let dist = levenshtein(query_term, term);
        if dist <= options.max_distance && dist > 0 {
            let score = 1.0 - (dist as f64 / options.max_distance as f64);
            out.push((term, score));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_identical_strings_is_zero() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn levenshtein_single_substitution() {
        assert_eq!(levenshtein("kitten", "sitten"), 1);
    }

    #[test]
    fn levenshtein_classic_kitten_sitting() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn fuzzy_matches_respects_prefix_and_distance() {
        let terms = vec!["geography", "geology", "biology", "zzzzz"];
        let options = FuzzyOptions::default();
        let matches = fuzzy_matches("geograpy", terms.into_iter(), &options);
        assert!(matches.iter().any(|(t, _)| *t == "geography"));
        assert!(!matches.iter().any(|(t, _)| *t == "biology"));
    }

    #[test]
    fn fuzzy_matches_rejects_short_query_terms() {
        let terms = vec!["cat", "cats"];
        let options = FuzzyOptions::default();
        let matches = fuzzy_matches("cat", terms.into_iter(), &options);
        assert!(matches.is_empty());
    }
}
