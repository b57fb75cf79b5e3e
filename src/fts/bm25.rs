//! Field-weighted BM25 inverted index (§4.6).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::fts::analysis::analyze;
use crate::fts::fuzzy::{fuzzy_matches, FuzzyOptions};
use crate::fts::highlight::{snippet, HighlightOptions};

pub const K1: f64 = 1.2;
pub const B: f64 = 0.75;

/// Canonical per-field weight multipliers.
pub fn default_field_weights() -> HashMap<String, f64> {
    [
        ("title".to_string(), 3.0),
        ("description".to_string(), 2.0),
        ("text".to_string(), 1.0),
        ("infobox".to_string(), 0.5),
    ]
    .into_iter()
    .collect()
}

#[derive(Serialize, Deserialize)]
struct DocMeta {
    category: String,
    fields: HashMap<String, String>,
}

pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f64,
    pub types: Option<HashSet<String>>,
    pub highlight: bool,
    pub fuzzy: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            min_score: 0.0,
            types: None,
            highlight: false,
            fuzzy: false,
        }
    }
}

pub struct SearchResult {
    pub id: String,
    pub score: f64,
    pub snippets: HashMap<String, String>,
}

/// Field-weighted inverted index. Per field: term -> sorted `(doc id, tf)`
/// postings list, plus per-document field length and a corpus-wide
/// average length per field for BM25 normalization.
#[derive(Serialize, Deserialize)]
pub struct FtsIndex {
    field_weights: HashMap<String, f64>,
    postings: HashMap<String, HashMap<String, Vec<(String, u32)>>>,
    field_lengths: HashMap<String, HashMap<String, u32>>,
    avg_field_lengths: HashMap<String, f64>,
    term_document_ids: HashMap<String, HashSet<String>>,
    documents: HashMap<String, DocMeta>,
}

impl FtsIndex {
    pub fn new() -> Self {
        Self::with_field_weights(default_field_weights())
    }

    pub fn with_field_weights(field_weights: HashMap<String, f64>) -> Self {
        Self {
            field_weights,
            postings: HashMap::new(),
            field_lengths: HashMap::new(),
            avg_field_lengths: HashMap::new(),
            term_document_ids: HashMap::new(),
            documents: HashMap::new(),
        }
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Indexes one document's fields. `fields` maps field name to raw text;
    /// only fields present in `field_weights` are analyzed.
    pub fn index_document(&mut self, id: &str, category: &str, fields: HashMap<String, String>) {
        for (field, text) in &fields {
            if !self.field_weights.contains_key(field) {
                continue;
            }
            let tokens = analyze(text);
            self.field_lengths
                .entry(field.clone())
                .or_default()
                .insert(id.to_string(), tokens.len() as u32);

            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            let field_postings = self.postings.entry(field.clone()).or_default();
            for (term, freq) in tf {
                field_postings
                    .entry(term.clone())
                    .or_default()
                    .push((id.to_string(), freq));
                self.term_document_ids
                    .entry(term)
                    .or_default()
                    .insert(id.to_string());
            }
        }

        self.documents.insert(
            id.to_string(),
            DocMeta {
                category: category.to_string(),
                fields,
            },
        );

        self.recompute_averages();
    }

    fn recompute_averages(&mut self) {
        for (field, lengths) in &self.field_lengths {
            if lengths.is_empty() {
                continue;
            }
            let total: u64 = lengths.values().map(|&l| l as u64).sum();
            self.avg_field_lengths
                .insert(field.clone(), total as f64 / lengths.len() as f64);
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self
            .term_document_ids
            .get(term)
            .map(|s| s.len())
            .unwrap_or(0) as f64;
        if df == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Best field (by weight) in which `term` appears for `doc_id`, along
    /// with its tf and length — BM25's "highest-weighted field that
    /// contains the term" rule.
    fn best_field_for_term(&self, term: &str, doc_id: &str) -> Option<(&str, f64, u32, f64)> {
        let mut best: Option<(&str, f64, u32, f64)> = None;
        for (field, weight) in &self.field_weights {
            let Some(postings) = self.postings.get(field).and_then(|p| p.get(term)) else {
                continue;
            };
            let Some((_, tf)) = postings.iter().find(|(d, _)| d == doc_id) else {
                continue;
            };
            let len = self
                .field_lengths
                .get(field)
                .and_then(|m| m.get(doc_id))
                .copied()
                .unwrap_or(0);
            let avg_len = self.avg_field_lengths.get(field).copied().unwrap_or(1.0).max(1.0);
            if best.map(|(_, w, _, _)| *weight > w).unwrap_or(true) {
                best = Some((field.as_str(), *weight, *tf, avg_len));
            }
        }
        best
    }

    fn score_term_for_doc(&self, term: &str, doc_id: &str, idf: f64) -> f64 {
        let Some((field, weight, tf, avg_len)) = self.best_field_for_term(term, doc_id) else {
            return 0.0;
        };
        let len = self
            .field_lengths
            .get(field)
            .and_then(|m| m.get(doc_id))
            .copied()
            .unwrap_or(0) as f64;
        let denom = tf as f64 + K1 * (1.0 - B + B * len / avg_len);
        if denom == 0.0 {
            return 0.0;
        }
        weight * idf * (tf as f64 * (K1 + 1.0)) / denom
    }

    /// Terms to search for a query term: itself, plus any fuzzy matches
    /// (scaled by the fuzzy score multiplier) when `fuzzy` is enabled.
    fn expand_terms(&self, term: &str, fuzzy: bool) -> Vec<(String, f64)> {
        let mut out = vec![(term.to_string(), 1.0)];
        if fuzzy {
            let indexed_terms: HashSet<&str> = self
                .postings
                .values()
                .flat_map(|m| m.keys())
                .map(String::as_str)
                .collect();
            let matches = fuzzy_matches(term, indexed_terms.into_iter(), &FuzzyOptions::default());
            for (matched, scale) in matches {
                out.push((matched.to_string(), scale));
            }
        }
        out
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        let query_terms: Vec<String> = analyze(query).into_iter().collect::<HashSet<_>>().into_iter().collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<String, f64> = HashMap::new();
        for term in &query_terms {
            for (expanded_term, scale) in self.expand_terms(term, options.fuzzy) {
                let idf = self.idf(&expanded_term);
                if idf <= 0.0 {
                    continue;
                }
                let Some(doc_ids) = self.term_document_ids.get(&expanded_term) else {
                    continue;
                };
                for doc_id in doc_ids {
                    let contribution = self.score_term_for_doc(&expanded_term, doc_id, idf) * scale;
                    *scores.entry(doc_id.clone()).or_insert(0.0) += contribution;
                }
            }
        }

        let mut results: Vec<SearchResult> = scores
            .into_iter()
            .filter(|(id, score)| {
                *score >= options.min_score
                    && self
                        .documents
                        .get(id)
                        .map(|doc| {
                            options
                                .types
                                .as_ref()
                                .map(|types| types.contains(&doc.category))
                                .unwrap_or(true)
                        })
                        .unwrap_or(false)
            })
            .map(|(id, score)| {
                let snippets = if options.highlight {
                    self.build_snippets(&id, &query_terms)
                } else {
                    HashMap::new()
                };
                SearchResult { id, score, snippets }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(options.limit);
        results
    }

    fn build_snippets(&self, doc_id: &str, query_terms: &[String]) -> HashMap<String, String> {
        let options = HighlightOptions::default();
        let mut out = HashMap::new();
        if let Some(doc) = self.documents.get(doc_id) {
            for (field, text) in &doc.fields {
                if self.field_weights.contains_key(field) {
                    out.insert(field.clone(), snippet(text, query_terms, &options));
                }
            }
        }
        out
    }
}

impl Default for FtsIndex {
    fn default() -> Self {
        Self::new()
    }
}
