//! Query facade (§4.9): translates the four query classes into calls
//! against the lower components, owns the HNSW/FTS degradation policy,
//! and shapes results into the envelopes `http::mod` serializes.

pub mod filter;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::context::RequestContext;
use crate::error::{KbError, Result};
use crate::fts::SearchOptions as FtsSearchOptions;
use crate::manifest::{normalize_title, LocationRecord};
use crate::parquet_reader::page::Value;
use crate::parquet_reader::{ColumnarReader, RowStreamOptions};

pub use filter::{FilterCondition, FilterOp, FilterQuery, FilterValue};

/// Default scan cap for a best-effort inbound-relationship scan (§4.9);
/// unbounded inbound scanning across the whole corpus is out of scope.
const DEFAULT_INBOUND_SCAN_CAP: usize = 20_000;
const VECTOR_OVER_FETCH_MULTIPLIER: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub wikidata_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub infobox: HashMap<String, String>,
    pub text: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredArticle {
    pub article: Article,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoResult {
    pub id: String,
    pub title: String,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub distance_meters: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoIndexStats {
    pub bucket_count: usize,
    pub entry_count: usize,
    pub min_bucket_population: usize,
    pub max_bucket_population: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipDirection {
    Outbound,
    Inbound,
}

/// Vector-search request parameters. `use_hnsw=false` is the caller's own
/// choice to skip the ANN graph; the facade may additionally downgrade a
/// `true` request if the graph fails to load (§7).
pub struct VectorSearchOptions {
    pub k: usize,
    pub ef: usize,
    pub types: Option<std::collections::HashSet<String>>,
    pub model: String,
    pub use_hnsw: bool,
}

pub struct TextSearchOptions {
    pub limit: usize,
    pub types: Option<std::collections::HashSet<String>>,
    pub use_fts: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoSearchOptions {
    pub limit: usize,
    pub fast: bool,
}

/// Whether a degradable query actually used its preferred index, carried
/// alongside the result so callers (and the HTTP envelope) can surface it.
pub struct DegradableResult<T> {
    pub value: T,
    pub used_index: bool,
}

fn get_str(row: &HashMap<String, Value>, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn get_f64(row: &HashMap<String, Value>, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_f64)
}

fn get_i64(row: &HashMap<String, Value>, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_i64)
}

fn infobox_value_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn parse_infobox(raw: Option<String>) -> HashMap<String, String> {
    let Some(raw) = raw else {
        return HashMap::new();
    };
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(map)) => {
            map.into_iter().map(|(k, v)| (k, infobox_value_to_string(v))).collect()
        }
        _ => HashMap::new(),
    }
}

fn row_to_article(fallback_id: &str, row: &HashMap<String, Value>) -> Article {
    Article {
        id: get_str(row, "id").unwrap_or_else(|| fallback_id.to_string()),
        category: get_str(row, "category").unwrap_or_else(|| "other".to_string()),
        title: get_str(row, "title").unwrap_or_default(),
        description: get_str(row, "description").unwrap_or_default(),
        wikidata_id: get_str(row, "wikidata_id"),
        lat: get_f64(row, "lat"),
        lng: get_f64(row, "lng"),
        infobox: parse_infobox(get_str(row, "infobox")),
        text: get_str(row, "text").unwrap_or_default(),
        updated_at: get_i64(row, "updated_at").unwrap_or(0),
    }
}

pub struct QueryFacade {
    ctx: Arc<RequestContext>,
}

impl QueryFacade {
    pub fn new(ctx: Arc<RequestContext>) -> Self {
        Self { ctx }
    }

    async fn read_row_at(&self, reader: &ColumnarReader, location: &LocationRecord) -> Result<HashMap<String, Value>> {
        let row_group = reader.read_row_group(location.row_group).await?;
        let mut row = HashMap::with_capacity(row_group.columns.len());
        for (name, values) in &row_group.columns {
            let value = values.get(location.row).cloned().unwrap_or(Value::Null);
            row.insert(name.clone(), value);
        }
        Ok(row)
    }

    async fn read_article(&self, id: &str, location: &LocationRecord) -> Result<Article> {
        let reader = self.ctx.columnar_reader(&location.file_path).await?;
        let row = self.read_row_at(&reader, location).await?;
        Ok(row_to_article(id, &row))
    }

    /// Id index probe → location record → columnar row read.
    pub async fn get_article_by_id(&self, id: &str) -> Result<Article> {
        let manifest = self.ctx.manifest().await?;
        let entry = manifest
            .lookup_id(id)
            .ok_or_else(|| KbError::not_found(format!("no article with id '{id}'")))?;
        self.read_article(id, &entry.location).await
    }

    /// Same lookup via the title index, after §3 normalization.
    pub async fn get_article_by_title(&self, title: &str) -> Result<Article> {
        let manifest = self.ctx.manifest().await?;
        let location = manifest
            .lookup_title(title)
            .ok_or_else(|| KbError::not_found(format!("no article titled '{title}'")))?
            .clone();
        let reader = self.ctx.columnar_reader(&location.file_path).await?;
        let row = self.read_row_at(&reader, &location).await?;
        let id = get_str(&row, "id").unwrap_or_else(|| normalize_title(title));
        Ok(row_to_article(&id, &row))
    }

    /// Reads every article from a category's partitions, in file order.
    async fn read_category_articles(&self, category: &str) -> Result<Vec<Article>> {
        use futures::StreamExt;

        let manifest = self.ctx.manifest().await?;
        let files: Vec<String> = manifest.files_for_type(category).to_vec();
        let mut articles = Vec::new();
        for file_path in files {
            let reader = self.ctx.columnar_reader(&file_path).await?;
            let mut rows = std::pin::pin!(reader.stream_rows(RowStreamOptions::default()));
            while let Some(row) = rows.next().await {
                articles.push(row_to_article("", &row?));
            }
        }
        Ok(articles)
    }

    /// Delegates to a scan of the relevant type-index file list.
    pub async fn list_articles(&self, category: Option<&str>, limit: usize, offset: usize) -> Result<(Vec<Article>, usize)> {
        let articles = match category {
            Some(category) => self.read_category_articles(category).await?,
            None => {
                let manifest = self.ctx.manifest().await?;
                let mut all = Vec::new();
                for category in manifest.type_stats().keys().cloned().collect::<Vec<_>>() {
                    all.extend(self.read_category_articles(&category).await?);
                }
                all
            }
        };
        let total = articles.len();
        let page = articles.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    /// Applies the closed operator set against typed row structs; dispatch
    /// lives in `filter::FilterQuery`, never as dynamic property access.
    pub async fn advanced_filter(&self, query: &FilterQuery) -> Result<Vec<Article>> {
        let candidates = match &query.category {
            Some(category) => self.read_category_articles(category).await?,
            None => {
                let manifest = self.ctx.manifest().await?;
                let mut all = Vec::new();
                for category in manifest.type_stats().keys().cloned().collect::<Vec<_>>() {
                    all.extend(self.read_category_articles(&category).await?);
                }
                all
            }
        };
        let mut matched = Vec::with_capacity(candidates.len());
        for article in candidates {
            if query.matches(&article)? {
                matched.push(article);
            }
        }
        Ok(matched)
    }

    /// Delegates to the HNSW index (§4.7), one per-category `.lance`
    /// partition at a time, merging across every requested category. On a
    /// missing/unbuildable index for any searched category, degrades that
    /// category to a brute-force scan and reports `used_index=false` for
    /// the whole call (§7).
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        options: &VectorSearchOptions,
    ) -> Result<DegradableResult<Vec<ScoredArticle>>> {
        let categories: Vec<String> = match &options.types {
            Some(types) if !types.is_empty() => types.iter().cloned().collect(),
            _ => {
                let manifest = self.ctx.manifest().await?;
                manifest.type_stats().keys().cloned().collect()
            }
        };

        let mut merged = Vec::new();
        let mut used_index = true;
        for category in categories {
            let (neighbors, category_used_index) = if options.use_hnsw {
                match self.ctx.vector_index(&options.model, &category).await {
                    Ok(index) => (index.search(embedding, options.k, options.ef), true),
                    Err(err) => {
                        warn!(error = %err, %category, "vector index unavailable, falling back to brute-force scan");
                        (self.vector_brute_force_category(embedding, options, &category).await?, false)
                    }
                }
            } else {
                (self.vector_brute_force_category(embedding, options, &category).await?, false)
            };
            used_index &= category_used_index;
            for neighbor in neighbors {
                if let Ok(article) = self.get_article_by_id(&neighbor.id).await {
                    merged.push(ScoredArticle { article, score: neighbor.score });
                }
            }
        }

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.article.id.cmp(&b.article.id))
        });
        merged.truncate(options.k);
        Ok(DegradableResult { value: merged, used_index })
    }

    async fn vector_brute_force_category(
        &self,
        embedding: &[f32],
        options: &VectorSearchOptions,
        category: &str,
    ) -> Result<Vec<crate::vector::Neighbor>> {
        let index = self.ctx.vector_index(&options.model, category).await?;
        let over_fetch = (options.k * VECTOR_OVER_FETCH_MULTIPLIER).max(options.k);
        Ok(index.brute_force_search(embedding, over_fetch))
    }

    /// Delegates to the BM25 index (§4.6); on a missing index, degrades to
    /// normalized-prefix match over titles and reports `used_index=false`.
    pub async fn text_search(&self, query: &str, options: &TextSearchOptions) -> Result<DegradableResult<Vec<ScoredArticle>>> {
        if options.use_fts {
            match self.ctx.fts_index().await {
                Ok(index) => {
                    let fts_options = FtsSearchOptions {
                        limit: options.limit,
                        min_score: 0.0,
                        types: options.types.clone(),
                        highlight: true,
                        fuzzy: true,
                    };
                    let hits = index.search(query, &fts_options);
                    let mut results = Vec::with_capacity(hits.len());
                    for hit in hits {
                        if let Ok(article) = self.get_article_by_id(&hit.id).await {
                            results.push(ScoredArticle { article, score: hit.score });
                        }
                    }
                    return Ok(DegradableResult { value: results, used_index: true });
                }
                Err(err) => {
                    warn!(error = %err, "fts index unavailable, falling back to prefix match over titles");
                }
            }
        }

        let normalized_query = normalize_title(query);
        let manifest = self.ctx.manifest().await?;
        let categories: Vec<String> = match &options.types {
            Some(types) => types.iter().cloned().collect(),
            None => manifest.type_stats().keys().cloned().collect(),
        };
        let mut results = Vec::new();
        for category in categories {
            for article in self.read_category_articles(&category).await? {
                if normalize_title(&article.title).starts_with(&normalized_query) {
                    results.push(ScoredArticle { article, score: 0.0 });
                }
            }
        }
        results.truncate(options.limit);
        Ok(DegradableResult { value: results, used_index: false })
    }

    /// Delegates to the geo index (§4.5). `fast=true` is accepted but the
    /// geo index always computes its full candidate set before sorting;
    /// results are identical either way, just not early-exited.
    pub async fn geo_search(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        category: Option<&str>,
        options: &GeoSearchOptions,
    ) -> Result<Vec<GeoResult>> {
        let index = self.ctx.geo_index().await?;
        let hits = index.radius_search(lat, lng, radius_meters, options.limit, category);
        Ok(hits
            .into_iter()
            .map(|(entry, distance)| GeoResult {
                id: entry.id,
                title: entry.title,
                category: entry.category,
                lat: entry.lat,
                lng: entry.lng,
                distance_meters: distance,
            })
            .collect())
    }

    /// Reads the `infobox` map of the source article for wikidata-shaped
    /// links and resolves each via the id index. `Inbound` is a best-effort
    /// reverse scan bounded by `scan_cap`; `scan_cap == 0` is refused.
    pub async fn relationships(
        &self,
        id: &str,
        direction: RelationshipDirection,
        scan_cap: usize,
    ) -> Result<Vec<Article>> {
        match direction {
            RelationshipDirection::Outbound => {
                let article = self.get_article_by_id(id).await?;
                let mut linked = Vec::new();
                for value in article.infobox.values() {
                    if let Ok(target) = self.get_article_by_id(value).await {
                        linked.push(target);
                    }
                }
                Ok(linked)
            }
            RelationshipDirection::Inbound => {
                if scan_cap == 0 {
                    return Err(KbError::internal("inbound relationship scan requires a positive scan cap"));
                }
                let source = self.get_article_by_id(id).await?;
                let candidates = self
                    .read_category_articles(&source.category)
                    .await?
                    .into_iter()
                    .take(scan_cap.min(DEFAULT_INBOUND_SCAN_CAP));
                Ok(candidates
                    .filter(|candidate| candidate.infobox.values().any(|v| v == id))
                    .collect())
            }
        }
    }

    /// Manifest per-category counts, no I/O beyond the manifest itself.
    pub async fn type_stats(&self) -> Result<Vec<CategoryStats>> {
        let manifest = self.ctx.manifest().await?;
        Ok(manifest
            .type_stats()
            .iter()
            .map(|(category, count)| CategoryStats { category: category.clone(), count: *count })
            .collect())
    }

    /// Bucket/entry counts and population bounds off the loaded geo index.
    pub async fn geo_index_stats(&self) -> Result<GeoIndexStats> {
        let index = self.ctx.geo_index().await?;
        let populations = index.bucket_populations();
        Ok(GeoIndexStats {
            bucket_count: index.bucket_count(),
            entry_count: index.len(),
            min_bucket_population: populations.iter().copied().min().unwrap_or(0),
            max_bucket_population: populations.iter().copied().max().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_to_article_parses_infobox_json() {
        let mut row = HashMap::new();
        row.insert("id".to_string(), Value::Bytes(b"Q1".to_vec()));
        row.insert("category".to_string(), Value::Bytes(b"person".to_vec()));
        row.insert("title".to_string(), Value::Bytes(b"Ada Lovelace".to_vec()));
        row.insert(
            "infobox".to_string(),
            Value::Bytes(br#"{"born":"1815","occupation":"mathematician"}"#.to_vec()),
        );
        let article = row_to_article("fallback", &row);
        assert_eq!(article.id, "Q1");
        assert_eq!(article.infobox.get("born"), Some(&"1815".to_string()));
        assert_eq!(article.infobox.get("occupation"), Some(&"mathematician".to_string()));
    }

    #[test]
    fn row_to_article_falls_back_to_supplied_id_when_column_absent() {
        let row = HashMap::new();
        let article = row_to_article("Q42", &row);
        assert_eq!(article.id, "Q42");
        assert_eq!(article.category, "other");
        assert!(article.infobox.is_empty());
    }
}
