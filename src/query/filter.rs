//! Closed filter-operator set for `advanced_filter` (§9: replace dynamic
//! property access with typed dispatch on a field's declared semantic
//! type, never on the runtime shape of a value).

use crate::error::{KbError, Result};
use crate::query::Article;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    StartsWith,
}

impl FilterOp {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "ne" => Ok(FilterOp::Ne),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "in" => Ok(FilterOp::In),
            "contains" => Ok(FilterOp::Contains),
            "starts_with" => Ok(FilterOp::StartsWith),
            other => Err(KbError::invalid_argument(format!("unknown filter operator '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Default)]
pub struct FilterQuery {
    pub category: Option<String>,
    pub conditions: Vec<FilterCondition>,
}

/// A field's declared type for filter dispatch; adding a new filterable
/// field means adding it here, not inspecting what a value happens to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SemanticType {
    Text,
    Number,
}

fn semantic_type(field: &str) -> Result<SemanticType> {
    match field {
        "id" | "category" | "title" | "description" | "wikidata_id" | "text" => Ok(SemanticType::Text),
        "lat" | "lng" | "updated_at" => Ok(SemanticType::Number),
        other => Err(KbError::invalid_argument(format!("unfilterable field '{other}'"))),
    }
}

fn text_value(article: &Article, field: &str) -> Option<String> {
    match field {
        "id" => Some(article.id.clone()),
        "category" => Some(article.category.clone()),
        "title" => Some(article.title.clone()),
        "description" => Some(article.description.clone()),
        "wikidata_id" => article.wikidata_id.clone(),
        "text" => Some(article.text.clone()),
        _ => None,
    }
}

fn number_value(article: &Article, field: &str) -> Option<f64> {
    match field {
        "lat" => article.lat,
        "lng" => article.lng,
        "updated_at" => Some(article.updated_at as f64),
        _ => None,
    }
}

impl FilterCondition {
    pub fn matches(&self, article: &Article) -> Result<bool> {
        match semantic_type(&self.field)? {
            SemanticType::Text => {
                let actual = text_value(article, &self.field).unwrap_or_default();
                match (self.op, &self.value) {
                    (FilterOp::Eq, FilterValue::Text(v)) => Ok(&actual == v),
                    (FilterOp::Ne, FilterValue::Text(v)) => Ok(&actual != v),
                    (FilterOp::Contains, FilterValue::Text(v)) => Ok(actual.contains(v.as_str())),
                    (FilterOp::StartsWith, FilterValue::Text(v)) => Ok(actual.starts_with(v.as_str())),
                    (FilterOp::In, FilterValue::List(values)) => Ok(values.iter().any(|v| v == &actual)),
                    (op, _) => Err(KbError::invalid_argument(format!(
                        "operator {op:?} is not valid for text field '{}'",
                        self.field
                    ))),
                }
            }
            SemanticType::Number => {
                let actual = number_value(article, &self.field).ok_or_else(|| {
                    KbError::invalid_argument(format!("field '{}' has no value to compare", self.field))
                })?;
                let FilterValue::Number(expected) = self.value else {
                    return Err(KbError::invalid_argument(format!(
                        "field '{}' expects a numeric filter value",
                        self.field
                    )));
                };
                match self.op {
                    FilterOp::Eq => Ok(actual == expected),
                    FilterOp::Ne => Ok(actual != expected),
                    FilterOp::Gt => Ok(actual > expected),
                    FilterOp::Gte => Ok(actual >= expected),
                    FilterOp::Lt => Ok(actual < expected),
                    FilterOp::Lte => Ok(actual <= expected),
                    op => Err(KbError::invalid_argument(format!(
                        "operator {op:?} is not valid for numeric field '{}'",
                        self.field
                    ))),
                }
            }
        }
    }
}

impl FilterQuery {
    pub fn matches(&self, article: &Article) -> Result<bool> {
        if let Some(category) = &self.category {
            if &article.category != category {
                return Ok(false);
            }
        }
        for condition in &self.conditions {
            if !condition.matches(article)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
