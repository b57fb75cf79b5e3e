//! Response envelope types (§6).
//!
//! §6 specifies the JSON shapes an HTTP front-end wraps query results in,
//! but the front-end itself — routing, auth, rate-limit enforcement — is
//! explicitly out of scope (§1). This module defines only the
//! `serde`-serializable envelope and error-body types plus the
//! [`KbErrorKind`] to HTTP status mapping, so a front-end built on top of
//! this crate has something concrete to serialize without this crate
//! reaching into request/response handling itself.

use serde::Serialize;

use crate::error::KbErrorKind;

/// Pagination metadata for a `list`-style response.
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    pub total: u64,
}

/// Query metadata echoed back alongside search results, carrying the
/// degradation flags a front-end surfaces to callers (§7, §4.9).
#[derive(Debug, Clone, Serialize)]
pub struct QueryMeta {
    pub query: String,
    pub used_index: bool,
}

/// Either shape a successful response body takes, per §6's
/// `{data | results, pagination | query, count}` envelope: a single
/// resource with no metadata, a paginated list, or a scored/ranked
/// result set carrying query metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Single {
        data: T,
    },
    Paginated {
        results: Vec<T>,
        pagination: Pagination,
        count: usize,
    },
    Queried {
        results: Vec<T>,
        query: QueryMeta,
        count: usize,
    },
}

impl<T> Envelope<T> {
    pub fn single(data: T) -> Self {
        Envelope::Single { data }
    }

    pub fn paginated(results: Vec<T>, limit: usize, offset: usize, total: u64) -> Self {
        let count = results.len();
        Envelope::Paginated { results, pagination: Pagination { limit, offset, total }, count }
    }

    pub fn queried(results: Vec<T>, query: impl Into<String>, used_index: bool) -> Self {
        let count = results.len();
        Envelope::Queried { results, query: QueryMeta { query: query.into(), used_index }, count }
    }
}

/// Error envelope body: `{error: {code, message}}` (§6, §7).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn from_kind(kind: KbErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail { code: kind.to_string(), message: message.into() },
        }
    }
}

/// `X-RateLimit-*` response headers (§6): standard limit/remaining/reset
/// triad, present on every response once a credential's bucket is known.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub reset_seconds: u64,
}

impl RateLimitHeaders {
    pub fn new(limit: u32, remaining: u32, reset_seconds: u64) -> Self {
        Self { limit, remaining, reset_seconds }
    }
}

/// Maps an error kind to the HTTP status a front-end should respond with.
/// Thin re-export of [`KbErrorKind::http_status`] under the name a
/// front-end author looks for in this module.
pub fn status_for(kind: KbErrorKind) -> u16 {
    kind.http_status()
}
