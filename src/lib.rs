//! Read-only, range-fetched columnar knowledge base server.
//!
//! Serves a static, read-mostly Wikipedia-scale knowledge base from
//! immutable columnar files in an object store, answering four query
//! classes with low latency: point lookup by article identifier or
//! title, k-nearest-neighbor vector search, BM25 full-text search, and
//! proximity search by geographic coordinates. The object store is
//! accessed over HTTP with byte-range requests; no mutable server-side
//! state persists between requests.
//!
//! The ingestion pipeline that produces the Parquet partitions and
//! pre-built indexes, the HTTP routing/authentication front-end, and the
//! embedding model itself are external collaborators and out of scope
//! for this crate ([`http`] only defines the response envelope shapes a
//! front-end would serialize; [`embedding`] is the client for the
//! external embedding service).

pub mod binary;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod fts;
pub mod geo;
pub mod http;
pub mod manifest;
pub mod parquet_reader;
pub mod query;
pub mod range_fetch;
pub mod vector;

pub use config::Config;
pub use context::{RequestContext, SharedCaches};
pub use error::{KbError, KbErrorKind, Result};
pub use query::QueryFacade;
