//! FTS (BM25) inverted index (§4.6).

pub mod analysis;
pub mod bm25;
pub mod fuzzy;
pub mod highlight;

use std::io::Read;

use crate::error::{KbError, KbErrorKind, Result};

pub use bm25::{FtsIndex, SearchOptions, SearchResult};

/// Loads a gzip-compressed serialized BM25 index (§6: `indexes/fts/articles.json.gz`).
pub fn load_gzip_json(bytes: &[u8]) -> Result<FtsIndex> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| KbError::with_source(KbErrorKind::Corrupt, "gzip decompression of fts index failed", e))?;
    serde_json::from_slice(&json)
        .map_err(|e| KbError::with_source(KbErrorKind::Corrupt, "malformed fts index json", e))
}
