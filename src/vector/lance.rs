//! Bespoke `.lance` vector partition file format (§6).
//!
//! 16-byte header (`LANC` magic, 4 reserved bytes, 4-byte LE metadata-JSON
//! length, 4 reserved bytes), followed by metadata JSON, six columns
//! (id, title, type, chunk_index, text_preview, embedding), and a 72-byte
//! trailing footer of column start offsets.

use serde::Deserialize;

use crate::error::{KbError, KbErrorKind, Result};

pub const MAGIC: &[u8; 4] = b"LANC";
const HEADER_SIZE: usize = 16;
const FOOTER_SIZE: usize = 72;
const COLUMN_COUNT: usize = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct LanceMetadata {
    #[serde(rename = "rowCount")]
    pub row_count: u64,
    #[serde(rename = "embeddingDimension")]
    pub embedding_dimension: u32,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct LanceRecord {
    pub id: String,
    pub title: String,
    pub category: String,
    pub chunk_index: i32,
    pub text_preview: String,
    pub embedding: Vec<f32>,
}

pub struct LanceFile {
    pub metadata: LanceMetadata,
    pub records: Vec<LanceRecord>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let slice = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| KbError::corrupt("lance file truncated reading u32"))?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_f64(bytes: &[u8], offset: usize) -> Result<f64> {
    let slice = bytes
        .get(offset..offset + 8)
        .ok_or_else(|| KbError::corrupt("lance file truncated reading f64"))?;
    Ok(f64::from_le_bytes(slice.try_into().unwrap()))
}

/// A string column: `(row_count + 1)` u32 offsets, then concatenated UTF-8 bytes.
fn read_string_column(bytes: &[u8], start: usize, row_count: usize) -> Result<Vec<String>> {
    let offsets_len = (row_count + 1) * 4;
    let offsets_end = start
        .checked_add(offsets_len)
        .ok_or_else(|| KbError::corrupt("lance string column offset table overflow"))?;
    if offsets_end > bytes.len() {
        return Err(KbError::corrupt("lance string column offset table truncated"));
    }

    let mut offsets = Vec::with_capacity(row_count + 1);
    for i in 0..=row_count {
        offsets.push(read_u32(bytes, start + i * 4)? as usize);
    }

    let data_start = offsets_end;
    let mut out = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let a = data_start + offsets[i];
        let b = data_start + offsets[i + 1];
        let slice = bytes
            .get(a..b)
            .ok_or_else(|| KbError::corrupt("lance string column data out of range"))?;
        let s = std::str::from_utf8(slice)
            .map_err(|e| KbError::with_source(KbErrorKind::Corrupt, "invalid utf-8 in lance string column", e))?;
        out.push(s.to_string());
    }
    Ok(out)
}

fn read_int32_column(bytes: &[u8], start: usize, row_count: usize) -> Result<Vec<i32>> {
    let end = start
        .checked_add(row_count * 4)
        .ok_or_else(|| KbError::corrupt("lance int32 column overflow"))?;
    if end > bytes.len() {
        return Err(KbError::corrupt("lance int32 column truncated"));
    }
    let mut out = Vec::with_capacity(row_count);
    for i in 0..row_count {
        out.push(i32::from_le_bytes(bytes[start + i * 4..start + i * 4 + 4].try_into().unwrap()));
    }
    Ok(out)
}

fn read_embedding_column(bytes: &[u8], start: usize, row_count: usize, dimension: usize) -> Result<Vec<Vec<f32>>> {
    let floats_per_row = dimension;
    let total_floats = row_count * floats_per_row;
    let end = start
        .checked_add(total_floats * 4)
        .ok_or_else(|| KbError::corrupt("lance embedding column overflow"))?;
    if end > bytes.len() {
        return Err(KbError::corrupt("lance embedding column truncated"));
    }
    let mut out = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let mut vec = Vec::with_capacity(dimension);
        for d in 0..dimension {
            let offset = start + (row * floats_per_row + d) * 4;
            vec.push(f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()));
        }
        out.push(vec);
    }
    Ok(out)
}

pub fn parse(bytes: &[u8]) -> Result<LanceFile> {
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(KbError::corrupt("lance file shorter than header+footer"));
    }
    if &bytes[0..4] != MAGIC {
        return Err(KbError::corrupt("missing LANC magic"));
    }
    let metadata_len = read_u32(bytes, 8)? as usize;
    let metadata_start = HEADER_SIZE;
    let metadata_end = metadata_start
        .checked_add(metadata_len)
        .ok_or_else(|| KbError::corrupt("lance metadata length overflow"))?;
    if metadata_end > bytes.len() {
        return Err(KbError::corrupt("lance metadata exceeds file bounds"));
    }
    let metadata: LanceMetadata = serde_json::from_slice(&bytes[metadata_start..metadata_end])
        .map_err(|e| KbError::with_source(KbErrorKind::Corrupt, "malformed lance metadata json", e))?;

    let footer_start = bytes.len() - FOOTER_SIZE;
    let mut offsets = [0usize; COLUMN_COUNT];
    for i in 0..COLUMN_COUNT {
        let offset_in_footer = footer_start + 8 + i * 8;
        offsets[i] = read_f64(bytes, offset_in_footer)? as usize;
    }

    let row_count = metadata.row_count as usize;
    let dimension = metadata.embedding_dimension as usize;

    let ids = read_string_column(bytes, offsets[0], row_count)?;
    let titles = read_string_column(bytes, offsets[1], row_count)?;
    let categories = read_string_column(bytes, offsets[2], row_count)?;
    let chunk_indices = read_int32_column(bytes, offsets[3], row_count)?;
    let previews = read_string_column(bytes, offsets[4], row_count)?;
    let embeddings = read_embedding_column(bytes, offsets[5], row_count, dimension)?;

    let mut records = Vec::with_capacity(row_count);
    for i in 0..row_count {
        records.push(LanceRecord {
            id: ids[i].clone(),
            title: titles[i].clone(),
            category: categories[i].clone(),
            chunk_index: chunk_indices[i],
            text_preview: previews[i].clone(),
            embedding: embeddings[i].clone(),
        });
    }

    Ok(LanceFile { metadata, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_string_column(values: &[&str]) -> Vec<u8> {
        let mut offsets = vec![0u32];
        let mut data = Vec::new();
        for v in values {
            data.extend_from_slice(v.as_bytes());
            offsets.push(data.len() as u32);
        }
        let mut out = Vec::new();
        for o in &offsets {
            out.extend_from_slice(&o.to_le_bytes());
        }
        out.extend_from_slice(&data);
        out
    }

    fn build_lance_file(ids: &[&str], titles: &[&str], categories: &[&str], chunk_indices: &[i32], previews: &[&str], embeddings: &[Vec<f32>]) -> Vec<u8> {
        let row_count = ids.len();
        let dimension = embeddings.first().map(|v| v.len()).unwrap_or(0);
        let metadata = serde_json::json!({
            "rowCount": row_count,
            "embeddingDimension": dimension,
            "model": "bge-m3",
        });
        let metadata_bytes = serde_json::to_vec(&metadata).unwrap();

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(metadata_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&metadata_bytes);

        let mut column_offsets = Vec::new();

        column_offsets.push(out.len() as f64);
        out.extend_from_slice(&encode_string_column(ids));

        column_offsets.push(out.len() as f64);
        out.extend_from_slice(&encode_string_column(titles));

        column_offsets.push(out.len() as f64);
        out.extend_from_slice(&encode_string_column(categories));

        column_offsets.push(out.len() as f64);
        for c in chunk_indices {
            out.extend_from_slice(&c.to_le_bytes());
        }

        column_offsets.push(out.len() as f64);
        out.extend_from_slice(&encode_string_column(previews));

        column_offsets.push(out.len() as f64);
        for e in embeddings {
            for f in e {
                out.extend_from_slice(&f.to_le_bytes());
            }
        }

        out.extend_from_slice(&[0u8; 8]);
        for o in &column_offsets {
            out.extend_from_slice(&o.to_le_bytes());
        }

        out
    }

    #[test]
    fn parses_minimal_two_row_file() {
        let bytes = build_lance_file(
            &["a1", "a2"],
            &["Title One", "Title Two"],
            &["place", "person"],
            &[0, 1],
            &["preview one", "preview two"],
            &[vec![1.0, 2.0], vec![3.0, 4.0]],
        );
        let file = parse(&bytes).unwrap();
        assert_eq!(file.metadata.row_count, 2);
        assert_eq!(file.records.len(), 2);
        assert_eq!(file.records[0].id, "a1");
        assert_eq!(file.records[1].embedding, vec![3.0, 4.0]);
    }

    #[test]
    fn rejects_missing_magic() {
        let mut bytes = build_lance_file(&["a"], &["T"], &["place"], &[0], &["p"], &[vec![1.0]]);
        bytes[0] = b'X';
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.kind(), KbErrorKind::Corrupt);
    }
}
