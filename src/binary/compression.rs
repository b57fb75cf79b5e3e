//! Decompression for Parquet page/column-chunk bytes (§4.2).
//!
//! `uncompressed`, `snappy`, `gzip`, and `zstd` are the only codecs this
//! store ever writes. Snappy is hand-rolled from the framing spec (no
//! snappy crate dependency); gzip and zstd delegate to platform
//! implementations (`flate2`, `zstd`), matching how the teacher treats
//! Parquet codecs as something the underlying `parquet` crate already
//! handles — here we own that responsibility ourselves.

use std::io::Read;

use crate::error::{KbError, KbErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Uncompressed,
    Snappy,
    Gzip,
    Zstd,
}

impl Codec {
    /// Maps a Parquet `CompressionCodec` thrift enum value to our codec.
    pub fn from_parquet_enum(value: i32) -> Result<Self> {
        Ok(match value {
            0 => Codec::Uncompressed,
            1 => Codec::Snappy,
            2 => Codec::Gzip,
            // 3 = LZO, 4 = BROTLI, 5 = LZ4, 6 = ZSTD, 7 = LZ4_RAW in the
            // Parquet spec; only ZSTD is in our supported set.
            6 => Codec::Zstd,
            other => {
                return Err(KbError::new(
                    KbErrorKind::UnsupportedCodec,
                    format!("unsupported parquet compression codec id {other}"),
                ))
            }
        })
    }
}

pub fn decompress(bytes: &[u8], codec: Codec, uncompressed_size: usize) -> Result<Vec<u8>> {
    match codec {
        Codec::Uncompressed => Ok(bytes.to_vec()),
        Codec::Snappy => snappy_decompress(bytes, uncompressed_size),
        Codec::Gzip => gzip_decompress(bytes, uncompressed_size),
        Codec::Zstd => zstd_decompress(bytes, uncompressed_size),
    }
}

fn gzip_decompress(bytes: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(uncompressed_size);
    flate2::read::GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| KbError::with_source(KbErrorKind::Corrupt, "gzip decompression failed", e))?;
    Ok(out)
}

fn zstd_decompress(bytes: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    zstd::stream::decode_all(bytes)
        .map(|mut v| {
            v.shrink_to(uncompressed_size.max(v.len()));
            v
        })
        .map_err(|e| KbError::with_source(KbErrorKind::Corrupt, "zstd decompression failed", e))
}

/// Snappy "framed" block format used by Parquet: a varint-prefixed
/// uncompressed length, then a stream of literal and copy tags.
///
/// Tag byte low 2 bits select the element kind:
/// - `00`: literal, length in the upper 6 bits (or following bytes if >= 60)
/// - `01`: copy with 1-byte offset, length 4-11
/// - `10`: copy with 2-byte offset
/// - `11`: copy with 4-byte offset
fn snappy_decompress(bytes: &[u8], uncompressed_size_hint: usize) -> Result<Vec<u8>> {
    let (expected_len, mut pos) = read_snappy_varint_len(bytes)?;
    let mut out = Vec::with_capacity(expected_len.max(uncompressed_size_hint));

    while pos < bytes.len() {
        let tag = bytes[pos];
        pos += 1;
        match tag & 0x03 {
            0x00 => {
                // Literal.
                let mut len = (tag >> 2) as usize;
                if len < 60 {
                    len += 1;
                } else {
                    let extra_bytes = len - 59;
                    if pos + extra_bytes > bytes.len() {
                        return Err(KbError::corrupt("snappy literal length truncated"));
                    }
                    let mut n: usize = 0;
                    for i in 0..extra_bytes {
                        n |= (bytes[pos + i] as usize) << (8 * i);
                    }
                    pos += extra_bytes;
                    len = n + 1;
                }
                if pos + len > bytes.len() {
                    return Err(KbError::corrupt("snappy literal overruns input"));
                }
                out.extend_from_slice(&bytes[pos..pos + len]);
                pos += len;
            }
            tag_type => {
                let (length, offset, consumed) = read_copy(tag, tag_type, &bytes[pos..])?;
                pos += consumed;
                if offset == 0 || offset as usize > out.len() {
                    return Err(KbError::corrupt("snappy copy offset out of range"));
                }
                let start = out.len() - offset as usize;
                // Copies may overlap with the tail being written (RLE-style
                // runs), so copy byte-by-byte rather than via extend_from_slice.
                for i in 0..length {
                    let byte = out[start + i];
                    out.push(byte);
                }
            }
        }
    }

    if out.len() != expected_len && expected_len != 0 {
        return Err(KbError::corrupt(format!(
            "snappy decompressed length {} does not match declared length {}",
            out.len(),
            expected_len
        )));
    }

    Ok(out)
}

fn read_snappy_varint_len(bytes: &[u8]) -> Result<(usize, usize)> {
    let mut result: usize = 0;
    let mut shift = 0;
    let mut pos = 0;
    loop {
        let byte = *bytes
            .get(pos)
            .ok_or_else(|| KbError::corrupt("truncated snappy length varint"))?;
        result |= ((byte & 0x7f) as usize) << shift;
        pos += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 35 {
            return Err(KbError::corrupt("snappy length varint too long"));
        }
    }
    Ok((result, pos))
}

/// Returns (copy length, offset, bytes consumed from `rest` beyond the tag).
fn read_copy(tag: u8, tag_type: u8, rest: &[u8]) -> Result<(usize, u32, usize)> {
    match tag_type {
        0x01 => {
            // 1-byte offset copy: length in bits [2,4], offset high 3 bits in tag + 1 byte.
            let length = ((tag >> 2) & 0x07) as usize + 4;
            let offset_hi = ((tag >> 5) & 0x07) as u32;
            let offset_lo = *rest
                .first()
                .ok_or_else(|| KbError::corrupt("truncated snappy 1-byte copy offset"))?
                as u32;
            let offset = (offset_hi << 8) | offset_lo;
            Ok((length, offset, 1))
        }
        0x02 => {
            let length = ((tag >> 2) as usize) + 1;
            if rest.len() < 2 {
                return Err(KbError::corrupt("truncated snappy 2-byte copy offset"));
            }
            let offset = rest[0] as u32 | ((rest[1] as u32) << 8);
            Ok((length, offset, 2))
        }
        0x03 => {
            let length = ((tag >> 2) as usize) + 1;
            if rest.len() < 4 {
                return Err(KbError::corrupt("truncated snappy 4-byte copy offset"));
            }
            let offset = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            Ok((length, offset, 4))
        }
        _ => unreachable!("tag_type is masked to 2 bits"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-encodes "aaaaaaaaaa" (10 bytes) as snappy: 4 literal 'a's
    /// followed by a copy of length 6 at offset 1.
    #[test]
    fn snappy_literal_and_copy_roundtrip() {
        let mut encoded = Vec::new();
        // length varint = 10
        encoded.push(10u8);
        // literal tag: 4 bytes -> (4-1)=3 in upper bits, tag_type 0
        encoded.push((3 << 2) | 0x00);
        encoded.extend_from_slice(b"aaaa");
        // copy tag_type 0x01, length 6 -> (6-4)=2 in bits[2,4], offset=1 -> offset_hi=0
        encoded.push((0 << 5) | (2 << 2) | 0x01);
        encoded.push(1); // offset_lo

        let out = snappy_decompress(&encoded, 10).unwrap();
        assert_eq!(out, b"aaaaaaaaaa");
    }

    #[test]
    fn snappy_pure_literal() {
        let mut encoded = Vec::new();
        encoded.push(5u8); // length = 5
        encoded.push((4 << 2) | 0x00); // literal len 5
        encoded.extend_from_slice(b"hello");
        let out = snappy_decompress(&encoded, 5).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn gzip_roundtrip() {
        use std::io::Write;
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"the quick brown fox").unwrap();
        let compressed = enc.finish().unwrap();
        let out = gzip_decompress(&compressed, 19).unwrap();
        assert_eq!(out, b"the quick brown fox");
    }

    #[test]
    fn zstd_roundtrip() {
        let compressed = zstd::stream::encode_all(&b"the quick brown fox"[..], 3).unwrap();
        let out = zstd_decompress(&compressed, 19).unwrap();
        assert_eq!(out, b"the quick brown fox");
    }

    #[test]
    fn unsupported_codec_enum_is_rejected() {
        let err = Codec::from_parquet_enum(3).unwrap_err();
        assert_eq!(err.kind(), KbErrorKind::UnsupportedCodec);
    }
}
