//! Decodes Parquet data pages into typed column values (§4.3 step 4).
//!
//! Only `PLAIN`-encoded data pages are supported: the ingestion pipeline that
//! writes these partitions is a fixed, append-only batch job (out of scope
//! here) and never emits dictionary-encoded or nested/repeated columns, so a
//! dictionary page or a non-zero repetition level is always a corrupt-file
//! signal rather than something to decode.

use crate::binary::{decompress, Codec, FieldHeader, ThriftCompactDecoder, WireType};
use crate::error::{KbError, KbErrorKind, Result};
use crate::parquet_reader::footer::PhysicalType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageType {
    Data,
    Index,
    Dictionary,
    DataV2,
}

impl PageType {
    fn from_i32(v: i32) -> Result<Self> {
        Ok(match v {
            0 => PageType::Data,
            1 => PageType::Index,
            2 => PageType::Dictionary,
            3 => PageType::DataV2,
            other => return Err(KbError::corrupt(format!("unrecognized page type {other}"))),
        })
    }
}

/// A decoded column value. `Null` only ever appears for `OPTIONAL` columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

struct PageHeader {
    page_type: PageType,
    uncompressed_page_size: i32,
    compressed_page_size: i32,
    num_values: i32,
}

fn parse_page_header(dec: &mut ThriftCompactDecoder<'_>) -> Result<PageHeader> {
    dec.push_struct();
    let mut page_type = None;
    let mut uncompressed_page_size = 0i32;
    let mut compressed_page_size = 0i32;
    let mut num_values = 0i32;

    loop {
        let header = dec.read_field_header()?;
        if header.wire_type == WireType::Stop {
            break;
        }
        match header.field_id {
            1 => page_type = Some(PageType::from_i32(dec.read_zigzag_i32()?)?),
            2 => uncompressed_page_size = dec.read_zigzag_i32()?,
            3 => compressed_page_size = dec.read_zigzag_i32()?,
            5 => num_values = read_data_page_header_num_values(dec)?,
            7 => skip_struct_field(dec, &header)?,
            8 => num_values = read_data_page_header_num_values(dec)?,
            _ => dec.skip(header.wire_type)?,
        }
    }
    dec.pop_struct();

    Ok(PageHeader {
        page_type: page_type.ok_or_else(|| KbError::corrupt("page header missing type"))?,
        uncompressed_page_size,
        compressed_page_size,
        num_values,
    })
}

fn skip_struct_field(dec: &mut ThriftCompactDecoder<'_>, header: &FieldHeader) -> Result<()> {
    dec.skip(header.wire_type)
}

/// `DataPageHeader`/`DataPageHeaderV2` both start with an i32 `num_values`
/// as field 1; that is the only field this reader needs from either.
fn read_data_page_header_num_values(dec: &mut ThriftCompactDecoder<'_>) -> Result<i32> {
    dec.push_struct();
    let mut num_values = 0i32;
    loop {
        let header = dec.read_field_header()?;
        if header.wire_type == WireType::Stop {
            break;
        }
        if header.field_id == 1 {
            num_values = dec.read_zigzag_i32()?;
        } else {
            dec.skip(header.wire_type)?;
        }
    }
    dec.pop_struct();
    Ok(num_values)
}

/// Decodes the RLE/bit-packed hybrid definition-level stream used by
/// optional columns. Only bit-width 1 is supported (flat, non-nested
/// schema means the maximum definition level is always 1).
///
/// Layout: `[4-byte LE byte length][hybrid-encoded bytes]`. Each run is a
/// varint header `(count << 1) | is_bit_packed`; an RLE run is followed by
/// one value byte, a bit-packed run by `ceil(count/8)` group bytes.
fn decode_definition_levels(buf: &[u8], num_values: usize) -> Result<(Vec<u8>, usize)> {
    if buf.len() < 4 {
        return Err(KbError::corrupt("truncated definition-level length prefix"));
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let body_start = 4;
    let body_end = body_start
        .checked_add(len)
        .ok_or_else(|| KbError::corrupt("definition-level length overflow"))?;
    if body_end > buf.len() {
        return Err(KbError::corrupt(
            "definition-level body exceeds remaining page bytes",
        ));
    }
    let body = &buf[body_start..body_end];

    let mut levels = Vec::with_capacity(num_values);
    let mut pos = 0usize;
    while levels.len() < num_values {
        let (header, consumed) = read_uleb128(&body[pos..])?;
        pos += consumed;
        if header & 1 == 0 {
            // RLE run: header >> 1 repetitions of one value byte.
            let count = (header >> 1) as usize;
            let value = *body
                .get(pos)
                .ok_or_else(|| KbError::corrupt("truncated RLE value byte"))?;
            pos += 1;
            for _ in 0..count {
                levels.push(value);
            }
        } else {
            // Bit-packed run: header >> 1 groups of 8 values, 1 bit each.
            let groups = (header >> 1) as usize;
            let count = groups * 8;
            let group_bytes = groups; // bit-width 1 => 1 byte per group of 8
            if pos + group_bytes > body.len() {
                return Err(KbError::corrupt("truncated bit-packed definition levels"));
            }
            for i in 0..count {
                let byte = body[pos + i / 8];
                let bit = (byte >> (i % 8)) & 1;
                levels.push(bit);
            }
            pos += group_bytes;
        }
    }
    levels.truncate(num_values);
    Ok((levels, body_end))
}

fn read_uleb128(buf: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut pos = 0;
    loop {
        let byte = *buf
            .get(pos)
            .ok_or_else(|| KbError::corrupt("truncated varint in definition levels"))?;
        result |= ((byte & 0x7f) as u64) << shift;
        pos += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok((result, pos))
}

fn decode_plain_value(buf: &[u8], pos: &mut usize, physical_type: PhysicalType) -> Result<Value> {
    match physical_type {
        PhysicalType::Boolean => {
            let byte_index = *pos / 8;
            let bit_index = *pos % 8;
            let byte = *buf
                .get(byte_index)
                .ok_or_else(|| KbError::corrupt("truncated boolean page"))?;
            *pos += 1;
            Ok(Value::Bool((byte >> bit_index) & 1 == 1))
        }
        PhysicalType::Int32 => {
            let bytes = read_fixed::<4>(buf, pos)?;
            Ok(Value::Int32(i32::from_le_bytes(bytes)))
        }
        PhysicalType::Int64 => {
            let bytes = read_fixed::<8>(buf, pos)?;
            Ok(Value::Int64(i64::from_le_bytes(bytes)))
        }
        PhysicalType::Float => {
            let bytes = read_fixed::<4>(buf, pos)?;
            Ok(Value::Float(f32::from_le_bytes(bytes)))
        }
        PhysicalType::Double => {
            let bytes = read_fixed::<8>(buf, pos)?;
            Ok(Value::Double(f64::from_le_bytes(bytes)))
        }
        PhysicalType::ByteArray => {
            let len_bytes = read_fixed::<4>(buf, pos)?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            let start = *pos;
            let end = start
                .checked_add(len)
                .ok_or_else(|| KbError::corrupt("byte array length overflow"))?;
            if end > buf.len() {
                return Err(KbError::corrupt("byte array exceeds page bytes"));
            }
            *pos = end;
            Ok(Value::Bytes(buf[start..end].to_vec()))
        }
        PhysicalType::FixedLenByteArray | PhysicalType::Int96 => Err(KbError::unsupported_codec(
            "FIXED_LEN_BYTE_ARRAY / INT96 columns are not used by this schema",
        )),
    }
}

fn read_fixed<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N]> {
    let start = *pos;
    let end = start + N;
    if end > buf.len() {
        return Err(KbError::corrupt("truncated fixed-width value in page"));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[start..end]);
    *pos = end;
    Ok(out)
}

/// Decodes every data page of a (already-decompressed-per-page) column
/// chunk byte range into a flat `Vec<Value>` in row order.
///
/// `chunk_bytes` spans the whole column chunk (dictionary page, if any,
/// plus one or more data pages) as returned by a single range-GET.
pub fn decode_column_chunk(
    chunk_bytes: &[u8],
    physical_type: PhysicalType,
    codec: i32,
    optional: bool,
    expected_num_values: usize,
) -> Result<Vec<Value>> {
    let codec = Codec::from_parquet_enum(codec)?;
    let mut out = Vec::with_capacity(expected_num_values);
    let mut offset = 0usize;

    while out.len() < expected_num_values && offset < chunk_bytes.len() {
        let mut header_dec = ThriftCompactDecoder::new(&chunk_bytes[offset..]);
        let header = parse_page_header(&mut header_dec)?;
        let header_len = header_dec.position();
        offset += header_len;

        let compressed_end = offset + header.compressed_page_size as usize;
        if compressed_end > chunk_bytes.len() {
            return Err(KbError::corrupt("page extends past column chunk bytes"));
        }
        let page_bytes = &chunk_bytes[offset..compressed_end];
        offset = compressed_end;

        if header.page_type == PageType::Dictionary {
            return Err(KbError::unsupported_codec(
                "dictionary-encoded pages are not supported",
            ));
        }
        if header.page_type == PageType::Index {
            continue;
        }

        let decoded = decompress(
            page_bytes,
            codec,
            header.uncompressed_page_size as usize,
        )?;

        let mut body_pos = 0usize;
        let def_levels = if optional {
            let (levels, consumed) = decode_definition_levels(&decoded, header.num_values as usize)?;
            body_pos = consumed;
            Some(levels)
        } else {
            None
        };

        match def_levels {
            Some(levels) => {
                for &level in &levels {
                    if level == 0 {
                        out.push(Value::Null);
                    } else {
                        out.push(decode_plain_value(&decoded, &mut body_pos, physical_type)?);
                    }
                }
            }
            None => {
                for _ in 0..header.num_values {
                    out.push(decode_plain_value(&decoded, &mut body_pos, physical_type)?);
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_page_header(page_type: i32, uncompressed: i32, compressed: i32, num_values: i32) -> Vec<u8> {
        let mut out = Vec::new();
        // field 1: page_type (i32)
        out.push((1 << 4) | 5);
        write_zigzag(&mut out, page_type as i64);
        // field 2: uncompressed_page_size
        out.push((1 << 4) | 5);
        write_zigzag(&mut out, uncompressed as i64);
        // field 3: compressed_page_size
        out.push((1 << 4) | 5);
        write_zigzag(&mut out, compressed as i64);
        // field 5: data_page_header (struct), delta=2 from field 3
        out.push((2 << 4) | 12);
        // nested struct: field 1 num_values
        out.push((1 << 4) | 5);
        write_zigzag(&mut out, num_values as i64);
        out.push(0); // stop nested struct
        out.push(0); // stop outer struct
        out
    }

    fn write_zigzag(out: &mut Vec<u8>, v: i64) {
        let zz = ((v << 1) ^ (v >> 63)) as u64;
        write_varint(out, zz);
    }

    fn write_varint(out: &mut Vec<u8>, mut v: u64) {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if v == 0 {
                break;
            }
        }
    }

    #[test]
    fn decodes_required_int32_plain_page() {
        let values: [i32; 3] = [10, -5, 99];
        let mut page_body = Vec::new();
        for v in values {
            page_body.extend_from_slice(&v.to_le_bytes());
        }
        let header = encode_page_header(0, page_body.len() as i32, page_body.len() as i32, 3);
        let mut chunk = header;
        chunk.extend_from_slice(&page_body);

        let decoded = decode_column_chunk(&chunk, PhysicalType::Int32, 0, false, 3).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_i64(), Some(10));
        assert_eq!(decoded[1].as_i64(), Some(-5));
        assert_eq!(decoded[2].as_i64(), Some(99));
    }

    #[test]
    fn decodes_optional_column_with_nulls_via_rle_definition_levels() {
        // def levels: [1, 0, 1] meaning present, null, present.
        let mut def_level_body = Vec::new();
        // RLE run header: count=3 << 1 | 0 (rle) won't work since values differ;
        // use three separate bit-packed or simplest: one RLE run per value.
        // Encode as bit-packed group of 8 (padded) since count=3 < 8.
        let bits: u8 = 0b0000_0101; // bit0=1(present), bit1=0(null), bit2=1(present)
        def_level_body.push((1 << 1) | 1); // header: 1 group, bit-packed
        def_level_body.push(bits);
        let mut def_section = Vec::new();
        def_section.extend_from_slice(&(def_level_body.len() as u32).to_le_bytes());
        def_section.extend_from_slice(&def_level_body);

        let mut values_body = Vec::new();
        values_body.extend_from_slice(&42i32.to_le_bytes());
        values_body.extend_from_slice(&7i32.to_le_bytes());

        let mut page_body = def_section;
        page_body.extend_from_slice(&values_body);

        let header = encode_page_header(0, page_body.len() as i32, page_body.len() as i32, 3);
        let mut chunk = header;
        chunk.extend_from_slice(&page_body);

        let decoded = decode_column_chunk(&chunk, PhysicalType::Int32, 0, true, 3).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_i64(), Some(42));
        assert!(decoded[1].is_null());
        assert_eq!(decoded[2].as_i64(), Some(7));
    }

    #[test]
    fn dictionary_page_is_unsupported_codec_error() {
        let header = encode_page_header(2, 0, 0, 0);
        let err = decode_column_chunk(&header, PhysicalType::Int32, 0, false, 1).unwrap_err();
        assert_eq!(err.kind(), KbErrorKind::UnsupportedCodec);
    }
}
