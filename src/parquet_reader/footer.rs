//! Parses the Parquet `FileMetaData` footer (compact-Thrift) into typed
//! structures (§4.3 steps 1–2).

use crate::binary::{FieldHeader, ThriftCompactDecoder, WireType};
use crate::error::{KbError, KbErrorKind, Result};

pub const MAGIC: &[u8; 4] = b"PAR1";
pub const FOOTER_SIZE: usize = 8;

/// Primitive physical types a column chunk's values are stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalType {
    Boolean,
    Int32,
    Int64,
    Int96,
    Float,
    Double,
    ByteArray,
    FixedLenByteArray,
}

impl PhysicalType {
    fn from_i32(v: i32) -> Result<Self> {
        Ok(match v {
            0 => PhysicalType::Boolean,
            1 => PhysicalType::Int32,
            2 => PhysicalType::Int64,
            3 => PhysicalType::Int96,
            4 => PhysicalType::Float,
            5 => PhysicalType::Double,
            6 => PhysicalType::ByteArray,
            7 => PhysicalType::FixedLenByteArray,
            other => {
                return Err(KbError::corrupt(format!(
                    "unrecognized parquet physical type id {other}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetition {
    Required,
    Optional,
    Repeated,
}

impl Repetition {
    fn from_i32(v: i32) -> Result<Self> {
        Ok(match v {
            0 => Repetition::Required,
            1 => Repetition::Optional,
            2 => Repetition::Repeated,
            other => {
                return Err(KbError::corrupt(format!(
                    "unrecognized parquet repetition type id {other}"
                )))
            }
        })
    }
}

/// JSON-annotated `BYTE_ARRAY` columns (the `infobox` field) carry
/// `converted_type == JSON` (id 19 in the Parquet `ConvertedType` enum).
pub const CONVERTED_TYPE_JSON: i32 = 19;

#[derive(Debug, Clone)]
pub struct SchemaElement {
    pub name: String,
    pub physical_type: Option<PhysicalType>,
    pub repetition: Option<Repetition>,
    pub num_children: Option<i32>,
    pub converted_type: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ColumnMetaData {
    pub physical_type: PhysicalType,
    pub path_in_schema: Vec<String>,
    pub codec: i32,
    pub num_values: i64,
    pub total_uncompressed_size: i64,
    pub total_compressed_size: i64,
    pub data_page_offset: i64,
    pub dictionary_page_offset: Option<i64>,
}

impl ColumnMetaData {
    /// The byte span `[start, end)` covering this column chunk, used for the
    /// single range-GET per row-group read (§4.3 step 3).
    pub fn byte_range(&self) -> (u64, u64) {
        let start = self
            .dictionary_page_offset
            .unwrap_or(self.data_page_offset) as u64;
        (start, start + self.total_compressed_size as u64)
    }

    pub fn column_name(&self) -> &str {
        self.path_in_schema
            .last()
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct ColumnChunk {
    pub file_offset: i64,
    pub meta_data: ColumnMetaData,
}

#[derive(Debug, Clone)]
pub struct RowGroup {
    pub columns: Vec<ColumnChunk>,
    pub total_byte_size: i64,
    pub num_rows: i64,
}

#[derive(Debug, Clone)]
pub struct FileMetaData {
    pub version: i32,
    pub schema: Vec<SchemaElement>,
    pub num_rows: i64,
    pub row_groups: Vec<RowGroup>,
}

impl FileMetaData {
    pub fn num_row_groups(&self) -> usize {
        self.row_groups.len()
    }

    /// Column names in file order (leaves only), skipping the implicit root.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .iter()
            .skip(1)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Reads the metadata length from the trailing 8 bytes of a Parquet file:
/// `[4-byte LE length][4-byte "PAR1" magic]`.
pub fn read_metadata_length(footer_bytes: &[u8]) -> Result<u32> {
    if footer_bytes.len() < FOOTER_SIZE {
        return Err(KbError::corrupt("footer shorter than 8 bytes"));
    }
    let magic = &footer_bytes[footer_bytes.len() - 4..];
    if magic != MAGIC {
        return Err(KbError::corrupt("missing PAR1 trailing magic"));
    }
    let len_bytes = &footer_bytes[footer_bytes.len() - 8..footer_bytes.len() - 4];
    Ok(u32::from_le_bytes([
        len_bytes[0],
        len_bytes[1],
        len_bytes[2],
        len_bytes[3],
    ]))
}

/// Parses the compact-Thrift `FileMetaData` struct.
pub fn parse_file_metadata(bytes: &[u8]) -> Result<FileMetaData> {
    let mut dec = ThriftCompactDecoder::new(bytes);
    dec.push_struct();

    let mut version = 0i32;
    let mut schema = Vec::new();
    let mut num_rows = 0i64;
    let mut row_groups = Vec::new();

    loop {
        let header = dec.read_field_header()?;
        if header.wire_type == WireType::Stop {
            break;
        }
        match header.field_id {
            1 => version = dec.read_zigzag_i32()?,
            2 => schema = read_schema_list(&mut dec, &header)?,
            3 => num_rows = dec.read_zigzag_i64()?,
            4 => row_groups = read_row_group_list(&mut dec, &header)?,
            _ => dec.skip(header.wire_type)?,
        }
    }
    dec.pop_struct();

    Ok(FileMetaData {
        version,
        schema,
        num_rows,
        row_groups,
    })
}

fn read_schema_list(
    dec: &mut ThriftCompactDecoder<'_>,
    header: &FieldHeader,
) -> Result<Vec<SchemaElement>> {
    require_list_type(header)?;
    let (elem_type, count) = dec.read_list_header()?;
    if elem_type != WireType::Struct {
        return Err(KbError::corrupt("schema list element is not a struct"));
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_schema_element(dec)?);
    }
    Ok(out)
}

fn read_schema_element(dec: &mut ThriftCompactDecoder<'_>) -> Result<SchemaElement> {
    dec.push_struct();
    let mut physical_type = None;
    let mut repetition = None;
    let mut name = String::new();
    let mut num_children = None;
    let mut converted_type = None;

    loop {
        let header = dec.read_field_header()?;
        if header.wire_type == WireType::Stop {
            break;
        }
        match header.field_id {
            1 => physical_type = Some(PhysicalType::from_i32(dec.read_zigzag_i32()?)?),
            3 => repetition = Some(Repetition::from_i32(dec.read_zigzag_i32()?)?),
            4 => name = dec.read_string()?,
            5 => num_children = Some(dec.read_zigzag_i32()?),
            6 => converted_type = Some(dec.read_zigzag_i32()?),
            _ => dec.skip(header.wire_type)?,
        }
    }
    dec.pop_struct();

    Ok(SchemaElement {
        name,
        physical_type,
        repetition,
        num_children,
        converted_type,
    })
}

fn read_row_group_list(
    dec: &mut ThriftCompactDecoder<'_>,
    header: &FieldHeader,
) -> Result<Vec<RowGroup>> {
    require_list_type(header)?;
    let (elem_type, count) = dec.read_list_header()?;
    if elem_type != WireType::Struct {
        return Err(KbError::corrupt("row_groups list element is not a struct"));
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_row_group(dec)?);
    }
    Ok(out)
}

fn read_row_group(dec: &mut ThriftCompactDecoder<'_>) -> Result<RowGroup> {
    dec.push_struct();
    let mut columns = Vec::new();
    let mut total_byte_size = 0i64;
    let mut num_rows = 0i64;

    loop {
        let header = dec.read_field_header()?;
        if header.wire_type == WireType::Stop {
            break;
        }
        match header.field_id {
            1 => {
                require_list_type(&header)?;
                let (elem_type, count) = dec.read_list_header()?;
                if elem_type != WireType::Struct {
                    return Err(KbError::corrupt("columns list element is not a struct"));
                }
                columns = Vec::with_capacity(count);
                for _ in 0..count {
                    columns.push(read_column_chunk(dec)?);
                }
            }
            2 => total_byte_size = dec.read_zigzag_i64()?,
            3 => num_rows = dec.read_zigzag_i64()?,
            _ => dec.skip(header.wire_type)?,
        }
    }
    dec.pop_struct();

    Ok(RowGroup {
        columns,
        total_byte_size,
        num_rows,
    })
}

fn read_column_chunk(dec: &mut ThriftCompactDecoder<'_>) -> Result<ColumnChunk> {
    dec.push_struct();
    let mut file_offset = 0i64;
    let mut meta_data = None;

    loop {
        let header = dec.read_field_header()?;
        if header.wire_type == WireType::Stop {
            break;
        }
        match header.field_id {
            2 => file_offset = dec.read_zigzag_i64()?,
            3 => meta_data = Some(read_column_metadata(dec)?),
            _ => dec.skip(header.wire_type)?,
        }
    }
    dec.pop_struct();

    let meta_data = meta_data
        .ok_or_else(|| KbError::corrupt("column chunk missing required meta_data field"))?;
    Ok(ColumnChunk {
        file_offset,
        meta_data,
    })
}

fn read_column_metadata(dec: &mut ThriftCompactDecoder<'_>) -> Result<ColumnMetaData> {
    dec.push_struct();
    let mut physical_type = None;
    let mut path_in_schema = Vec::new();
    let mut codec = 0i32;
    let mut num_values = 0i64;
    let mut total_uncompressed_size = 0i64;
    let mut total_compressed_size = 0i64;
    let mut data_page_offset = 0i64;
    let mut dictionary_page_offset = None;

    loop {
        let header = dec.read_field_header()?;
        if header.wire_type == WireType::Stop {
            break;
        }
        match header.field_id {
            1 => physical_type = Some(PhysicalType::from_i32(dec.read_zigzag_i32()?)?),
            3 => {
                require_list_type(&header)?;
                let (elem_type, count) = dec.read_list_header()?;
                path_in_schema = Vec::with_capacity(count);
                for _ in 0..count {
                    if elem_type == WireType::Binary {
                        path_in_schema.push(dec.read_string()?);
                    } else {
                        dec.skip(elem_type)?;
                    }
                }
            }
            4 => codec = dec.read_zigzag_i32()?,
            5 => num_values = dec.read_zigzag_i64()?,
            6 => total_uncompressed_size = dec.read_zigzag_i64()?,
            7 => total_compressed_size = dec.read_zigzag_i64()?,
            9 => data_page_offset = dec.read_zigzag_i64()?,
            11 => dictionary_page_offset = Some(dec.read_zigzag_i64()?),
            _ => dec.skip(header.wire_type)?,
        }
    }
    dec.pop_struct();

    let physical_type =
        physical_type.ok_or_else(|| KbError::corrupt("column metadata missing type field"))?;

    Ok(ColumnMetaData {
        physical_type,
        path_in_schema,
        codec,
        num_values,
        total_uncompressed_size,
        total_compressed_size,
        data_page_offset,
        dictionary_page_offset,
    })
}

fn require_list_type(header: &FieldHeader) -> Result<()> {
    if header.wire_type != WireType::List && header.wire_type != WireType::Set {
        return Err(KbError::corrupt(format!(
            "expected list/set wire type for field {}, got {:?}",
            header.field_id, header.wire_type
        )));
    }
    Ok(())
}
