//! Binary decoders (§4.2): compact-Thrift tokenizer and codec decompression.

pub mod compression;
pub mod thrift;

pub use compression::{decompress, Codec};
pub use thrift::{FieldHeader, ThriftCompactDecoder, WireType};
