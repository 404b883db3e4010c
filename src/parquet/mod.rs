pub mod chunk;
pub mod compression;
pub mod deserializer;
pub mod metadata;
pub mod schema;
pub mod serializer;
pub mod statistics;

pub use chunk::{ColumnChunk, DataPage, Encoding, RowGroup};
pub use compression::{create_codec, CompressionCodec, Compressor};
pub use deserializer::ParquetDeserializer;
pub use metadata::{FileMetadata, RowGroupMeta};
pub use schema::{Field, LogicalType, MessageType, PhysicalType, Repetition};
pub use serializer::ParquetSerializer;
pub use statistics::Statistics;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{JparqueError, Result};

/// Magic bytes framing a columnar file at both ends.
pub const MAGIC: &[u8; 4] = b"PAR1";

/// Bounds-checked reader over a byte slice, shared by the binary decoders
/// in this module.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(JparqueError::UnexpectedEof { context });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self, context: &'static str) -> Result<u8> {
        Ok(self.take(1, context)?[0])
    }

    pub(crate) fn read_u32(&mut self, context: &'static str) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4, context)?))
    }

    pub(crate) fn read_i32(&mut self, context: &'static str) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4, context)?))
    }

    pub(crate) fn read_u64(&mut self, context: &'static str) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8, context)?))
    }

    pub(crate) fn read_i64(&mut self, context: &'static str) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(8, context)?))
    }

    pub(crate) fn read_f32(&mut self, context: &'static str) -> Result<f32> {
        Ok(BigEndian::read_f32(self.take(4, context)?))
    }

    pub(crate) fn read_f64(&mut self, context: &'static str) -> Result<f64> {
        Ok(BigEndian::read_f64(self.take(8, context)?))
    }

    pub(crate) fn read_bytes(&mut self, len: usize, context: &'static str) -> Result<&'a [u8]> {
        self.take(len, context)
    }

    /// Read a `[u32 len][bytes]` block.
    pub(crate) fn read_length_prefixed(&mut self, context: &'static str) -> Result<&'a [u8]> {
        let len = self.read_u32(context)? as usize;
        self.take(len, context)
    }

    /// Read a `[u32 len][utf-8 bytes]` block as a string.
    pub(crate) fn read_string(&mut self, context: &'static str) -> Result<String> {
        let bytes = self.read_length_prefixed(context)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| JparqueError::UnexpectedEof { context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_reader_sequencing() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(b"abc");
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u32("a").unwrap(), 7);
        assert_eq!(reader.read_length_prefixed("b").unwrap(), b"abc");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_byte_reader_eof() {
        let mut reader = ByteReader::new(&[1, 2]);
        assert!(matches!(
            reader.read_u32("short"),
            Err(JparqueError::UnexpectedEof { context: "short" })
        ));
    }
}
