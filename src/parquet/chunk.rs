//! In-memory assembly units of the columnar file: data pages, column
//! chunks and row groups, each able to lay itself down on a byte sink and
//! read itself back.

use byteorder::{BigEndian, WriteBytesExt};
use serde::Serialize;

use crate::error::{JparqueError, Result};
use crate::parquet::schema::PhysicalType;
use crate::parquet::statistics::Statistics;
use crate::parquet::{ByteReader, CompressionCodec};

/// Page type tag. Only data pages exist in this codec.
const DATA_PAGE_TAG: u8 = 0;

/// Value encoding identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Encoding {
    Plain,
    Rle,
    BitPacked,
}

impl Encoding {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Encoding::Plain),
            3 => Some(Encoding::Rle),
            4 => Some(Encoding::BitPacked),
            _ => None,
        }
    }

    pub fn tag(&self) -> i32 {
        match self {
            Encoding::Plain => 0,
            Encoding::Rle => 3,
            Encoding::BitPacked => 4,
        }
    }
}

/// One data page: header plus its (already compressed) payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPage {
    pub uncompressed_size: u32,
    pub value_count: u32,
    pub value_encoding: Encoding,
    pub def_level_encoding: Encoding,
    pub rep_level_encoding: Encoding,
    pub statistics: Option<Statistics>,
    pub payload: Vec<u8>,
}

impl DataPage {
    pub fn new(payload: Vec<u8>, uncompressed_size: u32, value_count: u32) -> Self {
        Self {
            uncompressed_size,
            value_count,
            value_encoding: Encoding::Plain,
            def_level_encoding: Encoding::Plain,
            rep_level_encoding: Encoding::Plain,
            statistics: None,
            payload,
        }
    }

    pub fn with_statistics(mut self, statistics: Statistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn compressed_size(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Header layout, in order: page type tag (1), uncompressed size (4),
    /// compressed size (4), value count (4), value encoding (4),
    /// definition-level encoding (4), repetition-level encoding (4),
    /// statistics presence byte and block, then the payload bytes.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u8(DATA_PAGE_TAG)?;
        out.write_u32::<BigEndian>(self.uncompressed_size)?;
        out.write_u32::<BigEndian>(self.compressed_size())?;
        out.write_u32::<BigEndian>(self.value_count)?;
        out.write_i32::<BigEndian>(self.value_encoding.tag())?;
        out.write_i32::<BigEndian>(self.def_level_encoding.tag())?;
        out.write_i32::<BigEndian>(self.rep_level_encoding.tag())?;
        match &self.statistics {
            Some(stats) => {
                out.write_u8(1)?;
                stats.write_to(out)?;
            }
            None => out.write_u8(0)?,
        }
        out.extend_from_slice(&self.payload);
        Ok(())
    }

    pub(crate) fn read_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let tag = reader.read_u8("page type tag")?;
        if tag != DATA_PAGE_TAG {
            return Err(JparqueError::UnexpectedEof {
                context: "unknown page type tag",
            });
        }
        let uncompressed_size = reader.read_u32("page uncompressed size")?;
        let compressed_size = reader.read_u32("page compressed size")?;
        let value_count = reader.read_u32("page value count")?;
        let value_encoding = Encoding::from_tag(reader.read_i32("value encoding")?)
            .ok_or(JparqueError::UnexpectedEof {
                context: "value encoding tag",
            })?;
        let def_level_encoding = Encoding::from_tag(reader.read_i32("definition-level encoding")?)
            .ok_or(JparqueError::UnexpectedEof {
                context: "definition-level encoding tag",
            })?;
        let rep_level_encoding = Encoding::from_tag(reader.read_i32("repetition-level encoding")?)
            .ok_or(JparqueError::UnexpectedEof {
                context: "repetition-level encoding tag",
            })?;
        let statistics = if reader.read_u8("statistics flag")? != 0 {
            Some(Statistics::read_from(reader)?)
        } else {
            None
        };
        let payload = reader
            .read_bytes(compressed_size as usize, "page payload")?
            .to_vec();

        Ok(Self {
            uncompressed_size,
            value_count,
            value_encoding,
            def_level_encoding,
            rep_level_encoding,
            statistics,
            payload,
        })
    }
}

/// A column chunk: prefix plus the pages of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnChunk {
    pub physical_type: PhysicalType,
    pub codec: CompressionCodec,
    pub pages: Vec<DataPage>,
}

impl ColumnChunk {
    pub fn new(physical_type: PhysicalType, codec: CompressionCodec, pages: Vec<DataPage>) -> Self {
        Self {
            physical_type,
            codec,
            pages,
        }
    }

    pub fn value_count(&self) -> u64 {
        self.pages.iter().map(|p| p.value_count as u64).sum()
    }

    /// Prefix layout: primitive type tag (4), compression codec tag (4),
    /// value count (8), total size in bytes (8), then each page.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_i32::<BigEndian>(self.physical_type.tag())?;
        out.write_i32::<BigEndian>(self.codec.tag())?;
        out.write_u64::<BigEndian>(self.value_count())?;

        let mut pages = Vec::new();
        for page in &self.pages {
            page.write_to(&mut pages)?;
        }
        out.write_u64::<BigEndian>(pages.len() as u64)?;
        out.extend_from_slice(&pages);
        Ok(())
    }

    pub(crate) fn read_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let physical_type = PhysicalType::from_tag(reader.read_i32("chunk type tag")?).ok_or(
            JparqueError::UnexpectedEof {
                context: "chunk type tag",
            },
        )?;
        let codec_tag = reader.read_i32("chunk codec tag")?;
        let codec =
            CompressionCodec::from_tag(codec_tag).ok_or(JparqueError::UnknownCodec(codec_tag))?;
        let value_count = reader.read_u64("chunk value count")?;
        let total_size = reader.read_u64("chunk total size")? as usize;

        let pages_start = reader.position();
        let mut pages = Vec::new();
        while reader.position() - pages_start < total_size {
            pages.push(DataPage::read_from(reader)?);
        }

        let chunk = Self {
            physical_type,
            codec,
            pages,
        };
        if chunk.value_count() != value_count {
            return Err(JparqueError::SizeMismatch {
                context: "chunk value count",
                expected: value_count as usize,
                actual: chunk.value_count() as usize,
            });
        }
        Ok(chunk)
    }
}

/// Ordered list of column chunks with a row count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowGroup {
    pub chunks: Vec<ColumnChunk>,
    pub row_count: u64,
}

impl RowGroup {
    pub fn new(chunks: Vec<ColumnChunk>, row_count: u64) -> Self {
        Self { chunks, row_count }
    }

    /// Concatenation of the column chunks in field order.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        for chunk in &self.chunks {
            chunk.write_to(out)?;
        }
        Ok(())
    }

    pub(crate) fn read_from(
        reader: &mut ByteReader<'_>,
        num_columns: usize,
        row_count: u64,
    ) -> Result<Self> {
        let mut chunks = Vec::with_capacity(num_columns);
        for _ in 0..num_columns {
            chunks.push(ColumnChunk::read_from(reader)?);
        }
        Ok(Self { chunks, row_count })
    }
}
