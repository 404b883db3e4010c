use std::fs::File;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use memmap2::Mmap;

use crate::error::{JparqueError, Result};
use crate::parquet::compression::{create_codec, CompressionCodec};
use crate::parquet::metadata::FileMetadata;
use crate::parquet::schema::{Field, MessageType, PhysicalType, Repetition};
use crate::parquet::{ByteReader, MAGIC};
use crate::record::{FieldMap, Value};

/// Trailer: 8-byte metadata offset followed by the 4-byte magic.
const TRAILER_SIZE: usize = 12;

/// Binds the columnar on-disk layout back to records-of-maps, read side.
///
/// The file is memory-mapped; metadata is recovered through the 8-byte
/// offset stored at `file_len - 12`, directly before the trailing magic.
pub struct ParquetDeserializer {
    mmap: Mmap,
    codec: CompressionCodec,
    metadata: FileMetadata,
}

impl ParquetDeserializer {
    /// Open a columnar file, verifying both magics and decoding the
    /// metadata block.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < MAGIC.len() + TRAILER_SIZE {
            return Err(JparqueError::UnexpectedEof {
                context: "columnar file",
            });
        }
        if &mmap[..MAGIC.len()] != MAGIC {
            return Err(JparqueError::InvalidMagic);
        }
        if &mmap[mmap.len() - MAGIC.len()..] != MAGIC {
            return Err(JparqueError::InvalidMagic);
        }

        let offset_pos = mmap.len() - TRAILER_SIZE;
        let metadata_offset = BigEndian::read_u64(&mmap[offset_pos..offset_pos + 8]) as usize;
        if metadata_offset >= offset_pos || metadata_offset < MAGIC.len() {
            return Err(JparqueError::CorruptPage {
                page: 0,
                reason: "metadata offset outside file body",
            });
        }

        let mut reader = ByteReader::new(&mmap[metadata_offset..offset_pos]);
        let codec_tag = reader.read_i32("metadata codec tag")?;
        let codec =
            CompressionCodec::from_tag(codec_tag).ok_or(JparqueError::UnknownCodec(codec_tag))?;
        let metadata = FileMetadata::read_from(&mut reader)?;

        debug!(
            "opened columnar file: {} fields, {} row groups, codec {:?}",
            metadata.fields.len(),
            metadata.row_groups.len(),
            codec
        );
        Ok(Self {
            mmap,
            codec,
            metadata,
        })
    }

    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn schema(&self) -> MessageType {
        self.metadata.schema()
    }

    /// Decode every row group back into records.
    pub fn read_all(&self) -> Result<Vec<FieldMap>> {
        let compressor = create_codec(self.codec)?;
        let mut records = Vec::new();

        for group in &self.metadata.row_groups {
            let start = group.start_offset as usize;
            let end = start + group.total_byte_size as usize;
            if end > self.mmap.len() {
                return Err(JparqueError::UnexpectedEof {
                    context: "row group payload",
                });
            }
            let mut reader = ByteReader::new(&self.mmap[start..end]);

            let record_count = reader.read_u32("row-group record count")? as usize;
            let mut group_records = vec![FieldMap::new(); record_count];

            for field in &self.metadata.fields {
                let uncompressed_size = reader.read_u32("column uncompressed size")? as usize;
                let compressed_size = reader.read_u32("column compressed size")? as usize;
                let payload = reader.read_bytes(compressed_size, "column payload")?;
                let column = compressor.decompress(payload, uncompressed_size)?;
                Self::decode_column(field, &column, &mut group_records)?;
            }

            records.append(&mut group_records);
        }
        Ok(records)
    }

    /// Decode one column buffer into the per-record maps.
    fn decode_column(field: &Field, column: &[u8], records: &mut [FieldMap]) -> Result<()> {
        let mut reader = ByteReader::new(column);

        for record in records.iter_mut() {
            match field.repetition {
                Repetition::Required => {
                    let value = Self::decode_single(field, &mut reader)?;
                    record.insert(field.name.clone(), value);
                }
                Repetition::Optional => {
                    let present = reader.read_u8("optional presence flag")?;
                    if present != 0 {
                        let value = Self::decode_single(field, &mut reader)?;
                        record.insert(field.name.clone(), value);
                    }
                }
                Repetition::Repeated => {
                    let count = reader.read_u32("repeated value count")? as usize;
                    let mut items = Vec::with_capacity(count);
                    for _ in 0..count {
                        items.push(Self::decode_single(field, &mut reader)?);
                    }
                    record.insert(field.name.clone(), Value::List(items));
                }
            }
        }
        Ok(())
    }

    fn decode_single(field: &Field, reader: &mut ByteReader<'_>) -> Result<Value> {
        match field.physical_type {
            PhysicalType::Boolean => Ok(Value::Bool(reader.read_u8("boolean value")? != 0)),
            PhysicalType::Int32 => Ok(Value::Int(reader.read_i32("int32 value")?)),
            PhysicalType::Int64 => Ok(Value::Long(reader.read_i64("int64 value")?)),
            PhysicalType::Float => Ok(Value::Float(reader.read_f32("float value")?)),
            PhysicalType::Double => Ok(Value::Double(reader.read_f64("double value")?)),
            PhysicalType::Binary => {
                let bytes = reader.read_length_prefixed("binary value")?;
                if field.is_utf8() {
                    Ok(Value::Str(String::from_utf8_lossy(bytes).to_string()))
                } else {
                    Ok(Value::Bytes(bytes.to_vec()))
                }
            }
            other => Err(JparqueError::UnsupportedType(other)),
        }
    }
}
