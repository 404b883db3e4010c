use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use log::debug;

use crate::error::{JparqueError, Result};
use crate::parquet::compression::{create_codec, CompressionCodec};
use crate::parquet::metadata::{FileMetadata, RowGroupMeta};
use crate::parquet::schema::{Field, MessageType, PhysicalType, Repetition};
use crate::parquet::MAGIC;
use crate::record::{FieldMap, Value};

/// Creator string stamped into file metadata.
const CREATOR: &str = concat!("jparque version ", env!("CARGO_PKG_VERSION"));

/// Binds records-of-maps to the columnar on-disk layout, write side.
///
/// File framing: header magic; `u32` row-group count; per row group a
/// `u32` record count and, per schema field, `u32` uncompressed size,
/// `u32` compressed size and the compressed column bytes; a metadata
/// block (codec tag + file metadata); the metadata block's start offset
/// as 8 bytes; trailing magic.
pub struct ParquetSerializer {
    schema: MessageType,
    codec: CompressionCodec,
}

impl ParquetSerializer {
    pub fn new(schema: MessageType, codec: CompressionCodec) -> Self {
        Self { schema, codec }
    }

    pub fn schema(&self) -> &MessageType {
        &self.schema
    }

    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }

    /// Serialize `records` to `path`, replacing any existing file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P, records: &[FieldMap]) -> Result<()> {
        for record in records {
            self.validate(record)?;
        }

        let compressor = create_codec(self.codec)?;

        // One contiguous column buffer per field, compressed independently.
        let mut columns = Vec::with_capacity(self.schema.num_fields());
        for field in &self.schema.fields {
            let raw = self.encode_column(field, records)?;
            let compressed = compressor.compress(&raw)?;
            columns.push((raw.len() as u32, compressed));
        }

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.write_u32::<BigEndian>(1)?; // row-group count

        let group_start = out.len() as u64;
        out.write_u32::<BigEndian>(records.len() as u32)?;
        for (uncompressed_size, compressed) in &columns {
            out.write_u32::<BigEndian>(*uncompressed_size)?;
            out.write_u32::<BigEndian>(compressed.len() as u32)?;
            out.extend_from_slice(compressed);
        }
        let group_size = out.len() as u64 - group_start;

        let metadata_offset = out.len() as u64;
        out.write_i32::<BigEndian>(self.codec.tag())?;
        let metadata = FileMetadata::new(
            self.schema.fields.clone(),
            CREATOR,
            vec![RowGroupMeta {
                row_count: records.len() as u64,
                total_byte_size: group_size,
                start_offset: group_start,
            }],
        );
        metadata.write_to(&mut out)?;

        out.write_u64::<BigEndian>(metadata_offset)?;
        out.extend_from_slice(MAGIC);

        std::fs::write(path.as_ref(), &out)?;
        debug!(
            "wrote {} records ({} bytes, codec {:?}) to {:?}",
            records.len(),
            out.len(),
            self.codec,
            path.as_ref()
        );
        Ok(())
    }

    /// Check one record against the schema: required fields must be
    /// present, repeated fields list-shaped, and every scalar must match
    /// its column's primitive type.
    pub fn validate(&self, record: &FieldMap) -> Result<()> {
        for field in &self.schema.fields {
            if matches!(
                field.physical_type,
                PhysicalType::Int96 | PhysicalType::FixedLenByteArray
            ) {
                return Err(JparqueError::UnsupportedType(field.physical_type));
            }

            let value = record.get(&field.name);
            match field.repetition {
                Repetition::Required => match value {
                    None | Some(Value::Null) => {
                        return Err(JparqueError::MissingRequiredField(field.name.clone()))
                    }
                    Some(v) => Self::check_scalar(field, v)?,
                },
                Repetition::Optional => {
                    if let Some(v) = value {
                        if !v.is_null() {
                            Self::check_scalar(field, v)?;
                        }
                    }
                }
                Repetition::Repeated => match value {
                    None => {}
                    Some(Value::List(items)) => {
                        for item in items {
                            Self::check_scalar(field, item)?;
                        }
                    }
                    Some(_) => return Err(JparqueError::RepeatedNotList(field.name.clone())),
                },
            }
        }
        Ok(())
    }

    fn check_scalar(field: &Field, value: &Value) -> Result<()> {
        let matches = match field.physical_type {
            PhysicalType::Boolean => matches!(value, Value::Bool(_)),
            PhysicalType::Int32 => matches!(value, Value::Int(_)),
            PhysicalType::Int64 => matches!(value, Value::Long(_)),
            PhysicalType::Float => matches!(value, Value::Float(_)),
            PhysicalType::Double => matches!(value, Value::Double(_)),
            // UTF-8 annotated binary carries strings; unannotated binary
            // carries raw bytes.
            PhysicalType::Binary if field.is_utf8() => matches!(value, Value::Str(_)),
            PhysicalType::Binary => matches!(value, Value::Bytes(_)),
            PhysicalType::Int96 | PhysicalType::FixedLenByteArray => false,
        };
        if matches {
            Ok(())
        } else {
            Err(JparqueError::TypeMismatch {
                field: field.name.clone(),
                expected: Self::expected_name(field),
            })
        }
    }

    fn expected_name(field: &Field) -> &'static str {
        match field.physical_type {
            PhysicalType::Boolean => "boolean",
            PhysicalType::Int32 => "int32",
            PhysicalType::Int64 => "int64",
            PhysicalType::Int96 => "int96",
            PhysicalType::Float => "float",
            PhysicalType::Double => "double",
            PhysicalType::Binary if field.is_utf8() => "utf8 string",
            PhysicalType::Binary => "binary bytes",
            PhysicalType::FixedLenByteArray => "fixed_len_byte_array",
        }
    }

    /// Encode every record's values for one field into a contiguous
    /// column buffer.
    fn encode_column(&self, field: &Field, records: &[FieldMap]) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        for record in records {
            let value = record.get(&field.name);
            match field.repetition {
                Repetition::Required => {
                    // Validation guarantees presence.
                    let v = value.ok_or_else(|| {
                        JparqueError::MissingRequiredField(field.name.clone())
                    })?;
                    Self::encode_single(field, v, &mut out)?;
                }
                Repetition::Optional => match value {
                    Some(v) if !v.is_null() => {
                        out.write_u8(1)?;
                        Self::encode_single(field, v, &mut out)?;
                    }
                    _ => out.write_u8(0)?,
                },
                Repetition::Repeated => {
                    let items: &[Value] = match value {
                        Some(Value::List(items)) => items,
                        Some(_) => {
                            return Err(JparqueError::RepeatedNotList(field.name.clone()))
                        }
                        None => &[],
                    };
                    out.write_u32::<BigEndian>(items.len() as u32)?;
                    for item in items {
                        Self::encode_single(field, item, &mut out)?;
                    }
                }
            }
        }
        Ok(out)
    }

    fn encode_single(field: &Field, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        match (field.physical_type, value) {
            (PhysicalType::Boolean, Value::Bool(v)) => out.write_u8(if *v { 1 } else { 0 })?,
            (PhysicalType::Int32, Value::Int(v)) => out.write_i32::<BigEndian>(*v)?,
            (PhysicalType::Int64, Value::Long(v)) => out.write_i64::<BigEndian>(*v)?,
            (PhysicalType::Float, Value::Float(v)) => out.write_f32::<BigEndian>(*v)?,
            (PhysicalType::Double, Value::Double(v)) => out.write_f64::<BigEndian>(*v)?,
            (PhysicalType::Binary, Value::Str(s)) if field.is_utf8() => {
                out.write_u32::<BigEndian>(s.len() as u32)?;
                out.extend_from_slice(s.as_bytes());
            }
            (PhysicalType::Binary, Value::Bytes(b)) if !field.is_utf8() => {
                out.write_u32::<BigEndian>(b.len() as u32)?;
                out.extend_from_slice(b);
            }
            _ => {
                return Err(JparqueError::TypeMismatch {
                    field: field.name.clone(),
                    expected: Self::expected_name(field),
                })
            }
        }
        Ok(())
    }
}
