use byteorder::{BigEndian, WriteBytesExt};
use serde::Serialize;

use crate::error::{JparqueError, Result};
use crate::parquet::schema::{Field, LogicalType, MessageType, PhysicalType, Repetition};
use crate::parquet::ByteReader;

/// Writer format version emitted in file metadata.
pub const FORMAT_VERSION: u32 = 1;

/// Index entry for one row group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowGroupMeta {
    pub row_count: u64,
    pub total_byte_size: u64,
    pub start_offset: u64,
}

/// File-level metadata: format version, schema fields, creator string and
/// the row-group index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub version: u32,
    pub fields: Vec<Field>,
    pub creator: String,
    pub row_groups: Vec<RowGroupMeta>,
}

impl FileMetadata {
    pub fn new(fields: Vec<Field>, creator: &str, row_groups: Vec<RowGroupMeta>) -> Self {
        Self {
            version: FORMAT_VERSION,
            fields,
            creator: creator.to_string(),
            row_groups,
        }
    }

    /// Rebuild a message type from the persisted field list.
    pub fn schema(&self) -> MessageType {
        MessageType::new("schema", self.fields.clone())
    }

    /// Layout: version (4); field count (4) then per field type tag (4),
    /// repetition (4), logical tag (4, −1 when absent), name length (4)
    /// and name bytes; length-prefixed creator; row-group count (8) then
    /// per group row count (8), total byte size (8), start offset (8).
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<BigEndian>(self.version)?;

        out.write_u32::<BigEndian>(self.fields.len() as u32)?;
        for field in &self.fields {
            out.write_i32::<BigEndian>(field.physical_type.tag())?;
            out.write_i32::<BigEndian>(field.repetition.tag())?;
            out.write_i32::<BigEndian>(field.logical_type.map_or(-1, |lt| lt.tag()))?;
            out.write_u32::<BigEndian>(field.name.len() as u32)?;
            out.extend_from_slice(field.name.as_bytes());
        }

        out.write_u32::<BigEndian>(self.creator.len() as u32)?;
        out.extend_from_slice(self.creator.as_bytes());

        out.write_u64::<BigEndian>(self.row_groups.len() as u64)?;
        for group in &self.row_groups {
            out.write_u64::<BigEndian>(group.row_count)?;
            out.write_u64::<BigEndian>(group.total_byte_size)?;
            out.write_u64::<BigEndian>(group.start_offset)?;
        }
        Ok(())
    }

    pub(crate) fn read_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let version = reader.read_u32("metadata version")?;

        let field_count = reader.read_u32("metadata field count")? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let type_tag = reader.read_i32("field type tag")?;
            let physical_type =
                PhysicalType::from_tag(type_tag).ok_or(JparqueError::UnexpectedEof {
                    context: "field type tag",
                })?;
            let repetition_tag = reader.read_i32("field repetition tag")?;
            let repetition =
                Repetition::from_tag(repetition_tag).ok_or(JparqueError::UnexpectedEof {
                    context: "field repetition tag",
                })?;
            let logical_tag = reader.read_i32("field logical tag")?;
            let logical_type = if logical_tag < 0 {
                None
            } else {
                Some(
                    LogicalType::from_tag(logical_tag).ok_or(JparqueError::UnexpectedEof {
                        context: "field logical tag",
                    })?,
                )
            };
            let name = reader.read_string("field name")?;

            let mut field = Field::new(&name, physical_type, repetition);
            field.logical_type = logical_type;
            fields.push(field);
        }

        let creator = reader.read_string("creator string")?;

        let group_count = reader.read_u64("row-group count")? as usize;
        let mut row_groups = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            row_groups.push(RowGroupMeta {
                row_count: reader.read_u64("row-group row count")?,
                total_byte_size: reader.read_u64("row-group byte size")?,
                start_offset: reader.read_u64("row-group start offset")?,
            });
        }

        Ok(Self {
            version,
            fields,
            creator,
            row_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileMetadata {
        FileMetadata::new(
            vec![
                Field::required("name", PhysicalType::Binary).with_logical_type(LogicalType::Utf8),
                Field::required("age", PhysicalType::Int32),
                Field::repeated("emails", PhysicalType::Binary)
                    .with_logical_type(LogicalType::Utf8),
                Field::optional("blob", PhysicalType::Binary),
            ],
            "jparque test writer",
            vec![
                RowGroupMeta {
                    row_count: 10,
                    total_byte_size: 2048,
                    start_offset: 8,
                },
                RowGroupMeta {
                    row_count: 3,
                    total_byte_size: 512,
                    start_offset: 2056,
                },
            ],
        )
    }

    #[test]
    fn test_metadata_round_trip() {
        let metadata = sample();
        let mut buf = Vec::new();
        metadata.write_to(&mut buf).unwrap();

        let mut reader = ByteReader::new(&buf);
        let restored = FileMetadata::read_from(&mut reader).unwrap();
        assert_eq!(restored, metadata);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_absent_logical_type_uses_sentinel() {
        let metadata = sample();
        let mut buf = Vec::new();
        metadata.write_to(&mut buf).unwrap();
        let restored = FileMetadata::read_from(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(restored.fields[1].logical_type, None);
        assert_eq!(restored.fields[0].logical_type, Some(LogicalType::Utf8));
    }

    #[test]
    fn test_schema_reconstruction() {
        let metadata = sample();
        let schema = metadata.schema();
        assert_eq!(schema.num_fields(), 4);
        assert!(schema.field("name").unwrap().is_utf8());
        assert_eq!(schema.version, 1);
    }

    #[test]
    fn test_truncated_metadata_fails() {
        let metadata = sample();
        let mut buf = Vec::new();
        metadata.write_to(&mut buf).unwrap();
        buf.truncate(20);
        assert!(FileMetadata::read_from(&mut ByteReader::new(&buf)).is_err());
    }
}
