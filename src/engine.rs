use crate::error::Result;
use crate::record::{FieldMap, Record};

/// Common contract implemented by every storage engine in this crate.
///
/// Keys are opaque byte sequences ordered by unsigned byte comparison.
/// A missing key is reported as `Ok(None)` from `read` and as a no-op from
/// `delete`, never as an error. `close` is idempotent.
pub trait StorageEngine {
    /// Write or replace a single record.
    fn write(&mut self, key: &[u8], fields: FieldMap) -> Result<()>;

    /// Apply a batch of records. An empty batch changes nothing.
    fn write_batch(&mut self, records: Vec<Record>) -> Result<()>;

    /// Read the record stored under `key`, if any.
    fn read(&mut self, key: &[u8]) -> Result<Option<FieldMap>>;

    /// Range scan ordered by key.
    ///
    /// `end = None` scans to the end of the keyspace. Whether the end
    /// bound is inclusive or exclusive is defined by each implementation
    /// and documented there. A non-empty `columns` projects each record
    /// down to just those fields.
    fn scan(
        &mut self,
        start: &[u8],
        end: Option<&[u8]>,
        columns: Option<&[String]>,
    ) -> Result<Vec<Record>>;

    /// Remove the record stored under `key`. Missing keys are a no-op.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Flush and release resources. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Project a field map down to the requested columns.
///
/// An empty or absent column list keeps every field.
pub(crate) fn project_fields(fields: &FieldMap, columns: Option<&[String]>) -> FieldMap {
    match columns {
        Some(cols) if !cols.is_empty() => fields
            .iter()
            .filter(|(name, _)| cols.iter().any(|c| c == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        _ => fields.clone(),
    }
}
