use std::path::Path;

use crate::btree::BTreeEngine;
use crate::engine::StorageEngine;
use crate::error::Result;
use crate::record::{FieldMap, Record};

/// A named row-oriented table bound to one B+Tree file.
///
/// Thin adapter: every operation delegates to the underlying engine.
pub struct Table {
    name: String,
    engine: BTreeEngine,
}

impl Table {
    /// Open or create the table's backing file at `path`.
    pub fn open<P: AsRef<Path>>(name: &str, path: P) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            engine: BTreeEngine::open(path)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, key: &[u8], fields: FieldMap) -> Result<()> {
        self.engine.write(key, fields)
    }

    pub fn insert_batch(&mut self, records: Vec<Record>) -> Result<()> {
        self.engine.write_batch(records)
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<FieldMap>> {
        self.engine.read(key)
    }

    pub fn scan(
        &mut self,
        start: &[u8],
        end: Option<&[u8]>,
        columns: Option<&[String]>,
    ) -> Result<Vec<Record>> {
        self.engine.scan(start, end, columns)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.engine.delete(key)
    }

    pub fn close(&mut self) -> Result<()> {
        self.engine.close()
    }
}
