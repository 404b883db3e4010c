//! Key-addressed facade over the columnar file codec.
//!
//! The store keeps an in-memory record list loaded lazily from disk and
//! rewrites the whole file on every mutation. Keys travel through the
//! file as an internal `_key` binary column holding the raw key bytes;
//! the column never reaches callers. Tombstones use the base64 rendering
//! of the key bytes as a hashable identity.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, warn};

use crate::engine::{project_fields, StorageEngine};
use crate::error::Result;
use crate::parquet::{
    CompressionCodec, Field, MessageType, ParquetDeserializer, ParquetSerializer, PhysicalType,
};
use crate::record::{compare_keys, FieldMap, Record, Value};

/// Internal column carrying the record key through the columnar file.
const KEY_COLUMN: &str = "_key";

/// A `StorageEngine` over a single columnar file.
pub struct ColumnStore {
    path: PathBuf,
    schema: MessageType,
    codec: CompressionCodec,
    cache: Vec<Record>,
    loaded: bool,
    tombstones: HashSet<String>,
    dirty: bool,
    closed: bool,
}

impl ColumnStore {
    /// Bind a store to `path`. The file is created on first write.
    pub fn open<P: AsRef<Path>>(path: P, schema: MessageType, codec: CompressionCodec) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema,
            codec,
            cache: Vec::new(),
            loaded: false,
            tombstones: HashSet::new(),
            dirty: false,
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &MessageType {
        &self.schema
    }

    fn key_identity(key: &[u8]) -> String {
        BASE64.encode(key)
    }

    /// The schema actually written to disk: the caller's fields plus the
    /// internal key column (raw binary, no annotation).
    fn storage_schema(&self) -> MessageType {
        let mut fields = self.schema.fields.clone();
        fields.push(Field::required(KEY_COLUMN, PhysicalType::Binary));
        MessageType::new(&self.schema.name, fields)
    }

    /// Load the record cache from disk on first access.
    fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        if !self.path.exists() {
            self.loaded = true;
            return Ok(());
        }

        let deserializer = ParquetDeserializer::open(&self.path)?;
        let mut records = Vec::new();
        for mut fields in deserializer.read_all()? {
            let key = match fields.remove(KEY_COLUMN) {
                Some(Value::Bytes(key)) => key,
                _ => {
                    warn!("skipping record without key column");
                    continue;
                }
            };
            records.push(Record::new(key, fields));
        }
        debug!("loaded {} records from {:?}", records.len(), self.path);
        self.cache = records;
        self.loaded = true;
        Ok(())
    }

    /// Rewrite the whole file from the cache.
    fn rewrite(&mut self) -> Result<()> {
        let storage_records: Vec<FieldMap> = self
            .cache
            .iter()
            .map(|record| {
                let mut fields = record.fields.clone();
                fields.insert(KEY_COLUMN.to_string(), Value::Bytes(record.key.clone()));
                fields
            })
            .collect();

        let serializer = ParquetSerializer::new(self.storage_schema(), self.codec);
        serializer.write_to_file(&self.path, &storage_records)?;
        self.dirty = false;
        Ok(())
    }

    /// Insert or replace `record` in the cache without touching the file.
    fn upsert(&mut self, record: Record) {
        self.tombstones.remove(&Self::key_identity(&record.key));
        match self.cache.iter_mut().find(|r| r.key == record.key) {
            Some(existing) => *existing = record,
            None => self.cache.push(record),
        }
        self.dirty = true;
    }
}

impl StorageEngine for ColumnStore {
    fn write(&mut self, key: &[u8], fields: FieldMap) -> Result<()> {
        self.ensure_loaded()?;
        self.upsert(Record::new(key, fields));
        self.rewrite()
    }

    /// Batch writes perform exactly one file rewrite.
    fn write_batch(&mut self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure_loaded()?;
        for record in records {
            self.upsert(record);
        }
        self.rewrite()
    }

    fn read(&mut self, key: &[u8]) -> Result<Option<FieldMap>> {
        if self.tombstones.contains(&Self::key_identity(key)) {
            return Ok(None);
        }
        self.ensure_loaded()?;
        Ok(self
            .cache
            .iter()
            .find(|record| record.key == key)
            .map(|record| record.fields.clone()))
    }

    /// `end` is exclusive for the column store.
    fn scan(
        &mut self,
        start: &[u8],
        end: Option<&[u8]>,
        columns: Option<&[String]>,
    ) -> Result<Vec<Record>> {
        self.ensure_loaded()?;

        let mut results: Vec<Record> = self
            .cache
            .iter()
            .filter(|record| compare_keys(&record.key, start).is_ge())
            .filter(|record| match end {
                Some(end_key) => compare_keys(&record.key, end_key).is_lt(),
                None => true,
            })
            .filter(|record| !self.tombstones.contains(&Self::key_identity(&record.key)))
            .map(|record| {
                Record::new(record.key.clone(), project_fields(&record.fields, columns))
            })
            .collect();
        results.sort_by(|a, b| compare_keys(&a.key, &b.key));
        Ok(results)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.tombstones.insert(Self::key_identity(key));
        self.ensure_loaded()?;
        let before = self.cache.len();
        self.cache.retain(|record| record.key != key);
        if self.cache.len() != before {
            self.dirty = true;
            self.rewrite()?;
        }
        Ok(())
    }

    /// Flush to disk if a mutation is pending. Idempotent.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.dirty && self.loaded {
            self.rewrite()?;
        }
        self.closed = true;
        Ok(())
    }
}
