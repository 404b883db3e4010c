//! JParque: a dual storage engine.
//!
//! Two engines expose the same [`StorageEngine`] contract:
//!
//! - [`BTreeEngine`]: a paged B+Tree key/value store with a slotted page
//!   layout, an LRU-cached page manager, overflow chains for large values
//!   and sibling-linked leaves for range scans.
//! - [`ColumnStore`]: a keyed facade over a Parquet-shaped columnar file
//!   codec with per-chunk compression (Snappy, Gzip, Zstd) and a
//!   schema-carrying footer.
//!
//! [`Table`] binds a named B+Tree file as a row-oriented table.

pub mod btree;
pub mod column_store;
pub mod dump;
pub mod engine;
pub mod error;
pub mod parquet;
pub mod record;
pub mod table;
pub mod value_codec;

pub use btree::BTreeEngine;
pub use column_store::ColumnStore;
pub use engine::StorageEngine;
pub use error::{JparqueError, Result};
pub use record::{FieldMap, Record, Value};
pub use table::Table;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parquet::{CompressionCodec, Field, LogicalType, MessageType, PhysicalType};
    use tempfile::tempdir;

    fn user_schema() -> MessageType {
        MessageType::new(
            "user",
            vec![
                Field::required("name", PhysicalType::Binary).with_logical_type(LogicalType::Utf8),
                Field::required("index", PhysicalType::Int32),
            ],
        )
    }

    fn fields(name: &str, index: i32) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("name".into(), Value::Str(name.into()));
        map.insert("index".into(), Value::Int(index));
        map
    }

    /// Both engines behind the common trait, driven identically.
    fn exercise(engine: &mut dyn StorageEngine) {
        for i in [3, 1, 2, 0] {
            engine
                .write(format!("key-{:02}", i).as_bytes(), fields("row", i))
                .unwrap();
        }
        assert_eq!(engine.read(b"key-02").unwrap(), Some(fields("row", 2)));
        assert_eq!(engine.read(b"key-99").unwrap(), None);

        let all = engine.scan(b"key-00", None, None).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].key < w[1].key));

        engine.delete(b"key-01").unwrap();
        assert_eq!(engine.read(b"key-01").unwrap(), None);
        engine.close().unwrap();
    }

    #[test]
    fn test_btree_engine_through_trait() {
        let dir = tempdir().unwrap();
        let mut engine = BTreeEngine::open(dir.path().join("t.db")).unwrap();
        exercise(&mut engine);
    }

    #[test]
    fn test_column_store_through_trait() {
        let dir = tempdir().unwrap();
        let mut engine = ColumnStore::open(
            dir.path().join("t.parquet"),
            user_schema(),
            CompressionCodec::Gzip,
        );
        exercise(&mut engine);
    }
}
