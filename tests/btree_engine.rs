use jparque::{BTreeEngine, FieldMap, Value};
use tempfile::tempdir;

fn fields(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_insert_read_and_read_missing() {
    let dir = tempdir().unwrap();
    let mut store = BTreeEngine::open(dir.path().join("seed1.db")).unwrap();

    let record = fields(&[
        ("name", Value::Str("John Doe".into())),
        ("age", Value::Int(30)),
        ("email", Value::Str("john@example.com".into())),
    ]);
    store.write(b"test-key", record.clone()).unwrap();

    assert_eq!(store.read(b"test-key").unwrap(), Some(record));
    assert_eq!(store.read(b"missing").unwrap(), None);
    store.close().unwrap();
}

#[test]
fn test_range_scan_with_projection() {
    let dir = tempdir().unwrap();
    let mut store = BTreeEngine::open(dir.path().join("seed2.db")).unwrap();

    for i in 10..50 {
        let key = format!("key-{:03}", i);
        store
            .write(
                key.as_bytes(),
                fields(&[
                    ("index", Value::Int(i)),
                    ("field1", Value::Str("one".into())),
                    ("field2", Value::Str("two".into())),
                    ("field3", Value::Str("three".into())),
                ]),
            )
            .unwrap();
    }

    // Inclusive bounds on both ends for the B+Tree engine.
    let results = store.scan(b"key-020", Some(b"key-030"), None).unwrap();
    assert_eq!(results.len(), 11);
    for (offset, record) in results.iter().enumerate() {
        assert_eq!(record.key, format!("key-{:03}", 20 + offset).as_bytes());
        assert_eq!(record.fields["index"], Value::Int(20 + offset as i32));
    }

    let columns = vec!["field1".to_string(), "field3".to_string()];
    let projected = store
        .scan(b"key-020", Some(b"key-030"), Some(&columns))
        .unwrap();
    for record in &projected {
        assert_eq!(record.fields.len(), 2);
        assert!(record.fields.contains_key("field1"));
        assert!(record.fields.contains_key("field3"));
        assert!(!record.fields.contains_key("field2"));
        assert!(!record.fields.contains_key("index"));
    }
    store.close().unwrap();
}

#[test]
fn test_splits_under_load() {
    let dir = tempdir().unwrap();
    let mut store = BTreeEngine::open(dir.path().join("seed3.db")).unwrap();

    for i in 0..1000 {
        let key = format!("split-test-{:04}", i);
        store
            .write(key.as_bytes(), fields(&[("index", Value::Int(i))]))
            .unwrap();
    }

    for i in (0..1000).step_by(50) {
        let key = format!("split-test-{:04}", i);
        let record = store.read(key.as_bytes()).unwrap().unwrap();
        assert_eq!(record, fields(&[("index", Value::Int(i))]));
    }

    // All 1000 keys reachable through tree descent from the current root,
    // each exactly once.
    let all = store
        .scan(b"split-test-0000", Some(b"split-test-0999"), None)
        .unwrap();
    assert_eq!(all.len(), 1000);
    for (i, record) in all.iter().enumerate() {
        assert_eq!(record.key, format!("split-test-{:04}", i).as_bytes());
    }
    store.close().unwrap();
}

#[test]
fn test_overflow_round_trip() {
    let dir = tempdir().unwrap();
    let mut store = BTreeEngine::open(dir.path().join("seed4.db")).unwrap();

    // Well past the inline budget of a 4 KiB leaf.
    let first = "a".repeat(1_300_000);
    store
        .write(b"large-value", fields(&[("payload", Value::Str(first.clone()))]))
        .unwrap();
    let read = store.read(b"large-value").unwrap().unwrap();
    assert_eq!(read["payload"], Value::Str(first));

    let second = "b".repeat(1_400_000);
    store
        .write(b"large-value", fields(&[("payload", Value::Str(second.clone()))]))
        .unwrap();
    let read = store.read(b"large-value").unwrap().unwrap();
    assert_eq!(read["payload"], Value::Str(second));

    store.delete(b"large-value").unwrap();
    assert_eq!(store.read(b"large-value").unwrap(), None);
    store.close().unwrap();
}

#[test]
fn test_small_and_large_values_interleave() {
    let dir = tempdir().unwrap();
    let mut store = BTreeEngine::open(dir.path().join("mixed.db")).unwrap();

    for i in 0..100 {
        let key = format!("mixed-{:03}", i);
        let value = if i % 10 == 0 {
            Value::Str("L".repeat(10_000 + i as usize))
        } else {
            Value::Str(format!("small-{}", i))
        };
        store.write(key.as_bytes(), fields(&[("v", value)])).unwrap();
    }

    for i in 0..100 {
        let key = format!("mixed-{:03}", i);
        let record = store.read(key.as_bytes()).unwrap().unwrap();
        match &record["v"] {
            Value::Str(s) if i % 10 == 0 => assert_eq!(s.len(), 10_000 + i as usize),
            Value::Str(s) => assert_eq!(s, &format!("small-{}", i)),
            other => panic!("unexpected value {:?}", other),
        }
    }
    store.close().unwrap();
}

#[test]
fn test_persistence_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.db");

    {
        let mut store = BTreeEngine::open(&path).unwrap();
        for i in 0..300 {
            let key = format!("p-{:04}", i);
            store
                .write(key.as_bytes(), fields(&[("index", Value::Int(i))]))
                .unwrap();
        }
        store.close().unwrap();
    }

    let mut store = BTreeEngine::open(&path).unwrap();
    assert_eq!(
        store.scan(b"p-0000", Some(b"p-9999"), None).unwrap().len(),
        300
    );
    assert_eq!(
        store.read(b"p-0123").unwrap().unwrap()["index"],
        Value::Int(123)
    );
    store.close().unwrap();
}
