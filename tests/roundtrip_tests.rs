//! Integration tests for compiling, writing and reopening dictionaries
//!
//! Every value store flavor is compiled, persisted to a temporary file and
//! reopened with both loading strategies.

use fsadict::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn compile_to_bytes<K, V>(kind: ValueStoreKind, params: CompilerParams, entries: &[(K, V)]) -> Vec<u8>
where
    K: AsRef<[u8]>,
    V: Clone + Into<Value>,
{
    let mut compiler = DictionaryCompiler::new(kind, params).unwrap();
    for (key, value) in entries {
        compiler.add(key, value.clone()).unwrap();
    }
    compiler.compile().unwrap();
    let mut bytes = Vec::new();
    compiler.write(&mut bytes).unwrap();
    bytes
}

fn compile_to_file<K, V>(
    dir: &TempDir,
    name: &str,
    kind: ValueStoreKind,
    params: CompilerParams,
    entries: &[(K, V)],
) -> std::path::PathBuf
where
    K: AsRef<[u8]>,
    V: Clone + Into<Value>,
{
    let path = dir.path().join(name);
    let mut compiler = DictionaryCompiler::new(kind, params).unwrap();
    for (key, value) in entries {
        compiler.add(key, value.clone()).unwrap();
    }
    compiler.compile().unwrap();
    compiler.write_to_file(&path).unwrap();
    path
}

// ============================================================================
// Flavors
// ============================================================================

#[test]
fn test_key_only_roundtrip() {
    let dir = TempDir::new().unwrap();
    let entries = [("apple", ()), ("banana", ()), ("cherry", ())];
    let path = compile_to_file(&dir, "keys.fsa", ValueStoreKind::KeyOnly, CompilerParams::default(), &entries);

    for strategy in [LoadingStrategy::Lazy, LoadingStrategy::Populate] {
        let dict = Dictionary::open_with(&path, strategy).unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.value_store_kind(), ValueStoreKind::KeyOnly);
        for (key, _) in &entries {
            assert!(dict.contains(key));
            assert_eq!(dict.get_value(key).unwrap(), Some(Value::None));
        }
        assert!(!dict.contains("apricot"));
        assert!(!dict.contains("app"));
    }
}

#[test]
fn test_int_roundtrip() {
    let dir = TempDir::new().unwrap();
    let entries = [("zero", 0u64), ("large", u64::MAX), ("answer", 42)];
    let path = compile_to_file(&dir, "int.fsa", ValueStoreKind::Int, CompilerParams::default(), &entries);
    let dict = Dictionary::open(&path).unwrap();
    for (key, value) in entries {
        assert_eq!(dict.get_value(key).unwrap(), Some(Value::Int(value)));
    }
    assert_eq!(dict.get_value("missing").unwrap(), None);
}

#[test]
fn test_weighted_roundtrip_reports_weight() {
    let bytes = compile_to_bytes(
        ValueStoreKind::IntWithWeights,
        CompilerParams::default(),
        &[("light", 3u64), ("heavy", 900)],
    );
    let dict = Dictionary::from_bytes(bytes).unwrap();
    assert_eq!(dict.get("heavy").unwrap().weight(), 900);
    assert_eq!(dict.get("light").unwrap().weight(), 3);
    assert_eq!(dict.get_value("heavy").unwrap(), Some(Value::Int(900)));
}

#[test]
fn test_string_roundtrip_with_every_compression() {
    let long = "lorem ipsum dolor sit amet ".repeat(20);
    let entries = vec![
        ("short", "x".to_string()),
        ("long", long.clone()),
        ("unicode", "grüße aus köln".to_string()),
        ("empty", String::new()),
    ];
    for compression in [
        Compression::None,
        Compression::Zlib,
        Compression::Snappy,
        Compression::Zstd,
    ] {
        let params = CompilerParams::default().with_compression(compression);
        let dict = Dictionary::from_bytes(compile_to_bytes(ValueStoreKind::String, params, &entries)).unwrap();
        assert_eq!(dict.statistics().value_store.compression, compression);
        for (key, value) in &entries {
            assert_eq!(
                dict.get_value(key).unwrap(),
                Some(Value::String(value.clone())),
                "{:?} / {}",
                compression,
                key
            );
        }
    }
}

#[test]
fn test_json_roundtrip_normalizes_documents() {
    let entries = vec![
        ("doc", Value::String(r#"{ "b": [1, 2, 3],   "a": "x" }"#.to_string())),
        ("nested", Value::Json(serde_json::json!({"outer": {"inner": null}}))),
        ("scalar", Value::Json(serde_json::json!(7))),
    ];
    let dict = Dictionary::from_bytes(compile_to_bytes(ValueStoreKind::Json, CompilerParams::default(), &entries)).unwrap();

    assert_eq!(
        dict.get_value("doc").unwrap(),
        Some(Value::Json(serde_json::json!({"a": "x", "b": [1, 2, 3]})))
    );
    assert_eq!(
        dict.get("nested").unwrap().value_as_string().unwrap(),
        r#"{"outer":{"inner":null}}"#
    );
    assert_eq!(dict.get_value("scalar").unwrap(), Some(Value::Json(serde_json::json!(7))));
}

#[test]
fn test_float_vector_roundtrip() {
    let params = CompilerParams::default().with_vector_size(3);
    let entries = vec![
        ("a", vec![0.5f32, -1.0, 2.25]),
        ("b", vec![0.0f32, 0.0, 0.0]),
    ];
    let dict = Dictionary::from_bytes(compile_to_bytes(ValueStoreKind::FloatVector, params, &entries)).unwrap();
    assert_eq!(dict.statistics().value_store.vector_size, 3);
    for (key, value) in entries {
        assert_eq!(dict.get_value(key).unwrap(), Some(Value::FloatVector(value)));
    }
}

// ============================================================================
// Keys
// ============================================================================

#[test]
fn test_keys_with_zero_bytes_and_high_bytes() {
    let entries: Vec<(Vec<u8>, u64)> = vec![
        (b"a\0b".to_vec(), 1),
        (b"a".to_vec(), 2),
        (b"\0".to_vec(), 3),
        (vec![0xff, 0x00, 0xfe], 4),
        (b"a\0".to_vec(), 5),
    ];
    let dict = Dictionary::from_bytes(compile_to_bytes(ValueStoreKind::Int, CompilerParams::default(), &entries)).unwrap();
    for (key, value) in &entries {
        assert_eq!(dict.get_value(key).unwrap(), Some(Value::Int(*value)));
    }
    assert!(!dict.contains(b"a\0c"));

    let keys: Vec<Vec<u8>> = dict.keys().collect();
    let mut expected: Vec<Vec<u8>> = entries.iter().map(|(k, _)| k.clone()).collect();
    expected.sort();
    assert_eq!(keys, expected);
}

#[test]
fn test_empty_key_is_a_regular_key() {
    let dict = Dictionary::from_bytes(compile_to_bytes(
        ValueStoreKind::Int,
        CompilerParams::default(),
        &[("", 1u64), ("a", 2)],
    ))
    .unwrap();
    assert_eq!(dict.get_value("").unwrap(), Some(Value::Int(1)));
    assert_eq!(dict.keys().next(), Some(Vec::new()));
}

#[test]
fn test_duplicate_keys_keep_last_value() {
    let dict = Dictionary::from_bytes(compile_to_bytes(
        ValueStoreKind::String,
        CompilerParams::default(),
        &[("k", "first"), ("other", "x"), ("k", "second")],
    ))
    .unwrap();
    assert_eq!(dict.len(), 2);
    assert_eq!(dict.get_value("k").unwrap(), Some(Value::String("second".into())));
}

#[test]
fn test_empty_dictionary_roundtrip() {
    let bytes = compile_to_bytes::<&str, u64>(ValueStoreKind::Int, CompilerParams::default(), &[]);
    let dict = Dictionary::from_bytes(bytes).unwrap();
    assert!(dict.is_empty());
    assert_eq!(dict.entries().count(), 0);
    assert_eq!(dict.complete_prefix("").count(), 0);
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_compile_is_byte_identical_across_insertion_orders() {
    let forward: Vec<(String, u64)> = (0..500).map(|i| (format!("key{:05}", i * 7), i)).collect();
    let mut backward = forward.clone();
    backward.reverse();

    let a = compile_to_bytes(ValueStoreKind::Int, CompilerParams::default(), &forward);
    let b = compile_to_bytes(ValueStoreKind::Int, CompilerParams::default(), &backward);
    assert_eq!(a, b);
}

#[test]
fn test_spilling_compile_matches_in_memory_compile() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<(String, String)> = (0..2000)
        .map(|i| (format!("{:x}", (i * 2654435761u64) % 100_000), format!("v{}", i % 17)))
        .collect();

    let in_memory = compile_to_bytes(ValueStoreKind::String, CompilerParams::default(), &entries);
    let spilling = compile_to_bytes(
        ValueStoreKind::String,
        CompilerParams::default()
            .with_memory_limit(4096)
            .with_temporary_path(dir.path()),
        &entries,
    );
    assert_eq!(in_memory, spilling);
}

#[test]
fn test_minimization_shares_identical_values() {
    let entries: Vec<(String, &str)> = (0..100).map(|i| (format!("k{}", i), "same value")).collect();
    let shared = Dictionary::from_bytes(compile_to_bytes(ValueStoreKind::String, CompilerParams::default(), &entries)).unwrap();
    let unshared = Dictionary::from_bytes(compile_to_bytes(
        ValueStoreKind::String,
        CompilerParams::default().with_minimization(false),
        &entries,
    ))
    .unwrap();

    assert!(shared.statistics().value_store.payload_bytes < unshared.statistics().value_store.payload_bytes);
    assert_eq!(shared.get_value("k42").unwrap(), unshared.get_value("k42").unwrap());
}

// ============================================================================
// Manifest and statistics
// ============================================================================

#[test]
fn test_manifest_and_statistics_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.fsa");
    let mut compiler = DictionaryCompiler::new(ValueStoreKind::Int, CompilerParams::default()).unwrap();
    compiler.add("a", 1u64).unwrap();
    compiler.add("b", 2u64).unwrap();
    compiler.set_manifest(r#"{"build":"nightly"}"#).unwrap();
    compiler.compile().unwrap();
    let expected = compiler.statistics().unwrap();
    compiler.write_to_file(&path).unwrap();

    let dict = Dictionary::open(&path).unwrap();
    assert_eq!(dict.manifest(), br#"{"build":"nightly"}"#);
    assert_eq!(dict.statistics(), &expected);
    assert_eq!(dict.statistics().general.number_of_keys, 2);
    assert_eq!(dict.size_in_bytes() as u64, std::fs::metadata(&path).unwrap().len());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_roundtrip_int(entries in prop::collection::btree_map("[a-e]{0,8}", any::<u64>(), 0..60),
                          queries in prop::collection::vec("[a-f]{0,8}", 0..20)) {
        let pairs: Vec<(String, u64)> = entries.clone().into_iter().collect();
        let dict = Dictionary::from_bytes(compile_to_bytes(ValueStoreKind::Int, CompilerParams::default(), &pairs)).unwrap();

        prop_assert_eq!(dict.len(), entries.len());
        for (key, value) in &entries {
            prop_assert_eq!(dict.get_value(key).unwrap(), Some(Value::Int(*value)));
        }
        for query in queries {
            prop_assert_eq!(dict.contains(&query), entries.contains_key(&query));
        }

        let listed: BTreeMap<String, u64> = dict
            .entries()
            .map(|m| (m.matched_string(), m.value().unwrap().as_int().unwrap()))
            .collect();
        prop_assert_eq!(listed, entries);
    }
}
