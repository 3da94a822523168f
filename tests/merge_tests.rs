//! Integration tests for merging compiled dictionaries

use fsadict::merger::deleted_keys_path;
use fsadict::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_int_dict(dir: &Path, name: &str, kind: ValueStoreKind, entries: &BTreeMap<String, u64>) -> PathBuf {
    let path = dir.join(name);
    let mut compiler = DictionaryCompiler::new(kind, CompilerParams::default()).unwrap();
    for (key, value) in entries {
        compiler.add(key, *value).unwrap();
    }
    compiler.compile().unwrap();
    compiler.write_to_file(&path).unwrap();
    path
}

fn map(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn merge(paths: &[PathBuf], params: CompilerParams, output: &Path) -> MergeStats {
    let mut merger = DictionaryMerger::new(params);
    for path in paths {
        merger.add(path).unwrap();
    }
    merger.merge(output).unwrap();
    merger.stats()
}

// ============================================================================
// Overwrite
// ============================================================================

#[test]
fn test_three_way_overwrite() {
    let dir = TempDir::new().unwrap();
    let inputs = vec![
        write_int_dict(dir.path(), "1.fsa", ValueStoreKind::Int, &map(&[("a", 1), ("b", 1), ("c", 1)])),
        write_int_dict(dir.path(), "2.fsa", ValueStoreKind::Int, &map(&[("b", 2), ("d", 2)])),
        write_int_dict(dir.path(), "3.fsa", ValueStoreKind::Int, &map(&[("c", 3), ("d", 3), ("e", 3)])),
    ];
    let out = dir.path().join("merged.fsa");
    let stats = merge(&inputs, CompilerParams::default(), &out);

    let dict = Dictionary::open(&out).unwrap();
    let merged: BTreeMap<String, u64> = dict
        .entries()
        .map(|m| (m.matched_string(), m.value().unwrap().as_int().unwrap()))
        .collect();
    assert_eq!(merged, map(&[("a", 1), ("b", 2), ("c", 3), ("d", 3), ("e", 3)]));
    assert_eq!(stats.number_of_keys, 5);
    assert_eq!(stats.updated_keys, 3);
    assert_eq!(stats.deleted_keys, 0);
}

#[test]
fn test_merged_weights_drive_completion() {
    let dir = TempDir::new().unwrap();
    let inputs = vec![
        write_int_dict(dir.path(), "old.fsa", ValueStoreKind::IntWithWeights, &map(&[("car", 10), ("cat", 50)])),
        write_int_dict(dir.path(), "new.fsa", ValueStoreKind::IntWithWeights, &map(&[("car", 90), ("cab", 5)])),
    ];
    let out = dir.path().join("merged.fsa");
    merge(&inputs, CompilerParams::default(), &out);

    let dict = Dictionary::open(&out).unwrap();
    let order: Vec<(String, u32)> = dict
        .complete_prefix("ca")
        .map(|m| (m.matched_string(), m.weight()))
        .collect();
    assert_eq!(order[0], ("car".to_string(), 90));
    assert_eq!(order.len(), 3);
}

#[test]
fn test_merge_preserves_string_payloads_with_compression() {
    let dir = TempDir::new().unwrap();
    let long = "payload ".repeat(40);
    let mut paths = Vec::new();
    for (name, value) in [("a.fsa", "short"), ("b.fsa", long.as_str())] {
        let path = dir.path().join(name);
        let mut compiler = DictionaryCompiler::new(
            ValueStoreKind::String,
            CompilerParams::default().with_compression(Compression::Zstd),
        )
        .unwrap();
        compiler.add(name, value).unwrap();
        compiler.add("shared", value).unwrap();
        compiler.compile().unwrap();
        compiler.write_to_file(&path).unwrap();
        paths.push(path);
    }

    let out = dir.path().join("merged.fsa");
    merge(&paths, CompilerParams::default().with_compression(Compression::Snappy), &out);

    let dict = Dictionary::open_with(&out, LoadingStrategy::Populate).unwrap();
    assert_eq!(dict.get_value("a.fsa").unwrap(), Some(Value::String("short".into())));
    assert_eq!(dict.get_value("b.fsa").unwrap(), Some(Value::String(long.clone())));
    assert_eq!(dict.get_value("shared").unwrap(), Some(Value::String(long)));
}

#[test]
fn test_merge_within_small_memory_limit_matches_default_merge() {
    let dir = TempDir::new().unwrap();
    let spill_dir = TempDir::new().unwrap();
    let mut paths = Vec::new();
    for part in 0..3 {
        let path = dir.path().join(format!("{}.fsa", part));
        let mut compiler =
            DictionaryCompiler::new(ValueStoreKind::String, CompilerParams::default()).unwrap();
        for i in 0..300 {
            compiler
                .add(format!("key{:04}", i * 3 + part), format!("value {} of part {}", i, part))
                .unwrap();
        }
        compiler.compile().unwrap();
        compiler.write_to_file(&path).unwrap();
        paths.push(path);
    }

    let roomy = dir.path().join("roomy.fsa");
    let tight = dir.path().join("tight.fsa");
    merge(&paths, CompilerParams::default(), &roomy);
    merge(
        &paths,
        CompilerParams::default()
            .with_memory_limit(1024)
            .with_temporary_path(spill_dir.path()),
        &tight,
    );

    assert_eq!(std::fs::read(&roomy).unwrap(), std::fs::read(&tight).unwrap());
    let dict = Dictionary::open_with(&tight, LoadingStrategy::Populate).unwrap();
    assert_eq!(dict.len(), 900);
    assert_eq!(
        dict.get_value("key0452").unwrap(),
        Some(Value::String("value 150 of part 2".into()))
    );
}

// ============================================================================
// Append and deletions
// ============================================================================

#[test]
fn test_append_keeps_one_value_per_source() {
    let dir = TempDir::new().unwrap();
    let inputs = vec![
        write_int_dict(dir.path(), "1.fsa", ValueStoreKind::Int, &map(&[("k", 1), ("only-old", 7)])),
        write_int_dict(dir.path(), "2.fsa", ValueStoreKind::Int, &map(&[("k", 2)])),
        write_int_dict(dir.path(), "3.fsa", ValueStoreKind::Int, &map(&[("k", 3)])),
    ];
    let out = dir.path().join("merged.fsa");
    merge(
        &inputs,
        CompilerParams::default().with_merge_mode(MergeMode::Append),
        &out,
    );

    let dict = Dictionary::open(&out).unwrap();
    let values: Vec<u64> = dict
        .get_all("k")
        .iter()
        .map(|m| m.value().unwrap().as_int().unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(dict.get_value("k").unwrap(), Some(Value::Int(3)));
    assert_eq!(dict.get_all("only-old").len(), 1);
    assert_eq!(dict.len(), 2);
    assert_eq!(dict.statistics().value_store.values, 4);
}

#[test]
fn test_deleted_keys_only_apply_to_their_own_input() {
    let dir = TempDir::new().unwrap();
    let old = write_int_dict(dir.path(), "old.fsa", ValueStoreKind::Int, &map(&[("keep", 1), ("gone", 1)]));
    let new = write_int_dict(dir.path(), "new.fsa", ValueStoreKind::Int, &map(&[("gone", 2), ("fresh", 2)]));
    // The newer input deletes "gone"; the older one lists "fresh", which it
    // never held and which the newer input still provides.
    std::fs::write(deleted_keys_path(&new), r#"["gone"]"#).unwrap();
    std::fs::write(deleted_keys_path(&old), r#"["fresh"]"#).unwrap();

    let out = dir.path().join("merged.fsa");
    let stats = merge(&[old, new], CompilerParams::default(), &out);

    let dict = Dictionary::open(&out).unwrap();
    let keys: Vec<String> = dict.keys().map(|k| String::from_utf8(k).unwrap()).collect();
    assert_eq!(keys, vec!["fresh", "keep"]);
    assert_eq!(stats.deleted_keys, 1);
}

#[test]
fn test_sidecar_path_appends_suffix() {
    assert_eq!(deleted_keys_path("dir/a.fsa"), PathBuf::from("dir/a.fsa.dk"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_single_input_is_usage_error_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let only = write_int_dict(dir.path(), "a.fsa", ValueStoreKind::Int, &map(&[("a", 1)]));
    let out = dir.path().join("merged.fsa");

    let mut merger = DictionaryMerger::new(CompilerParams::default());
    merger.add(&only).unwrap();
    let err = merger.merge(&out).unwrap_err();
    assert!(err.is_usage());
    assert!(!out.exists());
}

#[test]
fn test_output_directory_missing_is_io_error() {
    let dir = TempDir::new().unwrap();
    let a = write_int_dict(dir.path(), "a.fsa", ValueStoreKind::Int, &map(&[("a", 1)]));
    let b = write_int_dict(dir.path(), "b.fsa", ValueStoreKind::Int, &map(&[("b", 1)]));

    let mut merger = DictionaryMerger::new(CompilerParams::default());
    merger.add(&a).unwrap();
    merger.add(&b).unwrap();
    let err = merger.merge(dir.path().join("missing").join("out.fsa")).unwrap_err();
    assert!(err.is_io());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_overwrite_merge_is_ordered_union(
        inputs in prop::collection::vec(
            prop::collection::btree_map("[a-c]{1,4}", 0u64..1000, 0..15),
            2..5,
        )
    ) {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = inputs
            .iter()
            .enumerate()
            .map(|(i, entries)| write_int_dict(dir.path(), &format!("{}.fsa", i), ValueStoreKind::Int, entries))
            .collect();
        let out = dir.path().join("merged.fsa");
        let stats = merge(&paths, CompilerParams::default(), &out);

        let mut expected = BTreeMap::new();
        let mut total = 0u64;
        for entries in &inputs {
            total += entries.len() as u64;
            expected.extend(entries.iter().map(|(k, v)| (k.clone(), *v)));
        }

        let dict = Dictionary::open(&out).unwrap();
        let merged: Vec<(String, u64)> = dict
            .entries()
            .map(|m| (m.matched_string(), m.value().unwrap().as_int().unwrap()))
            .collect();
        prop_assert_eq!(merged, expected.clone().into_iter().collect::<Vec<_>>());
        prop_assert_eq!(stats.number_of_keys, expected.len() as u64);
        prop_assert_eq!(stats.updated_keys, total - expected.len() as u64);
    }
}
