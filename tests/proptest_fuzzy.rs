//! Property-based tests for fuzzy matching and completion
//!
//! Results are cross-checked against a brute-force scan of the key set using
//! the restricted Damerau-Levenshtein distance.

use fsadict::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

// Strategy for short words over a small alphabet, so that collisions and
// near misses are frequent.
fn word_strategy() -> impl Strategy<Value = String> {
    "[a-d]{1,6}"
}

fn dictionary_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(word_strategy(), 1..30)
}

fn build(words: &BTreeSet<String>) -> Dictionary {
    let mut compiler = DictionaryCompiler::new(ValueStoreKind::KeyOnly, CompilerParams::default()).unwrap();
    for word in words {
        compiler.add(word, ()).unwrap();
    }
    compiler.compile().unwrap();
    let mut bytes = Vec::new();
    compiler.write(&mut bytes).unwrap();
    Dictionary::from_bytes(bytes).unwrap()
}

// Restricted Damerau-Levenshtein distance over a full matrix.
fn transposition_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut d = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in d[0].iter_mut().enumerate() {
        *cell = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            d[i][j] = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d[i][j] = d[i][j].min(d[i - 2][j - 2] + 1);
            }
        }
    }
    d[a.len()][b.len()]
}

// Smallest distance between the query and any prefix of the key.
fn completion_distance(query: &str, key: &str) -> usize {
    (0..=key.len())
        .map(|end| transposition_distance(query, &key[..end]))
        .min()
        .unwrap_or(usize::MAX)
}

fn collect(matches: impl Iterator<Item = Match>) -> BTreeSet<String> {
    matches.map(|m| m.matched_string()).collect()
}

proptest! {
    #[test]
    fn prop_match_fuzzy_equals_brute_force(
        words in dictionary_strategy(),
        query in word_strategy(),
        max_distance in 0u32..3,
    ) {
        let dict = build(&words);
        let found = collect(dict.match_fuzzy(&query, max_distance, 0));
        let expected: BTreeSet<String> = words
            .iter()
            .filter(|w| transposition_distance(&query, w) <= max_distance as usize)
            .cloned()
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn prop_match_fuzzy_scores_are_distances(
        words in dictionary_strategy(),
        query in word_strategy(),
    ) {
        let dict = build(&words);
        for m in dict.match_fuzzy(&query, 2, 0) {
            let key = m.matched_string();
            prop_assert_eq!(m.score() as usize, transposition_distance(&query, &key));
        }
    }

    #[test]
    fn prop_complete_fuzzy_equals_brute_force(
        words in dictionary_strategy(),
        query in word_strategy(),
        max_distance in 0u32..3,
    ) {
        let dict = build(&words);
        let found = collect(dict.complete_fuzzy(&query, max_distance, 0));
        let expected: BTreeSet<String> = words
            .iter()
            .filter(|w| completion_distance(&query, w) <= max_distance as usize)
            .cloned()
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn prop_results_grow_with_distance(
        words in dictionary_strategy(),
        query in word_strategy(),
        max_distance in 1u32..4,
        exact in 0usize..3,
    ) {
        let dict = build(&words);
        let narrow = collect(dict.complete_fuzzy(&query, max_distance - 1, exact));
        let wide = collect(dict.complete_fuzzy(&query, max_distance, exact));
        prop_assert!(narrow.is_subset(&wide));

        let narrow = collect(dict.match_fuzzy(&query, max_distance - 1, exact));
        let wide = collect(dict.match_fuzzy(&query, max_distance, exact));
        prop_assert!(narrow.is_subset(&wide));
    }

    #[test]
    fn prop_exact_prefix_is_respected(
        words in dictionary_strategy(),
        query in word_strategy(),
        exact in 1usize..3,
    ) {
        let dict = build(&words);
        let required: String = query.chars().take(exact).collect();
        for key in collect(dict.match_fuzzy(&query, 2, exact)) {
            prop_assert!(key.starts_with(&required), "{} lacks prefix {}", key, required);
        }
    }

    #[test]
    fn prop_prefix_completion_equals_filter(
        words in dictionary_strategy(),
        prefix in "[a-d]{0,3}",
    ) {
        let dict = build(&words);
        let found = collect(dict.complete_prefix(&prefix));
        let expected: BTreeSet<String> = words
            .iter()
            .filter(|w| w.starts_with(&prefix))
            .cloned()
            .collect();
        prop_assert_eq!(found, expected);
    }
}
