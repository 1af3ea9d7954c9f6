#![forbid(unsafe_code)]

//! Property-based invariant tests for paths, values, and error trees.
//!
//! 1. Reported paths never contain an index segment.
//! 2. `related` is symmetric and reflexive.
//! 3. Every path is related to its children.
//! 4. `restore_from` always yields a value equal to its source.
//! 5. `has_errors` agrees with `error_count`.
//! 6. A written slot is read back unchanged.

use fform_core::path::related;
use fform_core::{ErrorTree, FieldPath, Segment, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

// ── Strategies ──────────────────────────────────────────────────────────

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(Segment::Key),
        (0usize..8).prop_map(Segment::Index),
    ]
}

fn field_path() -> impl Strategy<Value = FieldPath> {
    proptest::collection::vec(segment(), 1..6).prop_map(FieldPath::from_segments)
}

fn key_path() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{1,4}", 1..5).prop_map(|parts| parts.join("."))
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::from),
        "[a-zA-Z ]{0,8}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,3}", inner, 0..4).prop_map(Value::Object),
        ]
    })
}

fn object() -> impl Strategy<Value = Value> {
    proptest::collection::btree_map("[a-z]{1,3}", value(), 0..5).prop_map(Value::Object)
}

fn error_tree() -> impl Strategy<Value = ErrorTree> {
    let leaf = prop_oneof![Just(String::new()), "[a-z]{1,6}"].prop_map(ErrorTree::Leaf);
    leaf.prop_recursive(3, 24, 4, |inner| {
        proptest::collection::btree_map("[a-z]{1,3}", inner, 0..4)
            .prop_map(|children: BTreeMap<String, ErrorTree>| ErrorTree::Node(children))
    })
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Reported paths never contain an index segment
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reported_path_has_no_indices(path in field_path()) {
        let reported = path.reported();
        for part in reported.split('.').filter(|p| !p.is_empty()) {
            prop_assert!(!part.bytes().all(|b| b.is_ascii_digit()), "index leaked into {reported}");
        }
        let keys = path.segments().iter().filter(|s| !s.is_index()).count();
        let reported_parts = reported.split('.').filter(|p| !p.is_empty()).count();
        prop_assert_eq!(keys, reported_parts);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2–3. `related` is symmetric, reflexive, and covers children
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn related_is_symmetric(a in key_path(), b in key_path()) {
        prop_assert_eq!(related(&a, &b), related(&b, &a));
        prop_assert!(related(&a, &a));
    }

    #[test]
    fn related_to_children(base in key_path(), tail in key_path()) {
        let child = format!("{base}.{tail}");
        prop_assert!(related(&base, &child));
        prop_assert!(related(&child, &base));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. `restore_from` yields a value equal to its source
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn restore_from_matches_source(mut live in object(), saved in object()) {
        live.restore_from(&saved);
        prop_assert_eq!(live, saved);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. `has_errors` agrees with `error_count`
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn has_errors_matches_count(tree in error_tree()) {
        prop_assert_eq!(tree.has_errors(), tree.error_count() > 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Written slots read back unchanged
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn slot_write_reads_back(mut root in object(), key in "[a-z]{1,3}", v in leaf()) {
        let path = FieldPath::parse(&key).unwrap();
        let slot = root.slot_mut(&path).unwrap();
        *slot.value = v.clone();
        prop_assert_eq!(root.get_path(&path), Some(&v));
    }
}
