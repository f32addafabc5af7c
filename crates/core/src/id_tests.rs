// SPDX-License-Identifier: MIT

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_generates_unique_ids_with_prefix() {
    let a = TestId::new();
    let b = TestId::new();
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("tst-"));
    assert_eq!(a.as_str().len(), 4 + 19);
}

#[test]
fn define_id_round_trips_through_string() {
    let a = TestId::new();
    let parsed = TestId::from_string(a.as_str());
    assert_eq!(a, parsed);
}

#[test]
fn define_id_suffix_strips_prefix() {
    let id = TestId::from_string("tst-abcdefghijklmnopqrs");
    assert_eq!(id.suffix(), "abcdefghijklmnopqrs");
}

#[test]
fn define_id_short_truncates_suffix() {
    let id = TestId::from_string("tst-abcdefghijklmnopqrs");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefghijklmnopqrs");
}

#[test]
fn define_id_hash_map_lookup_by_str() {
    let id = TestId::from_string("tst-lookupme000000000");
    let mut map = HashMap::new();
    map.insert(id.clone(), 42);
    assert_eq!(map.get("tst-lookupme000000000"), Some(&42));
}

#[test]
fn define_id_display_matches_as_str() {
    let id = TestId::new();
    assert_eq!(id.to_string(), id.as_str());
}

// --- IdBuf tests ---

#[test]
fn short_fn_truncates_to_n_chars() {
    let s = "abcdefghijklmnop";
    assert_eq!(short(s, 8), "abcdefgh");
    assert_eq!(short(s, 100), s);
}

#[test]
fn idbuf_hash_matches_str_hash_for_borrowed_lookup() {
    use std::borrow::Borrow;
    let buf = IdBuf::new("hello");
    let borrowed: &str = buf.borrow();
    assert_eq!(borrowed, "hello");
}
