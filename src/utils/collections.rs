//! Constructors for the fast hash collections used across the crate.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::value::Value;

/// A fresh `FxHashMap` (the crate-wide hash map flavor).
#[must_use]
pub fn new_fx_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// A fresh `FxHashSet`.
#[must_use]
pub fn new_fx_set<T>() -> FxHashSet<T> {
    FxHashSet::default()
}

/// A fresh string-keyed value map (variable snapshots, property bags).
#[must_use]
pub fn new_value_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}
