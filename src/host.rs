//! Context-object registry: liveness, property bags, cancellation signals.
//!
//! Every triggered run is performed on behalf of an external "context object"
//! (a host entity the woven code calls `self`). The engine never holds a
//! direct reference to host objects; it registers them here and works with
//! ids, the explicit weak-reference discipline that keeps a leaked callback
//! from pinning host memory.
//!
//! A host entry owns the cancellation flag every flow started for that owner
//! derives its signal from: destroying the owner trips the flag, and any
//! in-flight traversal unwinds at its next `forward` entry (teardown runs
//! excepted).

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::GraphId;
use crate::value::Value;

/// Identifier of a registered context object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(u64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// Cancellation signal derived from a context object's lifetime.
///
/// Cloned into every flow started for the owner; checked at each recursive
/// `forward` entry. Tripping it is not an error condition; it silently ends
/// traversals.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether the signal has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

struct HostEntry {
    type_name: String,
    graph: Option<GraphId>,
    properties: Value,
    cancel: CancelSignal,
}

/// Registry of live context objects.
///
/// Host properties are kept as a [`Value::Object`] bag so registered property
/// accessors (see the registry module) can read and mutate them without the
/// engine knowing host types.
#[derive(Default)]
pub struct HostRegistry {
    entries: RwLock<FxHashMap<HostId, HostEntry>>,
    next_id: AtomicU64,
}

impl HostRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context object of the named type, optionally attached to
    /// the compiled graph its woven event methods dispatch into.
    pub fn register(&self, type_name: impl Into<String>, graph: Option<GraphId>) -> HostId {
        let id = HostId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().unwrap().insert(
            id,
            HostEntry {
                type_name: type_name.into(),
                graph,
                properties: Value::Object(FxHashMap::default()),
                cancel: CancelSignal::new(),
            },
        );
        id
    }

    /// Whether the object is still registered.
    #[must_use]
    pub fn is_alive(&self, id: HostId) -> bool {
        self.entries.read().unwrap().contains_key(&id)
    }

    /// Declared type name of the object.
    #[must_use]
    pub fn type_name(&self, id: HostId) -> Option<String> {
        self.entries
            .read()
            .unwrap()
            .get(&id)
            .map(|e| e.type_name.clone())
    }

    /// The graph this object's woven dispatch calls resolve against.
    #[must_use]
    pub fn graph_of(&self, id: HostId) -> Option<GraphId> {
        self.entries.read().unwrap().get(&id).and_then(|e| e.graph)
    }

    /// The cancellation signal tied to this object's lifetime.
    #[must_use]
    pub fn cancel_signal(&self, id: HostId) -> Option<CancelSignal> {
        self.entries
            .read()
            .unwrap()
            .get(&id)
            .map(|e| e.cancel.clone())
    }

    /// Trip the object's cancellation signal without removing it. The entry
    /// stays readable so teardown-time traversals can still reach properties.
    pub fn cancel(&self, id: HostId) {
        if let Some(entry) = self.entries.read().unwrap().get(&id) {
            entry.cancel.cancel();
        }
    }

    /// Drop the entry. In-flight flows keep their cloned signal; property
    /// access reports the owner gone from here on.
    pub fn remove(&self, id: HostId) -> bool {
        self.entries.write().unwrap().remove(&id).is_some()
    }

    /// Run a closure over the object's mutable property bag.
    pub fn with_properties<R>(&self, id: HostId, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.entries
            .write()
            .unwrap()
            .get_mut(&id)
            .map(|e| f(&mut e.properties))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_survives_removal_in_cloned_signals() {
        let hosts = HostRegistry::new();
        let id = hosts.register("Agent", None);
        let signal = hosts.cancel_signal(id).unwrap();

        hosts.cancel(id);
        hosts.remove(id);
        assert!(signal.is_cancelled());
        assert!(!hosts.is_alive(id));
        assert!(hosts.cancel_signal(id).is_none());
    }

    #[test]
    fn properties_start_as_empty_bag() {
        let hosts = HostRegistry::new();
        let id = hosts.register("Agent", None);
        let is_empty = hosts
            .with_properties(id, |bag| matches!(bag, Value::Object(map) if map.is_empty()))
            .unwrap();
        assert!(is_empty);
    }

    #[test]
    fn ids_are_distinct_across_registrations() {
        let hosts = HostRegistry::new();
        assert_ne!(hosts.register("A", None), hosts.register("A", None));
    }
}
