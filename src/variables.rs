//! Named, shared, mutable variable cells and the scope chain that owns them.
//!
//! Variables live in [`VariableScope`] tables linked into an explicit chain:
//! the engine owns the topmost (global) scope, each compiled uber graph gets
//! a child scope, and sub-graphs share their owning document's scope, so a
//! write is immediately visible to every bound port, including ports in
//! sibling sub-graphs. Lookup walks the chain nearest-first; there is no
//! ambient global state.
//!
//! Tables are guarded by a lightweight `RwLock`. The engine's execution model
//! is a single-threaded host tick, but compiled graphs are shared across
//! concurrently active flows, so the cells need the explicit synchronization
//! a Rust host must carry anyway.

use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

use crate::value::{Value, ValueType};

/// A named, typed, mutable value cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    /// Declared type of the cell.
    pub value_type: ValueType,
    /// Current value.
    pub value: Value,
    /// Shared across instances outside the owning document (lives in the
    /// parent scope instead of the graph scope).
    pub is_global: bool,
    /// Editable from outside the graph (inspector surface; passthrough for
    /// the engine).
    pub is_exposed: bool,
}

impl Variable {
    /// A local, unexposed cell typed after its initial value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value_type: value.value_type(),
            value,
            is_global: false,
            is_exposed: false,
        }
    }

    /// Override the declared type.
    #[must_use]
    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Mark the cell global.
    #[must_use]
    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    /// Mark the cell exposed.
    #[must_use]
    pub fn exposed(mut self) -> Self {
        self.is_exposed = true;
        self
    }
}

/// One table of variable cells plus a read-through link to its parent scope.
///
/// # Examples
///
/// ```rust
/// use wireflow::value::Value;
/// use wireflow::variables::{Variable, VariableScope};
///
/// let globals = VariableScope::root("globals");
/// globals.define("volume", Variable::new(Value::Float(0.8)));
///
/// let graph = VariableScope::child(&globals, "graph");
/// // Nearest-scope lookup reads through to the parent.
/// assert_eq!(graph.get("volume"), Some(Value::Float(0.8)));
///
/// // A local cell of the same name shadows the global one.
/// graph.define("volume", Variable::new(Value::Float(0.2)));
/// assert_eq!(graph.get("volume"), Some(Value::Float(0.2)));
/// assert_eq!(globals.get("volume"), Some(Value::Float(0.8)));
/// ```
#[derive(Debug)]
pub struct VariableScope {
    label: String,
    cells: RwLock<FxHashMap<String, Variable>>,
    parent: Option<Arc<VariableScope>>,
}

impl VariableScope {
    /// Create a topmost scope. The caller (normally the engine) owns it.
    pub fn root(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            cells: RwLock::new(FxHashMap::default()),
            parent: None,
        })
    }

    /// Create a child scope holding a read-through reference to `parent`.
    pub fn child(parent: &Arc<VariableScope>, label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            cells: RwLock::new(FxHashMap::default()),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Human-readable scope label, used in traces.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The parent scope this table reads through to, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<VariableScope>> {
        self.parent.as_ref()
    }

    /// Create or replace a cell in *this* scope.
    pub fn define(&self, name: impl Into<String>, variable: Variable) {
        self.cells.write().unwrap().insert(name.into(), variable);
    }

    /// Create a cell in this scope only if absent here (used for globals so a
    /// recompile does not clobber a live shared cell).
    pub fn define_if_absent(&self, name: impl Into<String>, variable: Variable) {
        self.cells
            .write()
            .unwrap()
            .entry(name.into())
            .or_insert(variable);
    }

    /// Read a value, walking the chain nearest-first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(cell) = self.cells.read().unwrap().get(name) {
            return Some(cell.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Write a value into the nearest scope that holds the cell; if no scope
    /// in the chain does, the cell is created in this scope. Writes are
    /// applied immediately and visible to every bound port.
    pub fn set(&self, name: &str, value: Value) {
        {
            let mut cells = self.cells.write().unwrap();
            if let Some(cell) = cells.get_mut(name) {
                cell.value = value;
                return;
            }
        }
        match &self.parent {
            Some(parent) if parent.contains(name) => parent.set(name, value),
            _ => self.define(name.to_string(), Variable::new(value)),
        }
    }

    /// Whether the chain holds a cell with this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        if self.cells.read().unwrap().contains_key(name) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.contains(name))
    }

    /// Remove a cell from this scope (not the chain). Returns the removed
    /// cell, severing every port binding that referenced it.
    pub fn remove(&self, name: &str) -> Option<Variable> {
        self.cells.write().unwrap().remove(name)
    }

    /// Snapshot of this scope's local cells (names and current values).
    #[must_use]
    pub fn snapshot(&self) -> FxHashMap<String, Value> {
        self.cells
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_writes_nearest_holding_scope() {
        let root = VariableScope::root("root");
        root.define("hp", Variable::new(Value::Int(100)));
        let child = VariableScope::child(&root, "graph");

        child.set("hp", Value::Int(50));
        assert_eq!(root.get("hp"), Some(Value::Int(50)));
        assert!(child.snapshot().is_empty(), "no local cell was created");
    }

    #[test]
    fn set_defines_locally_when_unknown() {
        let root = VariableScope::root("root");
        let child = VariableScope::child(&root, "graph");

        child.set("fresh", Value::Bool(true));
        assert_eq!(child.get("fresh"), Some(Value::Bool(true)));
        assert_eq!(root.get("fresh"), None);
    }

    #[test]
    fn remove_severs_only_this_scope() {
        let root = VariableScope::root("root");
        root.define("x", Variable::new(Value::Int(1)));
        let child = VariableScope::child(&root, "graph");
        child.define("x", Variable::new(Value::Int(2)));

        assert!(child.remove("x").is_some());
        // The global cell is still reachable through the chain.
        assert_eq!(child.get("x"), Some(Value::Int(1)));
    }
}
