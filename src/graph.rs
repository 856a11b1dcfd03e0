//! The compiled graph: the runtime-ready projection of a document.
//!
//! After compilation every node's descriptor is bound to a behavior and its
//! dependency path is precomputed, so each runtime traversal is O(path
//! length) instead of re-walking the port graph. Bindings and paths are
//! immutable post-compile and shared read-only across every concurrently
//! active flow.
//!
//! Sub-graph slots live in a [`SlotTable`] shared between a top-level graph
//! and all of its nested graphs; each slot compiles at most once through a
//! `Uncompiled -> Compiling -> Compiled` state machine (memoized, safe
//! against self-referential documents).

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use crate::compiler::{CompileDiagnostic, CompileError, Compiler};
use crate::document::{GraphDocument, SlotUsage, SubGraphSlot};
use crate::nodes::NodeBehavior;
use crate::port::PortSpec;
use crate::types::{GraphId, NodeId};
use crate::variables::VariableScope;

/// One bound node inside a compiled graph.
#[derive(Clone)]
pub struct CompiledNode {
    /// Stable id, unchanged from the document.
    pub id: NodeId,
    /// The bound variant behavior.
    pub(crate) behavior: Arc<dyn NodeBehavior>,
    /// Declared ports, declaration order preserved.
    pub ports: Arc<[PortSpec]>,
    /// Precomputed dependency path: upstream node ids that must execute
    /// before this node, in a valid topological order.
    pub deps: Arc<[NodeId]>,
}

impl CompiledNode {
    /// Variant label of the bound behavior.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.behavior.kind()
    }
}

/// Runtime projection of a [`GraphDocument`] after binding and dependency
/// precomputation.
pub struct CompiledGraph {
    guid: GraphId,
    nodes: FxHashMap<NodeId, CompiledNode>,
    order: Vec<NodeId>,
    events: FxHashMap<String, NodeId>,
    scope: Arc<VariableScope>,
    slots: Arc<SlotTable>,
    diagnostics: Vec<CompileDiagnostic>,
    active: Mutex<Vec<u64>>,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("guid", &self.guid)
            .field("node_count", &self.nodes.len())
            .field("order", &self.order)
            .field("events", &self.events)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl CompiledGraph {
    pub(crate) fn from_parts(
        guid: GraphId,
        nodes: FxHashMap<NodeId, CompiledNode>,
        order: Vec<NodeId>,
        events: FxHashMap<String, NodeId>,
        scope: Arc<VariableScope>,
        slots: Arc<SlotTable>,
        diagnostics: Vec<CompileDiagnostic>,
    ) -> Self {
        Self {
            guid,
            nodes,
            order,
            events,
            scope,
            slots,
            diagnostics,
            active: Mutex::new(Vec::new()),
        }
    }

    /// Guid of the source document.
    #[must_use]
    pub fn guid(&self) -> GraphId {
        self.guid
    }

    /// Look up a bound node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }

    /// Bound nodes in document order.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &CompiledNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Number of bound nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Name-keyed lookup from event name to its entry node.
    #[must_use]
    pub fn find_event(&self, name: &str) -> Option<&NodeId> {
        self.events.get(name)
    }

    /// Declared event names and their entry nodes.
    #[must_use]
    pub fn events(&self) -> &FxHashMap<String, NodeId> {
        &self.events
    }

    /// The precomputed dependency path of a node.
    #[must_use]
    pub fn dependency_path(&self, id: &NodeId) -> Option<&[NodeId]> {
        self.nodes.get(id).map(|n| n.deps.as_ref())
    }

    /// The variable scope chain shared by this graph and its sub-graphs.
    #[must_use]
    pub fn scope(&self) -> &Arc<VariableScope> {
        &self.scope
    }

    /// Diagnostics recorded while compiling this document (degraded nodes,
    /// unresolved inputs, type mismatches).
    #[must_use]
    pub fn diagnostics(&self) -> &[CompileDiagnostic] {
        &self.diagnostics
    }

    /// The shared sub-graph slot table.
    #[must_use]
    pub(crate) fn slots(&self) -> &Arc<SlotTable> {
        &self.slots
    }

    /// An already-compiled sub-graph, without triggering compilation.
    #[must_use]
    pub fn sub_graph(&self, name: &str) -> Option<Arc<CompiledGraph>> {
        self.slots.compiled(name)
    }

    /// Number of flows currently active against this graph.
    #[must_use]
    pub fn active_flows(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub(crate) fn push_active(&self, run_id: u64) {
        self.active.lock().unwrap().push(run_id);
    }

    pub(crate) fn pop_active(&self, run_id: u64) {
        let mut active = self.active.lock().unwrap();
        // Nested flows release out of LIFO order only if a parent errored
        // first; remove by id rather than assuming the top.
        if let Some(pos) = active.iter().rposition(|r| *r == run_id) {
            active.remove(pos);
        }
    }
}

/// Compilation state of one sub-graph slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompileState {
    Uncompiled,
    Compiling,
    Compiled,
}

struct SlotEntry {
    guid: GraphId,
    #[allow(dead_code)]
    usage: SlotUsage,
    document: GraphDocument,
    state: Mutex<CompileState>,
    compiled: OnceLock<Arc<CompiledGraph>>,
}

/// Named sub-graph slots of a top-level document, shared with every nested
/// graph compiled from it (calls inside sub-graphs resolve against the
/// owner's table, since sub-graphs cannot own slots of their own).
pub struct SlotTable {
    scope: Arc<VariableScope>,
    entries: FxHashMap<String, SlotEntry>,
}

impl SlotTable {
    pub(crate) fn new(slots: &[SubGraphSlot], scope: Arc<VariableScope>) -> Arc<Self> {
        let entries = slots
            .iter()
            .map(|slot| {
                (
                    slot.name.clone(),
                    SlotEntry {
                        guid: slot.guid,
                        usage: slot.usage,
                        document: slot.document.clone(),
                        state: Mutex::new(CompileState::Uncompiled),
                        compiled: OnceLock::new(),
                    },
                )
            })
            .collect();
        Arc::new(Self { scope, entries })
    }

    pub(crate) fn empty(scope: Arc<VariableScope>) -> Arc<Self> {
        Arc::new(Self {
            scope,
            entries: FxHashMap::default(),
        })
    }

    /// Whether a slot with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declared slot names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The compiled graph of a slot, if it has been compiled.
    #[must_use]
    pub fn compiled(&self, name: &str) -> Option<Arc<CompiledGraph>> {
        self.entries
            .get(name)
            .and_then(|e| e.compiled.get().cloned())
    }

    /// Compile a slot exactly once and return its graph.
    ///
    /// Idempotent: re-entering for a `Compiled` slot returns the cached
    /// `Arc`; re-entering while `Compiling` (a self-referential document) is
    /// a no-op yielding `None`, resolved by the caller at run time once the
    /// outer compile has finished. A missing slot also yields `None`.
    pub(crate) fn ensure(
        self: &Arc<Self>,
        name: &str,
        compiler: &Compiler,
    ) -> Result<Option<Arc<CompiledGraph>>, CompileError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        if let Some(graph) = entry.compiled.get() {
            return Ok(Some(graph.clone()));
        }
        {
            let mut state = entry.state.lock().unwrap();
            match *state {
                CompileState::Compiling => return Ok(None),
                CompileState::Compiled => {
                    return Ok(entry.compiled.get().cloned());
                }
                CompileState::Uncompiled => *state = CompileState::Compiling,
            }
        }

        tracing::debug!(slot = name, guid = %entry.guid, "compiling sub-graph slot");
        match compiler.compile_sub_graph(&entry.document, self.scope.clone(), Arc::clone(self)) {
            Ok(graph) => {
                let _ = entry.compiled.set(graph.clone());
                *entry.state.lock().unwrap() = CompileState::Compiled;
                Ok(Some(graph))
            }
            Err(err) => {
                *entry.state.lock().unwrap() = CompileState::Uncompiled;
                Err(err)
            }
        }
    }
}

/// Weak back-reference table from graph guid to compiled graph.
///
/// Delegate values and woven dispatch calls carry guids, not references; the
/// registry resolves them at invocation time, so a callback leaked outside a
/// dropped graph reports the target gone instead of keeping it alive.
#[derive(Clone, Default)]
pub struct GraphRegistry {
    inner: Arc<RwLock<FxHashMap<GraphId, Weak<CompiledGraph>>>>,
}

impl GraphRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a compiled graph under its guid.
    pub fn register(&self, graph: &Arc<CompiledGraph>) {
        self.inner
            .write()
            .unwrap()
            .insert(graph.guid(), Arc::downgrade(graph));
    }

    /// Resolve a guid to its live compiled graph; prunes the entry when the
    /// graph has been dropped.
    #[must_use]
    pub fn resolve(&self, id: GraphId) -> Option<Arc<CompiledGraph>> {
        if let Some(graph) = self.inner.read().unwrap().get(&id).and_then(Weak::upgrade) {
            return Some(graph);
        }
        self.inner.write().unwrap().remove(&id);
        None
    }

    /// Number of registered (possibly dead) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_stack_removes_by_run_id() {
        let graph = CompiledGraph::from_parts(
            GraphId::random(),
            FxHashMap::default(),
            Vec::new(),
            FxHashMap::default(),
            VariableScope::root("test"),
            SlotTable::empty(VariableScope::root("test")),
            Vec::new(),
        );
        graph.push_active(1);
        graph.push_active(2);
        graph.pop_active(1);
        assert_eq!(graph.active_flows(), 1);
        graph.pop_active(2);
        assert_eq!(graph.active_flows(), 0);
    }

    #[test]
    fn registry_prunes_dropped_graphs() {
        let registry = GraphRegistry::new();
        let guid;
        {
            let graph = Arc::new(CompiledGraph::from_parts(
                GraphId::random(),
                FxHashMap::default(),
                Vec::new(),
                FxHashMap::default(),
                VariableScope::root("test"),
                SlotTable::empty(VariableScope::root("test")),
                Vec::new(),
            ));
            guid = graph.guid();
            registry.register(&graph);
            assert!(registry.resolve(guid).is_some());
        }
        assert!(registry.resolve(guid).is_none());
        assert!(registry.is_empty());
    }
}
