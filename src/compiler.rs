//! Document compilation: binding, validation, dependency precomputation.
//!
//! The compiler walks a document once and produces its runtime projection:
//! every node's declared function/event reference bound to a callable through
//! the [`FunctionRegistry`](crate::registry::FunctionRegistry), every node's
//! dependency path precomputed, and every sub-graph slot referenced by a call
//! node compiled recursively (memoized, so self-referential documents
//! terminate).
//!
//! Structural integrity problems (duplicate ids, duplicate events, data
//! cycles) are hard errors. Binding and port-source defects degrade the
//! offending node to an inert placeholder and are recorded as
//! [`CompileDiagnostic`]s on the compiled graph, so the rest of the document
//! stays usable; `compile_strict` callers can turn a non-empty diagnostics
//! list into [`CompileError::Validation`] instead.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::document::{GraphDocument, NodeSpec, NodeSpecKind};
use crate::graph::{CompiledGraph, CompiledNode, GraphRegistry, SlotTable};
use crate::nodes::{
    Branch, EventEntry, GetProperty, Invalid, Invoke, MakeArray, NodeBehavior, Return, Sequence,
    SetProperty, SetVariable, SubGraphCall, Switch,
};
use crate::port::{PortRef, PortSpec};
use crate::registry::{FunctionKey, FunctionRegistry, MemberKey};
use crate::types::{GraphId, NodeId, PortKey};
use crate::value::{Value, ValueType};
use crate::variables::{Variable, VariableScope};

/// Structural compilation failures. These abort the whole document; per-node
/// defects are [`CompileDiagnostic`]s instead.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    /// Node ids must be unique within one document instance.
    #[error("duplicate node id {id} in document {graph}")]
    #[diagnostic(code(wireflow::compile::duplicate_node))]
    DuplicateNode { graph: GraphId, id: NodeId },

    /// Event names key the dispatch table; two entry nodes cannot share one.
    #[error("duplicate event name {event:?} in document {graph}")]
    #[diagnostic(code(wireflow::compile::duplicate_event))]
    DuplicateEvent { graph: GraphId, event: String },

    /// Input-port connections form a cycle; no topological order exists.
    #[error("data-connection cycle at node {node}")]
    #[diagnostic(
        code(wireflow::compile::dependency_cycle),
        help("Break the cycle by routing one edge through control flow instead of a data port.")
    )]
    DependencyCycle { node: NodeId },

    /// Strict-mode summary of per-node defects.
    #[error("document failed validation with {} diagnostic(s)", .diagnostics.len())]
    #[diagnostic(
        code(wireflow::compile::validation),
        help("Inspect CompiledGraph::diagnostics() from a non-strict compile for details.")
    )]
    Validation { diagnostics: Vec<CompileDiagnostic> },
}

/// Per-node defect recorded while compiling. Some degrade the owning node to
/// an inert placeholder (binding and source defects); the rest are warnings.
#[derive(Clone, Debug, PartialEq)]
pub enum CompileDiagnostic {
    /// Function descriptor did not resolve in the registry.
    UnboundFunction { node: NodeId, function: FunctionKey },
    /// Property accessor did not resolve in the registry.
    UnboundProperty { node: NodeId, member: MemberKey },
    /// Input port with no connection, no binding, and no default.
    UnresolvedInput { node: NodeId, port: PortKey },
    /// Input port with both a connection and a variable binding; the
    /// connection wins at run time.
    AmbiguousInput { node: NodeId, port: PortKey },
    /// Connection whose source node or port does not exist.
    DanglingConnection {
        node: NodeId,
        port: PortKey,
        target: PortRef,
    },
    /// Connected ports with incompatible declared types.
    TypeMismatch {
        node: NodeId,
        port: PortKey,
        declared: ValueType,
        actual: ValueType,
    },
    /// Variable binding naming a cell absent from the scope chain.
    UnknownVariable {
        node: NodeId,
        port: PortKey,
        variable: String,
    },
    /// Delegate port bound to an event this graph does not declare.
    UnknownDelegateEvent {
        node: NodeId,
        port: PortKey,
        event: String,
    },
    /// Sub-graph call naming a slot the owning document lacks.
    UnknownSubGraph { node: NodeId, slot: String },
    /// A nested document declared slots of its own; only top-level documents
    /// may own slots, so these are ignored.
    NestedSlots { slot: String },
    /// Make-array declared size disagrees with its input port count.
    ArraySize {
        node: NodeId,
        declared: usize,
        ports: usize,
    },
}

impl fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundFunction { node, function } => {
                write!(f, "node {node}: unbound function {function}")
            }
            Self::UnboundProperty { node, member } => {
                write!(f, "node {node}: unbound property {member}")
            }
            Self::UnresolvedInput { node, port } => {
                write!(f, "node {node}: input {port} has no value source")
            }
            Self::AmbiguousInput { node, port } => {
                write!(
                    f,
                    "node {node}: input {port} has both a connection and a variable binding"
                )
            }
            Self::DanglingConnection { node, port, target } => {
                write!(
                    f,
                    "node {node}: input {port} connects to missing port {} on {}",
                    target.key(),
                    target.node
                )
            }
            Self::TypeMismatch {
                node,
                port,
                declared,
                actual,
            } => {
                write!(
                    f,
                    "node {node}: input {port} declared {declared} but source produces {actual}"
                )
            }
            Self::UnknownVariable {
                node,
                port,
                variable,
            } => {
                write!(
                    f,
                    "node {node}: input {port} binds unknown variable {variable:?}"
                )
            }
            Self::UnknownDelegateEvent { node, port, event } => {
                write!(
                    f,
                    "node {node}: delegate port {port} targets unknown event {event:?}"
                )
            }
            Self::UnknownSubGraph { node, slot } => {
                write!(f, "node {node}: unknown sub-graph slot {slot:?}")
            }
            Self::NestedSlots { slot } => {
                write!(f, "nested document declares slot {slot:?}; ignored")
            }
            Self::ArraySize {
                node,
                declared,
                ports,
            } => {
                write!(
                    f,
                    "node {node}: make-array declares size {declared} but has {ports} item ports"
                )
            }
        }
    }
}

enum Visit {
    Visiting,
    Done,
}

/// Walks documents into [`CompiledGraph`]s.
///
/// Cheap to construct (two `Arc` clones); the engine builds one per compile
/// entry and per lazy sub-graph ensure.
pub struct Compiler {
    registry: Arc<FunctionRegistry>,
    graphs: GraphRegistry,
}

impl Compiler {
    pub fn new(registry: Arc<FunctionRegistry>, graphs: GraphRegistry) -> Self {
        Self { registry, graphs }
    }

    /// Compile a top-level document. `parent_scope` becomes the parent of the
    /// document's own variable scope; global variables are defined into it.
    #[instrument(skip_all, fields(graph = %document.guid))]
    pub fn compile(
        &self,
        document: &GraphDocument,
        parent_scope: Arc<VariableScope>,
    ) -> Result<Arc<CompiledGraph>, CompileError> {
        let scope = VariableScope::child(&parent_scope, format!("graph:{}", document.guid));
        self.define_variables(document, &scope, &parent_scope);
        let slots = SlotTable::new(&document.sub_graphs, scope.clone());
        self.compile_document(document, scope, slots, false)
    }

    /// Compile a nested document sharing its owner's scope and slot table.
    pub(crate) fn compile_sub_graph(
        &self,
        document: &GraphDocument,
        scope: Arc<VariableScope>,
        slots: Arc<SlotTable>,
    ) -> Result<Arc<CompiledGraph>, CompileError> {
        let globals = scope.parent().cloned().unwrap_or_else(|| scope.clone());
        self.define_variables(document, &scope, &globals);
        self.compile_document(document, scope, slots, true)
    }

    fn define_variables(
        &self,
        document: &GraphDocument,
        local: &Arc<VariableScope>,
        globals: &Arc<VariableScope>,
    ) {
        for spec in &document.variables {
            let variable = Variable {
                value_type: spec.value_type,
                value: Value::from_json(&spec.value),
                is_global: spec.is_global,
                is_exposed: spec.is_exposed,
            };
            if spec.is_global {
                // A recompile must not clobber a live shared cell.
                globals.define_if_absent(spec.name.clone(), variable);
            } else {
                local.define(spec.name.clone(), variable);
            }
        }
    }

    fn compile_document(
        &self,
        document: &GraphDocument,
        scope: Arc<VariableScope>,
        slots: Arc<SlotTable>,
        is_sub: bool,
    ) -> Result<Arc<CompiledGraph>, CompileError> {
        let mut diagnostics: Vec<CompileDiagnostic> = Vec::new();

        if is_sub {
            for slot in &document.sub_graphs {
                tracing::warn!(slot = %slot.name, "nested document declares its own slots; ignored");
                diagnostics.push(CompileDiagnostic::NestedSlots {
                    slot: slot.name.clone(),
                });
            }
        }

        // Structural integrity first: unique node ids, unique event names.
        let mut seen = FxHashSet::default();
        for spec in &document.nodes {
            if !seen.insert(&spec.id) {
                return Err(CompileError::DuplicateNode {
                    graph: document.guid,
                    id: spec.id.clone(),
                });
            }
        }

        let mut events: FxHashMap<String, NodeId> = FxHashMap::default();
        for spec in &document.nodes {
            if let NodeSpecKind::Event { event, .. } = &spec.kind {
                if events.insert(event.clone(), spec.id.clone()).is_some() {
                    return Err(CompileError::DuplicateEvent {
                        graph: document.guid,
                        event: event.clone(),
                    });
                }
            }
        }

        let specs: FxHashMap<&NodeId, &NodeSpec> =
            document.nodes.iter().map(|n| (&n.id, n)).collect();

        let mut nodes: FxHashMap<NodeId, CompiledNode> = FxHashMap::default();
        let mut order: Vec<NodeId> = Vec::with_capacity(document.nodes.len());

        for spec in &document.nodes {
            let defect = self.validate_ports(spec, &specs, &scope, &events, &mut diagnostics);

            let behavior = match defect {
                Some(reason) => {
                    tracing::warn!(node = %spec.id, %reason, "degrading node to invalid placeholder");
                    Arc::new(Invalid::new(reason)) as Arc<dyn NodeBehavior>
                }
                None => self.bind(spec, &slots, &mut diagnostics)?,
            };

            let deps = self.dependency_path(spec, &specs)?;

            nodes.insert(
                spec.id.clone(),
                CompiledNode {
                    id: spec.id.clone(),
                    behavior,
                    ports: spec.ports.clone().into(),
                    deps: deps.into(),
                },
            );
            order.push(spec.id.clone());
        }

        let graph = Arc::new(CompiledGraph::from_parts(
            document.guid,
            nodes,
            order,
            events,
            scope,
            slots,
            diagnostics,
        ));
        self.graphs.register(&graph);
        tracing::debug!(
            graph = %graph.guid(),
            nodes = graph.node_count(),
            diagnostics = graph.diagnostics().len(),
            "document compiled"
        );
        Ok(graph)
    }

    /// Validate a node's ports. Returns the degrade reason when a source
    /// defect makes the node unexecutable; warning-level findings are only
    /// recorded.
    fn validate_ports(
        &self,
        spec: &NodeSpec,
        specs: &FxHashMap<&NodeId, &NodeSpec>,
        scope: &Arc<VariableScope>,
        events: &FxHashMap<String, NodeId>,
        diagnostics: &mut Vec<CompileDiagnostic>,
    ) -> Option<String> {
        let mut defect: Option<String> = None;
        let record_defect = |reason: String, defect: &mut Option<String>| {
            if defect.is_none() {
                *defect = Some(reason);
            }
        };

        for port in &spec.ports {
            let key = port.key();
            if port.is_input() {
                if port.active_sources() == 0 {
                    diagnostics.push(CompileDiagnostic::UnresolvedInput {
                        node: spec.id.clone(),
                        port: key.clone(),
                    });
                    record_defect(format!("input {key} has no value source"), &mut defect);
                    continue;
                }
                if !port.connections.is_empty() && port.variable.is_some() {
                    diagnostics.push(CompileDiagnostic::AmbiguousInput {
                        node: spec.id.clone(),
                        port: key.clone(),
                    });
                }
                if let Some(conn) = port.connections.first() {
                    match source_port(specs, conn) {
                        Some(src_port) => {
                            if !port.value_type.accepts(src_port.value_type) {
                                diagnostics.push(CompileDiagnostic::TypeMismatch {
                                    node: spec.id.clone(),
                                    port: key.clone(),
                                    declared: port.value_type,
                                    actual: src_port.value_type,
                                });
                            }
                        }
                        None => {
                            diagnostics.push(CompileDiagnostic::DanglingConnection {
                                node: spec.id.clone(),
                                port: key.clone(),
                                target: conn.clone(),
                            });
                            record_defect(
                                format!("input {key} connects to a missing port"),
                                &mut defect,
                            );
                        }
                    }
                }
                if let Some(variable) = &port.variable {
                    if !scope.contains(variable) {
                        diagnostics.push(CompileDiagnostic::UnknownVariable {
                            node: spec.id.clone(),
                            port: key.clone(),
                            variable: variable.clone(),
                        });
                    }
                }
            } else if let Some(event) = &port.delegate {
                if !events.contains_key(event) {
                    diagnostics.push(CompileDiagnostic::UnknownDelegateEvent {
                        node: spec.id.clone(),
                        port: key,
                        event: event.clone(),
                    });
                }
            }
        }

        if let NodeSpecKind::MakeArray { size } = &spec.kind {
            let ports = spec.ports.iter().filter(|p| p.is_input()).count();
            if ports != *size {
                diagnostics.push(CompileDiagnostic::ArraySize {
                    node: spec.id.clone(),
                    declared: *size,
                    ports,
                });
            }
        }

        defect
    }

    /// Bind a node's descriptor to its behavior. Unresolved references
    /// degrade to [`Invalid`] rather than aborting the document.
    fn bind(
        &self,
        spec: &NodeSpec,
        slots: &Arc<SlotTable>,
        diagnostics: &mut Vec<CompileDiagnostic>,
    ) -> Result<Arc<dyn NodeBehavior>, CompileError> {
        let behavior: Arc<dyn NodeBehavior> = match &spec.kind {
            NodeSpecKind::Event { next, .. } => Arc::new(EventEntry::new(next.clone())),
            NodeSpecKind::Invoke { function, next } => match self.registry.resolve(function) {
                Some(callable) => Arc::new(Invoke::new(function.clone(), callable, next.clone())),
                None => {
                    tracing::warn!(node = %spec.id, function = %function, "function did not resolve");
                    diagnostics.push(CompileDiagnostic::UnboundFunction {
                        node: spec.id.clone(),
                        function: function.clone(),
                    });
                    Arc::new(Invalid::new(format!("unbound function {function}")))
                }
            },
            NodeSpecKind::GetProperty { member } => match self.registry.resolve_getter(member) {
                Some(getter) => Arc::new(GetProperty::new(member.clone(), getter)),
                None => {
                    tracing::warn!(node = %spec.id, member = %member, "getter did not resolve");
                    diagnostics.push(CompileDiagnostic::UnboundProperty {
                        node: spec.id.clone(),
                        member: member.clone(),
                    });
                    Arc::new(Invalid::new(format!("unbound property {member}")))
                }
            },
            NodeSpecKind::SetProperty { member, next } => {
                match self.registry.resolve_setter(member) {
                    Some(setter) => Arc::new(SetProperty::new(member.clone(), setter, next.clone())),
                    None => {
                        tracing::warn!(node = %spec.id, member = %member, "setter did not resolve");
                        diagnostics.push(CompileDiagnostic::UnboundProperty {
                            node: spec.id.clone(),
                            member: member.clone(),
                        });
                        Arc::new(Invalid::new(format!("unbound property {member}")))
                    }
                }
            }
            NodeSpecKind::SetVariable { variable, next } => {
                Arc::new(SetVariable::new(variable.clone(), next.clone()))
            }
            NodeSpecKind::SubGraphCall { slot, next } => {
                if slots.contains(slot) {
                    // Eagerly compile referenced slots; memoization makes
                    // self-referential documents terminate.
                    slots.ensure(slot, self)?;
                    Arc::new(SubGraphCall::new(slot.clone(), next.clone()))
                } else {
                    diagnostics.push(CompileDiagnostic::UnknownSubGraph {
                        node: spec.id.clone(),
                        slot: slot.clone(),
                    });
                    Arc::new(Invalid::new(format!("unknown sub-graph slot {slot:?}")))
                }
            }
            NodeSpecKind::Sequence { steps } => Arc::new(Sequence::new(steps.clone())),
            NodeSpecKind::Branch { on_true, on_false } => {
                Arc::new(Branch::new(on_true.clone(), on_false.clone()))
            }
            NodeSpecKind::Switch { targets, default } => {
                Arc::new(Switch::new(targets.clone(), default.clone()))
            }
            NodeSpecKind::MakeArray { .. } => Arc::new(MakeArray),
            NodeSpecKind::Return => Arc::new(Return),
        };
        Ok(behavior)
    }

    /// Compute a node's dependency path: every upstream node reachable by
    /// following input-port connections backward, postordered so a node never
    /// precedes one of its own dependencies. Ties between unordered siblings
    /// break on input-port declaration order (array index, then port order),
    /// never on layout position.
    fn dependency_path(
        &self,
        root: &NodeSpec,
        specs: &FxHashMap<&NodeId, &NodeSpec>,
    ) -> Result<Vec<NodeId>, CompileError> {
        let mut state: FxHashMap<NodeId, Visit> = FxHashMap::default();
        let mut path: Vec<NodeId> = Vec::new();
        state.insert(root.id.clone(), Visit::Visiting);
        for conn in data_connections(root, specs) {
            visit(&conn.node, specs, &mut state, &mut path)?;
        }
        Ok(path)
    }
}

/// Input connections of a node in declaration order, excluding connections
/// whose source is a delegate port (those resolve statically and must not
/// execute the node they point at).
fn data_connections<'a>(
    spec: &'a NodeSpec,
    specs: &'a FxHashMap<&'a NodeId, &'a NodeSpec>,
) -> impl Iterator<Item = &'a PortRef> {
    spec.ports
        .iter()
        .filter(|p| p.is_input())
        .flat_map(|p| p.connections.iter())
        .filter(|conn| source_port(specs, conn).is_none_or(|src| src.delegate.is_none()))
}

fn source_port<'a>(
    specs: &'a FxHashMap<&'a NodeId, &'a NodeSpec>,
    conn: &PortRef,
) -> Option<&'a PortSpec> {
    specs
        .get(&conn.node)?
        .ports
        .iter()
        .find(|p| p.is_output() && p.key() == conn.key())
}

fn visit<'a>(
    id: &NodeId,
    specs: &'a FxHashMap<&'a NodeId, &'a NodeSpec>,
    state: &mut FxHashMap<NodeId, Visit>,
    path: &mut Vec<NodeId>,
) -> Result<(), CompileError> {
    match state.get(id) {
        Some(Visit::Visiting) => {
            return Err(CompileError::DependencyCycle { node: id.clone() });
        }
        Some(Visit::Done) => return Ok(()),
        None => {}
    }
    state.insert(id.clone(), Visit::Visiting);

    let Some(spec) = specs.get(id) else {
        // Dangling connection, already diagnosed; keep the path to real
        // nodes only.
        state.insert(id.clone(), Visit::Done);
        return Ok(());
    };

    for conn in data_connections(spec, specs) {
        visit(&conn.node, specs, state, path)?;
    }

    state.insert(id.clone(), Visit::Done);
    path.push(id.clone());
    Ok(())
}
