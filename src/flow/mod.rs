//! The execution context and the forward-traversal algorithm.
//!
//! A [`Flow`] represents one triggered run: one event fire against one
//! compiled graph, performed on behalf of one context object. Flows are
//! pooled ([`FlowPool`]) and fully reset between uses.
//!
//! Traversal is driven by [`FlowCtx::forward`]:
//!
//! 1. Check cancellation, then the forward-path log (at-most-once guarantee).
//! 2. Forward every node in the precomputed dependency path, in order.
//! 3. Append the node to the log.
//! 4. Tracker `enter` hook (suspension point).
//! 5. Execute the node.
//! 6. Tracker `exit` hook (suspension point).
//! 7. While the context's next-node pointer is set, clear it and repeat.
//!
//! Recursion runs through boxed futures so dependency chains, control-flow
//! chains, and nested sub-graph traversals all share one async call path.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::compiler::CompileError;
use crate::engine::Engine;
use crate::graph::CompiledGraph;
use crate::host::{CancelSignal, HostId};
use crate::registry::InvokeError;
use crate::tracker::NodeRef;
use crate::types::{CALL_EVENT, GraphId, NodeId, PortKey};
use crate::value::{DelegateRef, Value};
use crate::variables::VariableScope;

mod pool;

pub use pool::FlowPool;
pub(crate) use pool::FlowGuard;

/// Errors raised during traversal.
///
/// `Cancelled` is a normal early termination, not a defect; the engine logs
/// it at debug level. Everything else unwinds the current flow, which is
/// released back to the pool by its guard without affecting sibling flows or
/// the shared compiled graph.
#[derive(Debug, Error, Diagnostic)]
pub enum FlowError {
    /// The context object was destroyed while this run was in flight.
    #[error("traversal cancelled: context object destroyed")]
    #[diagnostic(code(wireflow::flow::cancelled))]
    Cancelled,

    /// No event-entry node with this name exists in the graph.
    #[error("unknown event {event:?}")]
    #[diagnostic(
        code(wireflow::flow::unknown_event),
        help("Probe with Engine::try_execute_event when the name may not exist.")
    )]
    UnknownEvent { event: String },

    /// A next-pointer or dependency named a node missing from the graph.
    #[error("unknown node {node} in graph {graph}")]
    #[diagnostic(code(wireflow::flow::unknown_node))]
    UnknownNode { graph: GraphId, node: NodeId },

    /// An inert placeholder left by a compile-time binding failure was
    /// actually reached.
    #[error("invalid node {node} reached: {reason}")]
    #[diagnostic(
        code(wireflow::flow::invalid_node),
        help("The compile diagnostics name the binding that failed to resolve.")
    )]
    InvalidNode { node: NodeId, reason: String },

    /// An input port had no connection, no variable binding, and no literal
    /// default. A successfully validated graph never reaches this.
    #[error("no value source for input {port} on node {node}")]
    #[diagnostic(code(wireflow::flow::unresolved_input))]
    UnresolvedInput { node: NodeId, port: PortKey },

    /// A switch selector did not resolve to an integer.
    #[error("switch selector on node {node} must be an integer, got {got}")]
    #[diagnostic(code(wireflow::flow::bad_selector))]
    BadSelector {
        node: NodeId,
        got: crate::value::ValueType,
    },

    /// A sub-graph-call node referenced a slot the owning document lacks.
    #[error("sub-graph slot {slot:?} not found")]
    #[diagnostic(code(wireflow::flow::sub_graph_missing))]
    SubGraphMissing { slot: String },

    /// Lazy compilation of a sub-graph slot failed at call time.
    #[error("sub-graph slot {slot:?} failed to compile")]
    #[diagnostic(code(wireflow::flow::sub_graph_compile))]
    SubGraphCompile {
        slot: String,
        #[source]
        source: CompileError,
    },

    /// Sub-graph call nesting exceeded the configured limit: the runtime
    /// guard against unconditionally cyclic sub-graph calls.
    #[error("sub-graph call depth exceeded ({depth})")]
    #[diagnostic(
        code(wireflow::flow::call_depth),
        help("Check for sub-graphs that call each other without a termination condition.")
    )]
    CallDepthExceeded { depth: u32 },

    /// A delegate was invoked after its owning graph was dropped.
    #[error("delegate target graph {graph} is gone")]
    #[diagnostic(code(wireflow::flow::delegate_revoked))]
    DelegateRevoked { graph: GraphId },

    /// A property node ran for a context object no longer registered.
    #[error("context object {owner} is gone")]
    #[diagnostic(code(wireflow::flow::host_gone))]
    HostGone { owner: HostId },

    /// A bound callable failed.
    #[error("invoke failed on node {node}")]
    #[diagnostic(code(wireflow::flow::invoke))]
    Invoke {
        node: NodeId,
        #[source]
        source: InvokeError,
    },
}

/// One triggered run: the pooled, cancellable, re-entrant execution context.
///
/// All state is reset between uses; accessors exist so hosts and tests can
/// observe a run's forward path and verify pool hygiene.
#[derive(Default)]
pub struct Flow {
    run_id: u64,
    graph: Option<Arc<CompiledGraph>>,
    owner: Option<HostId>,
    event: Option<String>,
    args: Vec<Value>,
    next: Option<NodeId>,
    path: Vec<NodeId>,
    visited: FxHashSet<NodeId>,
    outputs: FxHashMap<(NodeId, PortKey), Value>,
    return_value: Option<Value>,
    cancel: Option<CancelSignal>,
    suppress_cancel: bool,
    depth: u32,
}

impl Flow {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn begin(
        &mut self,
        run_id: u64,
        graph: Arc<CompiledGraph>,
        owner: HostId,
        event: String,
        args: Vec<Value>,
        cancel: CancelSignal,
        suppress_cancel: bool,
        depth: u32,
    ) {
        self.run_id = run_id;
        self.graph = Some(graph);
        self.owner = Some(owner);
        self.event = Some(event);
        self.args = args;
        self.cancel = Some(cancel);
        self.suppress_cancel = suppress_cancel;
        self.depth = depth;
    }

    /// Clear every field, keeping allocation capacity for reuse.
    pub(crate) fn reset(&mut self) {
        self.run_id = 0;
        self.graph = None;
        self.owner = None;
        self.event = None;
        self.args.clear();
        self.next = None;
        self.path.clear();
        self.visited.clear();
        self.outputs.clear();
        self.return_value = None;
        self.cancel = None;
        self.suppress_cancel = false;
        self.depth = 0;
    }

    /// Identifier of this run, unique per engine.
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Node ids already executed in this run, in execution order.
    #[must_use]
    pub fn forward_path(&self) -> &[NodeId] {
        &self.path
    }

    /// The pending control-flow successor, if a node set one.
    #[must_use]
    pub fn next_node(&self) -> Option<&NodeId> {
        self.next.as_ref()
    }

    /// Sub-graph call nesting depth of this run (0 for event fires).
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether this run should stop: the owner's signal tripped and this is
    /// not a teardown-event run.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        !self.suppress_cancel
            && self
                .cancel
                .as_ref()
                .is_some_and(CancelSignal::is_cancelled)
    }

    /// True when every field is cleared, the state a flow must be in when it
    /// re-enters the pool.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.graph.is_none()
            && self.owner.is_none()
            && self.event.is_none()
            && self.args.is_empty()
            && self.next.is_none()
            && self.path.is_empty()
            && self.visited.is_empty()
            && self.outputs.is_empty()
            && self.return_value.is_none()
            && self.cancel.is_none()
            && !self.suppress_cancel
            && self.depth == 0
    }

    pub(crate) fn take_return(&mut self) -> Option<Value> {
        self.return_value.take()
    }
}

/// Traversal driver handed to node behaviors: the flow state plus the engine
/// and graph it runs against.
pub struct FlowCtx<'e> {
    engine: &'e Engine,
    graph: Arc<CompiledGraph>,
    current: NodeId,
    flow: &'e mut Flow,
}

impl<'e> FlowCtx<'e> {
    pub(crate) fn new(
        engine: &'e Engine,
        graph: Arc<CompiledGraph>,
        entry: NodeId,
        flow: &'e mut Flow,
    ) -> Self {
        Self {
            engine,
            graph,
            current: entry,
            flow,
        }
    }

    /// Id of the node currently executing.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.current
    }

    /// The compiled graph this run traverses.
    #[must_use]
    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }

    /// The engine driving this run.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// The context object this run is performed on behalf of.
    #[must_use]
    pub fn owner(&self) -> HostId {
        self.flow.owner.expect("flow not started")
    }

    /// The triggering event's payload arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.flow.args
    }

    /// The variable scope chain of the owning document.
    #[must_use]
    pub fn scope(&self) -> &Arc<VariableScope> {
        self.graph.scope()
    }

    /// Set (or clear) the control-flow successor chased after this node.
    pub fn set_next(&mut self, next: Option<NodeId>) {
        self.flow.next = next;
    }

    /// Capture the sub-graph return value and end this path.
    pub fn set_return(&mut self, value: Value) {
        self.flow.return_value = Some(value);
        self.flow.next = None;
    }

    /// Resolve one input port of the current node: active connection first,
    /// then variable binding, then literal default.
    pub fn resolve_input(&self, key: &PortKey) -> Result<Value, FlowError> {
        let node = self
            .graph
            .node(&self.current)
            .ok_or_else(|| FlowError::UnknownNode {
                graph: self.graph.guid(),
                node: self.current.clone(),
            })?;
        let port = node
            .ports
            .iter()
            .find(|p| p.is_input() && p.key() == *key)
            .ok_or_else(|| FlowError::UnresolvedInput {
                node: self.current.clone(),
                port: key.clone(),
            })?;

        if let Some(conn) = port.connections.first() {
            // Delegate outputs resolve statically: the value is a callback,
            // bound at compile time, and reading it never executes the
            // source node.
            if let Some(src) = self.graph.node(&conn.node) {
                if let Some(src_port) = src
                    .ports
                    .iter()
                    .find(|p| p.is_output() && p.key() == conn.key())
                {
                    if let Some(event) = &src_port.delegate {
                        return Ok(Value::Delegate(DelegateRef {
                            graph: self.graph.guid(),
                            event: event.clone(),
                        }));
                    }
                }
            }
            let produced = self
                .flow
                .outputs
                .get(&(conn.node.clone(), conn.key()))
                .cloned();
            if produced.is_none() {
                tracing::debug!(
                    node = %self.current,
                    port = %key,
                    source = %conn.node,
                    "connected source produced no value, reading null"
                );
            }
            return Ok(produced.unwrap_or(Value::Null));
        }

        if let Some(variable) = &port.variable {
            if let Some(value) = self.graph.scope().get(variable) {
                return Ok(value);
            }
            tracing::debug!(
                node = %self.current,
                variable = %variable,
                "bound variable has no cell yet, reading null"
            );
            return Ok(Value::Null);
        }

        if let Some(literal) = &port.default {
            return Ok(Value::from_json(literal));
        }

        Err(FlowError::UnresolvedInput {
            node: self.current.clone(),
            port: key.clone(),
        })
    }

    /// Resolve every declared input port of the current node, in declaration
    /// order.
    pub fn input_values(&self) -> Result<Vec<Value>, FlowError> {
        let keys = self.input_keys();
        keys.iter().map(|k| self.resolve_input(k)).collect()
    }

    /// Resolve the first declared input of the current node, or null when the
    /// node declares none.
    pub fn first_input(&self) -> Result<Value, FlowError> {
        match self.input_keys().first() {
            Some(key) => self.resolve_input(key),
            None => Ok(Value::Null),
        }
    }

    /// Store a produced value on an output port of the current node, visible
    /// to downstream input ports within this run only.
    pub fn write_output(&mut self, key: PortKey, value: Value) {
        self.flow
            .outputs
            .insert((self.current.clone(), key), value);
    }

    /// Store produced values onto the current node's declared output ports,
    /// in declaration order, skipping delegate ports.
    pub fn write_outputs_in_order(&mut self, values: Vec<Value>) {
        let keys = self.output_keys();
        if values.len() > keys.len() {
            tracing::debug!(
                node = %self.current,
                produced = values.len(),
                declared = keys.len(),
                "node produced more values than declared output ports"
            );
        }
        for (key, value) in keys.into_iter().zip(values) {
            self.write_output(key, value);
        }
    }

    fn input_keys(&self) -> Vec<PortKey> {
        self.graph
            .node(&self.current)
            .map(|n| {
                n.ports
                    .iter()
                    .filter(|p| p.is_input())
                    .map(|p| p.key())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn output_keys(&self) -> Vec<PortKey> {
        self.graph
            .node(&self.current)
            .map(|n| {
                n.ports
                    .iter()
                    .filter(|p| p.is_output() && p.delegate.is_none())
                    .map(|p| p.key())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forward a child node from inside a behavior (sequence steps).
    pub async fn forward_child(&mut self, id: &NodeId) -> Result<(), FlowError> {
        let caller = self.current.clone();
        let result = self.forward(id.clone()).await;
        self.current = caller;
        result
    }

    /// Compile (if needed) and traverse a named sub-graph slot, firing its
    /// synthesized `call` event with `args`; yields the nested run's declared
    /// return value.
    pub async fn call_sub_graph(
        &mut self,
        slot: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, FlowError> {
        let depth = self.flow.depth + 1;
        if depth > self.engine.config().max_call_depth {
            return Err(FlowError::CallDepthExceeded { depth });
        }
        let compiled = self
            .graph
            .slots()
            .ensure(slot, &self.engine.compiler())
            .map_err(|source| FlowError::SubGraphCompile {
                slot: slot.to_string(),
                source,
            })?
            .ok_or_else(|| FlowError::SubGraphMissing {
                slot: slot.to_string(),
            })?;
        self.engine
            .run_event(&compiled, self.owner(), CALL_EVENT, args, depth)
            .await
    }

    /// Run a closure over the owner's mutable property bag.
    pub fn host_properties<R>(
        &self,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Result<R, FlowError> {
        let owner = self.owner();
        self.engine
            .hosts()
            .with_properties(owner, f)
            .ok_or(FlowError::HostGone { owner })
    }

    /// The forward-traversal procedure; see the module docs for the steps.
    pub(crate) fn forward(&mut self, id: NodeId) -> BoxFuture<'_, Result<(), FlowError>> {
        async move {
            if self.flow.cancelled() {
                return Err(FlowError::Cancelled);
            }
            if self.flow.visited.contains(&id) {
                return Ok(());
            }

            let (deps, behavior) = {
                let node = self
                    .graph
                    .node(&id)
                    .ok_or_else(|| FlowError::UnknownNode {
                        graph: self.graph.guid(),
                        node: id.clone(),
                    })?;
                (node.deps.clone(), node.behavior.clone())
            };

            for dep in deps.iter() {
                if self.flow.visited.contains(dep) {
                    continue;
                }
                self.forward(dep.clone()).await?;
            }

            self.flow.visited.insert(id.clone());
            self.flow.path.push(id.clone());

            let at = NodeRef {
                graph: self.graph.guid(),
                node: id.clone(),
            };
            let tracker = self.engine.active_tracker();
            tracker.enter(&at).await;

            tracing::debug!(node = %id, kind = behavior.kind(), run = self.flow.run_id, "executing node");
            self.current = id;
            behavior.execute(self).await?;

            tracker.exit(&at).await;

            while let Some(next) = self.flow.next.take() {
                self.forward(next).await?;
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_flow_is_pristine() {
        assert!(Flow::default().is_pristine());
    }

    #[test]
    fn cancellation_respects_teardown_suppression() {
        let mut flow = Flow::default();
        let signal = CancelSignal::new();
        signal.cancel();
        flow.cancel = Some(signal);
        assert!(flow.cancelled());

        flow.suppress_cancel = true;
        assert!(!flow.cancelled());
    }

    #[test]
    fn reset_clears_every_field() {
        let mut flow = Flow::default();
        flow.run_id = 7;
        flow.args.push(Value::Int(1));
        flow.next = Some(NodeId::new("n"));
        flow.path.push(NodeId::new("n"));
        flow.visited.insert(NodeId::new("n"));
        flow.outputs
            .insert((NodeId::new("n"), PortKey::named("out")), Value::Int(2));
        flow.return_value = Some(Value::Null);
        flow.cancel = Some(CancelSignal::new());
        flow.suppress_cancel = true;
        flow.depth = 3;

        flow.reset();
        assert!(flow.is_pristine());
        assert_eq!(flow.run_id(), 0);
    }
}
