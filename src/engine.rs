//! The engine: compilation entry point, event dispatch, tracker stack, pool.
//!
//! One `Engine` per host process is the expected shape. It owns the binding
//! registry, the topmost variable scope, the context-object registry, the
//! flow pool, and the weak graph registry that delegate values and woven
//! dispatch calls resolve against.
//!
//! Dispatch surface:
//! - [`Engine::execute_event`]: fire an event on a graph, propagating flow
//!   errors to the caller.
//! - [`Engine::try_execute_event`]: probe-safe, unknown event names
//!   are a logged `false`, never a panic or error.
//! - [`Engine::dispatch`]: the code-weaving bridge; generated call sites
//!   invoke `dispatch(owner, args_or_none, event_name)` and the engine maps
//!   it onto the entry points above via the owner's attached graph.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::instrument;

use crate::compiler::{CompileError, Compiler};
use crate::document::GraphDocument;
use crate::flow::{FlowCtx, FlowError, FlowGuard, FlowPool};
use crate::graph::{CompiledGraph, GraphRegistry};
use crate::host::{CancelSignal, HostId, HostRegistry};
use crate::registry::FunctionRegistry;
use crate::tracker::{NoopTracker, Tracker};
use crate::value::{DelegateRef, Value};
use crate::variables::VariableScope;

/// Engine knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Event name treated as the owner's teardown notification: runs fired
    /// with this name suppress cancellation so teardown-time logic completes
    /// even though the owner is being destroyed.
    pub teardown_event: String,
    /// Maximum sub-graph call nesting before a run fails with
    /// [`FlowError::CallDepthExceeded`], the guard against unconditionally
    /// cyclic sub-graph calls.
    pub max_call_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            teardown_event: "on_teardown".to_string(),
            max_call_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Override the teardown event name.
    #[must_use]
    pub fn with_teardown_event(mut self, event: impl Into<String>) -> Self {
        self.teardown_event = event.into();
        self
    }

    /// Override the sub-graph call depth limit.
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }
}

/// Compilation and dispatch runtime for flow graphs.
///
/// # Examples
///
/// ```rust,no_run
/// use wireflow::document::{GraphDocument, NodeSpec};
/// use wireflow::engine::Engine;
/// use wireflow::registry::{FunctionKey, FunctionRegistry};
/// use wireflow::value::Value;
///
/// # async fn example() -> miette::Result<()> {
/// let registry = FunctionRegistry::new().with_function(
///     FunctionKey::new("Console", "log", 1),
///     |args| {
///         println!("{}", args[0]);
///         Ok(vec![])
///     },
/// );
/// let engine = Engine::new(registry);
///
/// let doc = GraphDocument::new()
///     .with_node(NodeSpec::event("start", "on_start").with_next("say"))
///     .with_node(NodeSpec::invoke("say", FunctionKey::new("Console", "log", 1)));
/// let graph = engine.compile(&doc)?;
///
/// let owner = engine.register_host("Agent", Some(&graph));
/// engine.execute_event(&graph, owner, "on_start", vec![]).await?;
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    registry: Arc<FunctionRegistry>,
    globals: Arc<VariableScope>,
    hosts: HostRegistry,
    trackers: RwLock<Vec<Arc<dyn Tracker>>>,
    noop: Arc<dyn Tracker>,
    pool: FlowPool,
    graphs: GraphRegistry,
    config: EngineConfig,
    run_ids: AtomicU64,
}

impl Engine {
    /// Engine with default configuration.
    #[must_use]
    pub fn new(registry: FunctionRegistry) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Engine with explicit configuration.
    #[must_use]
    pub fn with_config(registry: FunctionRegistry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            globals: VariableScope::root("globals"),
            hosts: HostRegistry::new(),
            trackers: RwLock::new(Vec::new()),
            noop: Arc::new(NoopTracker),
            pool: FlowPool::new(),
            graphs: GraphRegistry::new(),
            config,
            run_ids: AtomicU64::new(1),
        }
    }

    /// The binding registry this engine compiles against.
    #[must_use]
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// The topmost variable scope. Compiled graphs chain onto it; global
    /// variables live here.
    #[must_use]
    pub fn globals(&self) -> &Arc<VariableScope> {
        &self.globals
    }

    /// The context-object registry.
    #[must_use]
    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    /// The flow pool (exposed for pool-hygiene observation).
    #[must_use]
    pub fn pool(&self) -> &FlowPool {
        &self.pool
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn graphs(&self) -> &GraphRegistry {
        &self.graphs
    }

    pub(crate) fn compiler(&self) -> Compiler {
        Compiler::new(self.registry.clone(), self.graphs.clone())
    }

    /// Compile a document into its runtime projection and register it for
    /// delegate back-references. Per-node defects degrade and are recorded as
    /// diagnostics on the result.
    pub fn compile(&self, document: &GraphDocument) -> Result<Arc<CompiledGraph>, CompileError> {
        self.compiler().compile(document, self.globals.clone())
    }

    /// Like [`compile`](Self::compile), but a non-empty diagnostics list is a
    /// [`CompileError::Validation`], the editor-facing strict mode.
    pub fn compile_strict(
        &self,
        document: &GraphDocument,
    ) -> Result<Arc<CompiledGraph>, CompileError> {
        let graph = self.compile(document)?;
        if graph.diagnostics().is_empty() {
            Ok(graph)
        } else {
            Err(CompileError::Validation {
                diagnostics: graph.diagnostics().to_vec(),
            })
        }
    }

    /// Register a context object, optionally attaching the graph its woven
    /// event methods dispatch into.
    pub fn register_host(
        &self,
        type_name: impl Into<String>,
        graph: Option<&Arc<CompiledGraph>>,
    ) -> HostId {
        self.hosts.register(type_name, graph.map(|g| g.guid()))
    }

    /// Destroy a context object: trip its cancellation signal, run its
    /// graph's teardown event to completion (cancellation suppressed), then
    /// drop the registry entry.
    #[instrument(skip(self))]
    pub async fn destroy_host(&self, owner: HostId) {
        self.hosts.cancel(owner);
        if let Some(graph) = self
            .hosts
            .graph_of(owner)
            .and_then(|gid| self.graphs.resolve(gid))
        {
            if graph.find_event(&self.config.teardown_event).is_some() {
                let teardown = self.config.teardown_event.clone();
                if let Err(error) = self.execute_event(&graph, owner, &teardown, vec![]).await {
                    tracing::warn!(%owner, %error, "teardown event failed");
                }
            }
        }
        self.hosts.remove(owner);
    }

    /// Push a tracker, making it the active one. The previous tracker is
    /// saved underneath.
    pub fn activate_tracker(&self, tracker: Arc<dyn Tracker>) {
        self.trackers.write().unwrap().push(tracker);
    }

    /// Pop the active tracker, restoring whichever was active before it.
    pub fn deactivate_tracker(&self) -> Option<Arc<dyn Tracker>> {
        self.trackers.write().unwrap().pop()
    }

    pub(crate) fn active_tracker(&self) -> Arc<dyn Tracker> {
        self.trackers
            .read()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_else(|| self.noop.clone())
    }

    /// Name-keyed event lookup on a compiled graph.
    #[must_use]
    pub fn find_event<'g>(
        &self,
        graph: &'g Arc<CompiledGraph>,
        name: &str,
    ) -> Option<&'g crate::types::NodeId> {
        graph.find_event(name)
    }

    /// Fire a named event on a graph and drive the traversal to completion
    /// (or to its first unbounded suspension inside a tracker hook).
    #[instrument(skip(self, graph, args), fields(graph = %graph.guid()))]
    pub async fn execute_event(
        &self,
        graph: &Arc<CompiledGraph>,
        owner: HostId,
        event: &str,
        args: Vec<Value>,
    ) -> Result<(), FlowError> {
        self.run_event(graph, owner, event, args, 0).await.map(|_| ())
    }

    /// Probe-safe dispatch: `false` when the event name is unknown. Runtime
    /// failures inside a found event are logged, not returned; callers that
    /// do not know whether a name exists must be able to probe safely.
    pub async fn try_execute_event(
        &self,
        graph: &Arc<CompiledGraph>,
        owner: HostId,
        event: &str,
        args: Vec<Value>,
    ) -> bool {
        match self.run_event(graph, owner, event, args, 0).await {
            Ok(_) => true,
            Err(FlowError::UnknownEvent { event }) => {
                tracing::warn!(%event, graph = %graph.guid(), "dispatch to unknown event");
                false
            }
            Err(FlowError::Cancelled) => {
                tracing::debug!(event, "run cancelled");
                true
            }
            Err(error) => {
                tracing::warn!(event, %error, "event run failed");
                true
            }
        }
    }

    /// The code-weaving bridge: generated call sites invoke
    /// `dispatch(owner, args_or_none, event_name)`. Resolves the owner's
    /// attached graph and maps 1:1 onto [`try_execute_event`](Self::try_execute_event).
    #[instrument(skip(self, args))]
    pub async fn dispatch(
        &self,
        owner: HostId,
        args: Option<Vec<Value>>,
        event: &str,
    ) -> bool {
        let Some(guid) = self.hosts.graph_of(owner) else {
            tracing::warn!(%owner, "dispatch for host with no attached graph");
            return false;
        };
        let Some(graph) = self.graphs.resolve(guid) else {
            tracing::warn!(%owner, %guid, "dispatch target graph is gone");
            return false;
        };
        self.try_execute_event(&graph, owner, event, args.unwrap_or_default())
            .await
    }

    /// Invoke a delegate value: resolve its owning graph through the weak
    /// registry (the graph may be gone) and fire the bound event.
    pub async fn invoke_delegate(
        &self,
        delegate: &DelegateRef,
        owner: HostId,
        args: Vec<Value>,
    ) -> Result<(), FlowError> {
        let Some(graph) = self.graphs.resolve(delegate.graph) else {
            return Err(FlowError::DelegateRevoked {
                graph: delegate.graph,
            });
        };
        self.execute_event(&graph, owner, &delegate.event, args).await
    }

    /// Drive one run: acquire a pooled flow, traverse from the event's entry
    /// node, and yield the run's declared return value (sub-graph calls).
    ///
    /// The flow guard releases the fully reset flow on every exit path.
    pub(crate) async fn run_event(
        &self,
        graph: &Arc<CompiledGraph>,
        owner: HostId,
        event: &str,
        args: Vec<Value>,
        depth: u32,
    ) -> Result<Option<Value>, FlowError> {
        let Some(entry) = graph.find_event(event).cloned() else {
            return Err(FlowError::UnknownEvent {
                event: event.to_string(),
            });
        };

        // A destroyed (unregistered) owner means the run is cancelled from
        // birth, unless this is the teardown notification itself.
        let cancel = self.hosts.cancel_signal(owner).unwrap_or_else(|| {
            let signal = CancelSignal::new();
            signal.cancel();
            signal
        });
        let suppress_cancel = event == self.config.teardown_event;
        let run_id = self.run_ids.fetch_add(1, Ordering::Relaxed);

        let mut guard = FlowGuard::new(&self.pool);
        guard.flow_mut().begin(
            run_id,
            graph.clone(),
            owner,
            event.to_string(),
            args,
            cancel,
            suppress_cancel,
            depth,
        );
        guard.attach(graph.clone());

        tracing::debug!(run = run_id, event, entry = %entry, depth, "run started");
        let result = {
            let flow = guard.flow_mut();
            let mut ctx = FlowCtx::new(self, graph.clone(), entry.clone(), flow);
            ctx.forward(entry).await
        };

        match result {
            Ok(()) => {
                let returned = guard.flow_mut().take_return();
                tracing::debug!(run = run_id, event, "run completed");
                Ok(returned)
            }
            Err(FlowError::Cancelled) => {
                tracing::debug!(run = run_id, event, "run cancelled");
                Err(FlowError::Cancelled)
            }
            Err(error) => {
                tracing::warn!(run = run_id, event, %error, "run failed");
                Err(error)
            }
        }
    }
}
