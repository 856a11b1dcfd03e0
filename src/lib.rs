//! # Wireflow: Node-Graph Flow Execution Engine
//!
//! Wireflow compiles serialized node-graph documents into executable graphs
//! and runs them, asynchronously and re-entrantly, in response to named
//! events. The engine resolves per-node data dependencies through
//! precomputed dependency paths, guarantees each node runs at most once per
//! triggered execution, supports cooperative suspension (pausing mid-graph
//! for a debugger), and supports nested sub-graphs callable as functions.
//!
//! ## Core Concepts
//!
//! - **Documents**: Serialized graphs of typed nodes, ports, and variables
//! - **Compilation**: One walk that binds descriptors to callables and caches
//!   each node's dependency path
//! - **Flows**: Pooled, cancellable execution contexts, one per event fire
//! - **Trackers**: The observer hook around every node execution, and the only
//!   suspension points in a traversal
//! - **Dispatch**: Name-keyed event lookup plus the code-weaving bridge
//!
//! ## Quick Start
//!
//! ```rust
//! use wireflow::document::{GraphDocument, NodeSpec};
//! use wireflow::engine::Engine;
//! use wireflow::port::PortSpec;
//! use wireflow::registry::{FunctionKey, FunctionRegistry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> miette::Result<()> {
//! // Bind the functions graphs may reference.
//! let registry = FunctionRegistry::new().with_function(
//!     FunctionKey::new("Console", "log", 1),
//!     |args| {
//!         println!("{}", args[0]);
//!         Ok(vec![])
//!     },
//! );
//! let engine = Engine::new(registry);
//!
//! // One event wired to one action: on_start -> log("hi").
//! let doc = GraphDocument::new()
//!     .with_node(NodeSpec::event("start", "on_start").with_next("say"))
//!     .with_node(
//!         NodeSpec::invoke("say", FunctionKey::new("Console", "log", 1))
//!             .with_port(PortSpec::input("message").with_default(serde_json::json!("hi"))),
//!     );
//!
//! let graph = engine.compile(&doc).map_err(miette::Report::from)?;
//! let owner = engine.register_host("Agent", Some(&graph));
//! assert!(engine.try_execute_event(&graph, owner, "on_start", vec![]).await);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`document`] - Serialized graph schema: nodes, ports, variables, slots
//! - [`value`] - Runtime values and the static port type lattice
//! - [`variables`] - Variable cells and the explicit scope chain
//! - [`registry`] - `(type, member, arity)` to callable binding table
//! - [`compiler`] - Binding, validation, dependency precomputation
//! - [`graph`] - The compiled graph and its slot/graph registries
//! - [`nodes`] - Bound node behaviors (event, invoke, control flow, ...)
//! - [`flow`] - Execution contexts, forward traversal, pooling
//! - [`tracker`] - Observation and single-stepping hooks
//! - [`engine`] - Dispatch entry points and runtime ownership
//! - [`telemetry`] - Tracing setup and trace-event rendering

pub mod compiler;
pub mod document;
pub mod engine;
pub mod flow;
pub mod graph;
pub mod host;
pub mod nodes;
pub mod port;
pub mod registry;
pub mod telemetry;
pub mod tracker;
pub mod types;
pub mod utils;
pub mod value;
pub mod variables;
