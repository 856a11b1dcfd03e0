//! The serialized, author-facing graph document schema.
//!
//! A [`GraphDocument`] is what the editor produces and the compiler consumes:
//! an ordered sequence of node specs, a variable table, named sub-graph slots
//! (top-level documents only), and editor-only node-group metadata carried as
//! opaque passthrough. The concrete encoding is serde; the logical schema is
//! what matters to the engine.
//!
//! Node variants are a serde-tagged enum ([`NodeSpecKind`]); variant fields
//! replace what the original runtime discovered by reflection, so binding is
//! a table lookup at compile time, never a runtime search.

use serde::{Deserialize, Serialize};

use crate::port::PortSpec;
use crate::registry::{FunctionKey, MemberKey};
use crate::types::{GraphId, NodeId};
use crate::value::ValueType;

/// Declaration of one variable cell in a document's table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Cell name, unique within the document's table.
    pub name: String,
    /// Declared type; `Any` when unspecified.
    #[serde(default)]
    pub value_type: ValueType,
    /// Initial value literal.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Shared across instances outside the owning document.
    #[serde(default)]
    pub is_global: bool,
    /// Editable from outside the graph.
    #[serde(default)]
    pub is_exposed: bool,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::Any,
            value,
            is_global: false,
            is_exposed: false,
        }
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

/// How a sub-graph slot is used by its owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SlotUsage {
    /// Callable function: entered through the synthesized `call` event,
    /// returns through a return node.
    #[default]
    Function,
}

/// A named nested document reachable from its top-level owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubGraphSlot {
    /// Slot name, referenced by sub-graph-call nodes.
    pub name: String,
    /// Guid of the nested document.
    pub guid: GraphId,
    /// Usage of the slot.
    #[serde(default)]
    pub usage: SlotUsage,
    /// The nested document itself. Sub-graphs cannot own further slots.
    pub document: GraphDocument,
}

/// Variant-specific fields of a node, tagged by `type` in the document.
///
/// `next` fields are the declared control-flow successor the execution
/// context chases after the node runs; data dependencies are expressed
/// through input-port connections, never through `next`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeSpecKind {
    /// Event-entry node: traversal starts here when the named event fires;
    /// its output ports publish the event's arguments.
    Event {
        event: String,
        #[serde(default)]
        next: Option<NodeId>,
    },
    /// Plain action node bound to a registered function.
    Invoke {
        function: FunctionKey,
        #[serde(default)]
        next: Option<NodeId>,
    },
    /// Reads a property of the context object (pure; participates in data
    /// dependencies only).
    GetProperty { member: MemberKey },
    /// Writes a property of the context object.
    SetProperty {
        member: MemberKey,
        #[serde(default)]
        next: Option<NodeId>,
    },
    /// Writes its input into the named variable cell.
    SetVariable {
        variable: String,
        #[serde(default)]
        next: Option<NodeId>,
    },
    /// Calls a named sub-graph slot as a function.
    SubGraphCall {
        slot: String,
        #[serde(default)]
        next: Option<NodeId>,
    },
    /// Runs each step target in declared order.
    Sequence { steps: Vec<NodeId> },
    /// Routes to one of two successors on a boolean condition.
    Branch {
        #[serde(default)]
        on_true: Option<NodeId>,
        #[serde(default)]
        on_false: Option<NodeId>,
    },
    /// Routes by integer selector into a target array.
    Switch {
        targets: Vec<Option<NodeId>>,
        #[serde(default)]
        default: Option<NodeId>,
    },
    /// Collects its `item` port array into one array value (pure).
    MakeArray { size: usize },
    /// Captures its input as the sub-graph's return value and ends the path.
    Return,
}

/// Editor canvas position. Layout-only; irrelevant to execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// One node in a document: stable id, variant fields, ports, layout position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Stable id, unique within the document.
    pub id: NodeId,
    /// Variant-specific fields, tagged by `type`.
    #[serde(flatten)]
    pub kind: NodeSpecKind,
    /// Canvas position (passthrough).
    #[serde(default)]
    pub position: Position,
    /// Declared ports, in declaration order. Order is load-bearing: it is the
    /// deterministic tie-break for dependency paths.
    #[serde(default)]
    pub ports: Vec<PortSpec>,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, kind: NodeSpecKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            ports: Vec::new(),
        }
    }

    /// Shorthand for an event-entry node.
    pub fn event(id: impl Into<NodeId>, event: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeSpecKind::Event {
                event: event.into(),
                next: None,
            },
        )
    }

    /// Shorthand for an action node bound to `function`.
    pub fn invoke(id: impl Into<NodeId>, function: FunctionKey) -> Self {
        Self::new(
            id,
            NodeSpecKind::Invoke {
                function,
                next: None,
            },
        )
    }

    /// Append a port declaration.
    #[must_use]
    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.ports.push(port);
        self
    }

    /// Set the control-flow successor on variants that carry one.
    #[must_use]
    pub fn with_next(mut self, next: impl Into<NodeId>) -> Self {
        let next = Some(next.into());
        match &mut self.kind {
            NodeSpecKind::Event { next: n, .. }
            | NodeSpecKind::Invoke { next: n, .. }
            | NodeSpecKind::SetProperty { next: n, .. }
            | NodeSpecKind::SetVariable { next: n, .. }
            | NodeSpecKind::SubGraphCall { next: n, .. } => *n = next,
            other => {
                tracing::warn!(kind = ?other, "with_next on a variant without a next field");
            }
        }
        self
    }
}

/// The serialized, author-facing description of a graph.
///
/// # Examples
///
/// ```rust
/// use wireflow::document::{GraphDocument, NodeSpec};
/// use wireflow::port::PortSpec;
/// use wireflow::registry::FunctionKey;
///
/// let doc = GraphDocument::new()
///     .with_node(NodeSpec::event("start", "on_start").with_next("say"))
///     .with_node(
///         NodeSpec::invoke("say", FunctionKey::new("Console", "log", 1))
///             .with_port(PortSpec::input("message").with_default(serde_json::json!("hi"))),
///     );
///
/// let json = serde_json::to_string(&doc).unwrap();
/// let restored: GraphDocument = serde_json::from_str(&json).unwrap();
/// assert_eq!(doc, restored);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Document guid, minted at authoring time.
    #[serde(default)]
    pub guid: GraphId,
    /// Ordered node sequence.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Variable table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableSpec>,
    /// Named sub-graph slots. Only top-level documents may own slots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_graphs: Vec<SubGraphSlot>,
    /// Editor-only node grouping metadata, carried opaque and ignored by the
    /// engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_groups: Vec<serde_json::Value>,
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphDocument {
    /// An empty document with a fresh guid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            guid: GraphId::random(),
            nodes: Vec::new(),
            variables: Vec::new(),
            sub_graphs: Vec::new(),
            node_groups: Vec::new(),
        }
    }

    /// Append a node.
    #[must_use]
    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append a variable declaration.
    #[must_use]
    pub fn with_variable(mut self, variable: VariableSpec) -> Self {
        self.variables.push(variable);
        self
    }

    /// Attach a nested document as a named function slot.
    #[must_use]
    pub fn with_sub_graph(mut self, name: impl Into<String>, document: GraphDocument) -> Self {
        self.sub_graphs.push(SubGraphSlot {
            name: name.into(),
            guid: document.guid,
            usage: SlotUsage::Function,
            document,
        });
        self
    }

    /// Find a node spec by id.
    #[must_use]
    pub fn find_node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}
