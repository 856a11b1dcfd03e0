//! Port declarations: the typed value slots owned by nodes.
//!
//! A port belongs to exactly one node. Input ports take their value from at
//! most one *active source*: a connection to another node's output port, a
//! binding to a named variable, or a literal default. Output ports hold
//! values produced during one traversal, or, for delegate ports, a
//! statically bound callback to an event-entry node.
//!
//! The at-most-one-source invariant is validated at compile time; see
//! [`PortSpec::active_sources`].

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, PortKey};
use crate::value::ValueType;

/// Direction of a port relative to its owning node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// Reference to a port on another node, used by connections.
///
/// `index` addresses one element of a port array on the target.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Target node id.
    pub node: NodeId,
    /// Target port name.
    pub port: String,
    /// Target array element, for port arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl PortRef {
    /// Reference a plain port on `node`.
    pub fn new(node: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
            index: None,
        }
    }

    /// Reference one element of a port array on `node`.
    pub fn indexed(node: impl Into<NodeId>, port: impl Into<String>, index: usize) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
            index: Some(index),
        }
    }

    /// The port key this reference addresses on the target node.
    #[must_use]
    pub fn key(&self) -> PortKey {
        PortKey {
            name: self.port.clone(),
            index: self.index,
        }
    }
}

/// Declaration of one port on a node.
///
/// Built with the fluent `with_*` helpers:
///
/// ```rust
/// use wireflow::port::{PortRef, PortSpec};
/// use wireflow::value::ValueType;
///
/// // An input fed by another node's output.
/// let wired = PortSpec::input("a").with_connection(PortRef::new("add_1", "result"));
///
/// // An input falling back to a literal.
/// let defaulted = PortSpec::input("b")
///     .typed(ValueType::Int)
///     .with_default(serde_json::json!(0));
///
/// assert_eq!(wired.active_sources(), 1);
/// assert_eq!(defaulted.active_sources(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Declared port name.
    pub name: String,
    /// Input or output.
    pub direction: PortDirection,
    /// Array element index, when this port is part of a port array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Declared value type; `Any` when unspecified.
    #[serde(default)]
    pub value_type: ValueType,
    /// For inputs: the (single) upstream source. For outputs: outgoing
    /// connections, recorded for the editor; the engine reads connections
    /// from the input side.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<PortRef>,
    /// Binding to a named variable in the owning document's scope chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// Literal default, used when no connection or binding is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// For outputs only: the event-entry node this delegate port is bound to.
    /// Reading the port yields a callback value; it never executes the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
}

impl PortSpec {
    /// Declare an input port.
    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Input)
    }

    /// Declare an output port.
    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Output)
    }

    fn new(name: impl Into<String>, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            index: None,
            value_type: ValueType::Any,
            connections: Vec::new(),
            variable: None,
            default: None,
            delegate: None,
        }
    }

    /// Set the declared value type.
    #[must_use]
    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Make this port element `index` of a port array.
    #[must_use]
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Connect this port to another node's port.
    #[must_use]
    pub fn with_connection(mut self, source: PortRef) -> Self {
        self.connections.push(source);
        self
    }

    /// Bind this port to a named variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variable = Some(name.into());
        self
    }

    /// Give this port a literal default value.
    #[must_use]
    pub fn with_default(mut self, literal: serde_json::Value) -> Self {
        self.default = Some(literal);
        self
    }

    /// Bind this output port as a delegate to an event-entry node.
    #[must_use]
    pub fn with_delegate(mut self, event: impl Into<String>) -> Self {
        self.delegate = Some(event.into());
        self.value_type = ValueType::Delegate;
        self
    }

    /// The key addressing this port on its owning node.
    #[must_use]
    pub fn key(&self) -> PortKey {
        PortKey {
            name: self.name.clone(),
            index: self.index,
        }
    }

    /// Number of value sources set on this port. Inputs need at least one;
    /// when several are set, resolution order picks the active one
    /// (connection, then variable binding, then literal default).
    #[must_use]
    pub fn active_sources(&self) -> usize {
        usize::from(!self.connections.is_empty())
            + usize::from(self.variable.is_some())
            + usize::from(self.default.is_some())
    }

    /// Whether this is an input port.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Whether this is an output port.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}
