//! Core identifier types for the Wireflow execution engine.
//!
//! This module defines the fundamental identifiers used throughout the
//! system: node ids, graph guids, and port keys. These are the core domain
//! concepts that name things inside a graph document.
//!
//! # Key Types
//!
//! - [`NodeId`]: Stable string guid identifying a node within one document
//! - [`GraphId`]: Guid identifying a (compiled) graph document
//! - [`PortKey`]: Name plus optional array index addressing a port on a node
//!
//! # Examples
//!
//! ```rust
//! use wireflow::types::{NodeId, PortKey};
//!
//! let id: NodeId = "on_start".into();
//! assert_eq!(id.as_str(), "on_start");
//!
//! let slot = PortKey::indexed("item", 2);
//! assert_eq!(slot.to_string(), "item[2]");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Event name fired at a sub-graph's synthesized entry when it is called as a
/// function. Sub-graph documents declare an event node with this name to
/// receive the caller's argument ports.
pub const CALL_EVENT: &str = "call";

/// Stable identifier of a node within a single graph document.
///
/// Node ids are author-assigned string guids. Identity is immutable once a
/// document is compiled: dependency paths and forward-path logs are keyed by
/// node id. Ids are unique within one compiled document instance; each
/// sub-graph is its own namespace.
///
/// # Examples
///
/// ```rust
/// use wireflow::types::NodeId;
///
/// let a = NodeId::new("branch_1");
/// let b: NodeId = "branch_1".into();
/// assert_eq!(a, b);
///
/// // Freshly minted ids are guids and never collide in practice.
/// assert_ne!(NodeId::random(), NodeId::random());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from an author-assigned string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh guid-backed node id (editor authoring path).
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Guid identifying a graph document and its compiled projection.
///
/// Delegate values carry a `GraphId` instead of a strong reference so that a
/// callback leaked outside a graph cannot keep the whole document alive; the
/// engine's graph registry resolves the id back to the graph (or reports it
/// gone) at invocation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(Uuid);

impl GraphId {
    /// Mint a fresh graph guid.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying uuid.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses one port on a node: a name plus an optional array index.
///
/// Port arrays (e.g. the `item` inputs of a make-array node) declare one
/// `PortSpec` per element, all sharing a name and distinguished by index.
/// Dependency-path tie-breaking follows declaration order: array index first,
/// then port order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortKey {
    /// Declared port name.
    pub name: String,
    /// Array element index, when the port is part of a port array.
    pub index: Option<usize>,
}

impl PortKey {
    /// Key for a plain (non-array) port.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    /// Key for one element of a port array.
    pub fn indexed(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.name, i),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<&str> for PortKey {
    fn from(s: &str) -> Self {
        Self::named(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_round_trips_through_str() {
        let id = NodeId::new("n1");
        assert_eq!(id, NodeId::from("n1"));
        assert_eq!(id.to_string(), "n1");
    }

    #[test]
    fn port_key_display_includes_index() {
        assert_eq!(PortKey::named("value").to_string(), "value");
        assert_eq!(PortKey::indexed("item", 0).to_string(), "item[0]");
    }

    #[test]
    fn graph_ids_are_unique() {
        assert_ne!(GraphId::random(), GraphId::random());
    }
}
