//! Bound node behaviors: the variant-specific `execute` implementations.
//!
//! Every node spec in a document is bound at compile time to one of the
//! behaviors in this module. The common contract: by the time `execute`
//! runs, every input port's data dependency has been satisfied by the
//! traversal layer; after execution the behavior may set the context's next
//! pointer (control-flow variants) or leave it unset (terminal on this path).

use async_trait::async_trait;

use crate::flow::{FlowCtx, FlowError};
use crate::types::NodeId;

mod control;
mod event;
mod invoke;
mod subgraph;

pub use control::{Branch, MakeArray, Sequence, Switch};
pub use event::{EventEntry, Return};
pub use invoke::{GetProperty, Invoke, SetProperty, SetVariable};
pub use subgraph::SubGraphCall;

/// A bound unit of work inside a compiled graph.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Run this node within the given traversal context.
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError>;

    /// Short variant label used in traces and error reasons.
    fn kind(&self) -> &'static str;
}

/// Inert placeholder left behind when a node's binding could not be resolved
/// at compile time. The rest of the document stays usable; this node fails
/// loudly only if a traversal actually reaches it.
pub struct Invalid {
    reason: String,
}

impl Invalid {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the original node was degraded.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl NodeBehavior for Invalid {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        Err(FlowError::InvalidNode {
            node: cx.node_id().clone(),
            reason: self.reason.clone(),
        })
    }

    fn kind(&self) -> &'static str {
        "invalid"
    }
}

/// Shared helper: hand the declared successor to the context.
fn continue_to(cx: &mut FlowCtx<'_>, next: &Option<NodeId>) {
    cx.set_next(next.clone());
}
