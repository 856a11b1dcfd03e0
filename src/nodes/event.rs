//! Event-entry and return behaviors: the boundary nodes of a traversal.

use async_trait::async_trait;

use crate::flow::{FlowCtx, FlowError};
use crate::types::NodeId;

use super::{NodeBehavior, continue_to};

/// Entry node for a named event. Has no data inputs from outside the graph;
/// the event's payload arguments become this node's own output ports for the
/// rest of the traversal.
pub struct EventEntry {
    next: Option<NodeId>,
}

impl EventEntry {
    pub fn new(next: Option<NodeId>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl NodeBehavior for EventEntry {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let args = cx.args().to_vec();
        cx.write_outputs_in_order(args);
        continue_to(cx, &self.next);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "event"
    }
}

/// Captures its input as the sub-graph's declared return value and ends the
/// current control path.
pub struct Return;

#[async_trait]
impl NodeBehavior for Return {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let value = cx.first_input()?;
        cx.set_return(value);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "return"
    }
}
