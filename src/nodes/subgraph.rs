//! Sub-graph call behavior: nested graphs as callable functions.

use async_trait::async_trait;

use crate::flow::{FlowCtx, FlowError};
use crate::types::NodeId;

use super::{NodeBehavior, continue_to};

/// Calls a named sub-graph slot. The call node's resolved argument ports
/// become the nested graph's synthesized `call`-event arguments; the nested
/// run's declared return value is copied back onto this node's output.
pub struct SubGraphCall {
    slot: String,
    next: Option<NodeId>,
}

impl SubGraphCall {
    pub fn new(slot: impl Into<String>, next: Option<NodeId>) -> Self {
        Self {
            slot: slot.into(),
            next,
        }
    }

    /// The slot this call resolves against at run time.
    #[must_use]
    pub fn slot(&self) -> &str {
        &self.slot
    }
}

#[async_trait]
impl NodeBehavior for SubGraphCall {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let args = cx.input_values()?;
        let returned = cx.call_sub_graph(&self.slot, args).await?;
        if let Some(value) = returned {
            cx.write_outputs_in_order(vec![value]);
        }
        continue_to(cx, &self.next);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sub_graph_call"
    }
}
