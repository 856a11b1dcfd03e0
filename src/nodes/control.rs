//! Control-flow and data-shaping behaviors: sequence, branch, switch,
//! make-array.

use async_trait::async_trait;

use crate::flow::{FlowCtx, FlowError};
use crate::types::NodeId;
use crate::value::Value;

use super::NodeBehavior;

/// Runs each step target in declared order, each as a nested traversal of
/// the same context, so the at-most-once guarantee spans all steps.
pub struct Sequence {
    steps: Vec<NodeId>,
}

impl Sequence {
    pub fn new(steps: Vec<NodeId>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl NodeBehavior for Sequence {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        for step in &self.steps {
            cx.forward_child(step).await?;
        }
        cx.set_next(None);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sequence"
    }
}

/// Routes to one of two successors on the truthiness of its condition input.
pub struct Branch {
    on_true: Option<NodeId>,
    on_false: Option<NodeId>,
}

impl Branch {
    pub fn new(on_true: Option<NodeId>, on_false: Option<NodeId>) -> Self {
        Self { on_true, on_false }
    }
}

#[async_trait]
impl NodeBehavior for Branch {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let condition = cx.first_input()?;
        let target = if condition.truthy() {
            &self.on_true
        } else {
            &self.on_false
        };
        cx.set_next(target.clone());
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "branch"
    }
}

/// Routes by integer selector into its target array, falling back to the
/// default target when the selector is out of range or the slot is empty.
pub struct Switch {
    targets: Vec<Option<NodeId>>,
    default: Option<NodeId>,
}

impl Switch {
    pub fn new(targets: Vec<Option<NodeId>>, default: Option<NodeId>) -> Self {
        Self { targets, default }
    }
}

#[async_trait]
impl NodeBehavior for Switch {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let selector = cx.first_input()?;
        let index = selector.as_int().ok_or_else(|| FlowError::BadSelector {
            node: cx.node_id().clone(),
            got: selector.value_type(),
        })?;
        let target = usize::try_from(index)
            .ok()
            .and_then(|i| self.targets.get(i).cloned().flatten())
            .or_else(|| self.default.clone());
        cx.set_next(target);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "switch"
    }
}

/// Collects its `item` input port array into one array value. Pure.
pub struct MakeArray;

#[async_trait]
impl NodeBehavior for MakeArray {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let items = cx.input_values()?;
        cx.write_outputs_in_order(vec![Value::Array(items)]);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "make_array"
    }
}
