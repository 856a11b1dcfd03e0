//! Registry-bound behaviors: function invocation, property access, variable
//! writes.

use async_trait::async_trait;

use crate::flow::{FlowCtx, FlowError};
use crate::registry::{FunctionKey, GetterFn, MemberKey, NativeFn, SetterFn};
use crate::types::NodeId;

use super::{NodeBehavior, continue_to};

/// Plain action node: resolves its input ports in declaration order, calls
/// the bound function, and writes the produced values onto its output ports.
pub struct Invoke {
    key: FunctionKey,
    callable: NativeFn,
    next: Option<NodeId>,
}

impl Invoke {
    pub fn new(key: FunctionKey, callable: NativeFn, next: Option<NodeId>) -> Self {
        Self {
            key,
            callable,
            next,
        }
    }

    /// The descriptor this node was bound from.
    #[must_use]
    pub fn key(&self) -> &FunctionKey {
        &self.key
    }
}

#[async_trait]
impl NodeBehavior for Invoke {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let args = cx.input_values()?;
        let outputs = (self.callable)(&args).map_err(|source| FlowError::Invoke {
            node: cx.node_id().clone(),
            source,
        })?;
        cx.write_outputs_in_order(outputs);
        continue_to(cx, &self.next);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "invoke"
    }
}

/// Reads a property of the context object. Pure: participates in data
/// dependencies, never sets a successor.
pub struct GetProperty {
    member: MemberKey,
    getter: GetterFn,
}

impl GetProperty {
    pub fn new(member: MemberKey, getter: GetterFn) -> Self {
        Self { member, getter }
    }
}

#[async_trait]
impl NodeBehavior for GetProperty {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let read = cx.host_properties(|bag| (self.getter)(bag))?;
        let value = read.map_err(|source| FlowError::Invoke {
            node: cx.node_id().clone(),
            source,
        })?;
        tracing::debug!(member = %self.member, value = %value, "property read");
        cx.write_outputs_in_order(vec![value]);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "get_property"
    }
}

/// Writes its input into a property of the context object.
pub struct SetProperty {
    member: MemberKey,
    setter: SetterFn,
    next: Option<NodeId>,
}

impl SetProperty {
    pub fn new(member: MemberKey, setter: SetterFn, next: Option<NodeId>) -> Self {
        Self {
            member,
            setter,
            next,
        }
    }
}

#[async_trait]
impl NodeBehavior for SetProperty {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let value = cx.first_input()?;
        let written = cx.host_properties(|bag| (self.setter)(bag, value))?;
        written.map_err(|source| FlowError::Invoke {
            node: cx.node_id().clone(),
            source,
        })?;
        tracing::debug!(member = %self.member, "property written");
        continue_to(cx, &self.next);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "set_property"
    }
}

/// Writes its input into the named variable cell. The write lands in the
/// nearest scope holding the cell and is immediately visible to every bound
/// port, including sibling sub-graphs sharing the document's table.
pub struct SetVariable {
    variable: String,
    next: Option<NodeId>,
}

impl SetVariable {
    pub fn new(variable: impl Into<String>, next: Option<NodeId>) -> Self {
        Self {
            variable: variable.into(),
            next,
        }
    }
}

#[async_trait]
impl NodeBehavior for SetVariable {
    async fn execute(&self, cx: &mut FlowCtx<'_>) -> Result<(), FlowError> {
        let value = cx.first_input()?;
        cx.scope().set(&self.variable, value);
        continue_to(cx, &self.next);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "set_variable"
    }
}
