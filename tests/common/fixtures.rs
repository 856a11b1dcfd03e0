//! Shared fixtures: recording registries and canonical test documents.

use std::sync::{Arc, Mutex};

use wireflow::document::{GraphDocument, NodeSpec, NodeSpecKind};
use wireflow::port::{PortRef, PortSpec};
use wireflow::registry::{FunctionKey, FunctionRegistry, MemberKey};
use wireflow::value::Value;

/// Execution-order log filled by the `Probe::mark` family.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Captured-value log filled by `Probe::capture`.
pub type ValueLog = Arc<Mutex<Vec<Value>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn new_value_log() -> ValueLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn logged(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn captured(log: &ValueLog) -> Vec<Value> {
    log.lock().unwrap().clone()
}

fn mark_body(log: CallLog) -> impl Fn(&[Value]) -> Result<Vec<Value>, wireflow::registry::InvokeError>
{
    move |args: &[Value]| {
        let tag = args.first().cloned().unwrap_or(Value::Null);
        log.lock().unwrap().push(match &tag {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        Ok(vec![tag])
    }
}

/// Registry used by most tests:
///
/// - `Probe::mark/{1,2,3}`: records its first input (the node's tag) into
///   the call log, passes it through as output
/// - `Probe::capture/1`: clones its input into the value log
/// - `Math::add/2`, `Math::double/1`: integer arithmetic
/// - `Agent::hp` getter/setter over the host property bag
pub fn test_registry(calls: &CallLog, values: &ValueLog) -> FunctionRegistry {
    let values = values.clone();
    let mut registry = FunctionRegistry::new()
        .with_function(FunctionKey::new("Probe", "mark", 1), mark_body(calls.clone()))
        .with_function(FunctionKey::new("Probe", "mark", 2), mark_body(calls.clone()))
        .with_function(FunctionKey::new("Probe", "mark", 3), mark_body(calls.clone()))
        .with_function(FunctionKey::new("Probe", "mark", 4), mark_body(calls.clone()))
        .with_function(FunctionKey::new("Math", "add", 2), |args: &[Value]| {
            match (args[0].as_int(), args[1].as_int()) {
                (Some(a), Some(b)) => Ok(vec![Value::Int(a + b)]),
                _ => Err(wireflow::registry::InvokeError::failed("add expects ints")),
            }
        })
        .with_function(FunctionKey::new("Math", "double", 1), |args: &[Value]| {
            match args[0].as_int() {
                Some(n) => Ok(vec![Value::Int(n * 2)]),
                None => Err(wireflow::registry::InvokeError::failed(
                    "double expects an int",
                )),
            }
        })
        .with_getter(MemberKey::new("Agent", "hp"), |bag: &Value| match bag {
            Value::Object(map) => Ok(map.get("hp").cloned().unwrap_or(Value::Null)),
            _ => Err(wireflow::registry::InvokeError::failed("bag is not an object")),
        })
        .with_setter(MemberKey::new("Agent", "hp"), |bag: &mut Value, value| {
            match bag {
                Value::Object(map) => {
                    map.insert("hp".to_string(), value);
                    Ok(())
                }
                _ => Err(wireflow::registry::InvokeError::failed("bag is not an object")),
            }
        });
    registry.register(FunctionKey::new("Probe", "capture", 1), move |args| {
        values
            .lock()
            .unwrap()
            .push(args.first().cloned().unwrap_or(Value::Null));
        Ok(vec![])
    });
    registry
}

pub fn mark_key(arity: usize) -> FunctionKey {
    FunctionKey::new("Probe", "mark", arity)
}

pub fn capture_key() -> FunctionKey {
    FunctionKey::new("Probe", "capture", 1)
}

/// A node that records its own id and passes a value downstream. `links`
/// wires one input per upstream output, declared after the tag input.
pub fn mark_node(id: &str, links: &[&str]) -> NodeSpec {
    let mut node = NodeSpec::invoke(id, mark_key(1 + links.len())).with_port(
        PortSpec::input("tag").with_default(serde_json::json!(id)),
    );
    for (i, source) in links.iter().enumerate() {
        node = node.with_port(
            PortSpec::input("from")
                .at_index(i)
                .with_connection(PortRef::new(*source, "out")),
        );
    }
    node.with_port(PortSpec::output("out"))
}

/// The canonical diamond: `A -> B -> D`, `A -> C -> D` as pure data
/// dependencies, with the `on_start` event wired straight to `D`.
///
/// Forwarding `D` must execute `{A, B, C, D}` exactly once each, `A` before
/// `B` and `C`, both before `D`, and `B` before `C` (declaration order
/// tie-break on `D`'s inputs).
pub fn diamond_document() -> GraphDocument {
    GraphDocument::new()
        .with_node(NodeSpec::event("start", "on_start").with_next("D"))
        .with_node(mark_node("A", &[]))
        .with_node(mark_node("B", &["A"]))
        .with_node(mark_node("C", &["A"]))
        .with_node(mark_node("D", &["B", "C"]))
}

/// `on_start -> a -> b`: a two-step control chain of recording nodes.
pub fn chain_document() -> GraphDocument {
    GraphDocument::new()
        .with_node(NodeSpec::event("start", "on_start").with_next("a"))
        .with_node(
            NodeSpec::invoke("a", mark_key(1))
                .with_port(PortSpec::input("tag").with_default(serde_json::json!("a")))
                .with_port(PortSpec::output("out"))
                .with_next("b"),
        )
        .with_node(
            NodeSpec::invoke("b", mark_key(1))
                .with_port(PortSpec::input("tag").with_default(serde_json::json!("b")))
                .with_port(PortSpec::output("out")),
        )
}

/// A sub-graph slot document: `call(n) -> return n * 2`.
pub fn doubler_document() -> GraphDocument {
    GraphDocument::new()
        .with_node(
            NodeSpec::event("entry", "call")
                .with_port(PortSpec::output("n"))
                .with_next("ret"),
        )
        .with_node(
            NodeSpec::invoke("twice", FunctionKey::new("Math", "double", 1))
                .with_port(PortSpec::input("n").with_connection(PortRef::new("entry", "n")))
                .with_port(PortSpec::output("out")),
        )
        .with_node(
            NodeSpec::new("ret", NodeSpecKind::Return)
                .with_port(PortSpec::input("value").with_connection(PortRef::new("twice", "out"))),
        )
}
