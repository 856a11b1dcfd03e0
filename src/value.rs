//! Runtime values and the static port type lattice.
//!
//! Ports and variables are typed by [`ValueType`], a small lattice used for
//! the static compatibility checks performed at edit/compile time. Runtime
//! data flowing through ports is a [`Value`]: the JSON-shaped scalar and
//! container variants plus [`Value::Delegate`], a callback bound to an
//! event-entry node that only the engine can invoke.
//!
//! Document literals are stored as `serde_json::Value` and converted on the
//! way in; delegates never round-trip through the document.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::GraphId;

/// Declared type of a port or variable.
///
/// `Any` is the top of the lattice and accepts everything; `Float` accepts
/// `Int` (widening); every other pairing must match exactly. This is the full
/// extent of static typing in the engine; there is no inference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
    Delegate,
}

impl ValueType {
    /// Whether a slot declared as `self` accepts a value of type `actual`.
    #[must_use]
    pub fn accepts(&self, actual: ValueType) -> bool {
        match (self, actual) {
            (ValueType::Any, _) | (_, ValueType::Any) => true,
            (ValueType::Float, ValueType::Int) => true,
            (declared, actual) => *declared == actual,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueType::Any => "any",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Delegate => "delegate",
        };
        write!(f, "{label}")
    }
}

/// A callback value bound to an event-entry node of a specific graph.
///
/// Carries ids, not references: the engine's graph registry is consulted at
/// invocation time, so a delegate held after its graph was dropped reports
/// the target gone instead of keeping the document alive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegateRef {
    /// Guid of the graph owning the target event.
    pub graph: GraphId,
    /// Name of the event-entry node to fire.
    pub event: String,
}

impl fmt::Display for DelegateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.graph, self.event)
    }
}

/// Runtime value flowing through ports and variable cells.
///
/// # Examples
///
/// ```rust
/// use wireflow::value::{Value, ValueType};
///
/// let v = Value::from(3);
/// assert_eq!(v.value_type(), ValueType::Int);
/// assert!(v.truthy());
/// assert_eq!(Value::Null.truthy(), false);
/// ```
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(FxHashMap<String, Value>),
    Delegate(DelegateRef),
}

impl Value {
    /// The runtime type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
            Value::Delegate(_) => ValueType::Delegate,
        }
    }

    /// Truthiness used by branch nodes: `Null`, `false`, `0`, `0.0`, and the
    /// empty string are falsy; containers and delegates are always truthy.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Delegate(_) => true,
        }
    }

    /// Integer view used by switch selectors. Accepts exact floats.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Borrow the string content, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the delegate reference, if any.
    #[must_use]
    pub fn as_delegate(&self) -> Option<&DelegateRef> {
        match self {
            Value::Delegate(d) => Some(d),
            _ => None,
        }
    }

    /// Convert a document literal into a runtime value.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to a JSON value. Returns `None` for delegates (and for
    /// any container holding one): callbacks do not serialize.
    #[must_use]
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Int(i) => Some(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
            Value::String(s) => Some(serde_json::Value::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                Some(serde_json::Value::Object(out))
            }
            Value::Delegate(_) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => write!(f, "[{} items]", items.len()),
            Value::Object(map) => write!(f, "{{{} keys}}", map.len()),
            Value::Delegate(d) => write!(f, "delegate({d})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn any_accepts_everything() {
        assert!(ValueType::Any.accepts(ValueType::Delegate));
        assert!(ValueType::String.accepts(ValueType::Any));
        assert!(ValueType::Float.accepts(ValueType::Int));
        assert!(!ValueType::Int.accepts(ValueType::Float));
        assert!(!ValueType::Bool.accepts(ValueType::String));
    }

    #[test]
    fn json_round_trip_preserves_shape() {
        let json = json!({"a": [1, 2.5, "x", true, null]});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), Some(json));
    }

    #[test]
    fn delegates_do_not_serialize() {
        let v = Value::Delegate(DelegateRef {
            graph: GraphId::random(),
            event: "tick".into(),
        });
        assert_eq!(v.to_json(), None);
        assert_eq!(
            Value::Array(vec![Value::Int(1), v]).to_json(),
            None,
            "containers holding a delegate must not serialize either"
        );
    }

    #[test]
    fn switch_selector_accepts_exact_floats() {
        assert_eq!(Value::Float(2.0).as_int(), Some(2));
        assert_eq!(Value::Float(2.5).as_int(), None);
        assert_eq!(Value::String("2".into()).as_int(), None);
    }
}
