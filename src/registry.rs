//! Function binding: an explicit registry in place of runtime reflection.
//!
//! Node descriptors name a `(type, member, arity)` key; the registry maps
//! each key to a typed callable, populated once at load time. The compiler's
//! only contract with this module is [`FunctionRegistry::resolve`]: a `None`
//! degrades the referencing node to an inert placeholder instead of aborting
//! compilation (see the compiler module).
//!
//! Property accessors are registered separately per `(type, member)` as
//! getter/setter pairs operating on a host object's property bag.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::value::Value;

/// Stable descriptor of a callable function: owning type, member name, arity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionKey {
    /// Name of the owning type (host class, module, library).
    pub type_name: String,
    /// Member (function) name.
    pub member: String,
    /// Number of input values the callable expects.
    pub arity: usize,
}

impl FunctionKey {
    pub fn new(type_name: impl Into<String>, member: impl Into<String>, arity: usize) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
            arity,
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}/{}", self.type_name, self.member, self.arity)
    }
}

/// Stable descriptor of a property: owning type plus member name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberKey {
    /// Name of the owning type.
    pub type_name: String,
    /// Property name.
    pub member: String,
}

impl MemberKey {
    pub fn new(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_name, self.member)
    }
}

/// Failure raised by a bound callable at invocation time.
#[derive(Debug, Error, Diagnostic)]
pub enum InvokeError {
    /// The callable was handed the wrong number of arguments.
    #[error("arity mismatch for {key}: expected {expected}, got {got}")]
    #[diagnostic(
        code(wireflow::registry::arity),
        help("The node's input ports do not match the registered callable.")
    )]
    Arity {
        key: FunctionKey,
        expected: usize,
        got: usize,
    },

    /// The callable rejected its input values.
    #[error("type mismatch: expected {expected}, got {got}")]
    #[diagnostic(code(wireflow::registry::type_mismatch))]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// Domain failure reported by the callable itself.
    #[error("{message}")]
    #[diagnostic(code(wireflow::registry::failed))]
    Failed { message: String },
}

impl InvokeError {
    /// Convenience constructor for domain failures.
    pub fn failed(message: impl Into<String>) -> Self {
        InvokeError::Failed {
            message: message.into(),
        }
    }
}

/// A bound function: input values in, output values out.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Vec<Value>, InvokeError> + Send + Sync>;

/// A bound property getter over a host object's property bag.
pub type GetterFn = Arc<dyn Fn(&Value) -> Result<Value, InvokeError> + Send + Sync>;

/// A bound property setter over a host object's property bag.
pub type SetterFn = Arc<dyn Fn(&mut Value, Value) -> Result<(), InvokeError> + Send + Sync>;

/// The binding table consulted by the compiler.
///
/// # Examples
///
/// ```rust
/// use wireflow::registry::{FunctionKey, FunctionRegistry, InvokeError};
/// use wireflow::value::Value;
///
/// let registry = FunctionRegistry::new().with_function(
///     FunctionKey::new("Math", "add", 2),
///     |args: &[Value]| match (args[0].as_int(), args[1].as_int()) {
///         (Some(a), Some(b)) => Ok(vec![Value::Int(a + b)]),
///         _ => Err(InvokeError::failed("add expects two ints")),
///     },
/// );
///
/// assert!(registry.resolve(&FunctionKey::new("Math", "add", 2)).is_some());
/// assert!(registry.resolve(&FunctionKey::new("Math", "add", 3)).is_none());
/// ```
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<FunctionKey, NativeFn>,
    getters: FxHashMap<MemberKey, GetterFn>,
    setters: FxHashMap<MemberKey, SetterFn>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its descriptor key (fluent form).
    #[must_use]
    pub fn with_function(
        mut self,
        key: FunctionKey,
        f: impl Fn(&[Value]) -> Result<Vec<Value>, InvokeError> + Send + Sync + 'static,
    ) -> Self {
        self.register(key, f);
        self
    }

    /// Register a property getter (fluent form).
    #[must_use]
    pub fn with_getter(
        mut self,
        key: MemberKey,
        f: impl Fn(&Value) -> Result<Value, InvokeError> + Send + Sync + 'static,
    ) -> Self {
        self.getters.insert(key, Arc::new(f));
        self
    }

    /// Register a property setter (fluent form).
    #[must_use]
    pub fn with_setter(
        mut self,
        key: MemberKey,
        f: impl Fn(&mut Value, Value) -> Result<(), InvokeError> + Send + Sync + 'static,
    ) -> Self {
        self.setters.insert(key, Arc::new(f));
        self
    }

    /// Register a function under its descriptor key.
    pub fn register(
        &mut self,
        key: FunctionKey,
        f: impl Fn(&[Value]) -> Result<Vec<Value>, InvokeError> + Send + Sync + 'static,
    ) {
        self.functions.insert(key, Arc::new(f));
    }

    /// Resolve a function descriptor to its callable, or report unresolved.
    #[must_use]
    pub fn resolve(&self, key: &FunctionKey) -> Option<NativeFn> {
        self.functions.get(key).cloned()
    }

    /// Resolve a property getter.
    #[must_use]
    pub fn resolve_getter(&self, key: &MemberKey) -> Option<GetterFn> {
        self.getters.get(key).cloned()
    }

    /// Resolve a property setter.
    #[must_use]
    pub fn resolve_setter(&self, key: &MemberKey) -> Option<SetterFn> {
        self.setters.get(key).cloned()
    }

    /// Number of registered functions (accessors not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether no functions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.len())
            .field("getters", &self.getters.len())
            .field("setters", &self.setters.len())
            .finish()
    }
}
