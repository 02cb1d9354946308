//! Values marshaled across the host/script boundary.
//!
//! Every engine converts its native values into [`Value`] before handing
//! them to the host, and converts [`Value`]s back when the host passes
//! arguments or registers named items.  Values are owned; nothing here
//! borrows from an engine's heap.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Signature of a host callback invoked from script code.
///
/// An `Err` is raised inside the interpreter as a script error, so it flows
/// back through the site's error callback like any other script failure.
pub type HostCallback = dyn Fn(Vec<Value>) -> Result<Value, String>;

/// A host function that scripts can call.
#[derive(Clone)]
pub struct HostFn {
    name: String,
    f: Rc<HostCallback>,
}

impl HostFn {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(Vec<Value>) -> Result<Value, String> + 'static,
    ) -> Self {
        Self { name: name.into(), f: Rc::new(f) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        (self.f)(args)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFn({})", self.name)
    }
}

impl PartialEq for HostFn {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

/// An owned script value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Host function exposed to script code.
    Function(HostFn),
    /// A script-side value with no host representation (script functions,
    /// userdata, symbols); carries the engine's type name.
    Opaque(String),
}

impl Value {
    /// Build an object from `(key, value)` pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Look up a property of an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Opaque(name) => name,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(h) => write!(f, "function {}()", h.name()),
            Value::Opaque(name) => write!(f, "[{name}]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<HostFn> for Value {
    fn from(h: HostFn) -> Self {
        Value::Function(h)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
