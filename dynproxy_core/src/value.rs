//! Runtime values.
//!
//! Values are cheap to clone: strings, arrays and objects are shared.

use crate::error::{ProxyError, ProxyResult};
use crate::object::{Instance, ObjectRef};
use crate::types::Type;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed value flowing through callables.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent reference.
    #[default]
    Null,
    /// Result of a `void` call.
    Unit,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Array of opaque values.
    Array(Arc<[Value]>),
    /// Heap object.
    Object(ObjectRef),
}

impl Value {
    /// Create a string value.
    #[inline]
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Create an array value from any sequence of values.
    #[inline]
    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Box a value for storage in an opaque array.
    ///
    /// `Unit` has no boxed form and becomes `Null`.
    #[inline]
    pub fn boxed(self) -> Self {
        match self {
            Value::Unit => Value::Null,
            other => other,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Borrow the state of an `Instance<T>` held by this value.
    pub fn state<T: Send + Sync + fmt::Debug + 'static>(&self) -> Option<&T> {
        self.as_object()?
            .as_any()
            .downcast_ref::<Instance<T>>()
            .map(Instance::state)
    }

    /// The most precise type describing this value.
    ///
    /// `Null` has no type of its own and reports `Any`.
    pub fn runtime_type(&self) -> Type {
        match self {
            Value::Null => Type::Any,
            Value::Unit => Type::Void,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::Str,
            Value::Array(_) => Type::Array,
            Value::Object(object) => Type::Class(object.class().clone()),
        }
    }

    /// Name of this value's type for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            other => other.runtime_type().to_string(),
        }
    }

    /// Invoke an instance member on this value by name and arguments.
    pub fn invoke<I>(&self, name: &str, args: I) -> ProxyResult<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        match self {
            Value::Object(object) => crate::object::invoke(object, name, args),
            Value::Null => Err(ProxyError::NullReceiver {
                member: name.to_string(),
            }),
            other => Err(ProxyError::type_mismatch("object", other.type_name())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Objects compare by identity
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(object) => write!(f, "<{}>", object.describe()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Object(object) => write!(f, "{}", object.describe()),
            other => write!(f, "{:?}", other),
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
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}
