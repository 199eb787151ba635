//! Runtime types and value conversion.
//!
//! # Conversion Rules
//!
//! ```text
//!   from \ to   │ void  prim   any   str/array  class
//!   ────────────┼──────────────────────────────────────
//!   void        │  =    zero   null  null       null
//!   prim        │ drop  = (*)  box   ✗          ✗
//!   any         │ drop  unbox  =     cast       cast
//!   str/array   │ drop  ✗      box   =          ✗
//!   class       │ drop  ✗      box   ✗          cast (**)
//!
//!   (*)  int → float widens, other primitive pairs are rejected
//!   (**) free when the source class is a subclass of the target
//! ```
//!
//! Rejected pairs are composition-time errors. Casts and unboxing are checked
//! when a value actually flows through and fail with `TypeMismatch`.

use crate::class::ClassRef;
use crate::error::{ProxyError, ProxyResult};
use crate::value::Value;
use std::fmt;

/// Type of a parameter, return slot or field slot.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value (return slots only).
    Void,
    Bool,
    Int,
    Float,
    /// Immutable string reference.
    Str,
    /// Array of opaque values.
    Array,
    /// Top reference type.
    Any,
    /// Instances of a class or of any of its subclasses.
    Class(ClassRef),
}

impl Type {
    /// Check if this is a reference type (admits `Null`).
    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Str | Type::Array | Type::Any | Type::Class(_))
    }

    /// Check if this is a primitive type.
    #[inline]
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Int | Type::Float)
    }

    /// Default value produced when a `void` result is converted to this type.
    pub fn zero(&self) -> Value {
        match self {
            Type::Void => Value::Unit,
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            _ => Value::Null,
        }
    }

    /// Check whether `value` is an instance of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Void, Value::Unit) => true,
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Int, Value::Int(_)) => true,
            (Type::Float, Value::Float(_)) => true,
            (Type::Str, Value::Str(_)) => true,
            (Type::Array, Value::Array(_)) => true,
            (Type::Any, Value::Unit) => false,
            (Type::Any, _) => true,
            (Type::Class(class), Value::Object(object)) => object.class().is_subclass_of(class),
            (ty, Value::Null) => ty.is_reference(),
            _ => false,
        }
    }

    /// Check if every value of this type is also a value of `other`.
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (Type::Void, _) | (_, Type::Void) => false,
            (a, Type::Any) => a.is_reference(),
            (Type::Class(a), Type::Class(b)) => a.is_subclass_of(b),
            _ => false,
        }
    }

    /// Check if values of this type can be converted to `to` (see module docs).
    pub fn can_convert_to(&self, to: &Type) -> bool {
        match (self, to) {
            (a, b) if a == b => true,
            (_, Type::Void) | (Type::Void, _) => true,
            (Type::Int, Type::Float) => true,
            (_, Type::Any) | (Type::Any, _) => true,
            (Type::Class(_), Type::Class(_)) => true,
            _ => false,
        }
    }

    /// Convert a value of this type to `to`.
    ///
    /// Callers are expected to have checked `can_convert_to` when the
    /// conversion was composed; this only performs the runtime checks.
    pub fn convert(&self, to: &Type, value: Value) -> ProxyResult<Value> {
        if self == to {
            return Ok(value);
        }
        match (self, to) {
            (_, Type::Void) => Ok(Value::Unit),
            (Type::Void, to) => Ok(to.zero()),
            (_, Type::Any) => Ok(value.boxed()),
            (_, Type::Float) => match value {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                other => Self::checked(to, other),
            },
            (_, to) => Self::checked(to, value),
        }
    }

    #[inline]
    fn checked(to: &Type, value: Value) -> ProxyResult<Value> {
        if to.accepts(&value) {
            Ok(value)
        } else {
            Err(ProxyError::type_mismatch(to, value.type_name()))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::Array => write!(f, "array"),
            Type::Any => write!(f, "any"),
            Type::Class(class) => write!(f, "{}", class.name()),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
