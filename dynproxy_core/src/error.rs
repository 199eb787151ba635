//! Error taxonomy shared by the object model and the proxy runtime.
//!
//! Errors fall in two groups:
//! - Construction and bind-time defects (`ConventionMismatch`,
//!   `FieldNotMutable`, access violations, factory misuse). These are never
//!   recovered by the runtime.
//! - Errors raised by target code at invocation time (`Raised`). These carry
//!   an error object and can be trapped by a callable pipeline.

use crate::class::ClassRef;
use crate::object::{Exception, ObjectRef};
use std::sync::Arc;

// =============================================================================
// Proxy Errors
// =============================================================================

/// Errors produced while composing, linking or invoking proxy callables.
#[derive(Debug, Clone)]
pub enum ProxyError {
    /// Two calling conventions that must agree do not.
    ConventionMismatch { message: String },

    /// A policy asked for a setter on a slot declared immutable.
    FieldNotMutable { index: usize },

    /// Field slot index outside the declared layout.
    NoSuchField { index: usize, count: usize },

    /// The access token may not see the member.
    MemberNotAccessible { member: String },

    /// The access token may not implement the interface.
    InterfaceNotAccessible { interface: String, reason: String },

    /// Wrong number of values supplied.
    ArityMismatch { expected: usize, actual: usize },

    /// A value does not conform to the expected type.
    TypeMismatch { expected: String, actual: String },

    /// Instance member invoked on a null receiver.
    NullReceiver { member: String },

    /// No implementation found for the member on the receiver class.
    NoSuchMember { class: String, member: String },

    /// Error object raised by target code.
    Raised(ObjectRef),
}

impl ProxyError {
    /// Create a convention mismatch from any displayable message.
    #[inline]
    pub fn convention(message: impl Into<String>) -> Self {
        Self::ConventionMismatch {
            message: message.into(),
        }
    }

    /// Create a type mismatch between an expected and an observed type name.
    #[inline]
    pub fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Raise an `Exception` object of the given class.
    pub fn raise(class: &ClassRef, message: impl Into<String>) -> Self {
        Self::Raised(Arc::new(Exception::new(class.clone(), message)))
    }

    /// The raised error object, if this is a raised error.
    #[inline]
    pub fn raised(&self) -> Option<&ObjectRef> {
        match self {
            Self::Raised(object) => Some(object),
            _ => None,
        }
    }

    /// Check whether this is a raised error whose class is `kind` or a subclass.
    pub fn is_raised_kind(&self, kind: &ClassRef) -> bool {
        self.raised()
            .is_some_and(|object| object.class().is_subclass_of(kind))
    }
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConventionMismatch { message } => {
                write!(f, "convention mismatch: {}", message)
            }
            Self::FieldNotMutable { index } => {
                write!(f, "field {} is not mutable", index)
            }
            Self::NoSuchField { index, count } => {
                write!(f, "no field {} (proxy declares {} fields)", index, count)
            }
            Self::MemberNotAccessible { member } => {
                write!(f, "member {} is not accessible", member)
            }
            Self::InterfaceNotAccessible { interface, reason } => {
                write!(f, "interface {} is not accessible: {}", interface, reason)
            }
            Self::ArityMismatch { expected, actual } => {
                write!(f, "expected {} values, got {}", expected, actual)
            }
            Self::TypeMismatch { expected, actual } => {
                write!(f, "expected {}, found {}", expected, actual)
            }
            Self::NullReceiver { member } => {
                write!(f, "cannot invoke {} on null", member)
            }
            Self::NoSuchMember { class, member } => {
                write!(f, "class {} has no implementation of {}", class, member)
            }
            Self::Raised(object) => write!(f, "{}", object.describe()),
        }
    }
}

impl std::error::Error for ProxyError {}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
