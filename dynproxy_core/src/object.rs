//! Heap objects.
//!
//! Every heap value implements `Object` and reports its runtime class.
//! `Instance<T>` wraps arbitrary Rust state behind a class, and `Exception`
//! is the default error object carried by `ProxyError::Raised`.

use crate::callable::ArgVec;
use crate::class::ClassRef;
use crate::error::{ProxyError, ProxyResult};
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A heap object with a runtime class.
pub trait Object: Send + Sync + fmt::Debug {
    /// Runtime class of this object.
    fn class(&self) -> &ClassRef;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Human readable description used in diagnostics.
    fn describe(&self) -> String {
        format!("{} instance", self.class().name())
    }
}

/// Shared object reference.
pub type ObjectRef = Arc<dyn Object>;

// =============================================================================
// Instance
// =============================================================================

/// Object of a host class carrying Rust state.
pub struct Instance<T> {
    class: ClassRef,
    state: T,
}

impl<T: Send + Sync + fmt::Debug + 'static> Instance<T> {
    /// Allocate a new instance and return it as a value.
    pub fn new(class: &ClassRef, state: T) -> Value {
        Value::Object(Arc::new(Self {
            class: class.clone(),
            state,
        }))
    }

    #[inline]
    pub fn state(&self) -> &T {
        &self.state
    }
}

impl<T: fmt::Debug> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.class.name(), self.state)
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> Object for Instance<T> {
    #[inline]
    fn class(&self) -> &ClassRef {
        &self.class
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Exception
// =============================================================================

/// Error object with a message.
#[derive(Debug)]
pub struct Exception {
    class: ClassRef,
    message: String,
}

impl Exception {
    pub fn new(class: ClassRef, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Object for Exception {
    #[inline]
    fn class(&self) -> &ClassRef {
        &self.class
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self) -> String {
        format!("{}: {}", self.class.name(), self.message)
    }
}

// =============================================================================
// Dynamic Invocation
// =============================================================================

/// Invoke an instance member on `receiver` by name and arguments.
///
/// The member is selected on the receiver's class hierarchy among the
/// overloads whose parameter types accept the arguments, and the
/// implementation runs with the receiver prepended to the arguments.
pub fn invoke<I>(receiver: &ObjectRef, name: &str, args: I) -> ProxyResult<Value>
where
    I: IntoIterator<Item = Value>,
{
    let mut argv: ArgVec = ArgVec::new();
    argv.push(Value::Object(receiver.clone()));
    argv.extend(args);

    let class = receiver.class();
    if let Some((_, body)) = class.select_method(name, &argv[1..]) {
        return body(argv);
    }

    // No overload fits; report against the most derived candidate
    let arity = argv.len() - 1;
    let (member, _) = class
        .overloads(name, arity)
        .next()
        .ok_or_else(|| ProxyError::NoSuchMember {
            class: class.name().to_string(),
            member: format!("{}/{}", name, arity),
        })?;
    let (ty, arg) = member
        .params()
        .iter()
        .zip(&argv[1..])
        .find(|(ty, arg)| !ty.accepts(arg))
        .ok_or_else(|| ProxyError::NoSuchMember {
            class: class.name().to_string(),
            member: format!("{}/{}", name, arity),
        })?;
    Err(ProxyError::type_mismatch(ty, arg.type_name()))
}
