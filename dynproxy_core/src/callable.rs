//! Type-erased callables with a declared calling convention.
//!
//! A `Callable` pairs a `Convention` with a shared body. Bodies receive their
//! arguments by value in an `ArgVec` so adapters can insert, drop and
//! replace arguments without copying the whole buffer.

use crate::convention::Convention;
use crate::error::{ProxyError, ProxyResult};
use crate::types::Type;
use crate::value::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Argument buffer passed to callable bodies.
pub type ArgVec = SmallVec<[Value; 6]>;

/// Shared callable body.
pub type MethodFn = Arc<dyn Fn(ArgVec) -> ProxyResult<Value> + Send + Sync>;

/// A callable value of a fixed convention.
#[derive(Clone)]
pub struct Callable {
    convention: Convention,
    body: MethodFn,
}

impl Callable {
    /// Create a callable from a closure.
    pub fn new<F>(convention: Convention, body: F) -> Self
    where
        F: Fn(ArgVec) -> ProxyResult<Value> + Send + Sync + 'static,
    {
        Self {
            convention,
            body: Arc::new(body),
        }
    }

    /// Create a callable from an existing shared body.
    #[inline]
    pub fn from_fn(convention: Convention, body: MethodFn) -> Self {
        Self { convention, body }
    }

    /// Identity on a single value of type `ty`.
    pub fn identity(ty: Type) -> Self {
        Self::new(Convention::new(ty.clone(), [ty]), |mut args: ArgVec| {
            Ok(args.pop().unwrap_or_default())
        })
    }

    /// Callable of `convention` that ignores its arguments and returns `value`.
    pub fn constant(convention: Convention, value: Value) -> ProxyResult<Self> {
        if !convention.ret().accepts(&value) {
            return Err(ProxyError::type_mismatch(convention.ret(), value.type_name()));
        }
        Ok(Self::new(convention, move |_| Ok(value.clone())))
    }

    #[inline]
    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    /// The shared body, usable as a method table entry.
    #[inline]
    pub fn body(&self) -> &MethodFn {
        &self.body
    }

    /// Invoke without checking arguments against the convention.
    ///
    /// This is the hot path used inside composed pipelines, where the shape
    /// of the arguments was established when the pipeline was built.
    #[inline(always)]
    pub fn invoke(&self, args: ArgVec) -> ProxyResult<Value> {
        debug_assert_eq!(args.len(), self.convention.param_count());
        (self.body)(args)
    }

    /// Invoke after checking arity and argument types.
    pub fn call<I: IntoIterator<Item = Value>>(&self, args: I) -> ProxyResult<Value> {
        let args: ArgVec = args.into_iter().collect();
        if args.len() != self.convention.param_count() {
            return Err(ProxyError::ArityMismatch {
                expected: self.convention.param_count(),
                actual: args.len(),
            });
        }
        for (ty, arg) in self.convention.params().iter().zip(&args) {
            if !ty.accepts(arg) {
                return Err(ProxyError::type_mismatch(ty, arg.type_name()));
            }
        }
        (self.body)(args)
    }

    /// Adapt this callable to another convention of the same arity.
    ///
    /// Arguments are converted from `convention`'s parameter types to this
    /// callable's, and the result back to `convention`'s return type.
    pub fn as_type(&self, convention: &Convention) -> ProxyResult<Callable> {
        if &self.convention == convention {
            return Ok(self.clone());
        }
        if !self.convention.can_adapt_to(convention) {
            return Err(ProxyError::convention(format!(
                "cannot adapt {} to {}",
                self.convention, convention
            )));
        }
        let outer = convention.clone();
        let inner = self.clone();
        Ok(Callable::new(convention.clone(), move |mut args: ArgVec| {
            let targets = inner.convention.params();
            for ((from, to), arg) in outer.params().iter().zip(targets).zip(args.iter_mut()) {
                if from != to {
                    let value = std::mem::take(arg);
                    *arg = from.convert(to, value)?;
                }
            }
            let result = inner.invoke(args)?;
            inner.convention.ret().convert(outer.ret(), result)
        }))
    }

    /// Check if two callables share the same body.
    #[inline]
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable{}", self.convention)
    }
}
