//! Callable builder: a small combinator algebra over calling conventions.
//!
//! A builder starts from the convention the finished callable must have
//! (the *outer* convention). Every combinator describes how the remaining
//! target differs from the current convention and records the adapter that
//! bridges the two. Finishing with a target runs the recorded adapters in
//! reverse, so the result always has the outer convention.
//!
//! ```text
//!   builder(any, Service, str) -> void
//!     .drop_first()               target now (Service, str) -> void
//!     .before(|b| ...)            hook of (Service, str) -> void runs first
//!     .resolve_and_finish(add)    Service.add_user(str) -> void
//! ```
//!
//! Every combinator validates its inputs immediately, so a malformed
//! composition fails at the call that introduced the mistake and never at
//! the first invocation.

use crate::inline_cache::{InlineCache, MAX_RECEIVER_TYPES};
use dynproxy_core::{
    ArgVec, Callable, ClassRef, Convention, Lookup, MemberDescriptor, ProxyError, ProxyResult,
    Type, Value,
};
use smallvec::smallvec;
use std::fmt;
use std::sync::Arc;

/// Maps a callable of the current convention to one of the outer convention.
type Pipeline = Box<dyn FnOnce(Callable) -> ProxyResult<Callable> + Send>;

/// Immutable builder of adapted callables.
///
/// Combinators consume the builder and return a new one; a builder is
/// finished at most once.
pub struct CallableBuilder {
    /// Convention the target must have.
    convention: Convention,
    pipeline: Pipeline,
    /// Guard limit of inline caches created by `resolve_and_finish`.
    cache_limit: usize,
}

impl CallableBuilder {
    /// Builder producing callables of `convention`.
    pub fn new(convention: Convention) -> Self {
        Self {
            convention,
            pipeline: Box::new(Ok),
            cache_limit: MAX_RECEIVER_TYPES,
        }
    }

    /// Set the guard limit of inline caches created by this builder.
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    /// Convention the target must currently have.
    #[inline]
    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    /// Fresh builder for a sub-callable, inheriting settings.
    fn child(&self, convention: Convention) -> Self {
        Self::new(convention).with_cache_limit(self.cache_limit)
    }

    /// Record an adapter and move to the convention `next`.
    ///
    /// `adapt` receives the target of convention `next` and returns a
    /// callable of the current convention.
    fn push<F>(self, next: Convention, adapt: F) -> Self
    where
        F: FnOnce(Callable) -> ProxyResult<Callable> + Send + 'static,
    {
        let prev = self.pipeline;
        Self {
            convention: next,
            pipeline: Box::new(move |target| prev(adapt(target)?)),
            cache_limit: self.cache_limit,
        }
    }

    /// Run `build` on a fresh builder and check the result's convention.
    fn sub_callable<F>(&self, convention: Convention, build: F) -> ProxyResult<Callable>
    where
        F: FnOnce(CallableBuilder) -> ProxyResult<Callable>,
    {
        let callable = build(self.child(convention.clone()))?;
        if callable.convention() != &convention {
            return Err(ProxyError::convention(format!(
                "sub-builder returned {} where {} was required",
                callable.convention(),
                convention
            )));
        }
        Ok(callable)
    }

    // =========================================================================
    // Argument Shape
    // =========================================================================

    /// Collect all arguments into one array.
    pub fn box_all(self) -> Self {
        let outer = self.convention.clone();
        let next = Convention::new(outer.ret().clone(), [Type::Array]);
        self.push(next, move |target| {
            Ok(Callable::new(outer, move |args: ArgVec| {
                let array = Value::array(args.into_iter().map(Value::boxed));
                target.invoke(smallvec![array])
            }))
        })
    }

    /// Collect the trailing `count` arguments into one array.
    pub fn box_last(self, count: usize) -> ProxyResult<Self> {
        let outer = self.convention.clone();
        let total = outer.param_count();
        if count > total {
            return Err(ProxyError::convention(format!(
                "cannot box {} arguments of {}",
                count, outer
            )));
        }
        let start = total - count;
        let next = Convention::new(
            outer.ret().clone(),
            outer.params()[..start].iter().cloned().chain([Type::Array]),
        );
        Ok(self.push(next, move |target| {
            Ok(Callable::new(outer, move |mut args: ArgVec| {
                let tail = Value::array(args.drain(start..).map(Value::boxed));
                args.push(tail);
                target.invoke(args)
            }))
        }))
    }

    /// Give the target an extra argument `value` of type `ty` at `index`.
    pub fn insert_argument(self, index: usize, ty: Type, value: Value) -> ProxyResult<Self> {
        if !ty.accepts(&value) {
            return Err(ProxyError::type_mismatch(&ty, value.type_name()));
        }
        let outer = self.convention.clone();
        let next = outer.with_param_inserted(index, ty)?;
        Ok(self.push(next, move |target| {
            Ok(Callable::new(outer, move |mut args: ArgVec| {
                args.insert(index, value.clone());
                target.invoke(args)
            }))
        }))
    }

    /// Stop passing the argument at `index` to the target.
    pub fn drop_parameter(self, index: usize) -> ProxyResult<Self> {
        let outer = self.convention.clone();
        let next = outer.with_param_removed(index)?;
        Ok(self.push(next, move |target| {
            Ok(Callable::new(outer, move |mut args: ArgVec| {
                args.remove(index);
                target.invoke(args)
            }))
        }))
    }

    /// Stop passing the first argument to the target.
    #[inline]
    pub fn drop_first(self) -> ProxyResult<Self> {
        self.drop_parameter(0)
    }

    /// Call the target without arguments.
    pub fn drop_all(self) -> Self {
        let outer = self.convention.clone();
        let next = Convention::new(outer.ret().clone(), []);
        self.push(next, move |target| {
            Ok(Callable::new(outer, move |_| target.invoke(ArgVec::new())))
        })
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Require a target of `convention`, converting arguments and result.
    ///
    /// Parameter counts must match. A no-op when the conventions are equal.
    pub fn convert_to(self, convention: Convention) -> ProxyResult<Self> {
        let outer = self.convention.clone();
        if convention == outer {
            return Ok(self);
        }
        if convention.param_count() != outer.param_count() {
            return Err(ProxyError::convention(format!(
                "cannot convert {} to {}: parameter counts differ",
                outer, convention
            )));
        }
        if !convention.can_adapt_to(&outer) {
            return Err(ProxyError::convention(format!(
                "cannot convert {} to {}",
                outer, convention
            )));
        }
        Ok(self.push(convention, move |target| target.as_type(&outer)))
    }

    /// Require a target returning `ty`.
    pub fn convert_return_type(self, ty: Type) -> ProxyResult<Self> {
        let next = self.convention.with_return(ty);
        self.convert_to(next)
    }

    // =========================================================================
    // Composition
    // =========================================================================

    /// Run a hook before the target.
    ///
    /// `build` gets a builder for the current parameters returning `void`.
    /// The hook sees the same arguments as the target.
    pub fn before<F>(self, build: F) -> ProxyResult<Self>
    where
        F: FnOnce(CallableBuilder) -> ProxyResult<Callable>,
    {
        let outer = self.convention.clone();
        let hook = self.sub_callable(outer.with_return(Type::Void), build)?;
        Ok(self.push(outer.clone(), move |target| {
            Ok(Callable::new(outer, move |args: ArgVec| {
                hook.invoke(args.clone())?;
                target.invoke(args)
            }))
        }))
    }

    /// Run a hook after the target; the hook's result becomes the result.
    ///
    /// The hook receives the target's result followed by the arguments, or
    /// only the arguments when the return type is `void`.
    pub fn after<F>(self, build: F) -> ProxyResult<Self>
    where
        F: FnOnce(CallableBuilder) -> ProxyResult<Callable>,
    {
        let outer = self.convention.clone();
        let returns_value = outer.ret() != &Type::Void;
        let hook_convention = if returns_value {
            outer.with_param_inserted(0, outer.ret().clone())?
        } else {
            outer.clone()
        };
        let hook = self.sub_callable(hook_convention, build)?;
        Ok(self.push(outer.clone(), move |target| {
            Ok(Callable::new(outer, move |args: ArgVec| {
                let result = target.invoke(args.clone())?;
                if returns_value {
                    hook.invoke(prepend(result, args))
                } else {
                    hook.invoke(args)
                }
            }))
        }))
    }

    /// Handle errors of class `kind` (or a subclass) raised by the target.
    ///
    /// The handler receives the error object followed by the arguments and
    /// produces the result instead. Other errors pass through.
    pub fn trap<F>(self, kind: &ClassRef, build: F) -> ProxyResult<Self>
    where
        F: FnOnce(CallableBuilder) -> ProxyResult<Callable>,
    {
        let outer = self.convention.clone();
        let handler_convention = outer.with_param_inserted(0, Type::Class(kind.clone()))?;
        let handler = self.sub_callable(handler_convention, build)?;
        let kind = kind.clone();
        Ok(self.push(outer.clone(), move |target| {
            Ok(Callable::new(outer, move |args: ArgVec| {
                match target.invoke(args.clone()) {
                    Err(ProxyError::Raised(error)) if error.class().is_subclass_of(&kind) => {
                        handler.invoke(prepend(Value::Object(error), args))
                    }
                    other => other,
                }
            }))
        }))
    }

    /// Require a target returning `intermediate` and filter its result.
    ///
    /// `build` gets a builder for `(intermediate) -> ret`, or `() -> ret`
    /// when `intermediate` is `void`.
    pub fn compose_return<F>(self, intermediate: Type, build: F) -> ProxyResult<Self>
    where
        F: FnOnce(CallableBuilder) -> ProxyResult<Callable>,
    {
        let outer = self.convention.clone();
        let discards = intermediate == Type::Void;
        let filter_params: Vec<Type> = if discards {
            Vec::new()
        } else {
            vec![intermediate.clone()]
        };
        let filter = self.sub_callable(Convention::new(outer.ret().clone(), filter_params), build)?;
        let next = outer.with_return(intermediate);
        Ok(self.push(next, move |target| {
            Ok(Callable::new(outer, move |args: ArgVec| {
                let value = target.invoke(args)?;
                if discards {
                    filter.invoke(ArgVec::new())
                } else {
                    filter.invoke(smallvec![value])
                }
            }))
        }))
    }

    /// Filter the argument at `index` through a callable producing `intermediate`.
    ///
    /// `build` gets a builder for `(original) -> intermediate`.
    pub fn filter_argument<F>(self, index: usize, intermediate: Type, build: F) -> ProxyResult<Self>
    where
        F: FnOnce(CallableBuilder) -> ProxyResult<Callable>,
    {
        let outer = self.convention.clone();
        let original = outer
            .param(index)
            .cloned()
            .ok_or_else(|| ProxyError::convention(format!("no parameter {} in {}", index, outer)))?;
        if intermediate == Type::Void {
            return Err(ProxyError::convention("cannot filter an argument to void"));
        }
        let filter = self.sub_callable(Convention::new(intermediate.clone(), [original]), build)?;
        let next = outer.with_param_changed(index, intermediate)?;
        Ok(self.push(next, move |target| {
            Ok(Callable::new(outer, move |mut args: ArgVec| {
                let value = std::mem::take(&mut args[index]);
                args[index] = filter.invoke(smallvec![value])?;
                target.invoke(args)
            }))
        }))
    }

    /// Filter each of the trailing `count` arguments through one shared filter.
    ///
    /// The arguments are first converted to `from`; `build` gets a builder
    /// for `(from) -> to` and runs once.
    pub fn filter_last_arguments<F>(
        self,
        count: usize,
        from: Type,
        to: Type,
        build: F,
    ) -> ProxyResult<Self>
    where
        F: FnOnce(CallableBuilder) -> ProxyResult<Callable>,
    {
        let outer = self.convention.clone();
        let total = outer.param_count();
        if count > total {
            return Err(ProxyError::convention(format!(
                "cannot filter {} arguments of {}",
                count, outer
            )));
        }
        if from == Type::Void || to == Type::Void {
            return Err(ProxyError::convention("cannot filter arguments through void"));
        }
        let start = total - count;
        if let Some(bad) = outer.params()[start..].iter().find(|ty| !ty.can_convert_to(&from)) {
            return Err(ProxyError::convention(format!(
                "cannot convert {} argument to {}",
                bad, from
            )));
        }
        let filter = self.sub_callable(Convention::new(to.clone(), [from.clone()]), build)?;
        let next = Convention::new(
            outer.ret().clone(),
            outer.params()[..start]
                .iter()
                .cloned()
                .chain(std::iter::repeat_n(to, count)),
        );
        Ok(self.push(next, move |target| {
            Ok(Callable::new(outer.clone(), move |mut args: ArgVec| {
                for (ty, arg) in outer.params()[start..].iter().zip(&mut args[start..]) {
                    let value = ty.convert(&from, std::mem::take(arg))?;
                    *arg = filter.invoke(smallvec![value])?;
                }
                target.invoke(args)
            }))
        }))
    }

    // =========================================================================
    // Finishers
    // =========================================================================

    /// Finish with `target`, which must have the current convention.
    ///
    /// The target is not invoked here.
    pub fn finish(self, target: Callable) -> ProxyResult<Callable> {
        if target.convention() != &self.convention {
            return Err(ProxyError::convention(format!(
                "target {} does not match {}",
                target.convention(),
                self.convention
            )));
        }
        (self.pipeline)(target)
    }

    /// Finish with a target returning its first argument.
    pub fn finish_as_identity(self) -> ProxyResult<Callable> {
        let convention = self.convention.clone();
        let first = convention
            .param(0)
            .cloned()
            .ok_or_else(|| ProxyError::convention(format!("{} has no argument to return", convention)))?;
        let ret = convention.ret().clone();
        if !first.can_convert_to(&ret) {
            return Err(ProxyError::convention(format!(
                "cannot return {} argument as {}",
                first, ret
            )));
        }
        let target = Callable::new(convention, move |args: ArgVec| {
            let value = args.into_iter().next().unwrap_or_default();
            first.convert(&ret, value)
        });
        self.finish(target)
    }

    /// Finish with a target ignoring its arguments and returning `value`.
    pub fn finish_as_constant(self, value: Value) -> ProxyResult<Callable> {
        let target = Callable::constant(self.convention.clone(), value)?;
        self.finish(target)
    }

    /// Finish with a member resolved through `lookup`.
    ///
    /// The member's natural convention must equal the current convention.
    /// Virtual members are dispatched through a fresh inline cache keyed on
    /// the receiver's class.
    pub fn resolve_and_finish(
        self,
        lookup: &Lookup,
        member: &MemberDescriptor,
    ) -> ProxyResult<Callable> {
        let resolved = lookup.resolve(member)?;
        let target = if member.is_virtual() {
            let cache = InlineCache::for_member(resolved, member.clone()).with_limit(self.cache_limit);
            Arc::new(cache).into_callable()
        } else {
            resolved
        };
        self.finish(target)
    }
}

impl fmt::Debug for CallableBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableBuilder")
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}

/// `value` followed by `args`.
#[inline]
fn prepend(value: Value, args: ArgVec) -> ArgVec {
    let mut out = ArgVec::with_capacity(args.len() + 1);
    out.push(value);
    out.extend(args);
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dynproxy_core::{ClassBuilder, Instance};
    use parking_lot::Mutex;

    fn conv<const N: usize>(ret: Type, params: [Type; N]) -> Convention {
        Convention::new(ret, params)
    }

    fn concat() -> Callable {
        Callable::new(conv(Type::Str, [Type::Str, Type::Str]), |args: ArgVec| {
            let a = args[0].as_str().unwrap_or("");
            let b = args[1].as_str().unwrap_or("");
            Ok(Value::str(format!("{}{}", a, b)))
        })
    }

    #[test]
    fn test_box_all_identity_round_trip() {
        let callable = CallableBuilder::new(conv(Type::Any, [Type::Int, Type::Str]))
            .box_all()
            .finish_as_identity()
            .unwrap();
        let result = callable.call([Value::Int(1), Value::str("two")]).unwrap();
        assert_eq!(result, Value::array([Value::Int(1), Value::str("two")]));
    }

    #[test]
    fn test_box_last() {
        let callable = CallableBuilder::new(conv(Type::Any, [Type::Int, Type::Str, Type::Bool]))
            .box_last(2)
            .unwrap()
            .drop_first()
            .unwrap()
            .finish_as_identity()
            .unwrap();
        let result = callable
            .call([Value::Int(1), Value::str("x"), Value::Bool(true)])
            .unwrap();
        assert_eq!(result, Value::array([Value::str("x"), Value::Bool(true)]));

        let err = CallableBuilder::new(conv(Type::Any, [Type::Int]))
            .box_last(2)
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConventionMismatch { .. }));
    }

    #[test]
    fn test_drop_then_insert_is_transparent() {
        let callable = CallableBuilder::new(conv(Type::Str, [Type::Str, Type::Str]))
            .drop_parameter(1)
            .unwrap()
            .insert_argument(1, Type::Str, Value::str("!"))
            .unwrap()
            .finish(concat())
            .unwrap();
        assert_eq!(
            callable.call([Value::str("hi"), Value::str("ignored")]).unwrap(),
            Value::str("hi!")
        );
    }

    #[test]
    fn test_insert_argument_checks_value() {
        let err = CallableBuilder::new(conv(Type::Str, [Type::Str]))
            .insert_argument(0, Type::Int, Value::str("x"))
            .unwrap_err();
        assert!(matches!(err, ProxyError::TypeMismatch { .. }));

        let err = CallableBuilder::new(conv(Type::Str, [Type::Str]))
            .insert_argument(3, Type::Int, Value::Int(0))
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConventionMismatch { .. }));
    }

    #[test]
    fn test_finish_rejects_mismatch_without_invoking() {
        let invoked = Arc::new(Mutex::new(false));
        let flag = invoked.clone();
        let target = Callable::new(conv(Type::Int, [Type::Int]), move |_| {
            *flag.lock() = true;
            Ok(Value::Int(0))
        });
        let err = CallableBuilder::new(conv(Type::Str, [Type::Int]))
            .finish(target)
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConventionMismatch { .. }));
        assert!(!*invoked.lock());
    }

    #[test]
    fn test_convert_to() {
        let callable = CallableBuilder::new(conv(Type::Any, [Type::Any, Type::Any]))
            .convert_to(conv(Type::Str, [Type::Str, Type::Str]))
            .unwrap()
            .finish(concat())
            .unwrap();
        assert_eq!(
            callable.call([Value::str("a"), Value::str("b")]).unwrap(),
            Value::str("ab")
        );
        assert!(matches!(
            callable.call([Value::Int(1), Value::str("b")]),
            Err(ProxyError::TypeMismatch { .. })
        ));

        let err = CallableBuilder::new(conv(Type::Any, [Type::Any]))
            .convert_to(conv(Type::Any, []))
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConventionMismatch { .. }));
    }

    #[test]
    fn test_convert_return_type() {
        let callable = CallableBuilder::new(conv(Type::Float, [Type::Int]))
            .convert_return_type(Type::Int)
            .unwrap()
            .finish_as_identity()
            .unwrap();
        assert_eq!(callable.call([Value::Int(3)]).unwrap(), Value::Float(3.0));

        assert!(CallableBuilder::new(conv(Type::Int, [Type::Int]))
            .convert_return_type(Type::Str)
            .is_err());
    }

    #[test]
    fn test_before_runs_first_with_same_arguments() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook_log = log.clone();
        let target_log = log.clone();
        let target = Callable::new(conv(Type::Void, [Type::Str]), move |args: ArgVec| {
            target_log.lock().push(format!("target {}", args[0]));
            Ok(Value::Unit)
        });

        let callable = CallableBuilder::new(conv(Type::Void, [Type::Str]))
            .before(|b| {
                b.finish(Callable::new(conv(Type::Void, [Type::Str]), move |args: ArgVec| {
                    hook_log.lock().push(format!("hook {}", args[0]));
                    Ok(Value::Unit)
                }))
            })
            .unwrap()
            .finish(target)
            .unwrap();
        callable.call([Value::str("x")]).unwrap();
        assert_eq!(*log.lock(), vec!["hook x".to_string(), "target x".to_string()]);
    }

    #[test]
    fn test_before_rejects_wrong_hook() {
        let err = CallableBuilder::new(conv(Type::Void, [Type::Str]))
            .before(|_| Ok(Callable::identity(Type::Str)))
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConventionMismatch { .. }));
    }

    #[test]
    fn test_after_sees_result_and_arguments() {
        let callable = CallableBuilder::new(conv(Type::Str, [Type::Str, Type::Str]))
            .after(|b| {
                assert_eq!(b.convention().param_count(), 3);
                b.drop_parameter(1)?.finish(concat())
            })
            .unwrap()
            .finish(concat())
            .unwrap();
        assert_eq!(
            callable.call([Value::str("a"), Value::str("b")]).unwrap(),
            Value::str("abb")
        );
    }

    #[test]
    fn test_trap_catches_matching_kind() {
        let io = ClassBuilder::class("IoError").build();
        let eof = ClassBuilder::class("EofError").implements(&io).build();
        let other = ClassBuilder::class("OtherError").build();

        let raising = |kind: ClassRef| {
            Callable::new(conv(Type::Str, [Type::Str]), move |_| {
                Err(ProxyError::raise(&kind, "boom"))
            })
        };
        let trapped = |target: Callable| {
            CallableBuilder::new(conv(Type::Str, [Type::Str]))
                .trap(&io, |b| b.drop_first()?.finish_as_identity())
                .unwrap()
                .finish(target)
                .unwrap()
        };

        let callable = trapped(raising(eof));
        assert_eq!(callable.call([Value::str("fallback")]).unwrap(), Value::str("fallback"));

        let callable = trapped(raising(other.clone()));
        let err = callable.call([Value::str("fallback")]).unwrap_err();
        assert!(err.is_raised_kind(&other));
    }

    #[test]
    fn test_compose_return() {
        let length = Callable::new(conv(Type::Int, [Type::Str]), |args: ArgVec| {
            Ok(Value::Int(args[0].as_str().map_or(0, |s| s.len() as i64)))
        });
        let callable = CallableBuilder::new(conv(Type::Int, [Type::Str, Type::Str]))
            .compose_return(Type::Str, |b| b.finish(length))
            .unwrap()
            .finish(concat())
            .unwrap();
        assert_eq!(
            callable.call([Value::str("ab"), Value::str("cde")]).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn test_compose_return_from_void() {
        let callable = CallableBuilder::new(conv(Type::Int, [Type::Str]))
            .compose_return(Type::Void, |b| b.finish_as_constant(Value::Int(7)))
            .unwrap()
            .finish(Callable::new(conv(Type::Void, [Type::Str]), |_| Ok(Value::Unit)))
            .unwrap();
        assert_eq!(callable.call([Value::str("x")]).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_filter_argument() {
        let shout = Callable::new(conv(Type::Str, [Type::Str]), |args: ArgVec| {
            Ok(Value::str(args[0].as_str().unwrap_or("").to_uppercase()))
        });
        let callable = CallableBuilder::new(conv(Type::Str, [Type::Str, Type::Str]))
            .filter_argument(1, Type::Str, |b| b.finish(shout))
            .unwrap()
            .finish(concat())
            .unwrap();
        assert_eq!(
            callable.call([Value::str("a"), Value::str("b")]).unwrap(),
            Value::str("aB")
        );
        assert!(CallableBuilder::new(conv(Type::Str, [Type::Str]))
            .filter_argument(4, Type::Str, |b| b.finish_as_identity())
            .is_err());
    }

    #[test]
    fn test_filter_last_arguments_shares_one_filter() {
        let builds = Arc::new(Mutex::new(0));
        let counter = builds.clone();
        let callable = CallableBuilder::new(conv(Type::Str, [Type::Int, Type::Int]))
            .filter_last_arguments(2, Type::Any, Type::Str, move |b| {
                *counter.lock() += 1;
                b.finish(Callable::new(conv(Type::Str, [Type::Any]), |args: ArgVec| {
                    Ok(Value::str(args[0].to_string()))
                }))
            })
            .unwrap()
            .finish(concat())
            .unwrap();
        assert_eq!(callable.call([Value::Int(1), Value::Int(2)]).unwrap(), Value::str("12"));
        assert_eq!(*builds.lock(), 1);
    }

    #[test]
    fn test_drop_all_and_constant() {
        let callable = CallableBuilder::new(conv(Type::Str, [Type::Int, Type::Int]))
            .drop_all()
            .finish_as_constant(Value::str("k"))
            .unwrap();
        assert_eq!(callable.call([Value::Int(1), Value::Int(2)]).unwrap(), Value::str("k"));

        let err = CallableBuilder::new(conv(Type::Int, []))
            .finish_as_constant(Value::str("k"))
            .unwrap_err();
        assert!(matches!(err, ProxyError::TypeMismatch { .. }));
    }

    #[test]
    fn test_finish_as_identity_requires_argument() {
        let err = CallableBuilder::new(conv(Type::Int, []))
            .finish_as_identity()
            .unwrap_err();
        assert!(matches!(err, ProxyError::ConventionMismatch { .. }));
    }

    #[test]
    fn test_resolve_and_finish_virtual() {
        let shape = ClassBuilder::interface("Shape")
            .abstract_method("sides", [], Type::Int)
            .build();
        let triangle = ClassBuilder::class("Triangle")
            .implements(&shape)
            .method("sides", [], Type::Int, |_| Ok(Value::Int(3)))
            .build();
        let sides = shape.member("sides", &[]).unwrap();

        let callable = CallableBuilder::new(sides.natural_convention())
            .resolve_and_finish(&Lookup::public(), &sides)
            .unwrap();
        let receiver = Instance::new(&triangle, ());
        assert_eq!(callable.call([receiver]).unwrap(), Value::Int(3));
        assert!(matches!(
            callable.invoke(smallvec![Value::Null]),
            Err(ProxyError::NullReceiver { .. })
        ));
    }
}
