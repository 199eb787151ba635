//! Access tokens and member resolution.
//!
//! A `Lookup` stands for the caller's vantage point. It decides which
//! classes and members the caller may see, and turns member descriptors
//! into callables.
//!
//! # Visibility
//!
//! ```text
//!   member \ token     │ public()   in_module(m)
//!   ───────────────────┼──────────────────────────
//!   public             │   yes      yes
//!   module (default)   │   no       if declared in m
//!   private            │   no       if declared in m
//! ```
//!
//! A member is only visible if its declaring class is visible too.

use crate::callable::{ArgVec, Callable};
use crate::class::{ClassRef, MemberDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::value::Value;
use std::sync::Arc;

/// Access token used to check visibility and resolve members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    module: Option<Arc<str>>,
}

impl Lookup {
    /// Token that only sees public classes and members.
    pub fn public() -> Self {
        Self { module: None }
    }

    /// Token with full access to the classes of `module`.
    pub fn in_module(module: &str) -> Self {
        Self {
            module: Some(Arc::from(module)),
        }
    }

    /// Module this token belongs to, if any.
    #[inline]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    #[inline]
    fn owns(&self, class: &ClassRef) -> bool {
        self.module.as_deref() == Some(class.module())
    }

    pub fn can_access_class(&self, class: &ClassRef) -> bool {
        class.is_public() || self.owns(class)
    }

    pub fn can_access_member(&self, member: &MemberDescriptor) -> bool {
        let declaring = member.declaring();
        self.can_access_class(declaring) && (member.is_public() || self.owns(declaring))
    }

    /// Resolve a member to a callable of its natural convention.
    ///
    /// Static and private members call their body directly. Virtual members
    /// select the implementation on the receiver's class at every call.
    pub fn resolve(&self, member: &MemberDescriptor) -> ProxyResult<Callable> {
        if !self.can_access_member(member) {
            return Err(ProxyError::MemberNotAccessible {
                member: member.to_string(),
            });
        }
        if !member.is_virtual() {
            return member.resolve_for(member.declaring());
        }

        let key = member.key();
        let target = member.clone();
        Ok(Callable::new(member.natural_convention(), move |args: ArgVec| {
            let class = match args.first() {
                Some(Value::Object(receiver)) => receiver.class().clone(),
                Some(Value::Null) | None => {
                    return Err(ProxyError::NullReceiver {
                        member: target.to_string(),
                    });
                }
                Some(other) => return Err(ProxyError::type_mismatch("object", other.type_name())),
            };
            let body = class.find_method(&key).ok_or_else(|| ProxyError::NoSuchMember {
                class: class.name().to_string(),
                member: target.to_string(),
            })?;
            body(args)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;
    use crate::object::Instance;
    use crate::types::Type;

    #[test]
    fn test_public_token_hides_module_members() {
        let class = ClassBuilder::class("Vault")
            .module("bank")
            .declare(
                "open",
                [],
                Type::Bool,
                crate::class::MemberFlags::empty(),
                Some(Arc::new(|_: ArgVec| Ok(Value::Bool(true)))),
            )
            .build();
        let open = class.member("open", &[]).unwrap();

        let err = Lookup::public().resolve(&open).unwrap_err();
        assert!(matches!(err, ProxyError::MemberNotAccessible { .. }));
        assert!(Lookup::in_module("bank").resolve(&open).is_ok());
    }

    #[test]
    fn test_module_private_class_hidden() {
        let class = ClassBuilder::interface("Secret")
            .module("bank")
            .module_private()
            .build();
        assert!(!Lookup::public().can_access_class(&class));
        assert!(Lookup::in_module("bank").can_access_class(&class));
        assert!(!Lookup::in_module("shop").can_access_class(&class));
    }

    #[test]
    fn test_virtual_resolution_dispatches_on_receiver() {
        let animal = ClassBuilder::interface("Animal")
            .abstract_method("sound", [], Type::Str)
            .build();
        let dog = ClassBuilder::class("Dog")
            .implements(&animal)
            .method("sound", [], Type::Str, |_| Ok(Value::str("woof")))
            .build();
        let cat = ClassBuilder::class("Cat")
            .implements(&animal)
            .method("sound", [], Type::Str, |_| Ok(Value::str("meow")))
            .build();

        let sound = animal.member("sound", &[]).unwrap();
        let callable = Lookup::public().resolve(&sound).unwrap();
        assert_eq!(callable.call([Instance::new(&dog, ())]).unwrap(), Value::str("woof"));
        assert_eq!(callable.call([Instance::new(&cat, ())]).unwrap(), Value::str("meow"));
        assert!(matches!(
            callable.invoke(smallvec::smallvec![Value::Null]),
            Err(ProxyError::NullReceiver { .. })
        ));
    }

    #[test]
    fn test_static_resolution() {
        let math = ClassBuilder::class("Math")
            .static_method("twice", [Type::Int], Type::Int, |args: ArgVec| {
                Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
            })
            .build();
        let twice = math.member("twice", &[Type::Int]).unwrap();
        let callable = Lookup::public().resolve(&twice).unwrap();
        assert_eq!(callable.convention().param_count(), 1);
        assert_eq!(callable.call([Value::Int(21)]).unwrap(), Value::Int(42));
    }
}
