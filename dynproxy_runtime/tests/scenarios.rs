//! End-to-end proxy scenarios.
//!
//! Coverage:
//! - Interception: a hook inspects arguments before forwarding to a real
//!   implementation held in a proxy field
//! - Beans: getters and fluent setters backed by a map held in a proxy field

use dynproxy_core::{
    ArgVec, Callable, ClassBuilder, ClassRef, Convention, Instance, Lookup, ProxyError,
    ProxyResult, Type, Value,
};
use dynproxy_runtime::{CallableBuilder, NegotiationContext, ProxyFactory, ProxyPolicy};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

// =============================================================================
// Interception
// =============================================================================

mod interception {
    use super::*;

    struct Fixture {
        service: ClassRef,
        security: ClassRef,
        service_impl: ClassRef,
        created: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let service = ClassBuilder::interface("Service")
            .module("demo")
            .abstract_method("add_user", [Type::Str], Type::Void)
            .build();
        let security = ClassBuilder::class("SecurityException").build();
        let created = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&created);
        let service_impl = ClassBuilder::class("ServiceImpl")
            .module("demo")
            .implements(&service)
            .method("add_user", [Type::Str], Type::Void, move |args: ArgVec| {
                log.lock().push(args[1].to_string());
                Ok(Value::Unit)
            })
            .build();
        Fixture {
            service,
            security,
            service_impl,
            created,
        }
    }

    /// Rejects any call whose first argument mentions "Evil".
    fn intercept(security: ClassRef) -> Callable {
        Callable::new(Convention::new(Type::Void, [Type::Array]), move |args: ArgVec| {
            let rejected = args[0]
                .as_array()
                .and_then(|items| items.first())
                .is_some_and(|first| first.to_string().contains("Evil"));
            if rejected {
                Err(ProxyError::raise(&security, "don't be Evil !"))
            } else {
                Ok(Value::Unit)
            }
        })
    }

    struct Interceptor {
        lookup: Lookup,
        intercept: Callable,
    }

    impl ProxyPolicy for Interceptor {
        fn link(&self, cx: &NegotiationContext<'_>) -> ProxyResult<Callable> {
            let intercept = self.intercept.clone();
            cx.builder()
                .drop_first()?
                .before(|b| b.drop_first()?.box_all().finish(intercept))?
                .resolve_and_finish(&self.lookup, cx.member())
        }
    }

    fn proxy_for(fixture: &Fixture) -> Value {
        let lookup = Lookup::in_module("demo");
        let policy = Interceptor {
            lookup: lookup.clone(),
            intercept: intercept(fixture.security.clone()),
        };
        let factory = ProxyFactory::new(
            &lookup,
            &fixture.service,
            &[Type::Class(fixture.service.clone())],
            policy,
        )
        .unwrap();
        let service = Instance::new(&fixture.service_impl, ());
        factory.create([service]).unwrap()
    }

    #[test]
    fn test_accepted_call_reaches_target() {
        let fixture = fixture();
        let proxy = proxy_for(&fixture);
        let result = proxy.invoke("add_user", [Value::str("James Bond")]).unwrap();
        assert_eq!(result, Value::Unit);
        assert_eq!(*fixture.created.lock(), vec!["James Bond".to_string()]);
    }

    #[test]
    fn test_rejected_call_never_reaches_target() {
        let fixture = fixture();
        let proxy = proxy_for(&fixture);
        proxy.invoke("add_user", [Value::str("James Bond")]).unwrap();

        let err = proxy.invoke("add_user", [Value::str("Dr Evil")]).unwrap_err();
        assert!(err.is_raised_kind(&fixture.security));
        assert_eq!(err.to_string(), "SecurityException: don't be Evil !");
        assert_eq!(*fixture.created.lock(), vec!["James Bond".to_string()]);
    }

    #[test]
    fn test_trap_recovers_from_rejection() {
        let fixture = fixture();
        let security = fixture.security.clone();
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rejected);

        let add_user = fixture.service.member("add_user", &[Type::Str]).unwrap();
        let guarded = CallableBuilder::new(add_user.natural_convention())
            .trap(&security, move |b| {
                // (SecurityException, Service, str) -> void
                let record = Callable::new(Convention::new(Type::Void, [Type::Str]), move |args: ArgVec| {
                    sink.lock().push(args[0].to_string());
                    Ok(Value::Unit)
                });
                b.drop_first()?.drop_first()?.finish(record)
            })
            .unwrap()
            .before(|b| b.drop_first()?.box_all().finish(intercept(security.clone())))
            .unwrap()
            .resolve_and_finish(&Lookup::in_module("demo"), &add_user)
            .unwrap();

        let service = Instance::new(&fixture.service_impl, ());
        guarded.call([service.clone(), Value::str("Alice")]).unwrap();
        guarded.call([service, Value::str("Dr Evil")]).unwrap();
        assert_eq!(*fixture.created.lock(), vec!["Alice".to_string()]);
        assert_eq!(*rejected.lock(), vec!["Dr Evil".to_string()]);
    }

    #[test]
    fn test_public_lookup_cannot_resolve_module_member() {
        let fixture = fixture();
        let hidden = ClassBuilder::class("Audit")
            .module("demo")
            .implements(&fixture.service)
            .declare(
                "add_user",
                [Type::Str],
                Type::Void,
                dynproxy_core::MemberFlags::empty(),
                Some(Arc::new(|_: ArgVec| Ok(Value::Unit))),
            )
            .build();
        let member = hidden.member("add_user", &[Type::Str]).unwrap();
        let err = CallableBuilder::new(member.natural_convention())
            .resolve_and_finish(&Lookup::public(), &member)
            .unwrap_err();
        assert!(matches!(err, ProxyError::MemberNotAccessible { .. }));
    }
}

// =============================================================================
// Beans
// =============================================================================

mod beans {
    use super::*;

    #[derive(Debug, Default)]
    struct BeanMap(Mutex<FxHashMap<String, Value>>);

    fn map_of(receiver: &Value) -> ProxyResult<&BeanMap> {
        receiver
            .state::<BeanMap>()
            .ok_or_else(|| ProxyError::type_mismatch("HashMap", receiver.type_name()))
    }

    fn hash_map_class() -> ClassRef {
        ClassBuilder::class("HashMap")
            .method("get", [Type::Any], Type::Any, |args: ArgVec| {
                let map = map_of(&args[0])?;
                Ok(map.0.lock().get(&args[1].to_string()).cloned().unwrap_or_default())
            })
            .method("put", [Type::Any, Type::Any], Type::Any, |args: ArgVec| {
                let map = map_of(&args[0])?;
                let previous = map.0.lock().insert(args[1].to_string(), args[2].clone());
                Ok(previous.unwrap_or_default())
            })
            .method("to_string", [], Type::Str, |args: ArgVec| {
                let map = map_of(&args[0])?;
                let map = map.0.lock();
                let mut entries: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                entries.sort();
                Ok(Value::str(format!("{{{}}}", entries.join(", "))))
            })
            .build()
    }

    fn user_interface() -> ClassRef {
        let builder = ClassBuilder::interface("User");
        let user = builder.this_type();
        builder
            .abstract_method("first_name", [], Type::Str)
            .abstract_method("first_name", [Type::Str], user.clone())
            .abstract_method("last_name", [], Type::Str)
            .abstract_method("last_name", [Type::Str], user.clone())
            .abstract_method("age", [], Type::Int)
            .abstract_method("age", [Type::Int], user)
            .abstract_method("to_string", [], Type::Str)
            .build()
    }

    struct BeanPolicy {
        map: ClassRef,
    }

    impl ProxyPolicy for BeanPolicy {
        fn link(&self, cx: &NegotiationContext<'_>) -> ProxyResult<Callable> {
            let lookup = Lookup::public();
            let member = cx.member();
            let map_type = Type::Class(self.map.clone());
            let name = Value::str(member.name());

            if member.name() == "to_string" {
                let to_string = self.map.member("to_string", &[]).ok_or_else(missing)?;
                return cx.builder().drop_first()?.resolve_and_finish(&lookup, &to_string);
            }
            if member.param_count() == 0 {
                // getter: map.get(name)
                let get = self.map.member("get", &[Type::Any]).ok_or_else(missing)?;
                return cx
                    .builder()
                    .drop_first()?
                    .insert_argument(1, Type::Any, name)?
                    .convert_to(Convention::new(Type::Any, [map_type, Type::Any]))?
                    .resolve_and_finish(&lookup, &get);
            }
            // setter: map.put(name, value), then return the proxy itself
            let put = self.map.member("put", &[Type::Any, Type::Any]).ok_or_else(missing)?;
            cx.builder()
                .before(|b| {
                    b.drop_first()?
                        .insert_argument(1, Type::Any, name)?
                        .convert_to(Convention::new(
                            Type::Any,
                            [map_type, Type::Any, Type::Any],
                        ))?
                        .resolve_and_finish(&lookup, &put)
                })?
                .drop_parameter(1)?
                .drop_parameter(1)?
                .finish_as_identity()
        }
    }

    fn missing() -> ProxyError {
        ProxyError::convention("HashMap member not found")
    }

    fn new_bean(factory: &ProxyFactory, map: &ClassRef) -> Value {
        factory.create([Instance::new(map, BeanMap::default())]).unwrap()
    }

    #[test]
    fn test_setters_and_getters() {
        let map = hash_map_class();
        let user = user_interface();
        let factory = ProxyFactory::new(
            &Lookup::public(),
            &user,
            &[Type::Class(map.clone())],
            BeanPolicy { map: map.clone() },
        )
        .unwrap();

        let bean = new_bean(&factory, &map);
        let returned = bean
            .invoke("first_name", [Value::str("Fox")])
            .and_then(|b| b.invoke("last_name", [Value::str("Mulder")]))
            .and_then(|b| b.invoke("age", [Value::Int(30)]))
            .unwrap();

        assert_eq!(returned, bean);
        assert_eq!(bean.invoke("age", []).unwrap(), Value::Int(30));
        assert_eq!(bean.invoke("last_name", []).unwrap(), Value::str("Mulder"));
        assert_eq!(
            bean.invoke("to_string", []).unwrap(),
            Value::str("{age=30, first_name=Fox, last_name=Mulder}")
        );
    }

    #[test]
    fn test_beans_share_type_not_state() {
        let map = hash_map_class();
        let user = user_interface();
        let factory = ProxyFactory::new(
            &Lookup::public(),
            &user,
            &[Type::Class(map.clone())],
            BeanPolicy { map: map.clone() },
        )
        .unwrap();

        let a = new_bean(&factory, &map);
        let b = new_bean(&factory, &map);
        a.invoke("age", [Value::Int(1)]).unwrap();
        b.invoke("age", [Value::Int(2)]).unwrap();
        assert_eq!(a.invoke("age", []).unwrap(), Value::Int(1));
        assert_eq!(b.invoke("age", []).unwrap(), Value::Int(2));

        let age = factory.synthesized_type().site("age", &[Type::Int]).unwrap();
        assert_eq!(age.link_attempts(), 1);
    }

    #[test]
    fn test_getter_of_unset_primitive_fails() {
        let map = hash_map_class();
        let factory = ProxyFactory::new(
            &Lookup::public(),
            &user_interface(),
            &[Type::Class(map.clone())],
            BeanPolicy { map: map.clone() },
        )
        .unwrap();
        let bean = new_bean(&factory, &map);
        assert_eq!(bean.invoke("first_name", []).unwrap(), Value::Null);
        assert!(matches!(
            bean.invoke("age", []),
            Err(ProxyError::TypeMismatch { .. })
        ));
    }
}
