//! Proxy type synthesis and factories.
//!
//! A `ProxyFactory` defines one fresh class implementing an interface. The
//! class carries a fixed list of field slots and one `DispatchSite` per
//! forwarded member. Each forwarding body loads the receiver, every field
//! value and the call arguments, and invokes its site.
//!
//! ```text
//!   proxy.add_user("x")
//!     └─▶ forwarding body ──▶ site.invoke(proxy, field0, .., "x")
//!                                └─▶ (first call) policy.link(context)
//! ```

use crate::binding::{DispatchSite, ProxyPolicy};
use crate::config::ProxyConfig;
use crate::instance::{FieldLayout, FieldSlot, ProxyInstance};
use dynproxy_core::{
    ArgVec, Callable, ClassBuilder, ClassFlags, ClassRef, Convention, Lookup, MemberFlags,
    MemberKey, ProxyError, ProxyResult, Type, Value,
};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counter for naming synthesized classes.
static NEXT_PROXY_ID: AtomicU32 = AtomicU32::new(0);

// =============================================================================
// Blueprint
// =============================================================================

/// Interface plus the field slots its proxies carry.
#[derive(Debug, Clone)]
pub struct InterfaceBlueprint {
    interface: ClassRef,
    fields: Vec<FieldSlot>,
}

impl InterfaceBlueprint {
    /// Check access to `interface` and declare one slot per field type.
    ///
    /// The policy is asked once per slot whether it is mutable.
    pub fn new(
        lookup: &Lookup,
        interface: &ClassRef,
        field_types: &[Type],
        policy: &dyn ProxyPolicy,
    ) -> ProxyResult<Self> {
        if !lookup.can_access_class(interface) {
            return Err(ProxyError::InterfaceNotAccessible {
                interface: interface.name().to_string(),
                reason: "not visible from the lookup".to_string(),
            });
        }
        if !interface.is_interface() {
            return Err(ProxyError::InterfaceNotAccessible {
                interface: interface.name().to_string(),
                reason: "not an interface".to_string(),
            });
        }
        let fields = field_types
            .iter()
            .enumerate()
            .map(|(index, ty)| {
                if *ty == Type::Void {
                    return Err(ProxyError::type_mismatch("field type", ty));
                }
                Ok(FieldSlot {
                    ty: ty.clone(),
                    mutable: policy.is_mutable(index, ty),
                })
            })
            .collect::<ProxyResult<Vec<_>>>()?;
        Ok(Self {
            interface: interface.clone(),
            fields,
        })
    }

    #[inline]
    pub fn interface(&self) -> &ClassRef {
        &self.interface
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSlot] {
        &self.fields
    }
}

// =============================================================================
// Synthesized Type
// =============================================================================

/// Class created for one factory, with its layout and dispatch sites.
pub struct SynthesizedType {
    interface: ClassRef,
    class: ClassRef,
    layout: Arc<FieldLayout>,
    sites: Vec<Arc<DispatchSite>>,
    index: FxHashMap<MemberKey, usize>,
}

impl SynthesizedType {
    /// Define the proxy class for `blueprint`.
    pub fn synthesize(
        blueprint: InterfaceBlueprint,
        policy: Arc<dyn ProxyPolicy>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        let interface = blueprint.interface;
        let name = format!(
            "{}$Proxy{}",
            interface.name(),
            NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed)
        );
        let mut class = ClassBuilder::class(&name)
            .module(interface.module())
            .flags(ClassFlags::FINAL | ClassFlags::SYNTHETIC)
            .implements(&interface);
        let layout = Arc::new(FieldLayout::new(class.id(), blueprint.fields));

        let mut sites = Vec::new();
        let mut index = FxHashMap::default();
        for member in interface.all_members() {
            if !member.is_virtual() {
                continue;
            }
            if !member.is_abstract() && !policy.override_member(&member) {
                continue;
            }
            let convention = Convention::new(
                member.return_type().clone(),
                std::iter::once(Type::Any)
                    .chain(layout.types().cloned())
                    .chain(member.params().iter().cloned()),
            );
            let site = Arc::new(DispatchSite::new(
                member.clone(),
                convention,
                Arc::clone(&layout),
                Arc::clone(&policy),
                Arc::clone(&config),
            ));
            let body = forwarding_body(Arc::clone(&layout), Arc::clone(&site));
            class = class.declare(
                member.name(),
                member.params().iter().cloned(),
                member.return_type().clone(),
                MemberFlags::PUBLIC,
                Some(body),
            );
            index.insert(member.key(), sites.len());
            sites.push(site);
        }

        let class = class.build();
        tracing::debug!(
            interface = %interface,
            class = %class,
            fields = layout.len(),
            forwarded = sites.len(),
            "synthesized proxy type"
        );
        Self {
            interface,
            class,
            layout,
            sites,
            index,
        }
    }

    #[inline]
    pub fn interface(&self) -> &ClassRef {
        &self.interface
    }

    #[inline]
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    #[inline]
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Dispatch sites in member order.
    #[inline]
    pub fn sites(&self) -> &[Arc<DispatchSite>] {
        &self.sites
    }

    /// Dispatch site of the forwarded member `name(params...)`.
    pub fn site(&self, name: &str, params: &[Type]) -> Option<&Arc<DispatchSite>> {
        let key = MemberKey {
            name: Arc::from(name),
            params: params.iter().cloned().collect(),
        };
        self.index.get(&key).map(|&i| &self.sites[i])
    }
}

impl fmt::Debug for SynthesizedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesizedType")
            .field("interface", &self.interface)
            .field("class", &self.class)
            .field("layout", &self.layout)
            .field("sites", &self.sites)
            .finish()
    }
}

/// Body of a forwarded member: receiver, fields, then arguments.
fn forwarding_body(
    layout: Arc<FieldLayout>,
    site: Arc<DispatchSite>,
) -> dynproxy_core::MethodFn {
    Arc::new(move |args: ArgVec| {
        let mut forwarded = ArgVec::with_capacity(args.len() + layout.len());
        forwarded.push(args[0].clone());
        let instance = layout.instance_of(&args[0])?;
        for i in 0..layout.len() {
            forwarded.push(instance.field(i)?);
        }
        forwarded.extend(args.into_iter().skip(1));
        site.invoke(forwarded)
    })
}

// =============================================================================
// Factory
// =============================================================================

/// Creates instances of one synthesized proxy type.
///
/// # Example
///
/// ```ignore
/// let factory = ProxyFactory::new(&lookup, &service, &[Type::Class(service.clone())], policy)?;
/// let proxy = factory.create([target])?;
/// proxy.invoke("add_user", [Value::str("James Bond")])?;
/// ```
pub struct ProxyFactory {
    synthesized: SynthesizedType,
}

impl ProxyFactory {
    /// Synthesize a proxy type for `interface` with the default config.
    pub fn new<P>(
        lookup: &Lookup,
        interface: &ClassRef,
        field_types: &[Type],
        policy: P,
    ) -> ProxyResult<Self>
    where
        P: ProxyPolicy + 'static,
    {
        Self::with_config(lookup, interface, field_types, policy, ProxyConfig::default())
    }

    /// Synthesize a proxy type for `interface` with an explicit config.
    pub fn with_config<P>(
        lookup: &Lookup,
        interface: &ClassRef,
        field_types: &[Type],
        policy: P,
        config: ProxyConfig,
    ) -> ProxyResult<Self>
    where
        P: ProxyPolicy + 'static,
    {
        let blueprint = InterfaceBlueprint::new(lookup, interface, field_types, &policy)?;
        let synthesized = SynthesizedType::synthesize(blueprint, Arc::new(policy), Arc::new(config));
        Ok(Self { synthesized })
    }

    /// Factory for proxies without fields, using the public lookup.
    pub fn anonymous<P>(interface: &ClassRef, policy: P) -> ProxyResult<Self>
    where
        P: ProxyPolicy + 'static,
    {
        Self::new(&Lookup::public(), interface, &[], policy)
    }

    /// Create a proxy holding `values` in its field slots.
    pub fn create<I>(&self, values: I) -> ProxyResult<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        ProxyInstance::allocate(&self.synthesized.class, &self.synthesized.layout, values)
    }

    /// Callable of convention `(field types...) -> interface` creating proxies.
    pub fn constructor(&self) -> Callable {
        let class = self.synthesized.class.clone();
        let layout = Arc::clone(&self.synthesized.layout);
        let interface = self.interface().clone();
        let convention = Convention::new(Type::Class(interface), layout.types().cloned());
        Callable::new(convention, move |args: ArgVec| {
            ProxyInstance::allocate(&class, &layout, args)
        })
    }

    /// Interface implemented by the proxies.
    #[inline]
    pub fn interface(&self) -> &ClassRef {
        &self.synthesized.interface
    }

    #[inline]
    pub fn synthesized_type(&self) -> &SynthesizedType {
        &self.synthesized
    }
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("class", &self.synthesized.class)
            .finish_non_exhaustive()
    }
}
