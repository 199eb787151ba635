//! Lazy linking of dispatch sites.
//!
//! Every forwarded member of a synthesized type owns a `DispatchSite`. The
//! site starts unbound; its first invocation asks the factory's
//! `ProxyPolicy` for a target through a `NegotiationContext`, publishes the
//! target with a compare-and-set and forwards the call. Later invocations go
//! straight to the published target.
//!
//! ```text
//!   Unbound ──invoke──▶ Binding ──CAS──▶ Bound
//!      ▲                   │
//!      └────link failed────┘
//! ```
//!
//! Concurrent first calls may all negotiate. One compare-and-set wins and
//! the others finish their own call with the callable they negotiated.

use crate::builder::CallableBuilder;
use crate::config::ProxyConfig;
use crate::instance::FieldLayout;
use arc_swap::ArcSwapOption;
use dynproxy_core::{
    ArgVec, Callable, Convention, MemberDescriptor, ProxyError, ProxyResult, Type, Value,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Policy
// =============================================================================

/// Decides the behavior of a proxy factory's members.
pub trait ProxyPolicy: Send + Sync {
    /// Whether field slot `index` of type `ty` is mutable.
    ///
    /// Asked once per slot while the proxy type is synthesized.
    fn is_mutable(&self, _index: usize, _ty: &Type) -> bool {
        false
    }

    /// Whether a member with a default body is forwarded to the policy.
    ///
    /// Abstract members are always forwarded.
    fn override_member(&self, _member: &MemberDescriptor) -> bool {
        false
    }

    /// Produce the target of a dispatch site.
    ///
    /// The result must have exactly `context.required_convention()`.
    fn link(&self, context: &NegotiationContext<'_>) -> ProxyResult<Callable>;
}

/// Policy made of a single link function.
pub struct LinkFn<F>(F);

/// Wrap a closure into a policy that only implements `link`.
pub fn link_with<F>(link: F) -> LinkFn<F>
where
    F: Fn(&NegotiationContext<'_>) -> ProxyResult<Callable> + Send + Sync,
{
    LinkFn(link)
}

impl<F> ProxyPolicy for LinkFn<F>
where
    F: Fn(&NegotiationContext<'_>) -> ProxyResult<Callable> + Send + Sync,
{
    #[inline]
    fn link(&self, context: &NegotiationContext<'_>) -> ProxyResult<Callable> {
        (self.0)(context)
    }
}

// =============================================================================
// Dispatch Site
// =============================================================================

/// Observable state of a dispatch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    /// No target installed and no link in progress.
    Unbound,
    /// A link is in progress on some thread.
    Binding,
    /// Target installed.
    Bound,
}

/// Per-member lazily linked call target.
pub struct DispatchSite {
    member: MemberDescriptor,
    /// `(any, field types..., member params...) -> member return`.
    convention: Convention,
    layout: Arc<FieldLayout>,
    policy: Arc<dyn ProxyPolicy>,
    config: Arc<ProxyConfig>,
    target: ArcSwapOption<Callable>,
    /// Links currently running.
    linking: AtomicU32,
    /// Links started so far, successful or not.
    link_attempts: AtomicU32,
}

impl DispatchSite {
    pub(crate) fn new(
        member: MemberDescriptor,
        convention: Convention,
        layout: Arc<FieldLayout>,
        policy: Arc<dyn ProxyPolicy>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self {
            member,
            convention,
            layout,
            policy,
            config,
            target: ArcSwapOption::empty(),
            linking: AtomicU32::new(0),
            link_attempts: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn member(&self) -> &MemberDescriptor {
        &self.member
    }

    /// Convention every target of this site must have.
    #[inline]
    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    pub fn state(&self) -> SiteState {
        if self.target.load().is_some() {
            SiteState::Bound
        } else if self.linking.load(Ordering::Acquire) > 0 {
            SiteState::Binding
        } else {
            SiteState::Unbound
        }
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.target.load().is_some()
    }

    /// Number of times the policy's `link` has been called for this site.
    #[inline]
    pub fn link_attempts(&self) -> u32 {
        self.link_attempts.load(Ordering::Relaxed)
    }

    /// Installed target, if bound.
    pub fn target(&self) -> Option<Callable> {
        self.target.load_full().map(|target| Callable::clone(&target))
    }

    /// Invoke the site, linking it first if needed.
    #[inline]
    pub fn invoke(&self, args: ArgVec) -> ProxyResult<Value> {
        let guard = self.target.load();
        if let Some(target) = &*guard {
            return target.invoke(args);
        }
        drop(guard);
        self.link_and_invoke(args)
    }

    #[cold]
    fn link_and_invoke(&self, args: ArgVec) -> ProxyResult<Value> {
        let target = self.link()?;
        target.invoke(args)
    }

    /// Negotiate a target and try to publish it.
    ///
    /// Returns the callable this thread negotiated, whether or not it won
    /// the publication race.
    fn link(&self) -> ProxyResult<Arc<Callable>> {
        self.link_attempts.fetch_add(1, Ordering::Relaxed);
        let negotiated = {
            let _linking = LinkingGuard::enter(&self.linking);
            self.negotiate()
        };

        let candidate = match negotiated {
            Ok(callable) => Arc::new(callable),
            Err(error) => {
                tracing::trace!(member = %self.member, %error, "dispatch site link failed");
                return Err(error);
            }
        };

        let previous = self
            .target
            .compare_and_swap(&None::<Arc<Callable>>, Some(Arc::clone(&candidate)));
        if previous.is_none() {
            tracing::debug!(member = %self.member, "dispatch site bound");
        } else {
            tracing::debug!(member = %self.member, "dispatch site lost bind race");
        }
        Ok(candidate)
    }

    fn negotiate(&self) -> ProxyResult<Callable> {
        let context = NegotiationContext { site: self };
        let callable = self.policy.link(&context)?;
        if callable.convention() != &self.convention {
            return Err(ProxyError::convention(format!(
                "policy linked {} with {} but the site requires {}",
                self.member,
                callable.convention(),
                self.convention
            )));
        }
        Ok(callable)
    }
}

/// Counts one running link; released on drop so a panicking policy
/// does not leave the site reporting `Binding`.
struct LinkingGuard<'a>(&'a AtomicU32);

impl<'a> LinkingGuard<'a> {
    #[inline]
    fn enter(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for LinkingGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for DispatchSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchSite")
            .field("member", &self.member)
            .field("convention", &self.convention)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Negotiation Context
// =============================================================================

/// What a policy may see and use while linking one dispatch site.
pub struct NegotiationContext<'a> {
    site: &'a DispatchSite,
}

impl<'a> NegotiationContext<'a> {
    /// Member being linked.
    #[inline]
    pub fn member(&self) -> &'a MemberDescriptor {
        &self.site.member
    }

    /// Convention the linked target must have.
    #[inline]
    pub fn required_convention(&self) -> &'a Convention {
        &self.site.convention
    }

    /// Builder seeded with the required convention.
    pub fn builder(&self) -> CallableBuilder {
        CallableBuilder::new(self.site.convention.clone())
            .with_cache_limit(self.site.config.inline_cache_limit)
    }

    #[inline]
    pub fn config(&self) -> &'a ProxyConfig {
        &self.site.config
    }

    /// Number of field slots of the proxy type.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.site.layout.len()
    }

    /// Declared type of field slot `index`.
    pub fn field_type(&self, index: usize) -> ProxyResult<&'a Type> {
        Ok(&self.site.layout.slot(index)?.ty)
    }

    /// Callable of convention `(any) -> ty` reading field slot `index`.
    pub fn field_getter(&self, index: usize, ty: Type) -> ProxyResult<Callable> {
        let slot_ty = self.field_type(index)?.clone();
        if ty == Type::Void || !slot_ty.can_convert_to(&ty) {
            return Err(ProxyError::type_mismatch(&ty, &slot_ty));
        }
        let layout = Arc::clone(&self.site.layout);
        let convention = Convention::new(ty.clone(), [Type::Any]);
        Ok(Callable::new(convention, move |args: ArgVec| {
            let instance = layout.instance_of(&args[0])?;
            slot_ty.convert(&ty, instance.field(index)?)
        }))
    }

    /// Callable of convention `(any, ty) -> void` writing field slot `index`.
    ///
    /// Fails with `FieldNotMutable` unless the policy declared the slot
    /// mutable.
    pub fn field_setter(&self, index: usize, ty: Type) -> ProxyResult<Callable> {
        let slot = self.site.layout.slot(index)?;
        if !slot.mutable {
            return Err(ProxyError::FieldNotMutable { index });
        }
        let slot_ty = slot.ty.clone();
        if ty == Type::Void || !ty.can_convert_to(&slot_ty) {
            return Err(ProxyError::type_mismatch(&slot_ty, &ty));
        }
        let layout = Arc::clone(&self.site.layout);
        let convention = Convention::new(Type::Void, [Type::Any, ty.clone()]);
        Ok(Callable::new(convention, move |mut args: ArgVec| {
            let value = ty.convert(&slot_ty, std::mem::take(&mut args[1]))?;
            layout.instance_of(&args[0])?.set_field(index, value)?;
            Ok(Value::Unit)
        }))
    }
}

impl fmt::Debug for NegotiationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationContext")
            .field("member", &self.site.member)
            .field("required_convention", &self.site.convention)
            .finish()
    }
}
