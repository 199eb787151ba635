//! Adaptive inline cache keyed on the receiver's runtime class.
//!
//! Wraps an endpoint whose first parameter is a receiver and specializes
//! calls per concrete receiver class.
//!
//! # State Machine
//!
//! ```text
//!                    ┌───────────────┐
//!                    │ Uninitialized │
//!                    └───────┬───────┘
//!                            │ first miss
//!                    ╔═══════▼═══════╗
//!                    ║  Monomorphic  ║
//!                    ╚═══════╤═══════╝
//!                            │ miss (different class)
//!                    ╔═══════▼═══════╗
//!                    ║  Polymorphic  ║  (up to `limit` guards)
//!                    ╚═══════╤═══════╝
//!                            │ miss with `limit` classes seen
//!                    ┌───────▼───────┐
//!                    │  Megamorphic  │  (endpoint only, permanent)
//!                    └───────────────┘
//! ```
//!
//! # Thread Safety
//!
//! The guard chain is an immutable snapshot published through `ArcSwap`.
//! Readers never lock. Writers rebuild the chain with `rcu`, so two threads
//! missing on the same class at once may both specialize it; the duplicate
//! guard is skipped and the distinct class counter may run one ahead. Every
//! guard maps a class to a target that is correct for it.

use arc_swap::ArcSwap;
use dynproxy_core::{
    ArgVec, Callable, ClassId, ClassRef, MemberDescriptor, ProxyResult, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Default number of receiver classes specialized before going megamorphic.
pub const MAX_RECEIVER_TYPES: usize = 8;

/// Produces the target specialized for one concrete receiver class.
pub type Specializer = Arc<dyn Fn(&ClassRef) -> ProxyResult<Callable> + Send + Sync>;

// =============================================================================
// Cache State
// =============================================================================

/// Coarse classification of an inline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No receiver class seen yet.
    Uninitialized,
    /// One guard.
    Monomorphic,
    /// Several guards.
    Polymorphic,
    /// Limit exceeded; all calls use the endpoint.
    Megamorphic,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Calls answered by a guard.
    pub hits: u64,
    /// Calls that missed every guard (including megamorphic calls).
    pub misses: u64,
    /// Guards currently installed.
    pub guards: usize,
}

impl CacheStats {
    /// Fraction of calls answered by a guard.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Guard Chain
// =============================================================================

#[derive(Clone)]
struct Guard {
    class: ClassId,
    target: Callable,
}

#[derive(Clone, Default)]
struct Chain {
    /// Most recently inserted first.
    guards: Vec<Guard>,
    megamorphic: bool,
}

impl Chain {
    #[inline]
    fn find(&self, class: ClassId) -> Option<&Callable> {
        self.guards
            .iter()
            .find(|guard| guard.class == class)
            .map(|guard| &guard.target)
    }
}

// =============================================================================
// Inline Cache
// =============================================================================

/// Receiver-class keyed dispatch chain in front of an endpoint.
pub struct InlineCache {
    endpoint: Callable,
    specializer: Option<Specializer>,
    limit: usize,
    chain: ArcSwap<Chain>,
    /// Distinct receiver classes specialized so far.
    seen: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InlineCache {
    /// Cache whose specialized targets are the endpoint itself.
    pub fn new(endpoint: Callable) -> Self {
        Self {
            endpoint,
            specializer: None,
            limit: MAX_RECEIVER_TYPES,
            chain: ArcSwap::from_pointee(Chain::default()),
            seen: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Use `specializer` to build the target for each new receiver class.
    ///
    /// Specialized targets must have the endpoint's convention.
    pub fn with_specializer<F>(mut self, specializer: F) -> Self
    where
        F: Fn(&ClassRef) -> ProxyResult<Callable> + Send + Sync + 'static,
    {
        self.specializer = Some(Arc::new(specializer));
        self
    }

    /// Override the number of classes specialized before going megamorphic.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Cache in front of a resolved virtual member.
    ///
    /// Each receiver class gets the implementation found on that class, so
    /// guarded calls skip the per-call method lookup of `endpoint`.
    pub fn for_member(endpoint: Callable, member: MemberDescriptor) -> Self {
        Self::new(endpoint).with_specializer(move |class| member.resolve_for(class))
    }

    /// Wrap the cache into a callable with the endpoint's convention.
    pub fn into_callable(self: Arc<Self>) -> Callable {
        let convention = self.endpoint.convention().clone();
        Callable::new(convention, move |args| self.invoke(args))
    }

    #[inline]
    pub fn endpoint(&self) -> &Callable {
        &self.endpoint
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Invoke through the cache.
    pub fn invoke(&self, args: ArgVec) -> ProxyResult<Value> {
        let class = match args.first() {
            Some(Value::Object(receiver)) => receiver.class().clone(),
            // Null and non-object receivers: the endpoint reports the error
            _ => return self.endpoint.invoke(args),
        };

        let chain = self.chain.load();
        if !chain.megamorphic {
            if let Some(target) = chain.find(class.id()) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return target.invoke(args);
            }
        }
        let megamorphic = chain.megamorphic;
        drop(chain);

        self.misses.fetch_add(1, Ordering::Relaxed);
        if megamorphic {
            return self.endpoint.invoke(args);
        }
        let target = self.miss(&class)?;
        target.invoke(args)
    }

    /// Slow path: specialize for `class` or go megamorphic.
    #[cold]
    fn miss(&self, class: &ClassRef) -> ProxyResult<Callable> {
        if self.seen.load(Ordering::Relaxed) >= self.limit {
            self.chain.store(Arc::new(Chain {
                guards: Vec::new(),
                megamorphic: true,
            }));
            tracing::debug!(
                convention = %self.endpoint.convention(),
                limit = self.limit,
                "inline cache went megamorphic"
            );
            return Ok(self.endpoint.clone());
        }

        let target = match &self.specializer {
            Some(specialize) => specialize(class)?,
            None => self.endpoint.clone(),
        };
        debug_assert_eq!(target.convention(), self.endpoint.convention());

        self.seen.fetch_add(1, Ordering::Relaxed);
        let id = class.id();
        self.chain.rcu(|current| {
            let mut next = Chain::clone(current);
            if !next.megamorphic && next.find(id).is_none() {
                next.guards.insert(
                    0,
                    Guard {
                        class: id,
                        target: target.clone(),
                    },
                );
            }
            next
        });
        tracing::trace!(class = %class, "inline cache guard inserted");
        Ok(target)
    }

    /// Number of guards currently installed.
    pub fn guard_count(&self) -> usize {
        self.chain.load().guards.len()
    }

    #[inline]
    pub fn is_megamorphic(&self) -> bool {
        self.chain.load().megamorphic
    }

    pub fn state(&self) -> CacheState {
        let chain = self.chain.load();
        match (chain.megamorphic, chain.guards.len()) {
            (true, _) => CacheState::Megamorphic,
            (false, 0) => CacheState::Uninitialized,
            (false, 1) => CacheState::Monomorphic,
            (false, _) => CacheState::Polymorphic,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            guards: self.guard_count(),
        }
    }
}

impl std::fmt::Debug for InlineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineCache")
            .field("convention", self.endpoint.convention())
            .field("state", &self.state())
            .field("limit", &self.limit)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
