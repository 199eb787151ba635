//! Lazily linked interface proxies.
//!
//! This crate provides:
//! - `CallableBuilder`: combinators adapting a target to a required convention
//! - `InlineCache`: receiver-class keyed specialization of virtual calls
//! - `DispatchSite` / `ProxyPolicy`: first-call linking through a policy
//! - `ProxyFactory`: synthesis of proxy types implementing an interface
//!
//! # Architecture
//!
//! ```text
//! ProxyFactory::new(lookup, interface, fields, policy)
//!   └─▶ SynthesizedType (fresh class, FieldLayout, one DispatchSite per member)
//!
//! proxy.invoke(member, args)
//!   └─▶ forwarding body ─▶ DispatchSite
//!         ├─ bound:   installed target
//!         └─ unbound: policy.link(NegotiationContext) ─▶ CAS install ─▶ target
//! ```

pub mod binding;
pub mod builder;
pub mod config;
pub mod inline_cache;
pub mod instance;
pub mod synth;

pub use binding::{DispatchSite, LinkFn, NegotiationContext, ProxyPolicy, SiteState, link_with};
pub use builder::CallableBuilder;
pub use config::ProxyConfig;
pub use inline_cache::{CacheState, CacheStats, InlineCache, MAX_RECEIVER_TYPES};
pub use instance::{FieldLayout, FieldSlot, ProxyInstance};
pub use synth::{InterfaceBlueprint, ProxyFactory, SynthesizedType};
