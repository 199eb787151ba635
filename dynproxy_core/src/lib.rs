//! Object model for runtime-synthesized proxies.
//!
//! This crate provides:
//! - Runtime values (`Value`) and types (`Type`)
//! - Calling conventions and type-erased callables
//! - Classes and interfaces with method tables (`Class`, `ClassBuilder`)
//! - Member descriptors and access-checked member resolution (`Lookup`)
//! - Heap objects (`Object`, `Instance`, `Exception`)
//! - The shared error taxonomy (`ProxyError`)
//!
//! The proxy machinery itself (callable builder, inline caches, lazy
//! dispatch sites, type synthesis) lives in `dynproxy_runtime`.

pub mod callable;
pub mod class;
pub mod convention;
pub mod error;
pub mod lookup;
pub mod object;
pub mod types;
pub mod value;

// Re-export commonly used items
pub use callable::{ArgVec, Callable, MethodFn};
pub use class::{
    ClassBuilder, ClassFlags, ClassId, ClassRef, MemberDescriptor, MemberFlags, MemberKey,
};
pub use convention::Convention;
pub use error::{ProxyError, ProxyResult};
pub use lookup::Lookup;
pub use object::{Exception, Instance, Object, ObjectRef, invoke};
pub use types::Type;
pub use value::Value;
