//! Classes, interfaces and member descriptors.
//!
//! A `Class` is the runtime type of an object. It carries:
//! - A unique `ClassId` (used as the inline cache guard key)
//! - Name and owning module (used for access checks)
//! - Supertypes (superclass and implemented interfaces)
//! - Declared members and the method table of implemented members
//!
//! # Architecture
//!
//! ```text
//! ClassRef ── Arc<Class>
//!             ├── id: ClassId
//!             ├── name: Arc<str>
//!             └── def: OnceLock<ClassDef>      (published by ClassBuilder::build)
//!                 ├── module, flags
//!                 ├── supertypes: SmallVec<ClassRef; 2>
//!                 ├── members: [Arc<MemberSig>]
//!                 └── methods: FxHashMap<MemberKey, MethodFn>
//! ```
//!
//! The class shell exists before its definition is published so members can
//! mention the class itself (fluent setters returning the interface type).
//! Classes are never unloaded.

use crate::callable::{ArgVec, Callable, MethodFn};
use crate::convention::Convention;
use crate::error::{ProxyError, ProxyResult};
use crate::types::Type;
use crate::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Class Identity
// =============================================================================

/// Global counter for allocating class identifiers.
static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a class for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    fn allocate() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags describing a class.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u32 {
        /// Visible from every module.
        const PUBLIC = 1 << 0;
        /// Interface (no instances of its own).
        const INTERFACE = 1 << 1;
        /// Cannot be extended.
        const FINAL = 1 << 2;
        /// Created by the proxy type synthesizer.
        const SYNTHETIC = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Flags describing a member.
    ///
    /// A member that is neither `PUBLIC` nor `PRIVATE` is visible within its
    /// declaring class's module.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u32 {
        const PUBLIC = 1 << 0;
        const PRIVATE = 1 << 1;
        /// No receiver.
        const STATIC = 1 << 2;
        /// No body in the declaring class.
        const ABSTRACT = 1 << 3;
    }
}

// =============================================================================
// Members
// =============================================================================

/// Method table key: name plus parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub name: Arc<str>,
    pub params: SmallVec<[Type; 4]>,
}

/// Signature of a declared member.
#[derive(Debug)]
pub struct MemberSig {
    name: Arc<str>,
    params: SmallVec<[Type; 4]>,
    ret: Type,
    exceptions: Vec<ClassRef>,
    flags: MemberFlags,
}

impl MemberSig {
    fn key(&self) -> MemberKey {
        MemberKey {
            name: self.name.clone(),
            params: self.params.clone(),
        }
    }
}

/// Opaque description of a member: name, declaring class, signature and flags.
#[derive(Clone)]
pub struct MemberDescriptor {
    declaring: ClassRef,
    sig: Arc<MemberSig>,
}

impl MemberDescriptor {
    #[inline]
    pub fn name(&self) -> &str {
        &self.sig.name
    }

    #[inline]
    pub fn declaring(&self) -> &ClassRef {
        &self.declaring
    }

    #[inline]
    pub fn params(&self) -> &[Type] {
        &self.sig.params
    }

    #[inline]
    pub fn param_count(&self) -> usize {
        self.sig.params.len()
    }

    #[inline]
    pub fn return_type(&self) -> &Type {
        &self.sig.ret
    }

    /// Error classes this member declares it may raise.
    #[inline]
    pub fn exceptions(&self) -> &[ClassRef] {
        &self.sig.exceptions
    }

    #[inline]
    pub fn flags(&self) -> MemberFlags {
        self.sig.flags
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.sig.flags.contains(MemberFlags::STATIC)
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.sig.flags.contains(MemberFlags::ABSTRACT)
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.sig.flags.contains(MemberFlags::PUBLIC)
    }

    #[inline]
    pub fn is_private(&self) -> bool {
        self.sig.flags.contains(MemberFlags::PRIVATE)
    }

    /// Check if calls may dispatch on the receiver's runtime class.
    #[inline]
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private()
    }

    /// Method table key for this member.
    pub fn key(&self) -> MemberKey {
        self.sig.key()
    }

    /// Convention of a direct call to this member.
    ///
    /// Instance members take their receiver (typed as the declaring class)
    /// as the first parameter.
    pub fn natural_convention(&self) -> Convention {
        let receiver = (!self.is_static()).then(|| Type::Class(self.declaring.clone()));
        Convention::new(
            self.sig.ret.clone(),
            receiver.into_iter().chain(self.sig.params.iter().cloned()),
        )
    }

    /// Resolve the implementation of this member for one concrete class.
    ///
    /// The result has the natural convention and calls the body found on
    /// `class` directly, without looking at the receiver's class again.
    pub fn resolve_for(&self, class: &ClassRef) -> ProxyResult<Callable> {
        let body = class.find_method(&self.key()).ok_or_else(|| ProxyError::NoSuchMember {
            class: class.name().to_string(),
            member: self.to_string(),
        })?;
        Ok(Callable::from_fn(self.natural_convention(), body))
    }
}

impl PartialEq for MemberDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.declaring == other.declaring && Arc::ptr_eq(&self.sig, &other.sig)
    }
}

impl fmt::Display for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.declaring.name(), self.sig.name)?;
        for (i, param) in self.sig.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.sig.ret)
    }
}

impl fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}]", self, self.sig.flags)
    }
}

// =============================================================================
// Class
// =============================================================================

/// Published definition of a class.
struct ClassDef {
    module: Arc<str>,
    flags: ClassFlags,
    supertypes: SmallVec<[ClassRef; 2]>,
    members: Box<[Arc<MemberSig>]>,
    methods: FxHashMap<MemberKey, MethodFn>,
}

/// Runtime class or interface.
pub struct Class {
    id: ClassId,
    name: Arc<str>,
    def: OnceLock<ClassDef>,
}

/// Shared handle to a class. Equality and hashing use the class identity.
#[derive(Clone)]
pub struct ClassRef(Arc<Class>);

impl ClassRef {
    #[inline]
    pub fn id(&self) -> ClassId {
        self.0.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Owning module ("" until the class is built).
    pub fn module(&self) -> &str {
        self.0.def.get().map_or("", |def| &*def.module)
    }

    pub fn flags(&self) -> ClassFlags {
        self.0.def.get().map_or(ClassFlags::empty(), |def| def.flags)
    }

    #[inline]
    pub fn is_interface(&self) -> bool {
        self.flags().contains(ClassFlags::INTERFACE)
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.flags().contains(ClassFlags::PUBLIC)
    }

    /// Direct supertypes.
    pub fn supertypes(&self) -> &[ClassRef] {
        match self.0.def.get() {
            Some(def) => &def.supertypes,
            None => &[],
        }
    }

    /// Check if this class is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &ClassRef) -> bool {
        self == other || self.supertypes().iter().any(|s| s.is_subclass_of(other))
    }

    /// Members declared by this class itself.
    pub fn declared_members(&self) -> impl Iterator<Item = MemberDescriptor> + '_ {
        let sigs: &[Arc<MemberSig>] = match self.0.def.get() {
            Some(def) => &def.members,
            None => &[],
        };
        sigs.iter().map(move |sig| MemberDescriptor {
            declaring: self.clone(),
            sig: sig.clone(),
        })
    }

    /// Declared and inherited members, most derived first.
    ///
    /// A member inherited from a supertype is hidden by a member with the
    /// same key declared closer to this class.
    pub fn all_members(&self) -> Vec<MemberDescriptor> {
        let mut seen = FxHashSet::default();
        let mut members = Vec::new();
        self.collect_members(&mut seen, &mut members);
        members
    }

    fn collect_members(&self, seen: &mut FxHashSet<MemberKey>, out: &mut Vec<MemberDescriptor>) {
        for member in self.declared_members() {
            if seen.insert(member.key()) {
                out.push(member);
            }
        }
        for supertype in self.supertypes() {
            supertype.collect_members(seen, out);
        }
    }

    /// Find a member by name and parameter types anywhere in the hierarchy.
    pub fn member(&self, name: &str, params: &[Type]) -> Option<MemberDescriptor> {
        self.all_members()
            .into_iter()
            .find(|m| m.name() == name && m.params() == params)
    }

    /// Find the implementation of `key`.
    ///
    /// The class's own table is searched first, then superclasses
    /// depth-first, then interfaces depth-first. A superclass override
    /// therefore beats an interface default regardless of the order the
    /// supertypes were added in.
    pub fn find_method(&self, key: &MemberKey) -> Option<MethodFn> {
        let def = self.0.def.get()?;
        if let Some(body) = def.methods.get(key) {
            return Some(body.clone());
        }
        let (interfaces, classes): (SmallVec<[&ClassRef; 2]>, SmallVec<[&ClassRef; 2]>) =
            def.supertypes.iter().partition(|s| s.is_interface());
        classes
            .into_iter()
            .chain(interfaces)
            .find_map(|s| s.find_method(key))
    }

    /// Instance members named `name` with `arity` parameters that have an
    /// implementation reachable from this class, most derived first.
    pub fn overloads<'a>(
        &'a self,
        name: &'a str,
        arity: usize,
    ) -> impl Iterator<Item = (MemberDescriptor, MethodFn)> + 'a {
        self.all_members()
            .into_iter()
            .filter(move |m| !m.is_static() && m.name() == name && m.param_count() == arity)
            .filter_map(move |m| {
                let body = self.find_method(&m.key())?;
                Some((m, body))
            })
    }

    /// Select the instance member to run for a call with `args`.
    ///
    /// Overloads of the same arity are told apart by their parameter types:
    /// the first overload whose parameters accept every argument wins.
    pub fn select_method(&self, name: &str, args: &[Value]) -> Option<(MemberDescriptor, MethodFn)> {
        self.overloads(name, args.len()).find(|(member, _)| {
            member
                .params()
                .iter()
                .zip(args)
                .all(|(ty, arg)| ty.accepts(arg))
        })
    }
}

impl PartialEq for ClassRef {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.id.0)
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

// =============================================================================
// Class Builder
// =============================================================================

/// Defines a new class or interface.
///
/// # Example
///
/// ```ignore
/// let service = ClassBuilder::interface("Service")
///     .module("demo")
///     .abstract_method("add_user", [Type::Str], Type::Void)
///     .build();
/// ```
pub struct ClassBuilder {
    shell: ClassRef,
    module: Arc<str>,
    flags: ClassFlags,
    supertypes: SmallVec<[ClassRef; 2]>,
    members: Vec<MemberSig>,
    methods: FxHashMap<MemberKey, MethodFn>,
}

impl ClassBuilder {
    fn with_flags(name: &str, flags: ClassFlags) -> Self {
        let shell = ClassRef(Arc::new(Class {
            id: ClassId::allocate(),
            name: Arc::from(name),
            def: OnceLock::new(),
        }));
        Self {
            shell,
            module: Arc::from(""),
            flags,
            supertypes: SmallVec::new(),
            members: Vec::new(),
            methods: FxHashMap::default(),
        }
    }

    /// Start a public interface.
    pub fn interface(name: &str) -> Self {
        Self::with_flags(name, ClassFlags::PUBLIC | ClassFlags::INTERFACE)
    }

    /// Start a public class.
    pub fn class(name: &str) -> Self {
        Self::with_flags(name, ClassFlags::PUBLIC)
    }

    /// Identity the built class will have.
    #[inline]
    pub fn id(&self) -> ClassId {
        self.shell.id()
    }

    /// Type of the class being built, for members mentioning it.
    pub fn this_type(&self) -> Type {
        Type::Class(self.shell.clone())
    }

    pub fn module(mut self, module: &str) -> Self {
        self.module = Arc::from(module);
        self
    }

    /// Restrict visibility to the owning module.
    pub fn module_private(mut self) -> Self {
        self.flags.remove(ClassFlags::PUBLIC);
        self
    }

    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Add a superclass or implemented interface.
    ///
    /// Method lookup prefers superclasses over interfaces; within each
    /// group supertypes are searched in the order they were added.
    pub fn implements(mut self, supertype: &ClassRef) -> Self {
        self.supertypes.push(supertype.clone());
        self
    }

    /// Declare a member. Members without a body are abstract.
    pub fn declare<P>(
        mut self,
        name: &str,
        params: P,
        ret: Type,
        mut flags: MemberFlags,
        body: Option<MethodFn>,
    ) -> Self
    where
        P: IntoIterator<Item = Type>,
    {
        if body.is_none() {
            flags |= MemberFlags::ABSTRACT;
        }
        let sig = MemberSig {
            name: Arc::from(name),
            params: params.into_iter().collect(),
            ret,
            exceptions: Vec::new(),
            flags,
        };
        if let Some(body) = body {
            self.methods.insert(sig.key(), body);
        }
        self.members.push(sig);
        self
    }

    /// Declare a public abstract instance member.
    pub fn abstract_method<P>(self, name: &str, params: P, ret: Type) -> Self
    where
        P: IntoIterator<Item = Type>,
    {
        self.declare(name, params, ret, MemberFlags::PUBLIC, None)
    }

    /// Declare a public instance member with a body.
    ///
    /// The body receives the receiver followed by the arguments. On an
    /// interface this is a default method.
    pub fn method<P, F>(self, name: &str, params: P, ret: Type, body: F) -> Self
    where
        P: IntoIterator<Item = Type>,
        F: Fn(ArgVec) -> ProxyResult<Value> + Send + Sync + 'static,
    {
        self.declare(name, params, ret, MemberFlags::PUBLIC, Some(Arc::new(body)))
    }

    /// Declare a public static member.
    pub fn static_method<P, F>(self, name: &str, params: P, ret: Type, body: F) -> Self
    where
        P: IntoIterator<Item = Type>,
        F: Fn(ArgVec) -> ProxyResult<Value> + Send + Sync + 'static,
    {
        let flags = MemberFlags::PUBLIC | MemberFlags::STATIC;
        self.declare(name, params, ret, flags, Some(Arc::new(body)))
    }

    /// Declare the error classes the last declared member may raise.
    pub fn throws(mut self, kinds: &[ClassRef]) -> Self {
        if let Some(last) = self.members.last_mut() {
            last.exceptions.extend(kinds.iter().cloned());
        }
        self
    }

    /// Publish the definition and return the class.
    pub fn build(self) -> ClassRef {
        let def = ClassDef {
            module: self.module,
            flags: self.flags,
            supertypes: self.supertypes,
            members: self.members.into_iter().map(Arc::new).collect(),
            methods: self.methods,
        };
        // The shell is private to this builder, so the cell is always empty here.
        let _ = self.shell.0.def.set(def);
        self.shell
    }
}
