//! Proxy instances and their field layout.
//!
//! Each synthesized type declares a fixed list of field slots. Immutable
//! slots hold their value directly; mutable slots sit behind a
//! `parking_lot::RwLock` held only while one value is copied in or out.

use dynproxy_core::{ClassId, ClassRef, Object, ProxyError, ProxyResult, Type, Value};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

// =============================================================================
// Layout
// =============================================================================

/// Declared type and mutability of one field slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub ty: Type,
    pub mutable: bool,
}

/// Field slots of a synthesized type.
#[derive(Debug)]
pub struct FieldLayout {
    /// Class whose instances use this layout.
    owner: ClassId,
    slots: Box<[FieldSlot]>,
}

impl FieldLayout {
    pub fn new(owner: ClassId, slots: Vec<FieldSlot>) -> Self {
        Self {
            owner,
            slots: slots.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Slot at `index`, or `NoSuchField`.
    pub fn slot(&self, index: usize) -> ProxyResult<&FieldSlot> {
        self.slots.get(index).ok_or(ProxyError::NoSuchField {
            index,
            count: self.slots.len(),
        })
    }

    /// Types of all slots in order.
    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.slots.iter().map(|slot| &slot.ty)
    }

    /// View `value` as an instance of the owning class.
    pub fn instance_of<'a>(&self, value: &'a Value) -> ProxyResult<&'a ProxyInstance> {
        let instance = match value {
            Value::Object(object) => object.as_any().downcast_ref::<ProxyInstance>(),
            Value::Null => {
                return Err(ProxyError::NullReceiver {
                    member: "field access".to_string(),
                });
            }
            _ => None,
        };
        match instance {
            Some(instance) if instance.class.id() == self.owner => Ok(instance),
            _ => Err(ProxyError::type_mismatch("proxy instance", value.type_name())),
        }
    }
}

// =============================================================================
// Instances
// =============================================================================

#[derive(Debug)]
enum FieldCell {
    Fixed(Value),
    Mutable(RwLock<Value>),
}

/// Instance of a synthesized proxy type.
#[derive(Debug)]
pub struct ProxyInstance {
    class: ClassRef,
    cells: Box<[FieldCell]>,
}

impl ProxyInstance {
    /// Allocate an instance of `class` with the given field values.
    ///
    /// Fails with `ArityMismatch` or `TypeMismatch` when the values do not
    /// fit the layout.
    pub fn allocate<I>(class: &ClassRef, layout: &FieldLayout, values: I) -> ProxyResult<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();
        if values.len() != layout.len() {
            return Err(ProxyError::ArityMismatch {
                expected: layout.len(),
                actual: values.len(),
            });
        }
        let cells = layout
            .slots()
            .iter()
            .zip(values)
            .map(|(slot, value)| {
                if !slot.ty.accepts(&value) {
                    return Err(ProxyError::type_mismatch(&slot.ty, value.type_name()));
                }
                Ok(if slot.mutable {
                    FieldCell::Mutable(RwLock::new(value))
                } else {
                    FieldCell::Fixed(value)
                })
            })
            .collect::<ProxyResult<Box<[FieldCell]>>>()?;
        Ok(Value::Object(Arc::new(ProxyInstance {
            class: class.clone(),
            cells,
        })))
    }

    #[inline]
    pub fn field_count(&self) -> usize {
        self.cells.len()
    }

    /// Current value of the field at `index`.
    pub fn field(&self, index: usize) -> ProxyResult<Value> {
        match self.cell(index)? {
            FieldCell::Fixed(value) => Ok(value.clone()),
            FieldCell::Mutable(lock) => Ok(lock.read().clone()),
        }
    }

    /// Overwrite the field at `index`; only mutable slots accept writes.
    pub fn set_field(&self, index: usize, value: Value) -> ProxyResult<()> {
        match self.cell(index)? {
            FieldCell::Fixed(_) => Err(ProxyError::FieldNotMutable { index }),
            FieldCell::Mutable(lock) => {
                *lock.write() = value;
                Ok(())
            }
        }
    }

    #[inline]
    fn cell(&self, index: usize) -> ProxyResult<&FieldCell> {
        self.cells.get(index).ok_or(ProxyError::NoSuchField {
            index,
            count: self.cells.len(),
        })
    }
}

impl Object for ProxyInstance {
    #[inline]
    fn class(&self) -> &ClassRef {
        &self.class
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self) -> String {
        format!("{} proxy", self.class.name())
    }
}
