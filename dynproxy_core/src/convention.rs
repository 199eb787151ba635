//! Calling conventions: ordered parameter types plus a return type.

use crate::error::{ProxyError, ProxyResult};
use crate::types::Type;
use smallvec::SmallVec;
use std::fmt;

/// Inline parameter capacity before spilling to the heap.
pub const INLINE_PARAMS: usize = 6;

/// Parameter list storage.
pub type ParamVec = SmallVec<[Type; INLINE_PARAMS]>;

/// The externally observable parameter/return shape of a callable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Convention {
    params: ParamVec,
    ret: Type,
}

impl Convention {
    /// Create a convention returning `ret` and taking `params`.
    pub fn new<I: IntoIterator<Item = Type>>(ret: Type, params: I) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
        }
    }

    /// Parameter types in order.
    #[inline]
    pub fn params(&self) -> &[Type] {
        &self.params
    }

    /// Type of the parameter at `index`.
    #[inline]
    pub fn param(&self, index: usize) -> Option<&Type> {
        self.params.get(index)
    }

    #[inline]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn ret(&self) -> &Type {
        &self.ret
    }

    /// Same parameters, different return type.
    pub fn with_return(&self, ret: Type) -> Self {
        Self {
            params: self.params.clone(),
            ret,
        }
    }

    /// Insert a parameter at `index` (`index == param_count()` appends).
    pub fn with_param_inserted(&self, index: usize, ty: Type) -> ProxyResult<Self> {
        self.check_index(index, self.params.len() + 1)?;
        let mut params = self.params.clone();
        params.insert(index, ty);
        Ok(Self {
            params,
            ret: self.ret.clone(),
        })
    }

    /// Remove the parameter at `index`.
    pub fn with_param_removed(&self, index: usize) -> ProxyResult<Self> {
        self.check_index(index, self.params.len())?;
        let mut params = self.params.clone();
        params.remove(index);
        Ok(Self {
            params,
            ret: self.ret.clone(),
        })
    }

    /// Replace the parameter type at `index`.
    pub fn with_param_changed(&self, index: usize, ty: Type) -> ProxyResult<Self> {
        self.check_index(index, self.params.len())?;
        let mut params = self.params.clone();
        params[index] = ty;
        Ok(Self {
            params,
            ret: self.ret.clone(),
        })
    }

    /// Check if a callable of this convention can be adapted to `outer`.
    ///
    /// Arguments flow from `outer` into this convention and the result flows
    /// back out, so each direction is checked accordingly.
    pub fn can_adapt_to(&self, outer: &Convention) -> bool {
        self.params.len() == outer.params.len()
            && outer
                .params
                .iter()
                .zip(&self.params)
                .all(|(from, to)| from.can_convert_to(to))
            && self.ret.can_convert_to(&outer.ret)
    }

    #[inline]
    fn check_index(&self, index: usize, bound: usize) -> ProxyResult<()> {
        if index < bound {
            Ok(())
        } else {
            Err(ProxyError::convention(format!(
                "parameter index {} out of range for {}",
                index, self
            )))
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

impl fmt::Debug for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
