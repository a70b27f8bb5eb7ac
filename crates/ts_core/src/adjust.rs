//! Pointer adjustment between a generic handle and a resolved view.
//!
//! This is the only module that reinterprets memory. A site measures the
//! byte distance between a handle and the view a candidate probe returned,
//! caches it per type token, and later rebuilds the view from the handle
//! with plain pointer arithmetic. That replay is sound because
//! [`Polymorphic`](crate::Polymorphic) requires views to sit at offsets fixed
//! by the concrete type.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Signed byte offset from a handle's data address to a view of it.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Adjustment(isize);

impl Adjustment {
    pub const ZERO: Adjustment = Adjustment(0);

    #[inline]
    pub const fn from_bytes(bytes: isize) -> Self {
        Adjustment(bytes)
    }

    #[inline]
    pub const fn bytes(self) -> isize {
        self.0
    }

    /// Offset of `view` relative to `handle`.
    pub fn measure<B: ?Sized>(handle: &B, view: &dyn Any) -> Self {
        let base = data_addr(handle) as isize;
        let target = view as *const dyn Any as *const u8 as isize;
        Adjustment(target.wrapping_sub(base))
    }
}

impl fmt::Debug for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Adjustment({:+})", self.0)
    }
}

/// Address of the data a (possibly fat) reference points at.
#[inline]
pub fn data_addr<B: ?Sized>(handle: &B) -> *const u8 {
    handle as *const B as *const u8
}

/// A handle already adjusted to one candidate type.
#[derive(Clone, Copy)]
pub struct Target<'a> {
    ptr: NonNull<u8>,
    type_id: TypeId,
    _borrow: PhantomData<&'a ()>,
}

impl<'a> Target<'a> {
    /// Wraps a view returned by a candidate probe.
    pub fn from_view(view: &'a dyn Any) -> Self {
        Self {
            ptr: NonNull::from(view).cast::<u8>(),
            type_id: view.type_id(),
            _borrow: PhantomData,
        }
    }

    /// Rebuilds a view of `handle` from a cached adjustment.
    ///
    /// # Safety
    ///
    /// `adjustment` must have been measured by [`Adjustment::measure`] on a
    /// view of type `type_id` taken from a value of the same concrete type as
    /// `handle`, and that type must uphold the `Polymorphic` contract.
    #[inline]
    pub unsafe fn apply<B: ?Sized>(handle: &'a B, adjustment: Adjustment, type_id: TypeId) -> Self {
        let base = NonNull::from(handle).cast::<u8>();
        Self {
            // SAFETY: the caller guarantees the offset lands on an inline view
            // of the same allocation as `handle`.
            ptr: unsafe { base.offset(adjustment.bytes()) },
            type_id,
            _borrow: PhantomData,
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Typed access to the view; `None` when `T` is not the view's type.
    #[inline]
    pub fn get<T: Any>(&self) -> Option<&'a T> {
        if !self.is::<T>() {
            return None;
        }
        // SAFETY: `ptr` points at a live `T` borrowed for `'a`, either taken
        // directly from a view or rebuilt under the contract of `apply`.
        Some(unsafe { self.ptr.cast::<T>().as_ref() })
    }
}

impl fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("type_id", &self.type_id)
            .finish()
    }
}
