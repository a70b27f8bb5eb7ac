//! Type identity tokens.
//!
//! Every concrete type that takes part in a type switch owns exactly one
//! `TypeAnchor` static. The anchor's address is the type's `TypeToken`: it is
//! pointer-sized, stable for the whole process and distinct for every type,
//! which is all the dispatch cache needs from it.

use std::any::{Any, TypeId};
use std::fmt;

use crate::adjust::Adjustment;

/// Pointer-sized identity of a concrete type.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeToken(usize);

impl TypeToken {
    /// Never produced by an anchor; marks an empty cache slot.
    pub const EMPTY: TypeToken = TypeToken(0);

    #[inline]
    pub fn of_anchor(anchor: &'static TypeAnchor) -> Self {
        TypeToken(anchor as *const TypeAnchor as usize)
    }

    /// Builds a token from a raw address.
    ///
    /// Only meaningful for synthetic tokens in cache tests and tools; a token
    /// that does not come from an anchor identifies no type.
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        TypeToken(raw)
    }

    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeToken({:#x})", self.0)
    }
}

/// Per-type static whose address serves as the type's token.
///
/// The name keeps anchors of different types from ever being identical
/// statics and shows up in logs.
pub struct TypeAnchor {
    name: &'static str,
}

impl TypeAnchor {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn token(&'static self) -> TypeToken {
        TypeToken::of_anchor(self)
    }
}

impl fmt::Debug for TypeAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAnchor")
            .field("name", &self.name)
            .field("addr", &(self as *const TypeAnchor))
            .finish()
    }
}

/// A view every value of a type offers, at an offset fixed by the layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticView {
    pub type_id: TypeId,
    pub adjustment: Adjustment,
}

impl StaticView {
    pub fn new(type_id: TypeId, offset: usize) -> Self {
        Self {
            type_id,
            adjustment: Adjustment::from_bytes(offset as isize),
        }
    }

    /// Appends a view unless an earlier one already answers `type_id`.
    pub fn push_unique(views: &mut Vec<StaticView>, type_id: TypeId, offset: usize) {
        if views.iter().all(|v| v.type_id != type_id) {
            views.push(StaticView::new(type_id, offset));
        }
    }
}

/// A value that can be classified by a type switch.
///
/// Use the [`polymorphic!`](crate::polymorphic) macro rather than writing an
/// implementation by hand.
///
/// # Safety
///
/// Cached dispatch replays the answers of this trait without asking again,
/// so implementations must be functions of the concrete type alone:
/// - `type_token` returns the same token for every value of the implementing
///   type and a token no other type returns;
/// - `concrete_type_id` returns `TypeId::of::<Self>()`;
/// - `view` returns `None`, `self`, or a reference to a field stored inline
///   in `self` (never behind a pointer); a returned reference has type
///   `target`, and whether it returns `Some` depends only on `target`;
/// - `static_views` lists exactly the targets `view` answers, each with the
///   byte offset of the returned reference from `self`, in the order `view`
///   checks them.
pub unsafe trait Polymorphic: 'static {
    fn type_token(&self) -> TypeToken;

    fn concrete_type_id(&self) -> TypeId;

    /// Views this value as `target`, the type-switch counterpart of a
    /// checked downcast.
    fn view(&self, target: TypeId) -> Option<&dyn Any>;

    /// Kind tag for closed hierarchies.
    fn kind(&self) -> Option<u32> {
        None
    }

    fn type_name(&self) -> &'static str;

    /// Views of this type known without a value. The default fits types
    /// whose only view is the value itself.
    fn static_views() -> Vec<StaticView>
    where
        Self: Sized,
    {
        vec![StaticView::new(TypeId::of::<Self>(), 0)]
    }
}

/// Implements [`Polymorphic`] for a concrete type.
///
/// ```
/// use ts_core::{polymorphic, Polymorphic};
///
/// struct Header { id: u32 }
/// struct Circle { radius: f64, header: Header }
/// struct Square { side: f64 }
///
/// polymorphic!(Header);
/// polymorphic!(Circle { header: Header });
/// polymorphic!(Square, kind = 1);
///
/// let c = Circle { radius: 1.0, header: Header { id: 7 } };
/// assert!(c.view(std::any::TypeId::of::<Header>()).is_some());
/// assert_ne!(c.type_token(), Square { side: 2.0 }.type_token());
/// ```
///
/// Fields listed in braces become additional views of the type, the way a
/// base-class subobject is a view of a derived object.
#[macro_export]
macro_rules! polymorphic {
    ($ty:ty $({ $($field:ident : $fty:ty),* $(,)? })? $(, kind = $kind:expr)? $(;)?) => {
        unsafe impl $crate::token::Polymorphic for $ty {
            #[inline]
            fn type_token(&self) -> $crate::token::TypeToken {
                static ANCHOR: $crate::token::TypeAnchor = $crate::token::TypeAnchor::new(
                    concat!(module_path!(), "::", stringify!($ty)),
                );
                ANCHOR.token()
            }

            #[inline]
            fn concrete_type_id(&self) -> ::std::any::TypeId {
                ::std::any::TypeId::of::<$ty>()
            }

            fn view(&self, target: ::std::any::TypeId) -> Option<&dyn ::std::any::Any> {
                if target == ::std::any::TypeId::of::<$ty>() {
                    return Some(self);
                }
                $($(
                    if target == ::std::any::TypeId::of::<$fty>() {
                        return Some(&self.$field);
                    }
                )*)?
                None
            }

            $(
                #[inline]
                fn kind(&self) -> Option<u32> {
                    Some($kind)
                }
            )?

            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }

            #[allow(unused_mut)]
            fn static_views() -> ::std::vec::Vec<$crate::token::StaticView> {
                let mut views = ::std::vec![$crate::token::StaticView::new(
                    ::std::any::TypeId::of::<$ty>(),
                    0,
                )];
                $($(
                    $crate::token::StaticView::push_unique(
                        &mut views,
                        ::std::any::TypeId::of::<$fty>(),
                        ::std::mem::offset_of!($ty, $field),
                    );
                )*)?
                views
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Header {
        #[allow(dead_code)]
        id: u32,
    }
    #[repr(C)]
    struct Tagged {
        pad: u64,
        header: Header,
    }
    struct Plain;

    crate::polymorphic!(Header);
    crate::polymorphic!(Tagged { header: Header }, kind = 3);
    crate::polymorphic!(Plain);

    #[test]
    fn tokens_are_stable_per_type() {
        let a = Plain;
        let b = Plain;
        assert_eq!(a.type_token(), b.type_token());
        assert!(!a.type_token().is_empty());
    }

    #[test]
    fn tokens_discriminate_types() {
        let t = Tagged {
            pad: 0,
            header: Header { id: 1 },
        };
        assert_ne!(t.type_token(), Plain.type_token());
        assert_ne!(t.type_token(), t.header.type_token());
    }

    #[test]
    fn view_returns_self_and_inline_fields() {
        let t = Tagged {
            pad: 9,
            header: Header { id: 1 },
        };
        let me = t.view(TypeId::of::<Tagged>()).unwrap();
        assert_eq!(me as *const dyn Any as *const u8, &t as *const Tagged as *const u8);
        let header = t.view(TypeId::of::<Header>()).unwrap();
        assert_eq!(
            header as *const dyn Any as *const u8,
            &t.header as *const Header as *const u8
        );
        assert!(t.view(TypeId::of::<Plain>()).is_none());
        assert_eq!(t.pad, 9);
    }

    #[test]
    fn static_views_match_dynamic_views() {
        let t = Tagged {
            pad: 0,
            header: Header { id: 1 },
        };
        let views = Tagged::static_views();
        assert_eq!(
            views,
            vec![
                StaticView::new(TypeId::of::<Tagged>(), 0),
                StaticView::new(TypeId::of::<Header>(), std::mem::offset_of!(Tagged, header)),
            ]
        );
        for v in &views {
            let dynamic = t.view(v.type_id).unwrap();
            assert_eq!(Adjustment::measure(&t, dynamic), v.adjustment);
        }
        assert_eq!(Plain::static_views().len(), 1);
    }

    #[test]
    fn kind_defaults_to_none() {
        assert_eq!(Plain.kind(), None);
        let t = Tagged {
            pad: 0,
            header: Header { id: 1 },
        };
        assert_eq!(t.kind(), Some(3));
        assert_eq!(t.type_name(), "Tagged");
        assert_eq!(t.concrete_type_id(), TypeId::of::<Tagged>());
    }
}
