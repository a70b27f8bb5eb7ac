#![allow(dead_code)]

use std::any::{Any, TypeId};
use std::cell::Cell;

use ts_core::TypeAnchor;
use ts_dispatch::{
    Candidate, Hierarchy, KindMember, Polymorphic, TypeToken, candidates, polymorphic,
};

pub struct Header {
    pub id: u32,
}

pub struct Origin {
    pub x: i32,
    pub y: i32,
}

pub struct Circle {
    pub radius: f64,
    pub header: Header,
}

#[repr(C)]
pub struct Square {
    pub side: f64,
    pub header: Header,
    pub origin: Origin,
}

pub struct Line;

#[repr(C)]
pub struct Blob {
    pub origin: Origin,
    pub weight: u64,
    pub header: Header,
}

pub struct Label {
    pub text: String,
    pub header: Header,
}

polymorphic!(Header);
polymorphic!(Origin);
polymorphic!(Circle { header: Header }, kind = 0);
polymorphic!(Square { header: Header, origin: Origin }, kind = 1);
polymorphic!(Line, kind = 2);
polymorphic!(Blob { origin: Origin, header: Header }, kind = 3);
polymorphic!(Label { header: Header }, kind = 4);

pub fn header(id: u32) -> Header {
    Header { id }
}

pub fn circle(id: u32) -> Circle {
    Circle {
        radius: 1.5,
        header: header(id),
    }
}

pub fn square(id: u32) -> Square {
    Square {
        side: 2.0,
        header: header(id),
        origin: Origin { x: 3, y: -4 },
    }
}

pub fn blob(id: u32) -> Blob {
    Blob {
        origin: Origin { x: -1, y: 1 },
        weight: 9,
        header: header(id),
    }
}

pub fn label(id: u32) -> Label {
    Label {
        text: format!("label-{id}"),
        header: header(id),
    }
}

/// One value of every fixture type, in a fixed order.
pub fn universe() -> Vec<Box<dyn Polymorphic>> {
    vec![
        Box::new(header(1)),
        Box::new(Origin { x: 0, y: 0 }),
        Box::new(circle(2)),
        Box::new(square(3)),
        Box::new(Line),
        Box::new(blob(4)),
        Box::new(label(5)),
    ]
}

/// Every fixture type as a candidate, including the component types.
pub fn candidate_pool() -> Vec<Candidate> {
    candidates![Header, Origin, Circle, Square, Line, Blob, Label].to_vec()
}

/// The shapes that carry a kind tag.
pub fn shape_kinds() -> Hierarchy {
    Hierarchy::closed([
        (0, KindMember::of::<Circle>()),
        (1, KindMember::of::<Square>()),
        (2, KindMember::of::<Line>()),
        (3, KindMember::of::<Blob>()),
        (4, KindMember::of::<Label>()),
    ])
    .unwrap()
}

thread_local! {
    static VIEW_CALLS: Cell<u64> = const { Cell::new(0) };
}

/// Number of `view` calls made on counted fixtures by this thread.
pub fn view_calls() -> u64 {
    VIEW_CALLS.with(|c| c.get())
}

pub fn reset_view_calls() {
    VIEW_CALLS.with(|c| c.set(0));
}

/// Fixture types that count how often they are probed.
macro_rules! counted {
    ($name:ident, $kind:expr) => {
        pub struct $name {
            pub payload: u32,
        }

        unsafe impl Polymorphic for $name {
            fn type_token(&self) -> TypeToken {
                static ANCHOR: TypeAnchor = TypeAnchor::new(stringify!($name));
                ANCHOR.token()
            }

            fn concrete_type_id(&self) -> TypeId {
                TypeId::of::<$name>()
            }

            fn view(&self, target: TypeId) -> Option<&dyn Any> {
                VIEW_CALLS.with(|c| c.set(c.get() + 1));
                (target == TypeId::of::<$name>()).then_some(self as &dyn Any)
            }

            fn kind(&self) -> Option<u32> {
                $kind
            }

            fn type_name(&self) -> &'static str {
                stringify!($name)
            }
        }
    };
}

counted!(Red, Some(0));
counted!(Green, Some(1));
counted!(Blue, Some(2));
counted!(Plain, None);
