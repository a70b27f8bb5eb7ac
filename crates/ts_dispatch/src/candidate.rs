//! Candidate descriptors: the case clauses of a type switch.

use std::any::{Any, TypeId};
use std::fmt;

use smallvec::SmallVec;

/// One case of a type switch, naming the type a value is tried as.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    type_id: TypeId,
    name: &'static str,
}

impl Candidate {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Name without the module path, for logs.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate({})", self.short_name())
    }
}

/// Candidates in declaration order; most switches have a handful of cases.
pub type CandidateList = SmallVec<[Candidate; 8]>;

/// Builds a candidate array in declaration order.
///
/// ```
/// use ts_dispatch::candidates;
/// struct A;
/// struct B;
/// let cs = candidates![A, B];
/// assert_eq!(cs.len(), 2);
/// ```
#[macro_export]
macro_rules! candidates {
    ($($ty:ty),* $(,)?) => {
        [$($crate::Candidate::of::<$ty>()),*]
    };
}
