//! Construction-time errors.
//!
//! Resolving a handle never fails: a value no candidate describes is an
//! ordinary `NO_MATCH` result. Errors only arise while describing a
//! hierarchy, configuring a cache or building a dispatch site.

use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// More candidates than case indices available between the sentinels.
    #[error("type switch declares {count} candidates, at most {max} are supported")]
    TooManyCandidates { count: usize, max: usize },

    /// Two concrete types of a closed hierarchy claim the same kind.
    #[error("kind {kind} is declared more than once in a closed hierarchy")]
    DuplicateKind { kind: u32 },

    /// Kind does not fit the dense jump table of a closed hierarchy.
    #[error("kind {kind} exceeds the largest closed-hierarchy kind {max}")]
    KindOutOfRange { kind: u32, max: u32 },

    #[error("invalid cache size range: min_bits={min} max_bits={max}")]
    InvalidCacheBits { min: u32, max: u32 },

    #[error("invalid token shift {shift}, at most {max} is allowed")]
    InvalidShift { shift: u32, max: u32 },

    #[error("closed hierarchy declares no kinds")]
    EmptyHierarchy,
}
