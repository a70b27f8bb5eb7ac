//! Core types for typeswitch dispatch.
//!
//! This crate contains the pieces of a type switch that do not depend on a
//! particular call site:
//! - `TypeToken` / `Polymorphic` - per-concrete-type identity and views
//! - `DispatchRecord` - the cached (case, adjustment) pair
//! - `SlotCache` / `BackingStore` - direct-mapped cache over an append-only map
//! - `Target` - the adjusted handle handed to a case body
//! - `CacheConfig` / `DispatchError` - configuration and construction errors

pub mod adjust;
pub mod cache;
pub mod config;
pub mod error;
pub mod map;
pub mod record;
pub mod token;

pub use adjust::{Adjustment, Target};
pub use cache::{BackingStore, CacheStats, SlotCache};
pub use config::CacheConfig;
pub use error::{DispatchError, DispatchResult};
pub use map::{FastHashMap, fast_map_new, fast_map_with_capacity};
pub use record::{CaseIndex, DispatchRecord, MAX_CASES, NO_MATCH, RecordState, UNRESOLVED};
pub use token::{Polymorphic, StaticView, TypeAnchor, TypeToken};
