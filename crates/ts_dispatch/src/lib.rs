//! Type-switch dispatch sites.
//!
//! A `DispatchSite` classifies values against an ordered list of candidate
//! types. Open hierarchies are probed once per concrete type and served from
//! a slot cache afterwards; closed hierarchies dispatch straight from a kind
//! tag. `SiteTable` owns the sites of a program and creates them on first use.

pub mod candidate;
pub mod probe;
pub mod site;
pub mod strategy;
pub mod table;

pub use candidate::{Candidate, CandidateList};
pub use probe::{ProbeOutcome, probe_sequential};
pub use site::{Dispatch, DispatchSite, SiteBuilder, SiteStats};
pub use strategy::{
    Choice, ClosedKinds, ClosedStrategy, Hierarchy, KindMember, MAX_CLOSED_KIND, OpenStrategy,
    SiteStrategy, Strategy, StrategyKind,
};
pub use table::{SiteId, SiteTable};

pub use ts_core::{
    Adjustment, CacheConfig, CaseIndex, DispatchError, DispatchRecord, DispatchResult, NO_MATCH,
    Polymorphic, StaticView, Target, TypeToken, UNRESOLVED, polymorphic,
};
