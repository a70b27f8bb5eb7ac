//! Open and closed dispatch strategies.
//!
//! A hierarchy is described once. Open hierarchies have no intrinsic tag, so
//! their sites probe each new concrete type and cache the answer. Closed
//! hierarchies carry a small-integer kind on every value, and their sites
//! jump straight from the kind to the case without probing or caching.

use std::any::TypeId;

use smallvec::SmallVec;
use tracing::debug;
use ts_core::{
    CacheConfig, CacheStats, CaseIndex, DispatchError, DispatchRecord, DispatchResult,
    FastHashMap, Polymorphic, SlotCache, StaticView, TypeToken, fast_map_new,
};

use crate::candidate::Candidate;

/// Largest kind a closed hierarchy may declare; kinds index a dense table.
pub const MAX_CLOSED_KIND: u32 = 4095;

/// What a strategy knows about a handle before any probing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Choice {
    /// Resolved or no-match; jump without probing.
    Decided(DispatchRecord),
    /// The site has to probe the candidates.
    Unresolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    Open,
    Closed,
}

/// Decides jump targets for one dispatch site.
///
/// The site calls `choose` first and only probes on `Choice::Unresolved`,
/// reporting the outcome back through `on_first_resolution` or
/// `on_no_match`. The `*_after` pair serves re-entry after case `after`.
pub trait Strategy {
    fn choose<B: ?Sized + Polymorphic>(&mut self, handle: &B) -> Choice;

    fn on_first_resolution<B: ?Sized + Polymorphic>(&mut self, handle: &B, record: DispatchRecord);

    fn on_no_match<B: ?Sized + Polymorphic>(&mut self, handle: &B);

    fn choose_after<B: ?Sized + Polymorphic>(&mut self, handle: &B, after: CaseIndex) -> Choice;

    fn on_continuation<B: ?Sized + Polymorphic>(
        &mut self,
        handle: &B,
        after: CaseIndex,
        record: DispatchRecord,
    );

    /// Settled first-match record for a token, if the strategy keeps one.
    fn peek(&self, token: TypeToken) -> Option<DispatchRecord>;

    fn cache_stats(&self) -> CacheStats;
}

/// Description of a class hierarchy, fixed before any site uses it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Hierarchy {
    #[default]
    Open,
    Closed(ClosedKinds),
}

/// The concrete type behind one kind, with the views its layout fixes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindMember {
    candidate: Candidate,
    views: Vec<StaticView>,
}

impl KindMember {
    pub fn of<T: Polymorphic>() -> Self {
        Self {
            candidate: Candidate::of::<T>(),
            views: T::static_views(),
        }
    }

    pub fn candidate(&self) -> Candidate {
        self.candidate
    }

    pub fn views(&self) -> &[StaticView] {
        &self.views
    }

    /// The view a value of this kind offers as `type_id`, if any.
    pub fn view(&self, type_id: TypeId) -> Option<&StaticView> {
        self.views.iter().find(|v| v.type_id == type_id)
    }
}

/// Concrete type of every kind in a closed hierarchy, indexed by kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosedKinds {
    by_kind: SmallVec<[Option<KindMember>; 16]>,
}

impl ClosedKinds {
    pub fn get(&self, kind: u32) -> Option<Candidate> {
        self.member(kind).map(KindMember::candidate)
    }

    pub fn member(&self, kind: u32) -> Option<&KindMember> {
        self.by_kind.get(kind as usize)?.as_ref()
    }

    /// Number of declared kinds.
    pub fn len(&self) -> usize {
        self.by_kind.iter().filter(|k| k.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Candidate)> + '_ {
        self.by_kind
            .iter()
            .enumerate()
            .filter_map(|(k, m)| m.as_ref().map(|m| (k as u32, m.candidate)))
    }
}

impl Hierarchy {
    pub fn open() -> Self {
        Hierarchy::Open
    }

    /// A closed hierarchy from `(kind, concrete type)` pairs.
    pub fn closed<I>(kinds: I) -> DispatchResult<Self>
    where
        I: IntoIterator<Item = (u32, KindMember)>,
    {
        let mut by_kind: SmallVec<[Option<KindMember>; 16]> = SmallVec::new();
        for (kind, member) in kinds {
            if kind > MAX_CLOSED_KIND {
                return Err(DispatchError::KindOutOfRange {
                    kind,
                    max: MAX_CLOSED_KIND,
                });
            }
            let idx = kind as usize;
            if by_kind.len() <= idx {
                by_kind.resize(idx + 1, None);
            }
            if by_kind[idx].is_some() {
                return Err(DispatchError::DuplicateKind { kind });
            }
            by_kind[idx] = Some(member);
        }
        if by_kind.is_empty() {
            return Err(DispatchError::EmptyHierarchy);
        }
        Ok(Hierarchy::Closed(ClosedKinds { by_kind }))
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Hierarchy::Open => StrategyKind::Open,
            Hierarchy::Closed(_) => StrategyKind::Closed,
        }
    }

    /// Picks the strategy for a site switching over this hierarchy.
    pub fn select(
        &self,
        candidates: &[Candidate],
        hint: usize,
        config: CacheConfig,
    ) -> DispatchResult<SiteStrategy> {
        Ok(match self {
            Hierarchy::Open => SiteStrategy::Open(OpenStrategy::new(hint, config)?),
            Hierarchy::Closed(kinds) => {
                config.validate()?;
                SiteStrategy::Closed(ClosedStrategy::new(kinds, candidates))
            }
        })
    }
}

/// Probe once per concrete type, then serve from the slot cache.
pub struct OpenStrategy {
    cache: Option<SlotCache>,
    continuations: FastHashMap<(TypeToken, CaseIndex), DispatchRecord>,
    hint: usize,
    config: CacheConfig,
}

impl OpenStrategy {
    pub fn new(hint: usize, config: CacheConfig) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            cache: None,
            continuations: fast_map_new(),
            hint,
            config,
        })
    }

    /// The slot cache, once the first resolve has created it.
    pub fn cache(&self) -> Option<&SlotCache> {
        self.cache.as_ref()
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn cache_mut(&mut self) -> Option<&mut SlotCache> {
        if self.cache.is_none() {
            let (hint, config) = (self.hint, self.config);
            debug!(hint, bits = config.bits_for_hint(hint), "creating slot cache");
            self.cache = SlotCache::new(hint, config).ok();
        }
        self.cache.as_mut()
    }
}

impl Strategy for OpenStrategy {
    fn choose<B: ?Sized + Polymorphic>(&mut self, handle: &B) -> Choice {
        if !self.config.enabled {
            return Choice::Unresolved;
        }
        let Some(cache) = self.cache_mut() else {
            return Choice::Unresolved;
        };
        let record = cache.get_or_insert(handle.type_token());
        if record.is_unresolved() {
            Choice::Unresolved
        } else {
            Choice::Decided(record)
        }
    }

    fn on_first_resolution<B: ?Sized + Polymorphic>(&mut self, handle: &B, record: DispatchRecord) {
        if !self.config.enabled {
            return;
        }
        if let Some(cache) = self.cache_mut() {
            cache.publish(handle.type_token(), record);
        }
    }

    fn on_no_match<B: ?Sized + Polymorphic>(&mut self, handle: &B) {
        if !self.config.enabled {
            return;
        }
        if let Some(cache) = self.cache_mut() {
            cache.publish(handle.type_token(), DispatchRecord::NO_MATCH);
        }
    }

    fn choose_after<B: ?Sized + Polymorphic>(&mut self, handle: &B, after: CaseIndex) -> Choice {
        if !self.config.enabled {
            return Choice::Unresolved;
        }
        match self.continuations.get(&(handle.type_token(), after)) {
            Some(record) => Choice::Decided(*record),
            None => Choice::Unresolved,
        }
    }

    fn on_continuation<B: ?Sized + Polymorphic>(
        &mut self,
        handle: &B,
        after: CaseIndex,
        record: DispatchRecord,
    ) {
        if self.config.enabled {
            self.continuations
                .entry((handle.type_token(), after))
                .or_insert(record);
        }
    }

    fn peek(&self, token: TypeToken) -> Option<DispatchRecord> {
        self.cache.as_ref().and_then(|c| c.peek(token))
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.as_ref().map(|c| c.stats()).unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
struct KindEntry {
    type_id: TypeId,
    /// Every case this kind's type can be viewed as, in declaration order,
    /// with the adjustment of that view.
    cases: SmallVec<[DispatchRecord; 2]>,
}

/// Jump table from kind tag to case.
#[derive(Clone, Debug)]
pub struct ClosedStrategy {
    table: SmallVec<[Option<KindEntry>; 16]>,
}

impl ClosedStrategy {
    /// Builds the jump table. A kind's cases are the candidates its type
    /// or one of its static views satisfies, so the first entry is the case
    /// sequential probing would pick.
    pub fn new(kinds: &ClosedKinds, candidates: &[Candidate]) -> Self {
        let table = kinds
            .by_kind
            .iter()
            .map(|declared| {
                declared.as_ref().map(|member| KindEntry {
                    type_id: member.candidate.type_id(),
                    cases: candidates
                        .iter()
                        .enumerate()
                        .filter_map(|(i, c)| {
                            let view = member.view(c.type_id())?;
                            Some(DispatchRecord::resolved(i as CaseIndex + 1, view.adjustment))
                        })
                        .collect(),
                })
            })
            .collect();
        Self { table }
    }

    /// Cases reachable for `kind`, first match first.
    pub fn cases_for_kind(&self, kind: u32) -> Vec<CaseIndex> {
        match self.table.get(kind as usize) {
            Some(Some(entry)) => entry.cases.iter().map(|r| r.case).collect(),
            _ => Vec::new(),
        }
    }

    fn entry<B: ?Sized + Polymorphic>(&self, handle: &B) -> Option<&KindEntry> {
        let kind = handle.kind()?;
        let entry = self.table.get(kind as usize)?.as_ref()?;
        // A kind is only trusted for the type it was declared with.
        if entry.type_id != handle.concrete_type_id() {
            debug!(kind, ty = handle.type_name(), "kind tag disagrees with declared type");
            return None;
        }
        Some(entry)
    }
}

fn decided(record: Option<DispatchRecord>) -> Choice {
    Choice::Decided(record.unwrap_or(DispatchRecord::NO_MATCH))
}

impl Strategy for ClosedStrategy {
    fn choose<B: ?Sized + Polymorphic>(&mut self, handle: &B) -> Choice {
        decided(self.entry(handle).and_then(|e| e.cases.first().copied()))
    }

    fn on_first_resolution<B: ?Sized + Polymorphic>(
        &mut self,
        _handle: &B,
        _record: DispatchRecord,
    ) {
    }

    fn on_no_match<B: ?Sized + Polymorphic>(&mut self, _handle: &B) {}

    fn choose_after<B: ?Sized + Polymorphic>(&mut self, handle: &B, after: CaseIndex) -> Choice {
        decided(
            self.entry(handle)
                .and_then(|e| e.cases.iter().copied().find(|r| r.case > after)),
        )
    }

    fn on_continuation<B: ?Sized + Polymorphic>(
        &mut self,
        _handle: &B,
        _after: CaseIndex,
        _record: DispatchRecord,
    ) {
    }

    fn peek(&self, _token: TypeToken) -> Option<DispatchRecord> {
        None
    }

    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// The strategy a site was built with.
pub enum SiteStrategy {
    Open(OpenStrategy),
    Closed(ClosedStrategy),
}

impl SiteStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            SiteStrategy::Open(_) => StrategyKind::Open,
            SiteStrategy::Closed(_) => StrategyKind::Closed,
        }
    }
}

impl Strategy for SiteStrategy {
    #[inline]
    fn choose<B: ?Sized + Polymorphic>(&mut self, handle: &B) -> Choice {
        match self {
            SiteStrategy::Open(s) => s.choose(handle),
            SiteStrategy::Closed(s) => s.choose(handle),
        }
    }

    fn on_first_resolution<B: ?Sized + Polymorphic>(&mut self, handle: &B, record: DispatchRecord) {
        match self {
            SiteStrategy::Open(s) => s.on_first_resolution(handle, record),
            SiteStrategy::Closed(s) => s.on_first_resolution(handle, record),
        }
    }

    fn on_no_match<B: ?Sized + Polymorphic>(&mut self, handle: &B) {
        match self {
            SiteStrategy::Open(s) => s.on_no_match(handle),
            SiteStrategy::Closed(s) => s.on_no_match(handle),
        }
    }

    fn choose_after<B: ?Sized + Polymorphic>(&mut self, handle: &B, after: CaseIndex) -> Choice {
        match self {
            SiteStrategy::Open(s) => s.choose_after(handle, after),
            SiteStrategy::Closed(s) => s.choose_after(handle, after),
        }
    }

    fn on_continuation<B: ?Sized + Polymorphic>(
        &mut self,
        handle: &B,
        after: CaseIndex,
        record: DispatchRecord,
    ) {
        match self {
            SiteStrategy::Open(s) => s.on_continuation(handle, after, record),
            SiteStrategy::Closed(s) => s.on_continuation(handle, after, record),
        }
    }

    fn peek(&self, token: TypeToken) -> Option<DispatchRecord> {
        match self {
            SiteStrategy::Open(s) => s.peek(token),
            SiteStrategy::Closed(s) => s.peek(token),
        }
    }

    fn cache_stats(&self) -> CacheStats {
        match self {
            SiteStrategy::Open(s) => s.cache_stats(),
            SiteStrategy::Closed(s) => s.cache_stats(),
        }
    }
}
