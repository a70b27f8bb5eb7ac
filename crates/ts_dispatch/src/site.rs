//! Dispatch sites: the persistent state of one type switch.

use std::any::Any;

use tracing::debug;
use ts_core::{
    Adjustment, CacheConfig, CaseIndex, DispatchError, DispatchRecord, DispatchResult, MAX_CASES,
    NO_MATCH, Polymorphic, Target, UNRESOLVED,
};

use crate::candidate::{Candidate, CandidateList};
use crate::probe::{ProbeOutcome, probe_sequential};
use crate::strategy::{Choice, Hierarchy, SiteStrategy, Strategy, StrategyKind};

/// Counters for one site, including its slot cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SiteStats {
    pub resolves: u64,
    pub hits: u64,
    pub misses: u64,
    pub collisions: u64,
    pub rehashes: u64,
    /// Candidates tried across all probes.
    pub probes: u64,
    pub first_resolutions: u64,
    pub no_matches: u64,
    pub continuations: u64,
    /// Resolutions answered from a closed hierarchy's kind tag.
    pub tag_dispatches: u64,
}

impl SiteStats {
    pub fn merge(&mut self, other: &SiteStats) {
        self.resolves += other.resolves;
        self.hits += other.hits;
        self.misses += other.misses;
        self.collisions += other.collisions;
        self.rehashes += other.rehashes;
        self.probes += other.probes;
        self.first_resolutions += other.first_resolutions;
        self.no_matches += other.no_matches;
        self.continuations += other.continuations;
        self.tag_dispatches += other.tag_dispatches;
    }
}

/// Result of resolving a handle: the case to run and the handle adjusted to
/// that case's type.
#[derive(Clone, Copy, Debug)]
pub struct Dispatch<'a> {
    record: DispatchRecord,
    target: Option<Target<'a>>,
}

impl<'a> Dispatch<'a> {
    pub fn no_match() -> Self {
        Self {
            record: DispatchRecord::NO_MATCH,
            target: None,
        }
    }

    /// 1-based case index, or `NO_MATCH`.
    #[inline]
    pub fn case(&self) -> CaseIndex {
        self.record.case
    }

    #[inline]
    pub fn is_match(&self) -> bool {
        self.record.is_resolved()
    }

    #[inline]
    pub fn is_no_match(&self) -> bool {
        self.record.is_no_match()
    }

    pub fn adjustment(&self) -> Adjustment {
        self.record.adjustment
    }

    pub fn record(&self) -> DispatchRecord {
        self.record
    }

    pub fn target(&self) -> Option<Target<'a>> {
        self.target
    }

    /// The adjusted handle as `T`; `None` unless `T` is the matched case's type.
    #[inline]
    pub fn get<T: Any>(&self) -> Option<&'a T> {
        self.target.and_then(|t| t.get::<T>())
    }
}

#[derive(Clone, Debug)]
pub struct SiteBuilder {
    candidates: CandidateList,
    hint: Option<usize>,
    hierarchy: Hierarchy,
    config: Option<CacheConfig>,
}

impl SiteBuilder {
    pub fn new<I: IntoIterator<Item = Candidate>>(candidates: I) -> Self {
        Self {
            candidates: candidates.into_iter().collect(),
            hint: None,
            hierarchy: Hierarchy::Open,
            config: None,
        }
    }

    /// Number of concrete types the switch is expected to see; sizes the
    /// slot cache only. Defaults to the number of candidates.
    pub fn hint(mut self, expected_types: usize) -> Self {
        self.hint = Some(expected_types);
        self
    }

    pub fn hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `config` unless one was set explicitly.
    pub fn default_config(mut self, config: CacheConfig) -> Self {
        self.config.get_or_insert(config);
        self
    }

    pub fn build(self) -> DispatchResult<DispatchSite> {
        if self.candidates.len() > MAX_CASES {
            return Err(DispatchError::TooManyCandidates {
                count: self.candidates.len(),
                max: MAX_CASES,
            });
        }
        let config = self.config.unwrap_or_default();
        let hint = self.hint.unwrap_or(self.candidates.len());
        let strategy = self.hierarchy.select(&self.candidates, hint, config)?;
        debug!(
            candidates = self.candidates.len(),
            hint,
            strategy = ?strategy.kind(),
            cache = config.enabled,
            "dispatch site created"
        );
        Ok(DispatchSite {
            candidates: self.candidates,
            strategy,
            stats: SiteStats::default(),
        })
    }
}

/// One type switch: an ordered candidate list plus whatever its strategy
/// remembers about the types it has seen.
///
/// A site is single-owner: resolution takes `&mut self`. Threads that run
/// the same switch each keep their own site (see `SiteTable`).
pub struct DispatchSite {
    candidates: CandidateList,
    strategy: SiteStrategy,
    stats: SiteStats,
}

impl DispatchSite {
    pub fn builder<I: IntoIterator<Item = Candidate>>(candidates: I) -> SiteBuilder {
        SiteBuilder::new(candidates)
    }

    /// An open site with default configuration.
    pub fn new<I: IntoIterator<Item = Candidate>>(candidates: I) -> DispatchResult<Self> {
        SiteBuilder::new(candidates).build()
    }

    /// Finds the first candidate, in declaration order, that describes
    /// `handle`.
    pub fn resolve<'a, B>(&mut self, handle: &'a B) -> Dispatch<'a>
    where
        B: ?Sized + Polymorphic,
    {
        self.stats.resolves += 1;
        if self.strategy.kind() == StrategyKind::Closed {
            self.stats.tag_dispatches += 1;
        }
        match self.strategy.choose(handle) {
            Choice::Decided(record) => self.replay(handle, record),
            Choice::Unresolved => {
                let outcome = self.probe(handle, UNRESOLVED);
                if outcome.record.is_no_match() {
                    self.stats.no_matches += 1;
                    debug!(
                        ty = handle.type_name(),
                        candidates = self.candidates.len(),
                        "no candidate matches type"
                    );
                    self.strategy.on_no_match(handle);
                } else {
                    self.stats.first_resolutions += 1;
                    debug!(
                        ty = handle.type_name(),
                        case = outcome.record.case,
                        candidate = self.case_name(outcome.record.case),
                        adjustment = outcome.record.adjustment.bytes(),
                        "type switch case resolved"
                    );
                    self.strategy.on_first_resolution(handle, outcome.record);
                }
                Dispatch {
                    record: outcome.record,
                    target: outcome.target,
                }
            }
        }
    }

    /// Finds the first candidate declared after case `after` that describes
    /// `handle`, for switches whose case `after` matched the type but was
    /// rejected by a finer sub-pattern. The first-match answer of `resolve`
    /// is left as it is.
    pub fn resolve_after<'a, B>(&mut self, handle: &'a B, after: CaseIndex) -> Dispatch<'a>
    where
        B: ?Sized + Polymorphic,
    {
        if after == UNRESOLVED {
            return self.resolve(handle);
        }
        if after == NO_MATCH || after as usize >= self.candidates.len() {
            return Dispatch::no_match();
        }
        self.stats.continuations += 1;
        match self.strategy.choose_after(handle, after) {
            Choice::Decided(record) => self.replay(handle, record),
            Choice::Unresolved => {
                let outcome = self.probe(handle, after);
                self.strategy.on_continuation(handle, after, outcome.record);
                Dispatch {
                    record: outcome.record,
                    target: outcome.target,
                }
            }
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Candidate behind a 1-based case index.
    pub fn candidate(&self, case: CaseIndex) -> Option<Candidate> {
        let idx = (case as usize).checked_sub(1)?;
        self.candidates.get(idx).copied()
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn strategy(&self) -> &SiteStrategy {
        &self.strategy
    }

    /// Settled first-match record for the type of `handle`, without
    /// resolving it.
    pub fn record_for<B: ?Sized + Polymorphic>(&self, handle: &B) -> Option<DispatchRecord> {
        self.strategy.peek(handle.type_token())
    }

    pub fn stats(&self) -> SiteStats {
        let cache = self.strategy.cache_stats();
        SiteStats {
            hits: cache.hits,
            misses: cache.misses,
            collisions: cache.collisions,
            rehashes: cache.rehashes,
            ..self.stats
        }
    }

    fn probe<'a, B>(&mut self, handle: &'a B, after: CaseIndex) -> ProbeOutcome<'a>
    where
        B: ?Sized + Polymorphic,
    {
        let outcome = probe_sequential(&self.candidates, handle, after);
        self.stats.probes += outcome.attempts;
        outcome
    }

    fn replay<'a, B>(&self, handle: &'a B, record: DispatchRecord) -> Dispatch<'a>
    where
        B: ?Sized + Polymorphic,
    {
        let target = record
            .candidate_index()
            .and_then(|i| self.candidates.get(i))
            .map(|candidate| {
                // SAFETY: open records were measured by probing a value with
                // the same type token as `handle`. Closed records carry the
                // static offset of a view of the kind's type, and were chosen
                // after checking the concrete type of `handle` against it.
                unsafe { Target::apply(handle, record.adjustment, candidate.type_id()) }
            });
        Dispatch { record, target }
    }

    fn case_name(&self, case: CaseIndex) -> &'static str {
        self.candidate(case).map(|c| c.short_name()).unwrap_or("?")
    }
}
