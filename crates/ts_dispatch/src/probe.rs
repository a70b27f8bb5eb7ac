//! Sequential candidate probing.
//!
//! This is the uncached meaning of a type switch: ask the value to view
//! itself as each candidate in declaration order and stop at the first that
//! works. Sites run it once per concrete type; everything they cache must
//! agree with it.

use ts_core::{Adjustment, CaseIndex, DispatchRecord, NO_MATCH, Polymorphic, Target};

use crate::candidate::Candidate;

#[derive(Clone, Copy, Debug)]
pub struct ProbeOutcome<'a> {
    pub record: DispatchRecord,
    pub target: Option<Target<'a>>,
    /// Number of candidates tried.
    pub attempts: u64,
}

/// Probes the candidates declared after case `after`; `after == 0` probes
/// them all. A view whose type is not the candidate's counts as a failure.
pub fn probe_sequential<'a, B>(
    candidates: &[Candidate],
    handle: &'a B,
    after: CaseIndex,
) -> ProbeOutcome<'a>
where
    B: ?Sized + Polymorphic,
{
    let mut attempts = 0;
    if after != NO_MATCH {
        for (i, candidate) in candidates.iter().enumerate().skip(after as usize) {
            attempts += 1;
            let Some(view) = handle.view(candidate.type_id()) else {
                continue;
            };
            if view.type_id() == candidate.type_id() {
                let adjustment = Adjustment::measure(handle, view);
                return ProbeOutcome {
                    record: DispatchRecord::resolved(i as CaseIndex + 1, adjustment),
                    target: Some(Target::from_view(view)),
                    attempts,
                };
            }
        }
    }
    ProbeOutcome {
        record: DispatchRecord::NO_MATCH,
        target: None,
        attempts,
    }
}
