//! Dispatch records: what a site remembers about one concrete type.

use crate::adjust::Adjustment;

/// 1-based position of a candidate in its type switch.
pub type CaseIndex = u32;

/// Not probed yet.
pub const UNRESOLVED: CaseIndex = 0;
/// Probed, and no candidate describes the type.
pub const NO_MATCH: CaseIndex = CaseIndex::MAX;
/// Largest number of candidates a single switch can declare.
pub const MAX_CASES: usize = (NO_MATCH - 1) as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DispatchRecord {
    pub case: CaseIndex,
    pub adjustment: Adjustment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordState {
    Unresolved,
    Resolved {
        case: CaseIndex,
        adjustment: Adjustment,
    },
    NoMatch,
}

impl DispatchRecord {
    pub const UNRESOLVED: DispatchRecord = DispatchRecord {
        case: UNRESOLVED,
        adjustment: Adjustment::ZERO,
    };

    pub const NO_MATCH: DispatchRecord = DispatchRecord {
        case: NO_MATCH,
        adjustment: Adjustment::ZERO,
    };

    #[inline]
    pub const fn resolved(case: CaseIndex, adjustment: Adjustment) -> Self {
        debug_assert!(case != UNRESOLVED && case != NO_MATCH);
        Self { case, adjustment }
    }

    #[inline]
    pub const fn is_unresolved(&self) -> bool {
        self.case == UNRESOLVED
    }

    #[inline]
    pub const fn is_no_match(&self) -> bool {
        self.case == NO_MATCH
    }

    #[inline]
    pub const fn is_resolved(&self) -> bool {
        self.case != UNRESOLVED && self.case != NO_MATCH
    }

    /// Zero-based index into the candidate list, for resolved records.
    #[inline]
    pub fn candidate_index(&self) -> Option<usize> {
        self.is_resolved().then(|| (self.case - 1) as usize)
    }

    pub fn state(&self) -> RecordState {
        match self.case {
            UNRESOLVED => RecordState::Unresolved,
            NO_MATCH => RecordState::NoMatch,
            case => RecordState::Resolved {
                case,
                adjustment: self.adjustment,
            },
        }
    }
}

impl Default for DispatchRecord {
    fn default() -> Self {
        Self::UNRESOLVED
    }
}
