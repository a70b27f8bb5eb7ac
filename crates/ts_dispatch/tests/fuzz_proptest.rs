mod common;

use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use ts_dispatch::{
    CacheConfig, Candidate, DispatchRecord, DispatchSite, Polymorphic, TypeToken, probe_sequential,
};

use common::{candidate_pool, shape_kinds, universe};

fn candidate_lists() -> impl Strategy<Value = Vec<Candidate>> {
    let pool = candidate_pool();
    let n = pool.len();
    proptest::collection::vec(0..n, 0..6)
        .prop_map(move |idx| idx.into_iter().map(|i| pool[i]).collect())
}

fn cache_configs() -> impl Strategy<Value = CacheConfig> {
    (0u32..3, 0u32..3, 0usize..3, 0u32..6).prop_map(|(min, extra, threshold, shift)| {
        CacheConfig::new()
            .with_bits(min, min + extra)
            .with_shift(shift, 8)
            .with_rehash_threshold(threshold)
    })
}

fn site(cands: &[Candidate], hint: usize, config: CacheConfig) -> DispatchSite {
    DispatchSite::builder(cands.iter().copied())
        .hint(hint)
        .config(config)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64, max_shrink_iters: 200, .. ProptestConfig::default()
    })]

    #[test]
    fn cached_dispatch_matches_uncached(
        cands in candidate_lists(),
        config in cache_configs(),
        hint in 0usize..8,
        seq in proptest::collection::vec(0usize..7, 1..64),
    ) {
        let values = universe();
        let mut cached = site(&cands, hint, config);
        let mut oracle = site(&cands, hint, CacheConfig::disabled());
        for &i in &seq {
            let v = values[i].as_ref();
            let got = cached.resolve(v);
            let want = oracle.resolve(v);
            prop_assert_eq!(got.record(), want.record());
            prop_assert_eq!(got.target().map(|t| t.addr()), want.target().map(|t| t.addr()));
            prop_assert_eq!(got.target().map(|t| t.type_id()), want.target().map(|t| t.type_id()));
        }
    }

    #[test]
    fn resolve_is_the_first_declared_match(
        cands in candidate_lists(),
        config in cache_configs(),
        seq in proptest::collection::vec(0usize..7, 1..32),
    ) {
        let values = universe();
        let mut s = site(&cands, cands.len(), config);
        for &i in &seq {
            let v = values[i].as_ref();
            let expected = cands
                .iter()
                .position(|c| v.view(c.type_id()).is_some())
                .map(|p| p as u32 + 1)
                .unwrap_or(ts_dispatch::NO_MATCH);
            prop_assert_eq!(s.resolve(v).case(), expected);
            prop_assert_eq!(s.resolve(v).record(), probe_sequential(&cands, v, 0).record);
        }
    }

    #[test]
    fn settled_records_never_change(
        cands in candidate_lists(),
        config in cache_configs(),
        seq in proptest::collection::vec(0usize..7, 1..96),
    ) {
        let values = universe();
        let mut s = site(&cands, 1, config);
        let mut settled: Vec<(TypeToken, DispatchRecord)> = Vec::new();
        for &i in &seq {
            let v = values[i].as_ref();
            let rec = s.resolve(v).record();
            prop_assert!(!rec.is_unresolved());
            prop_assert_eq!(s.record_for(v), Some(rec));
            match settled.iter().find(|(t, _)| *t == v.type_token()) {
                Some((_, before)) => prop_assert_eq!(*before, rec),
                None => settled.push((v.type_token(), rec)),
            }
        }
        let stats = s.stats();
        prop_assert_eq!(stats.first_resolutions + stats.no_matches, settled.len() as u64);
    }

    #[test]
    fn continuations_agree_with_probing_after(
        cands in candidate_lists(),
        config in cache_configs(),
        seq in proptest::collection::vec((0usize..7, 0u32..7), 1..48),
    ) {
        let values = universe();
        let mut s = site(&cands, cands.len(), config);
        for &(i, after) in &seq {
            let v = values[i].as_ref();
            let first = s.resolve(v).record();
            let got = s.resolve_after(v, after).record();
            prop_assert_eq!(got, probe_sequential(&cands, v, after).record);
            prop_assert_eq!(s.resolve(v).record(), first);
        }
    }

    #[test]
    fn closed_sites_agree_with_probing_for_kinded_values(
        cands in candidate_lists(),
        seq in proptest::collection::vec((2usize..7, 0u32..7), 1..32),
    ) {
        let values = universe();
        let mut closed = DispatchSite::builder(cands.iter().copied())
            .hierarchy(shape_kinds())
            .build()
            .unwrap();
        for &(i, after) in &seq {
            let v = values[i].as_ref();
            let want = probe_sequential(&cands, v, after);
            let got = closed.resolve_after(v, after);
            prop_assert_eq!(got.record(), want.record);
            prop_assert_eq!(got.target().map(|t| t.addr()), want.target.map(|t| t.addr()));
        }
    }
}
