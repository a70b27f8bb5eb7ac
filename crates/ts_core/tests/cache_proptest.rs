use std::collections::HashMap;

use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use ts_core::{Adjustment, CacheConfig, DispatchRecord, SlotCache, TypeToken};

fn tokens() -> impl Strategy<Value = Vec<TypeToken>> {
    proptest::collection::vec(1usize..4096, 1..24).prop_map(|raw| {
        raw.into_iter()
            .map(|r| TypeToken::from_raw(r * 8))
            .collect()
    })
}

fn record_for(i: usize) -> DispatchRecord {
    if i % 4 == 3 {
        DispatchRecord::NO_MATCH
    } else {
        DispatchRecord::resolved(i as u32 + 1, Adjustment::from_bytes(i as isize * 8))
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64, max_shrink_iters: 200, .. ProptestConfig::default()
    })]

    #[test]
    fn slot_cache_behaves_like_a_map(
        pool in tokens(),
        seq in proptest::collection::vec(0usize..24, 1..200),
        min_bits in 0u32..3,
        extra_bits in 0u32..4,
        threshold in 0usize..3,
        hint in 0usize..16,
    ) {
        let config = CacheConfig::new()
            .with_bits(min_bits, min_bits + extra_bits)
            .with_rehash_threshold(threshold);
        let mut cache = SlotCache::new(hint, config).unwrap();
        let mut model: HashMap<TypeToken, DispatchRecord> = HashMap::new();

        for &i in &seq {
            let i = i % pool.len();
            let token = pool[i];
            let got = cache.get_or_insert(token);
            match model.get(&token) {
                Some(expected) => prop_assert_eq!(got, *expected),
                None => {
                    prop_assert!(got.is_unresolved());
                    let rec = record_for(i);
                    cache.publish(token, rec);
                    model.insert(token, rec);
                }
            }
        }

        prop_assert_eq!(cache.len(), model.len());
        for (token, rec) in &model {
            prop_assert_eq!(cache.peek(*token), Some(*rec));
        }
        let stats = cache.stats();
        prop_assert_eq!(stats.hits + stats.misses, seq.len() as u64);
        prop_assert!(cache.bits() <= min_bits + extra_bits);
    }
}
