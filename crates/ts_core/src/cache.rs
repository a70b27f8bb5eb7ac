//! Direct-mapped slot cache over an append-only backing store.
//!
//! A slot holds one (token, record) pair. A hit is a shift, a mask and one
//! token comparison. A miss falls back to the backing store, which never
//! forgets a token, and unconditionally takes over the slot.

use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::DispatchResult;
use crate::map::{FastHashMap, fast_map_with_capacity};
use crate::record::DispatchRecord;
use crate::token::TypeToken;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses that evicted a different token.
    pub collisions: u64,
    pub rehashes: u64,
}

/// Every token a site has seen, with its record.
pub struct BackingStore {
    map: FastHashMap<TypeToken, DispatchRecord>,
}

impl BackingStore {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            map: fast_map_with_capacity(cap),
        }
    }

    #[inline]
    pub fn get(&self, token: TypeToken) -> Option<DispatchRecord> {
        self.map.get(&token).copied()
    }

    /// Record for `token`, inserting an unresolved one if it is new.
    #[inline]
    pub fn get_or_insert_unresolved(&mut self, token: TypeToken) -> DispatchRecord {
        *self.map.entry(token).or_insert(DispatchRecord::UNRESOLVED)
    }

    /// Stores a record, refusing to move a settled token back or elsewhere.
    pub fn publish(&mut self, token: TypeToken, record: DispatchRecord) {
        if record.is_unresolved() {
            return;
        }
        let slot = self.map.entry(token).or_insert(DispatchRecord::UNRESOLVED);
        if slot.is_unresolved() {
            *slot = record;
        } else {
            debug_assert_eq!(*slot, record, "settled record changed for {token:?}");
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeToken, DispatchRecord)> + '_ {
        self.map.iter().map(|(t, r)| (*t, *r))
    }
}

impl Default for BackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Default)]
struct Slot {
    token: TypeToken,
    record: DispatchRecord,
}

pub struct SlotCache {
    slots: Box<[Slot]>,
    bits: u32,
    shift: u32,
    store: BackingStore,
    config: CacheConfig,
    collisions_since_rehash: usize,
    /// Population at which a rehash at `max_bits` last ran. Rehashing the
    /// same tokens into the same slot count cannot do better.
    settled_population: Option<usize>,
    stats: CacheStats,
}

impl SlotCache {
    /// Cache sized for a switch expected to see about `hint` types.
    pub fn new(hint: usize, config: CacheConfig) -> DispatchResult<Self> {
        config.validate()?;
        let bits = config.bits_for_hint(hint);
        Ok(Self {
            slots: empty_slots(bits),
            bits,
            shift: config.default_shift,
            store: BackingStore::with_capacity(hint),
            config,
            collisions_since_rehash: 0,
            settled_population: None,
            stats: CacheStats::default(),
        })
    }

    #[inline]
    pub fn slot_index(&self, token: TypeToken) -> usize {
        index_for(token, self.bits, self.shift)
    }

    /// Record for `token`, served from its slot when the slot still holds
    /// it, otherwise copied from the backing store into the slot.
    pub fn get_or_insert(&mut self, token: TypeToken) -> DispatchRecord {
        let mut idx = self.slot_index(token);
        let slot = self.slots[idx];
        if slot.token == token {
            self.stats.hits += 1;
            return slot.record;
        }

        self.stats.misses += 1;
        if !slot.token.is_empty() {
            self.stats.collisions += 1;
            self.collisions_since_rehash += 1;
        }
        let record = self.store.get_or_insert_unresolved(token);
        trace!(?token, slot = idx, evicted = ?slot.token, "slot cache miss");

        if self.should_rehash() {
            self.rehash();
            idx = self.slot_index(token);
        }
        self.slots[idx] = Slot { token, record };
        record
    }

    /// Publishes a settled record for `token` to the store and its slot.
    pub fn publish(&mut self, token: TypeToken, record: DispatchRecord) {
        self.store.publish(token, record);
        let settled = self.store.get(token).unwrap_or(record);
        let idx = self.slot_index(token);
        self.slots[idx] = Slot {
            token,
            record: settled,
        };
    }

    /// Looks a token up without touching slots or counters.
    pub fn peek(&self, token: TypeToken) -> Option<DispatchRecord> {
        self.store.get(token)
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn store(&self) -> &BackingStore {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn should_rehash(&self) -> bool {
        self.config.rehash_threshold > 0
            && self.settled_population != Some(self.store.len())
            && self.collisions_since_rehash
                > self.config.rehash_threshold.saturating_mul(self.slots.len())
    }

    /// Picks a new slot count and shift from the tokens seen so far and
    /// refills the slots from the backing store. Records are untouched.
    pub fn rehash(&mut self) {
        let population = self.store.len();
        let bits = self
            .config
            .bits_for_hint(population)
            .max(self.bits)
            .min(self.config.max_bits);
        let tokens: Vec<TypeToken> = self.store.iter().map(|(t, _)| t).collect();

        let mut best_shift = self.shift;
        let mut best_conflicts = count_conflicts(&tokens, bits, self.shift);
        for shift in 0..=self.config.max_shift {
            if best_conflicts == 0 {
                break;
            }
            let conflicts = count_conflicts(&tokens, bits, shift);
            if conflicts < best_conflicts {
                best_conflicts = conflicts;
                best_shift = shift;
            }
        }

        debug!(
            population,
            old_bits = self.bits,
            bits,
            old_shift = self.shift,
            shift = best_shift,
            conflicts = best_conflicts,
            "rehashing slot cache"
        );

        self.bits = bits;
        self.shift = best_shift;
        self.slots = empty_slots(bits);
        for (token, record) in self.store.iter() {
            let idx = index_for(token, bits, best_shift);
            if self.slots[idx].token.is_empty() {
                self.slots[idx] = Slot { token, record };
            }
        }
        self.collisions_since_rehash = 0;
        self.settled_population = (bits == self.config.max_bits).then_some(population);
        self.stats.rehashes += 1;
    }
}

#[inline]
fn index_for(token: TypeToken, bits: u32, shift: u32) -> usize {
    let mask = (1usize << bits) - 1;
    (token.addr() >> shift) & mask
}

fn empty_slots(bits: u32) -> Box<[Slot]> {
    vec![Slot::default(); 1usize << bits].into_boxed_slice()
}

/// Tokens that would land in an already occupied slot.
fn count_conflicts(tokens: &[TypeToken], bits: u32, shift: u32) -> usize {
    let mut occupied = vec![false; 1usize << bits];
    let mut conflicts = 0;
    for &token in tokens {
        let idx = index_for(token, bits, shift);
        if occupied[idx] {
            conflicts += 1;
        } else {
            occupied[idx] = true;
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjust::Adjustment;
    use crate::error::DispatchError;

    fn tok(raw: usize) -> TypeToken {
        TypeToken::from_raw(raw)
    }

    fn no_rehash() -> CacheConfig {
        CacheConfig::new().with_rehash_threshold(0)
    }

    #[test]
    fn first_lookup_inserts_unresolved() {
        let mut cache = SlotCache::new(4, no_rehash()).unwrap();
        let r = cache.get_or_insert(tok(0x1000));
        assert!(r.is_unresolved());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn published_record_hits_without_store_lookup() {
        let mut cache = SlotCache::new(4, no_rehash()).unwrap();
        let t = tok(0x1000);
        cache.get_or_insert(t);
        let rec = DispatchRecord::resolved(2, Adjustment::from_bytes(16));
        cache.publish(t, rec);
        assert_eq!(cache.get_or_insert(t), rec);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn colliding_tokens_keep_their_own_records() {
        let mut cache = SlotCache::new(1, no_rehash().with_bits(0, 0)).unwrap();
        assert_eq!(cache.slot_count(), 1);
        let a = tok(0x1000);
        let b = tok(0x2000);
        assert_eq!(cache.slot_index(a), cache.slot_index(b));

        cache.get_or_insert(a);
        cache.publish(a, DispatchRecord::resolved(1, Adjustment::ZERO));
        let rb = cache.get_or_insert(b);
        assert!(rb.is_unresolved(), "b must not see a's record");
        cache.publish(b, DispatchRecord::NO_MATCH);

        assert_eq!(
            cache.get_or_insert(a),
            DispatchRecord::resolved(1, Adjustment::ZERO)
        );
        assert_eq!(cache.get_or_insert(b), DispatchRecord::NO_MATCH);
        assert_eq!(cache.stats().collisions, 3);
    }

    #[test]
    fn settled_records_never_regress() {
        let mut store = BackingStore::new();
        let t = tok(0x40);
        store.publish(t, DispatchRecord::resolved(3, Adjustment::ZERO));
        store.publish(t, DispatchRecord::UNRESOLVED);
        assert_eq!(store.get(t), Some(DispatchRecord::resolved(3, Adjustment::ZERO)));
        assert_eq!(store.get_or_insert_unresolved(t).case, 3);
    }

    #[test]
    fn rehash_preserves_records_and_reduces_conflicts() {
        let config = CacheConfig::new()
            .with_bits(2, 4)
            .with_shift(0, 8)
            .with_rehash_threshold(0);
        let mut cache = SlotCache::new(2, config).unwrap();
        // Same low 8 bits, so shift 0 maps every token to one slot.
        let tokens: Vec<TypeToken> = (1..=4).map(|i| tok(i << 8)).collect();
        for (i, &t) in tokens.iter().enumerate() {
            cache.get_or_insert(t);
            cache.publish(t, DispatchRecord::resolved(i as u32 + 1, Adjustment::ZERO));
        }
        let before = count_conflicts(&tokens, cache.bits(), cache.shift());
        assert!(before > 0);

        cache.rehash();
        assert_eq!(cache.stats().rehashes, 1);
        assert_eq!(count_conflicts(&tokens, cache.bits(), cache.shift()), 0);
        for (i, &t) in tokens.iter().enumerate() {
            assert_eq!(cache.get_or_insert(t).case, i as u32 + 1);
        }
    }

    #[test]
    fn collisions_trigger_adaptive_rehash() {
        let config = CacheConfig::new()
            .with_bits(1, 3)
            .with_shift(0, 8)
            .with_rehash_threshold(1);
        let mut cache = SlotCache::new(1, config).unwrap();
        let a = tok(0x100);
        let b = tok(0x200);
        for _ in 0..8 {
            cache.get_or_insert(a);
            cache.get_or_insert(b);
        }
        assert!(cache.stats().rehashes >= 1);
        let hits_before = cache.stats().hits;
        cache.get_or_insert(a);
        cache.get_or_insert(b);
        assert_eq!(cache.stats().hits, hits_before + 2);
    }

    #[test]
    fn full_caches_stop_rehashing_until_new_tokens_arrive() {
        let config = CacheConfig::new()
            .with_bits(0, 0)
            .with_shift(0, 8)
            .with_rehash_threshold(1);
        let mut cache = SlotCache::new(1, config).unwrap();
        let (a, b, c) = (tok(0x100), tok(0x200), tok(0x300));
        for _ in 0..16 {
            cache.get_or_insert(a);
            cache.get_or_insert(b);
        }
        assert_eq!(cache.stats().rehashes, 1);
        assert!(cache.stats().collisions > 16);

        for _ in 0..16 {
            cache.get_or_insert(c);
            cache.get_or_insert(a);
        }
        assert_eq!(cache.stats().rehashes, 2);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let inverted = CacheConfig::new().with_bits(5, 1);
        assert_eq!(
            SlotCache::new(4, inverted).err(),
            Some(DispatchError::InvalidCacheBits { min: 5, max: 1 })
        );
        let huge = CacheConfig::new().with_bits(0, usize::BITS);
        assert!(SlotCache::new(4, huge).is_err());
    }
}
