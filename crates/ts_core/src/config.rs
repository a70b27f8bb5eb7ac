//! Slot cache configuration.

use std::env;

use crate::error::{DispatchError, DispatchResult};

/// Largest slot cache a site may grow to (2^20 slots).
pub const MAX_CACHE_BITS: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false, every resolution re-probes the candidates in order.
    pub enabled: bool,
    /// Lower bound for log2 of the slot count.
    pub min_bits: u32,
    /// Upper bound for log2 of the slot count, also bounding rehash growth.
    pub max_bits: u32,
    /// Low token bits dropped before indexing; anchors are 8-byte aligned.
    pub default_shift: u32,
    /// Largest shift a rehash may try.
    pub max_shift: u32,
    /// Collisions per slot tolerated between rehashes; 0 disables rehashing.
    pub rehash_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bits: 1,
            max_bits: 12,
            default_shift: 3,
            max_shift: 12,
            rehash_threshold: 4,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always probe; useful as a reference when comparing results.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_bits(mut self, min_bits: u32, max_bits: u32) -> Self {
        self.min_bits = min_bits;
        self.max_bits = max_bits;
        self
    }

    pub fn with_shift(mut self, default_shift: u32, max_shift: u32) -> Self {
        self.default_shift = default_shift;
        self.max_shift = max_shift;
        self
    }

    pub fn with_rehash_threshold(mut self, threshold: usize) -> Self {
        self.rehash_threshold = threshold;
        self
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.min_bits > self.max_bits || self.max_bits > MAX_CACHE_BITS {
            return Err(DispatchError::InvalidCacheBits {
                min: self.min_bits,
                max: self.max_bits,
            });
        }
        let shift_limit = usize::BITS - 1;
        if self.max_shift > shift_limit {
            return Err(DispatchError::InvalidShift {
                shift: self.max_shift,
                max: shift_limit,
            });
        }
        if self.default_shift > self.max_shift {
            return Err(DispatchError::InvalidShift {
                shift: self.default_shift,
                max: self.max_shift,
            });
        }
        Ok(())
    }

    /// Slot-count exponent for a switch expected to see `hint` types.
    ///
    /// Leaves room for twice as many types as hinted so a full candidate set
    /// rarely collides.
    pub fn bits_for_hint(&self, hint: usize) -> u32 {
        let wanted = hint.max(1).saturating_mul(2).next_power_of_two();
        wanted.trailing_zeros().clamp(self.min_bits, self.max_bits)
    }

    /// Defaults overridden by `TS_CACHE_DISABLE`, `TS_CACHE_MAX_BITS` and
    /// `TS_CACHE_REHASH`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if lookup("TS_CACHE_DISABLE").as_deref() == Some("1") {
            config.enabled = false;
        }
        if let Some(bits) = lookup("TS_CACHE_MAX_BITS").and_then(|s| s.parse::<u32>().ok()) {
            config.max_bits = bits.min(MAX_CACHE_BITS);
            config.min_bits = config.min_bits.min(config.max_bits);
        }
        if let Some(threshold) = lookup("TS_CACHE_REHASH").and_then(|s| s.parse::<usize>().ok()) {
            config.rehash_threshold = threshold;
        }
        config
    }
}
