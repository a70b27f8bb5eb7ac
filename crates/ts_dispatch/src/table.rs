//! Lazily populated table of dispatch sites.

use std::hash::BuildHasher;

use hashbrown::hash_map::Entry;
use tracing::debug;
use ts_core::{CacheConfig, DispatchResult, FastHashMap, Polymorphic, fast_map_new};

use crate::site::{Dispatch, DispatchSite, SiteBuilder, SiteStats};

/// Identifies one type-switch occurrence in a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId(u64);

impl SiteId {
    pub const fn new(raw: u64) -> Self {
        SiteId(raw)
    }

    /// Id derived from a source location; see [`site_id!`](crate::site_id).
    pub fn from_location(file: &str, line: u32, column: u32) -> Self {
        SiteId(ts_core::map::fast_hasher().hash_one((file, line, column)))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// `SiteId` of the place the macro is written.
#[macro_export]
macro_rules! site_id {
    () => {
        $crate::SiteId::from_location(file!(), line!(), column!())
    };
}

/// Owns the dispatch sites of one thread of execution.
///
/// Sites are created the first time their id is seen and kept until the
/// table is dropped.
pub struct SiteTable {
    sites: FastHashMap<SiteId, DispatchSite>,
    config: CacheConfig,
}

impl SiteTable {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Table whose sites use `config` unless their builder sets its own.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            sites: fast_map_new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::with_config(CacheConfig::from_env())
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// The site for `id`, building it from `init` the first time.
    ///
    /// `init` runs at most once per id. If it or the build fails the error
    /// is returned and the table is left unchanged, so a later call retries.
    pub fn site<F>(&mut self, id: SiteId, init: F) -> DispatchResult<&mut DispatchSite>
    where
        F: FnOnce() -> DispatchResult<SiteBuilder>,
    {
        match self.sites.entry(id) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let site = init()?.default_config(self.config).build()?;
                debug!(site = id.raw(), "registered dispatch site");
                Ok(e.insert(site))
            }
        }
    }

    /// Resolves `handle` at site `id`, creating the site on first use.
    pub fn resolve<'a, B, F>(
        &mut self,
        id: SiteId,
        init: F,
        handle: &'a B,
    ) -> DispatchResult<Dispatch<'a>>
    where
        B: ?Sized + Polymorphic,
        F: FnOnce() -> DispatchResult<SiteBuilder>,
    {
        Ok(self.site(id, init)?.resolve(handle))
    }

    pub fn get(&self, id: SiteId) -> Option<&DispatchSite> {
        self.sites.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Counters summed over every site.
    pub fn stats(&self) -> SiteStats {
        let mut total = SiteStats::default();
        for site in self.sites.values() {
            total.merge(&site.stats());
        }
        total
    }
}

impl Default for SiteTable {
    fn default() -> Self {
        Self::new()
    }
}
