//! Quote/plan cache
//!
//! Memoizes quotes and plans within one interaction burst so repeated
//! renders of the same request do not refetch. Keyed by the logical slot
//! (pair, direction, enabled-source fingerprint); the stored entry carries
//! the amount and the block height at fetch time. An entry goes stale when
//! the chain head moves past its height by more than the tolerance, and a
//! put with a different amount replaces the slot's entry outright (the
//! user edited the input).
//!
//! Reads never block beyond the shard lock; a miss just means the caller
//! fetches fresh.

use basin_types::{Address, Quote, RoutePlan, SwapKind, U256};
use dashmap::DashMap;
use std::time::Instant;
use tracing::debug;

/// Logical slot identity. Deterministic `Hash`/`Eq` derive, no manual
/// hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub token_in: Address,
    pub token_out: Address,
    pub kind: SwapKind,
    /// Sorted, comma-joined ids of the enabled sources.
    pub sources_fingerprint: String,
}

/// What a slot can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Quote(Quote),
    Plan(RoutePlan),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    amount: U256,
    block_height: u64,
    value: CachedValue,
    #[allow(dead_code)] // diagnostic surface, read by debug logging only
    created_at: Instant,
}

/// Block-height-aware memo of quotes and plans.
pub struct PlanCache {
    entries: DashMap<CacheKey, CacheEntry>,
    stale_block_tolerance: u64,
}

impl PlanCache {
    pub fn new(stale_block_tolerance: u64) -> Self {
        Self {
            entries: DashMap::new(),
            stale_block_tolerance,
        }
    }

    /// A hit requires the amount to match and the entry to still be fresh
    /// at the observed height. Stale entries are evicted on the way out.
    pub fn get(&self, key: &CacheKey, amount: U256, observed_height: u64) -> Option<CachedValue> {
        let entry = self.entries.get(key)?;
        if entry.amount != amount {
            return None;
        }
        if self.is_stale(entry.block_height, observed_height) {
            drop(entry);
            self.entries.remove(key);
            debug!(?key, "evicted stale cache entry");
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store a value fetched at `block_height`. Replaces whatever the slot
    /// held, including an entry for a different amount.
    pub fn put(&self, key: CacheKey, amount: U256, value: CachedValue, block_height: u64) {
        self.entries.insert(
            key,
            CacheEntry {
                amount,
                block_height,
                value,
                created_at: Instant::now(),
            },
        );
    }

    /// Drop every entry stale at the observed height. Hook for a new-block
    /// listener.
    pub fn purge(&self, observed_height: u64) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !self.is_stale(entry.block_height, observed_height));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, observed_height, "purged stale cache entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_stale(&self, entry_height: u64, observed_height: u64) -> bool {
        observed_height > entry_height.saturating_add(self.stale_block_tolerance)
    }
}
