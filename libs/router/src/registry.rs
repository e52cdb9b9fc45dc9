//! In-memory pool registry
//!
//! Pool snapshots come from an external metadata provider (subgraph or
//! API); the registry holds the current set, validates each snapshot once
//! on entry, and answers the lookups routing needs: pools trading a pair,
//! and the linear/composable topology behind a boosted route.

use basin_types::{Address, Pool, PoolMathError, PoolType, H256};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Validated pool snapshots, keyed by pool id.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: HashMap<H256, Pool>,
}

impl PoolRegistry {
    /// Build a registry from snapshots, dropping any that fail validation.
    pub fn new(pools: Vec<Pool>) -> Self {
        let mut map = HashMap::with_capacity(pools.len());
        for pool in pools {
            match pool.validate() {
                Ok(()) => {
                    map.insert(pool.id, pool);
                }
                Err(e) => {
                    warn!(pool = %pool.short_id(), error = %e, "dropping invalid pool snapshot");
                }
            }
        }
        debug!(pools = map.len(), "pool registry loaded");
        Self { pools: map }
    }

    /// Strict constructor: any invalid snapshot fails the whole load.
    pub fn try_new(pools: Vec<Pool>) -> Result<Self, PoolMathError> {
        for pool in &pools {
            pool.validate()?;
        }
        Ok(Self {
            pools: pools.into_iter().map(|p| (p.id, p)).collect(),
        })
    }

    pub fn get(&self, id: &H256) -> Option<&Pool> {
        self.pools.get(id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    /// Pools in which both tokens are directly tradable (the composable
    /// pool's own BPT does not count).
    pub fn pools_with_pair(&self, token_a: Address, token_b: Address) -> Vec<&Pool> {
        self.pools
            .values()
            .filter(|pool| {
                let a = pool.token_index(token_a);
                let b = pool.token_index(token_b);
                match (a, b) {
                    (Some(i), Some(j)) => {
                        Some(i) != pool.bpt_index && Some(j) != pool.bpt_index
                    }
                    _ => false,
                }
            })
            .collect()
    }

    /// The linear pool whose unwrapped main token is `main`.
    pub fn linear_pool_for_main(&self, main: Address) -> Option<&Pool> {
        self.pools.values().find(|pool| {
            pool.pool_type == PoolType::Linear
                && pool
                    .linear
                    .as_ref()
                    .map(|p| pool.tokens[p.main_index].address == main)
                    .unwrap_or(false)
        })
    }

    /// The composable-stable pool holding both linear pools' BPTs (a linear
    /// pool's BPT shares its pool address). This is the hub of a boosted
    /// route.
    pub fn composable_linking(&self, bpt_a: Address, bpt_b: Address) -> Option<&Pool> {
        self.pools.values().find(|pool| {
            pool.pool_type == PoolType::ComposableStable
                && pool.token_index(bpt_a).is_some()
                && pool.token_index(bpt_b).is_some()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_types::{LinearParams, Token, Wad, U256};

    fn token(byte: u8) -> Token {
        Token::new(Address::repeat_byte(byte), 18)
    }

    fn weighted(id: u8, a: u8, b: u8) -> Pool {
        Pool {
            id: H256::repeat_byte(id),
            address: Address::repeat_byte(id),
            pool_type: PoolType::Weighted,
            tokens: vec![token(a), token(b)],
            balances: vec![Wad::from_int(1_000), Wad::from_int(1_000)],
            weights: Some(vec![
                Wad::from_decimal_str("0.5").unwrap(),
                Wad::from_decimal_str("0.5").unwrap(),
            ]),
            amplification: None,
            swap_fee: Wad::ZERO,
            total_supply: Wad::from_int(2_000),
            bpt_index: None,
            linear: None,
        }
    }

    fn linear(id: u8, main: u8, wrapped: u8) -> Pool {
        Pool {
            id: H256::repeat_byte(id),
            address: Address::repeat_byte(id),
            pool_type: PoolType::Linear,
            tokens: vec![token(main), token(wrapped)],
            balances: vec![Wad::from_int(500_000), Wad::from_int(400_000)],
            weights: None,
            amplification: None,
            swap_fee: Wad::from_decimal_str("0.0002").unwrap(),
            total_supply: Wad::from_int(900_000),
            bpt_index: None,
            linear: Some(LinearParams {
                main_index: 0,
                wrapped_index: 1,
                rate: Wad::ONE,
                lower_target: Wad::from_int(100_000),
                upper_target: Wad::from_int(800_000),
            }),
        }
    }

    fn composable(id: u8, bpt_a: u8, bpt_b: u8) -> Pool {
        Pool {
            id: H256::repeat_byte(id),
            address: Address::repeat_byte(id),
            pool_type: PoolType::ComposableStable,
            tokens: vec![token(id), token(bpt_a), token(bpt_b)],
            balances: vec![
                Wad::from_int(1_000_000),
                Wad::from_int(800_000),
                Wad::from_int(900_000),
            ],
            weights: None,
            amplification: Some(U256::from(570_000u64)),
            swap_fee: Wad::from_decimal_str("0.0001").unwrap(),
            total_supply: Wad::from_int(1_700_000),
            bpt_index: Some(0),
            linear: None,
        }
    }

    #[test]
    fn test_invalid_snapshots_are_dropped_not_fatal() {
        let mut broken = weighted(0x01, 1, 2);
        broken.weights = None;
        let registry = PoolRegistry::new(vec![broken, weighted(0x02, 3, 4)]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_strict_load_rejects_invalid_snapshot() {
        let mut broken = weighted(0x01, 1, 2);
        broken.balances.pop();
        assert!(PoolRegistry::try_new(vec![broken]).is_err());
    }

    #[test]
    fn test_pair_lookup_skips_own_bpt() {
        let registry = PoolRegistry::new(vec![weighted(0x01, 1, 2), composable(0x30, 0x10, 0x20)]);
        assert_eq!(registry.pools_with_pair(Address::repeat_byte(1), Address::repeat_byte(2)).len(), 1);
        // The composable pool's own BPT (token 0x30) is not a tradable pair leg.
        assert!(registry
            .pools_with_pair(Address::repeat_byte(0x30), Address::repeat_byte(0x10))
            .is_empty());
    }

    #[test]
    fn test_boosted_topology_lookup() {
        let registry = PoolRegistry::new(vec![
            linear(0x10, 1, 11),
            linear(0x20, 2, 22),
            composable(0x30, 0x10, 0x20),
        ]);
        let linear_in = registry.linear_pool_for_main(Address::repeat_byte(1)).unwrap();
        let linear_out = registry.linear_pool_for_main(Address::repeat_byte(2)).unwrap();
        let hub = registry
            .composable_linking(linear_in.address, linear_out.address)
            .unwrap();
        assert_eq!(hub.id, H256::repeat_byte(0x30));
    }
}
