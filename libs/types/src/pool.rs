//! Pool snapshots
//!
//! A [`Pool`] is an immutable snapshot of one AMM pool's on-chain state,
//! already normalized for math: balances are upscaled to 18 decimals, the
//! swap fee is a fraction, weights (when present) are normalized. Snapshots
//! are plain values; pool math never mutates them in place.

use crate::error::PoolMathError;
use crate::fixed_point::Wad;
use crate::token::Token;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Tolerance when checking that normalized weights sum to one, in raw
/// 18-decimal units. Covers rounding from n-way splits in indexed data.
const WEIGHT_SUM_TOLERANCE: u64 = 1_000_000;

/// Pool family tag deciding which invariant kernel prices the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    /// Constant weighted-product invariant
    Weighted,
    /// StableSwap invariant for like-valued assets
    Stable,
    /// StableSwap pool that pre-mints its own BPT as a pool token
    ComposableStable,
    /// Linear wrapper pool (main token / wrapped yield token), the leaf of
    /// a boosted pool
    Linear,
    /// Weighted pool with time-varying weights; the snapshot carries the
    /// weights in force at fetch time
    LiquidityBootstrapping,
}

impl PoolType {
    pub fn is_weighted_family(self) -> bool {
        matches!(self, PoolType::Weighted | PoolType::LiquidityBootstrapping)
    }

    pub fn is_stable_family(self) -> bool {
        matches!(self, PoolType::Stable | PoolType::ComposableStable)
    }

    pub fn is_linear(self) -> bool {
        matches!(self, PoolType::Linear)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoolType::Weighted => "weighted",
            PoolType::Stable => "stable",
            PoolType::ComposableStable => "composable-stable",
            PoolType::Linear => "linear",
            PoolType::LiquidityBootstrapping => "liquidity-bootstrapping",
        }
    }
}

/// Linear-pool parameters: which token is the unwrapped main token, which is
/// the wrapped yield-bearing one, the wrapped token's rate, and the target
/// band inside which main-token swaps pay no fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearParams {
    pub main_index: usize,
    pub wrapped_index: usize,
    /// Wrapped token units to main token units conversion rate.
    pub rate: Wad,
    pub lower_target: Wad,
    pub upper_target: Wad,
}

/// Immutable snapshot of one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: H256,
    pub address: Address,
    pub pool_type: PoolType,
    /// Registered tokens, in vault order.
    pub tokens: Vec<Token>,
    /// Balances index-aligned with `tokens`, upscaled to 18 decimals.
    pub balances: Vec<Wad>,
    /// Normalized weights, weighted family only.
    pub weights: Option<Vec<Wad>>,
    /// Amplification parameter in 1000-precision units, stable family only.
    pub amplification: Option<U256>,
    /// Swap fee as a fraction (0.003 = 30 bps).
    pub swap_fee: Wad,
    /// Total BPT supply, 18 decimals.
    pub total_supply: Wad,
    /// Index of the pool's own pre-minted BPT among `tokens`
    /// (composable-stable only); excluded from invariant math.
    pub bpt_index: Option<usize>,
    /// Linear-pool parameters, `Linear` only.
    pub linear: Option<LinearParams>,
}

impl Pool {
    pub fn token_index(&self, token: Address) -> Option<usize> {
        self.tokens.iter().position(|t| t.address == token)
    }

    pub fn is_initialized(&self) -> bool {
        !self.total_supply.is_zero()
    }

    /// Short identifier for log lines.
    pub fn short_id(&self) -> String {
        format!("0x{}", hex::encode(&self.id.as_bytes()[..4]))
    }

    /// Weights accessor that turns a missing array into a pool-state error.
    pub fn weights(&self) -> Result<&[Wad], PoolMathError> {
        self.weights.as_deref().ok_or_else(|| PoolMathError::InvalidPoolState {
            reason: format!("{} pool {} has no weights", self.pool_type.as_str(), self.short_id()),
        })
    }

    /// Amplification accessor for the stable family.
    pub fn amplification(&self) -> Result<U256, PoolMathError> {
        self.amplification.ok_or_else(|| PoolMathError::InvalidPoolState {
            reason: format!(
                "{} pool {} has no amplification parameter",
                self.pool_type.as_str(),
                self.short_id()
            ),
        })
    }

    /// Token indexes participating in invariant math. Identical to the full
    /// index range except for composable-stable pools, which skip their own
    /// pre-minted BPT.
    pub fn invariant_indexes(&self) -> Vec<usize> {
        (0..self.tokens.len())
            .filter(|i| Some(*i) != self.bpt_index)
            .collect()
    }

    /// Structural validation: index alignment, per-family required fields,
    /// weight normalization. Run once when a snapshot enters the engine;
    /// math kernels may then assume a well-formed pool.
    pub fn validate(&self) -> Result<(), PoolMathError> {
        let n = self.tokens.len();
        if n < 2 {
            return Err(self.invalid("fewer than two tokens"));
        }
        if self.balances.len() != n {
            return Err(self.invalid(&format!(
                "{} tokens but {} balances",
                n,
                self.balances.len()
            )));
        }
        if self.swap_fee >= Wad::ONE {
            return Err(self.invalid("swap fee is not a fraction below one"));
        }

        if self.pool_type.is_weighted_family() {
            let weights = self.weights()?;
            if weights.len() != n {
                return Err(self.invalid(&format!(
                    "{} tokens but {} weights",
                    n,
                    weights.len()
                )));
            }
            let mut sum = U256::zero();
            for weight in weights {
                if weight.is_zero() {
                    return Err(self.invalid("zero weight"));
                }
                sum = sum
                    .checked_add(weight.raw())
                    .ok_or_else(|| self.invalid("weight sum overflow"))?;
            }
            let one = Wad::ONE.raw();
            let tolerance = U256::from(WEIGHT_SUM_TOLERANCE);
            let deviation = if sum > one { sum - one } else { one - sum };
            if deviation > tolerance {
                return Err(self.invalid("weights do not sum to one"));
            }
        }

        if self.pool_type.is_stable_family() {
            let amp = self.amplification()?;
            if amp.is_zero() {
                return Err(self.invalid("zero amplification"));
            }
        }

        if self.pool_type == PoolType::ComposableStable {
            match self.bpt_index {
                Some(i) if i < n => {}
                _ => return Err(self.invalid("composable pool without a valid BPT index")),
            }
        }

        if self.pool_type.is_linear() {
            let params = self.linear.as_ref().ok_or_else(|| {
                self.invalid("linear pool without linear parameters")
            })?;
            if params.main_index >= n
                || params.wrapped_index >= n
                || params.main_index == params.wrapped_index
            {
                return Err(self.invalid("linear pool token indexes out of range"));
            }
            if params.lower_target > params.upper_target {
                return Err(self.invalid("linear targets are inverted"));
            }
            if params.rate.is_zero() {
                return Err(self.invalid("linear pool with zero rate"));
            }
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> PoolMathError {
        PoolMathError::InvalidPoolState {
            reason: format!("pool {}: {}", self.short_id(), reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(byte: u8, decimals: u8) -> Token {
        Token::new(Address::repeat_byte(byte), decimals)
    }

    fn weighted_pool() -> Pool {
        Pool {
            id: H256::repeat_byte(0xAA),
            address: Address::repeat_byte(0xAB),
            pool_type: PoolType::Weighted,
            tokens: vec![token(1, 18), token(2, 6)],
            balances: vec![Wad::from_int(1_000_000), Wad::from_int(1_000_000)],
            weights: Some(vec![
                Wad::from_decimal_str("0.5").unwrap(),
                Wad::from_decimal_str("0.5").unwrap(),
            ]),
            amplification: None,
            swap_fee: Wad::ZERO,
            total_supply: Wad::from_int(2_000_000),
            bpt_index: None,
            linear: None,
        }
    }

    #[test]
    fn test_well_formed_pool_validates() {
        assert!(weighted_pool().validate().is_ok());
    }

    #[test]
    fn test_mismatched_arrays_rejected() {
        let mut pool = weighted_pool();
        pool.balances.pop();
        assert!(matches!(
            pool.validate(),
            Err(PoolMathError::InvalidPoolState { .. })
        ));
    }

    #[test]
    fn test_missing_weights_rejected() {
        let mut pool = weighted_pool();
        pool.weights = None;
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_weight_sum_tolerance() {
        let mut pool = weighted_pool();
        // Three-way split rounds down by one unit in total; accepted
        pool.tokens.push(token(3, 18));
        pool.balances.push(Wad::from_int(1_000_000));
        let third = Wad::from_decimal_str("0.333333333333333333").unwrap();
        pool.weights = Some(vec![third, third, third]);
        assert!(pool.validate().is_ok());

        // A grossly unnormalized set is rejected
        pool.weights = Some(vec![third, third, Wad::from_decimal_str("0.5").unwrap()]);
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_stable_pool_requires_amplification() {
        let mut pool = weighted_pool();
        pool.pool_type = PoolType::Stable;
        pool.weights = None;
        assert!(pool.validate().is_err());
        pool.amplification = Some(U256::from(200_000u64));
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_composable_needs_bpt_index() {
        let mut pool = weighted_pool();
        pool.pool_type = PoolType::ComposableStable;
        pool.weights = None;
        pool.amplification = Some(U256::from(200_000u64));
        assert!(pool.validate().is_err());
        pool.bpt_index = Some(0);
        assert!(pool.validate().is_ok());
        assert_eq!(pool.invariant_indexes(), vec![1]);
    }

    #[test]
    fn test_token_lookup() {
        let pool = weighted_pool();
        assert_eq!(pool.token_index(Address::repeat_byte(2)), Some(1));
        assert_eq!(pool.token_index(Address::repeat_byte(9)), None);
    }

    #[test]
    fn test_snapshot_survives_json_round_trip() {
        // Fixture files store snapshots as JSON; the full shape must survive.
        let mut pool = weighted_pool();
        pool.pool_type = PoolType::Linear;
        pool.weights = None;
        pool.linear = Some(LinearParams {
            main_index: 0,
            wrapped_index: 1,
            rate: Wad::ONE,
            lower_target: Wad::from_int(100_000),
            upper_target: Wad::from_int(800_000),
        });

        let json = serde_json::to_string(&pool).unwrap();
        let back: Pool = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pool);
    }
}
