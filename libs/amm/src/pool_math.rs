//! Pool-math dispatch over snapshot pools
//!
//! The per-family kernels ([`WeightedMath`], [`StableMath`], [`LinearMath`])
//! know nothing about [`Pool`] snapshots; this module validates a snapshot,
//! masks the composable-stable own-BPT entry, routes to the right kernel,
//! and owns the operations that are family-independent: proportional
//! amounts, price impact, and proportional maximums.

use crate::linear::LinearMath;
use crate::stable::StableMath;
use crate::weighted::WeightedMath;
use basin_types::{Pool, PoolMathError, PoolType, TokenAmount, Wad};

/// Direction of a proportional action: tokens the user sends into the pool
/// or receives out of it. Decides the rounding side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// Maximal proportional deposit and withdrawal vectors for one account,
/// bounded by the balances the caller supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct PropMax {
    pub send: Vec<TokenAmount>,
    pub receive: Vec<TokenAmount>,
}

/// Invariant-math engine over immutable pool snapshots. Pure functions,
/// no I/O; constructed once and shared.
#[derive(Debug, Default, Clone)]
pub struct PoolMath;

impl PoolMath {
    pub fn new() -> Self {
        Self
    }

    /// Given one token's scaled amount, the amounts of every other token
    /// that keep the pool's relative composition unchanged.
    ///
    /// Rounding follows the direction: `Send` amounts round up (the user
    /// pays), `Receive` amounts round down (the user is paid).
    pub fn proportional_amounts_given(
        &self,
        pool: &Pool,
        reference_amount: Wad,
        reference_index: usize,
        direction: Direction,
    ) -> Result<Vec<TokenAmount>, PoolMathError> {
        pool.validate()?;
        self.require_initialized(pool)?;
        if reference_index >= pool.tokens.len() || Some(reference_index) == pool.bpt_index {
            return Err(PoolMathError::InvalidPoolState {
                reason: format!(
                    "reference index {} is not a tradable token of pool {}",
                    reference_index,
                    pool.short_id()
                ),
            });
        }
        let reference_balance = pool.balances[reference_index];
        if reference_balance.is_zero() {
            return Err(PoolMathError::InvalidPoolState {
                reason: format!("pool {} has a zero reference balance", pool.short_id()),
            });
        }

        let mut amounts = Vec::with_capacity(pool.tokens.len());
        for i in 0..pool.tokens.len() {
            if Some(i) == pool.bpt_index {
                amounts.push(TokenAmount::zero(pool.tokens[i].clone()));
                continue;
            }
            let scaled = if i == reference_index {
                reference_amount
            } else {
                match direction {
                    Direction::Send => {
                        pool.balances[i].mul_div_up(reference_amount, reference_balance)?
                    }
                    Direction::Receive => {
                        pool.balances[i].mul_div_down(reference_amount, reference_balance)?
                    }
                }
            };
            let amount = match direction {
                Direction::Send => TokenAmount::from_scaled_up(pool.tokens[i].clone(), scaled)?,
                Direction::Receive => {
                    TokenAmount::from_scaled_down(pool.tokens[i].clone(), scaled)?
                }
            };
            amounts.push(amount);
        }
        Ok(amounts)
    }

    /// BPT minted for an arbitrary basket of deposits, scaled amounts
    /// index-aligned with the pool's tokens. Composable-stable pools expect
    /// a zero at their own-BPT index.
    pub fn bpt_out_given_exact_tokens_in(
        &self,
        pool: &Pool,
        amounts_in: &[Wad],
    ) -> Result<Wad, PoolMathError> {
        pool.validate()?;
        self.require_initialized(pool)?;
        if amounts_in.len() != pool.tokens.len() {
            return Err(PoolMathError::InvalidPoolState {
                reason: format!(
                    "{} amounts for a {}-token pool",
                    amounts_in.len(),
                    pool.tokens.len()
                ),
            });
        }

        match pool.pool_type {
            PoolType::Weighted | PoolType::LiquidityBootstrapping => {
                WeightedMath::bpt_out_given_exact_tokens_in(
                    &pool.balances,
                    pool.weights()?,
                    amounts_in,
                    pool.total_supply,
                    pool.swap_fee,
                )
            }
            PoolType::Stable | PoolType::ComposableStable => {
                let indexes = pool.invariant_indexes();
                let balances = mask(&pool.balances, &indexes);
                let amounts = mask(amounts_in, &indexes);
                StableMath::bpt_out_given_exact_tokens_in(
                    pool.amplification()?,
                    &balances,
                    &amounts,
                    pool.total_supply,
                    pool.swap_fee,
                )
            }
            PoolType::Linear => {
                // Linear pools are joined by swapping the main token for BPT.
                let params = self.linear_params(pool)?;
                require_main_token_only(pool, amounts_in, params.main_index)?;
                let wrapped_nominal =
                    pool.balances[params.wrapped_index].mul_down(params.rate)?;
                LinearMath::bpt_out_per_main_in(
                    amounts_in[params.main_index],
                    pool.balances[params.main_index],
                    wrapped_nominal,
                    pool.total_supply,
                    pool.swap_fee,
                    params,
                )
            }
        }
    }

    /// BPT burned for an arbitrary basket of withdrawals.
    pub fn bpt_in_given_exact_tokens_out(
        &self,
        pool: &Pool,
        amounts_out: &[Wad],
    ) -> Result<Wad, PoolMathError> {
        pool.validate()?;
        self.require_initialized(pool)?;
        if amounts_out.len() != pool.tokens.len() {
            return Err(PoolMathError::InvalidPoolState {
                reason: format!(
                    "{} amounts for a {}-token pool",
                    amounts_out.len(),
                    pool.tokens.len()
                ),
            });
        }

        match pool.pool_type {
            PoolType::Weighted | PoolType::LiquidityBootstrapping => {
                WeightedMath::bpt_in_given_exact_tokens_out(
                    &pool.balances,
                    pool.weights()?,
                    amounts_out,
                    pool.total_supply,
                    pool.swap_fee,
                )
            }
            PoolType::Stable | PoolType::ComposableStable => {
                let indexes = pool.invariant_indexes();
                let balances = mask(&pool.balances, &indexes);
                let amounts = mask(amounts_out, &indexes);
                StableMath::bpt_in_given_exact_tokens_out(
                    pool.amplification()?,
                    &balances,
                    &amounts,
                    pool.total_supply,
                    pool.swap_fee,
                )
            }
            PoolType::Linear => {
                let params = self.linear_params(pool)?;
                require_main_token_only(pool, amounts_out, params.main_index)?;
                let wrapped_nominal =
                    pool.balances[params.wrapped_index].mul_down(params.rate)?;
                LinearMath::bpt_in_per_main_out(
                    amounts_out[params.main_index],
                    pool.balances[params.main_index],
                    wrapped_nominal,
                    pool.total_supply,
                    pool.swap_fee,
                    params,
                )
            }
        }
    }

    /// Amount of one token received for burning an exact BPT amount
    /// (single-asset exit).
    pub fn token_out_given_exact_bpt_in(
        &self,
        pool: &Pool,
        token_index: usize,
        bpt_in: Wad,
    ) -> Result<Wad, PoolMathError> {
        pool.validate()?;
        self.require_initialized(pool)?;
        require_token_index(pool, token_index)?;

        match pool.pool_type {
            PoolType::Weighted | PoolType::LiquidityBootstrapping => {
                WeightedMath::token_out_given_exact_bpt_in(
                    pool.balances[token_index],
                    pool.weights()?[token_index],
                    bpt_in,
                    pool.total_supply,
                    pool.swap_fee,
                )
            }
            PoolType::Stable | PoolType::ComposableStable => {
                let indexes = pool.invariant_indexes();
                let masked_index = indexes
                    .iter()
                    .position(|&i| i == token_index)
                    .ok_or_else(|| PoolMathError::InvalidPoolState {
                        reason: "single-asset exit into the pool's own BPT".to_string(),
                    })?;
                let balances = mask(&pool.balances, &indexes);
                StableMath::token_out_given_exact_bpt_in(
                    pool.amplification()?,
                    &balances,
                    masked_index,
                    bpt_in,
                    pool.total_supply,
                    pool.swap_fee,
                )
            }
            PoolType::Linear => {
                let params = self.linear_params(pool)?;
                let wrapped_nominal =
                    pool.balances[params.wrapped_index].mul_down(params.rate)?;
                LinearMath::main_out_per_bpt_in(
                    bpt_in,
                    pool.balances[params.main_index],
                    wrapped_nominal,
                    pool.total_supply,
                    pool.swap_fee,
                    params,
                )
            }
        }
    }

    /// Swap: scaled amount out for an exact scaled amount in. The swap fee
    /// is taken from the input before the kernel runs.
    pub fn out_given_in(
        &self,
        pool: &Pool,
        index_in: usize,
        index_out: usize,
        amount_in: Wad,
    ) -> Result<Wad, PoolMathError> {
        pool.validate()?;
        require_token_index(pool, index_in)?;
        require_token_index(pool, index_out)?;
        let fee = amount_in.mul_up(pool.swap_fee)?;
        let net_in = amount_in.checked_sub(fee)?;

        match pool.pool_type {
            PoolType::Weighted | PoolType::LiquidityBootstrapping => {
                let weights = pool.weights()?;
                WeightedMath::out_given_in(
                    pool.balances[index_in],
                    weights[index_in],
                    pool.balances[index_out],
                    weights[index_out],
                    net_in,
                )
            }
            PoolType::Stable | PoolType::ComposableStable => {
                let indexes = pool.invariant_indexes();
                let masked_in = masked_position(&indexes, index_in)?;
                let masked_out = masked_position(&indexes, index_out)?;
                let balances = mask(&pool.balances, &indexes);
                StableMath::out_given_in(
                    pool.amplification()?,
                    &balances,
                    masked_in,
                    masked_out,
                    net_in,
                )
            }
            PoolType::Linear => Err(PoolMathError::InvalidPoolState {
                reason: "linear pools swap via their BPT, not token to token".to_string(),
            }),
        }
    }

    /// Swap: scaled amount in required for an exact scaled amount out,
    /// with the swap fee added back on top of the kernel's answer.
    pub fn in_given_out(
        &self,
        pool: &Pool,
        index_in: usize,
        index_out: usize,
        amount_out: Wad,
    ) -> Result<Wad, PoolMathError> {
        pool.validate()?;
        require_token_index(pool, index_in)?;
        require_token_index(pool, index_out)?;
        let net_in = match pool.pool_type {
            PoolType::Weighted | PoolType::LiquidityBootstrapping => {
                let weights = pool.weights()?;
                WeightedMath::in_given_out(
                    pool.balances[index_in],
                    weights[index_in],
                    pool.balances[index_out],
                    weights[index_out],
                    amount_out,
                )?
            }
            PoolType::Stable | PoolType::ComposableStable => {
                let indexes = pool.invariant_indexes();
                let masked_in = masked_position(&indexes, index_in)?;
                let masked_out = masked_position(&indexes, index_out)?;
                let balances = mask(&pool.balances, &indexes);
                StableMath::in_given_out(
                    pool.amplification()?,
                    &balances,
                    masked_in,
                    masked_out,
                    amount_out,
                )?
            }
            PoolType::Linear => {
                return Err(PoolMathError::InvalidPoolState {
                    reason: "linear pools swap via their BPT, not token to token".to_string(),
                })
            }
        };
        // Gross up: net = gross * (1 - fee), rounded against the caller.
        Ok(net_in.div_up(pool.swap_fee.complement())?)
    }

    /// Fraction of deposit value lost versus splitting the same basket
    /// exactly proportionally to current balances: `1 - actual / ideal`.
    ///
    /// Zero (within kernel rounding) for a proportional basket; positive for
    /// any skewed one, because a skewed deposit is partly a swap and pays
    /// fee plus slippage.
    pub fn price_impact(&self, pool: &Pool, amounts_in: &[Wad]) -> Result<Wad, PoolMathError> {
        let actual = self.bpt_out_given_exact_tokens_in(pool, amounts_in)?;
        let ideal = self.ideal_proportional_bpt(pool, amounts_in)?;
        if ideal.is_zero() {
            return Ok(Wad::ZERO);
        }
        if actual >= ideal {
            // Kernel rounding can land a hair above the ideal; clamp rather
            // than report a negative impact.
            return Ok(Wad::ZERO);
        }
        Ok(actual.div_down(ideal)?.complement())
    }

    /// The BPT the same value would mint if deposited exactly
    /// proportionally: each token's share of its balance, valued at the
    /// pool's supply. The minimum share across tokens with a deposit would
    /// undervalue skewed baskets, so the ideal sums every token's
    /// supply-share contribution.
    fn ideal_proportional_bpt(
        &self,
        pool: &Pool,
        amounts_in: &[Wad],
    ) -> Result<Wad, PoolMathError> {
        let mut ideal = Wad::ZERO;
        match pool.pool_type {
            PoolType::Weighted | PoolType::LiquidityBootstrapping => {
                // Value share of token i is weight_i * amount_i / balance_i.
                let weights = pool.weights()?;
                for i in 0..pool.tokens.len() {
                    if amounts_in[i].is_zero() {
                        continue;
                    }
                    let share = amounts_in[i]
                        .mul_down(weights[i])?
                        .div_down(pool.balances[i])?;
                    ideal = ideal.checked_add(pool.total_supply.mul_down(share)?)?;
                }
            }
            _ => {
                // Stable family and linear: near-parity assets, value share
                // is amount over the sum of balances.
                let indexes = pool.invariant_indexes();
                let mut total = Wad::ZERO;
                for &i in &indexes {
                    total = total.checked_add(pool.balances[i])?;
                }
                for &i in &indexes {
                    if amounts_in[i].is_zero() {
                        continue;
                    }
                    let share = amounts_in[i].div_down(total)?;
                    ideal = ideal.checked_add(pool.total_supply.mul_down(share)?)?;
                }
            }
        }
        Ok(ideal)
    }

    /// Maximal proportional deposit and withdrawal bounded by the caller's
    /// balances: the account's token balances for the send side, its BPT
    /// balance for the receive side. `account_balances` is index-aligned
    /// with the pool's tokens; `account_bpt` is the scaled BPT holding.
    pub fn prop_max(
        &self,
        pool: &Pool,
        account_balances: &[Wad],
        account_bpt: Wad,
    ) -> Result<PropMax, PoolMathError> {
        pool.validate()?;
        self.require_initialized(pool)?;
        if account_balances.len() != pool.tokens.len() {
            return Err(PoolMathError::InvalidPoolState {
                reason: "account balances not aligned with pool tokens".to_string(),
            });
        }

        // The binding token is the one whose balance covers the smallest
        // multiple of its pool-side balance.
        let mut limit_index = None;
        let mut limit_ratio = Wad::ZERO;
        for i in 0..pool.tokens.len() {
            if Some(i) == pool.bpt_index || pool.balances[i].is_zero() {
                continue;
            }
            let ratio = account_balances[i].div_down(pool.balances[i])?;
            if limit_index.is_none() || ratio < limit_ratio {
                limit_index = Some(i);
                limit_ratio = ratio;
            }
        }
        let limit_index = limit_index.ok_or_else(|| PoolMathError::InvalidPoolState {
            reason: format!("pool {} has no tradable token balances", pool.short_id()),
        })?;

        let send = self.proportional_amounts_given(
            pool,
            account_balances[limit_index],
            limit_index,
            Direction::Send,
        )?;

        // Receive side: the proportional share of every balance that the
        // account's BPT holding commands.
        let mut receive = Vec::with_capacity(pool.tokens.len());
        for i in 0..pool.tokens.len() {
            if Some(i) == pool.bpt_index {
                receive.push(TokenAmount::zero(pool.tokens[i].clone()));
                continue;
            }
            let scaled = pool.balances[i].mul_div_down(account_bpt, pool.total_supply)?;
            receive.push(TokenAmount::from_scaled_down(pool.tokens[i].clone(), scaled)?);
        }

        Ok(PropMax { send, receive })
    }

    fn require_initialized(&self, pool: &Pool) -> Result<(), PoolMathError> {
        if pool.is_initialized() {
            Ok(())
        } else {
            Err(PoolMathError::PoolUninitialized {
                pool_id: pool.short_id(),
            })
        }
    }

    fn linear_params<'a>(
        &self,
        pool: &'a Pool,
    ) -> Result<&'a basin_types::LinearParams, PoolMathError> {
        pool.linear.as_ref().ok_or_else(|| PoolMathError::InvalidPoolState {
            reason: format!("linear pool {} without linear parameters", pool.short_id()),
        })
    }
}

/// Linear pools join and exit through the main token only; a nonzero amount
/// at any other index would be silently dropped, so it is rejected instead.
fn require_main_token_only(
    pool: &Pool,
    amounts: &[Wad],
    main_index: usize,
) -> Result<(), PoolMathError> {
    for (i, amount) in amounts.iter().enumerate() {
        if i != main_index && !amount.is_zero() {
            return Err(PoolMathError::InvalidPoolState {
                reason: format!(
                    "linear pool {} joins and exits through its main token only",
                    pool.short_id()
                ),
            });
        }
    }
    Ok(())
}

fn require_token_index(pool: &Pool, index: usize) -> Result<(), PoolMathError> {
    if index >= pool.tokens.len() {
        return Err(PoolMathError::InvalidPoolState {
            reason: format!(
                "token index {} out of range for pool {}",
                index,
                pool.short_id()
            ),
        });
    }
    Ok(())
}

fn mask(values: &[Wad], indexes: &[usize]) -> Vec<Wad> {
    indexes.iter().map(|&i| values[i]).collect()
}

fn masked_position(indexes: &[usize], index: usize) -> Result<usize, PoolMathError> {
    indexes
        .iter()
        .position(|&i| i == index)
        .ok_or_else(|| PoolMathError::InvalidPoolState {
            reason: "swap touches the pool's own BPT index".to_string(),
        })
}
