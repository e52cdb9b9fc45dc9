//! StableSwap invariant math
//!
//! Kernels for pools of like-valued assets priced by the amplified
//! StableSwap invariant. The invariant `D` has no closed form; it is found
//! with the canonical Newton iteration, bounded at 255 rounds and declared
//! converged at a spread of one raw unit. Composable-stable pools reuse
//! these kernels on balances with the pre-minted own-BPT entry masked out
//! (the dispatcher handles the masking).
//!
//! Internally everything runs on raw `U256` values in 18-decimal scale with
//! plain integer division, mirroring how the invariant behaves on chain;
//! `Wad` wrappers only appear at the boundary.

use basin_types::{FixedPointError, PoolMathError, Wad};
use ethers::types::U256;

/// Amplification parameters carry three extra digits of precision:
/// A = 200 is stored as 200_000.
pub const AMP_PRECISION: u64 = 1_000;

const MAX_NEWTON_ROUNDS: usize = 255;

/// Static math over stable-pool state.
pub struct StableMath;

impl StableMath {
    /// The invariant `D` for the given balances.
    pub fn invariant(amp: U256, balances: &[Wad]) -> Result<Wad, PoolMathError> {
        let amp_precision = U256::from(AMP_PRECISION);
        // Stored amplification is A * AMP_PRECISION; anything below the
        // precision floor encodes A < 1 and underflows the Newton step.
        if amp < amp_precision {
            return Err(PoolMathError::InvalidPoolState {
                reason: format!("amplification {amp} is below the {AMP_PRECISION} floor"),
            });
        }

        let n = U256::from(balances.len() as u64);
        let mut sum = U256::zero();
        for balance in balances {
            sum = checked_add(sum, balance.raw())?;
        }
        if sum.is_zero() {
            return Ok(Wad::ZERO);
        }

        let amp_times_total = checked_mul(amp, n)?;
        let mut invariant = sum;

        for _ in 0..MAX_NEWTON_ROUNDS {
            let mut p_d = checked_mul(balances[0].raw(), n)?;
            for balance in &balances[1..] {
                p_d = checked_mul(checked_mul(p_d, balance.raw())?, n)? / invariant;
            }
            let previous = invariant;

            let numerator = checked_add(
                checked_mul(checked_mul(n, invariant)?, invariant)?,
                checked_mul(checked_mul(amp_times_total, sum)?, p_d)? / amp_precision,
            )?;
            let denominator = checked_add(
                checked_mul(n + U256::one(), invariant)?,
                checked_mul(amp_times_total - amp_precision, p_d)? / amp_precision,
            )?;
            invariant = numerator / denominator;

            let spread = if invariant > previous {
                invariant - previous
            } else {
                previous - invariant
            };
            if spread <= U256::one() {
                return Ok(Wad(invariant));
            }
        }

        Err(PoolMathError::InvariantNotConverged)
    }

    /// Amount out for an exact fee-free amount in.
    pub fn out_given_in(
        amp: U256,
        balances: &[Wad],
        token_index_in: usize,
        token_index_out: usize,
        amount_in: Wad,
    ) -> Result<Wad, PoolMathError> {
        let invariant = Self::invariant(amp, balances)?;
        let mut shifted = balances.to_vec();
        shifted[token_index_in] = shifted[token_index_in].checked_add(amount_in)?;

        let final_balance_out =
            Self::token_balance_given_invariant(amp, &shifted, invariant, token_index_out)?;
        // One raw unit is shaved so rounding in the solve can never pay out
        // more than the invariant released.
        let out = checked_sub(balances[token_index_out].raw(), final_balance_out.raw())?;
        Ok(Wad(checked_sub(out, U256::one()).unwrap_or_default()))
    }

    /// Fee-free amount in required for an exact amount out.
    pub fn in_given_out(
        amp: U256,
        balances: &[Wad],
        token_index_in: usize,
        token_index_out: usize,
        amount_out: Wad,
    ) -> Result<Wad, PoolMathError> {
        let invariant = Self::invariant(amp, balances)?;
        let mut shifted = balances.to_vec();
        shifted[token_index_out] = shifted[token_index_out].checked_sub(amount_out)?;

        let final_balance_in =
            Self::token_balance_given_invariant(amp, &shifted, invariant, token_index_in)?;
        let input = checked_sub(final_balance_in.raw(), balances[token_index_in].raw())?;
        Ok(Wad(checked_add(input, U256::one())?))
    }

    /// BPT minted for an arbitrary basket of deposits, with the swap fee
    /// charged on each token's growth beyond the aggregate ratio. The
    /// balance share stands in for the weight a weighted pool would use.
    pub fn bpt_out_given_exact_tokens_in(
        amp: U256,
        balances: &[Wad],
        amounts_in: &[Wad],
        total_supply: Wad,
        swap_fee: Wad,
    ) -> Result<Wad, PoolMathError> {
        let mut sum_balances = Wad::ZERO;
        for balance in balances {
            sum_balances = sum_balances.checked_add(*balance)?;
        }

        let mut ratios_with_fee = Vec::with_capacity(balances.len());
        let mut invariant_ratio_with_fees = Wad::ZERO;
        for i in 0..balances.len() {
            let current_weight = balances[i].div_down(sum_balances)?;
            let ratio = balances[i].checked_add(amounts_in[i])?.div_down(balances[i])?;
            ratios_with_fee.push(ratio);
            invariant_ratio_with_fees =
                invariant_ratio_with_fees.checked_add(ratio.mul_down(current_weight)?)?;
        }

        let mut new_balances = Vec::with_capacity(balances.len());
        for i in 0..balances.len() {
            let amount_in_without_fee = if ratios_with_fee[i] > invariant_ratio_with_fees {
                let non_taxable = balances[i]
                    .mul_down(invariant_ratio_with_fees.saturating_sub(Wad::ONE))?;
                let taxable = amounts_in[i].checked_sub(non_taxable)?;
                non_taxable.checked_add(taxable.mul_down(swap_fee.complement())?)?
            } else {
                amounts_in[i]
            };
            new_balances.push(balances[i].checked_add(amount_in_without_fee)?);
        }

        let current_invariant = Self::invariant(amp, balances)?;
        let new_invariant = Self::invariant(amp, &new_balances)?;
        let invariant_ratio = new_invariant.div_down(current_invariant)?;

        if invariant_ratio > Wad::ONE {
            Ok(total_supply.mul_down(invariant_ratio.checked_sub(Wad::ONE)?)?)
        } else {
            Ok(Wad::ZERO)
        }
    }

    /// BPT burned for an arbitrary basket of withdrawals, rounded against
    /// the caller.
    pub fn bpt_in_given_exact_tokens_out(
        amp: U256,
        balances: &[Wad],
        amounts_out: &[Wad],
        total_supply: Wad,
        swap_fee: Wad,
    ) -> Result<Wad, PoolMathError> {
        let mut sum_balances = Wad::ZERO;
        for balance in balances {
            sum_balances = sum_balances.checked_add(*balance)?;
        }

        let mut ratios_without_fee = Vec::with_capacity(balances.len());
        let mut invariant_ratio_without_fees = Wad::ZERO;
        for i in 0..balances.len() {
            let current_weight = balances[i].div_up(sum_balances)?;
            let ratio = balances[i]
                .checked_sub(amounts_out[i])?
                .div_up(balances[i])?;
            ratios_without_fee.push(ratio);
            invariant_ratio_without_fees =
                invariant_ratio_without_fees.checked_add(ratio.mul_up(current_weight)?)?;
        }

        let mut new_balances = Vec::with_capacity(balances.len());
        for i in 0..balances.len() {
            let amount_out_with_fee = if invariant_ratio_without_fees > ratios_without_fee[i] {
                let non_taxable =
                    balances[i].mul_down(invariant_ratio_without_fees.complement())?;
                let taxable = amounts_out[i].checked_sub(non_taxable)?;
                non_taxable.checked_add(taxable.div_up(swap_fee.complement())?)?
            } else {
                amounts_out[i]
            };
            new_balances.push(balances[i].checked_sub(amount_out_with_fee)?);
        }

        let current_invariant = Self::invariant(amp, balances)?;
        let new_invariant = Self::invariant(amp, &new_balances)?;
        let invariant_ratio = new_invariant.div_down(current_invariant)?;

        Ok(total_supply.mul_up(invariant_ratio.complement())?)
    }

    /// Amount of one token received for burning an exact BPT amount.
    pub fn token_out_given_exact_bpt_in(
        amp: U256,
        balances: &[Wad],
        token_index: usize,
        bpt_in: Wad,
        total_supply: Wad,
        swap_fee: Wad,
    ) -> Result<Wad, PoolMathError> {
        let current_invariant = Self::invariant(amp, balances)?;
        let new_invariant = total_supply
            .checked_sub(bpt_in)?
            .div_up(total_supply)?
            .mul_up(current_invariant)?;

        let new_balance =
            Self::token_balance_given_invariant(amp, balances, new_invariant, token_index)?;
        let amount_out_without_fee = balances[token_index].checked_sub(new_balance)?;

        let mut sum_balances = Wad::ZERO;
        for balance in balances {
            sum_balances = sum_balances.checked_add(*balance)?;
        }
        let current_weight = balances[token_index].div_down(sum_balances)?;
        let taxable = amount_out_without_fee.mul_up(current_weight.complement())?;
        let non_taxable = amount_out_without_fee.checked_sub(taxable)?;
        Ok(non_taxable.checked_add(taxable.mul_down(swap_fee.complement())?)?)
    }

    /// Solve for the one balance that restores `invariant` with every other
    /// balance fixed. Newton iteration on the quadratic in that balance,
    /// rounded up so the pool keeps the dust.
    fn token_balance_given_invariant(
        amp: U256,
        balances: &[Wad],
        invariant: Wad,
        token_index: usize,
    ) -> Result<Wad, PoolMathError> {
        let n = U256::from(balances.len() as u64);
        let amp_precision = U256::from(AMP_PRECISION);
        let amp_times_total = checked_mul(amp, n)?;
        let d = invariant.raw();

        let mut sum = balances[0].raw();
        let mut p_d = checked_mul(balances[0].raw(), n)?;
        for balance in &balances[1..] {
            p_d = checked_mul(checked_mul(p_d, balance.raw())?, n)? / d;
            sum = checked_add(sum, balance.raw())?;
        }
        sum = checked_sub(sum, balances[token_index].raw())?;

        let d_squared = checked_mul(d, d)?;
        let c = checked_mul(
            checked_mul(
                div_up_raw(d_squared, checked_mul(amp_times_total, p_d)?)?,
                amp_precision,
            )?,
            balances[token_index].raw(),
        )?;
        let b = checked_add(sum, checked_mul(d / amp_times_total, amp_precision)?)?;

        let mut token_balance = div_up_raw(checked_add(d_squared, c)?, checked_add(d, b)?)?;
        for _ in 0..MAX_NEWTON_ROUNDS {
            let previous = token_balance;
            token_balance = div_up_raw(
                checked_add(checked_mul(token_balance, token_balance)?, c)?,
                checked_sub(
                    checked_add(checked_mul(token_balance, U256::from(2u64))?, b)?,
                    d,
                )?,
            )?;

            let spread = if token_balance > previous {
                token_balance - previous
            } else {
                previous - token_balance
            };
            if spread <= U256::one() {
                return Ok(Wad(token_balance));
            }
        }

        Err(PoolMathError::InvariantNotConverged)
    }
}

fn checked_add(a: U256, b: U256) -> Result<U256, PoolMathError> {
    a.checked_add(b)
        .ok_or(PoolMathError::Math(FixedPointError::Overflow))
}

fn checked_sub(a: U256, b: U256) -> Result<U256, PoolMathError> {
    a.checked_sub(b)
        .ok_or(PoolMathError::Math(FixedPointError::Underflow))
}

fn checked_mul(a: U256, b: U256) -> Result<U256, PoolMathError> {
    a.checked_mul(b)
        .ok_or(PoolMathError::Math(FixedPointError::Overflow))
}

fn div_up_raw(a: U256, b: U256) -> Result<U256, PoolMathError> {
    if b.is_zero() {
        return Err(PoolMathError::Math(FixedPointError::DivisionByZero));
    }
    if a.is_zero() {
        return Ok(U256::zero());
    }
    Ok((a - U256::one()) / b + U256::one())
}
