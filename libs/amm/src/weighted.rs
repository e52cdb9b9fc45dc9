//! Weighted-product invariant math
//!
//! Kernels for pools priced by the constant weighted product
//! `prod(balance_i ^ weight_i)`. Swap kernels take fee-free amounts (the
//! dispatcher strips the swap fee first); join and exit kernels charge the
//! fee internally on the non-proportional excess, which is economically a
//! swap against the pool.
//!
//! Rounding discipline: every intermediate rounds in the direction that
//! favors the pool, so a result can never credit the caller value the
//! invariant did not release.

use basin_types::{PoolMathError, RatioSide, Wad};

/// Swaps may consume at most 30% of the input-side balance in one trade.
pub const MAX_IN_RATIO: Wad = Wad(ethers::types::U256([300_000_000_000_000_000, 0, 0, 0]));

/// Swaps may drain at most 30% of the output-side balance in one trade.
pub const MAX_OUT_RATIO: Wad = Wad(ethers::types::U256([300_000_000_000_000_000, 0, 0, 0]));

/// Burning more than 30% of the supply against a single token is rejected.
const MIN_INVARIANT_RATIO: Wad = Wad(ethers::types::U256([700_000_000_000_000_000, 0, 0, 0]));

/// Static math over weighted-pool state. All amounts are 18-decimal scaled.
pub struct WeightedMath;

impl WeightedMath {
    /// Amount out for an exact fee-free amount in:
    /// `balance_out * (1 - (balance_in / (balance_in + amount_in)) ^ (w_in / w_out))`.
    pub fn out_given_in(
        balance_in: Wad,
        weight_in: Wad,
        balance_out: Wad,
        weight_out: Wad,
        amount_in: Wad,
    ) -> Result<Wad, PoolMathError> {
        if amount_in > balance_in.mul_down(MAX_IN_RATIO)? {
            return Err(PoolMathError::RatioExceeded { side: RatioSide::In });
        }
        let denominator = balance_in.checked_add(amount_in)?;
        let base = balance_in.div_up(denominator)?;
        let exponent = weight_in.div_down(weight_out)?;
        let power = base.pow_up(exponent)?;
        Ok(balance_out.mul_down(power.complement())?)
    }

    /// Amount in (fee-free) required for an exact amount out:
    /// `balance_in * ((balance_out / (balance_out - amount_out)) ^ (w_out / w_in) - 1)`.
    pub fn in_given_out(
        balance_in: Wad,
        weight_in: Wad,
        balance_out: Wad,
        weight_out: Wad,
        amount_out: Wad,
    ) -> Result<Wad, PoolMathError> {
        if amount_out > balance_out.mul_down(MAX_OUT_RATIO)? {
            return Err(PoolMathError::RatioExceeded { side: RatioSide::Out });
        }
        let base = balance_out.div_up(balance_out.checked_sub(amount_out)?)?;
        let exponent = weight_out.div_up(weight_in)?;
        let power = base.pow_up(exponent)?;
        Ok(balance_in.mul_up(power.checked_sub(Wad::ONE)?)?)
    }

    /// BPT minted for an arbitrary basket of deposits. The part of each
    /// deposit above the pool's aggregate growth ratio is treated as a swap
    /// and charged the swap fee before the invariant ratio is evaluated.
    pub fn bpt_out_given_exact_tokens_in(
        balances: &[Wad],
        weights: &[Wad],
        amounts_in: &[Wad],
        total_supply: Wad,
        swap_fee: Wad,
    ) -> Result<Wad, PoolMathError> {
        let mut ratios_with_fee = Vec::with_capacity(balances.len());
        let mut invariant_ratio_with_fees = Wad::ZERO;
        for i in 0..balances.len() {
            let ratio = balances[i].checked_add(amounts_in[i])?.div_down(balances[i])?;
            ratios_with_fee.push(ratio);
            invariant_ratio_with_fees =
                invariant_ratio_with_fees.checked_add(ratio.mul_down(weights[i])?)?;
        }

        let mut invariant_ratio = Wad::ONE;
        for i in 0..balances.len() {
            let amount_in_without_fee = if ratios_with_fee[i] > invariant_ratio_with_fees {
                let non_taxable = balances[i]
                    .mul_down(invariant_ratio_with_fees.saturating_sub(Wad::ONE))?;
                let taxable = amounts_in[i].checked_sub(non_taxable)?;
                non_taxable.checked_add(taxable.mul_down(swap_fee.complement())?)?
            } else {
                amounts_in[i]
            };
            let balance_ratio = balances[i]
                .checked_add(amount_in_without_fee)?
                .div_down(balances[i])?;
            invariant_ratio = invariant_ratio.mul_down(balance_ratio.pow_down(weights[i])?)?;
        }

        if invariant_ratio > Wad::ONE {
            Ok(total_supply.mul_down(invariant_ratio.checked_sub(Wad::ONE)?)?)
        } else {
            Ok(Wad::ZERO)
        }
    }

    /// BPT burned for an arbitrary basket of withdrawals. Mirror image of
    /// the join: the portion withdrawn beyond the aggregate shrink ratio
    /// pays the swap fee, and the result rounds up against the caller.
    pub fn bpt_in_given_exact_tokens_out(
        balances: &[Wad],
        weights: &[Wad],
        amounts_out: &[Wad],
        total_supply: Wad,
        swap_fee: Wad,
    ) -> Result<Wad, PoolMathError> {
        let mut ratios_without_fee = Vec::with_capacity(balances.len());
        let mut invariant_ratio_without_fees = Wad::ZERO;
        for i in 0..balances.len() {
            let ratio = balances[i]
                .checked_sub(amounts_out[i])?
                .div_up(balances[i])?;
            ratios_without_fee.push(ratio);
            invariant_ratio_without_fees =
                invariant_ratio_without_fees.checked_add(ratio.mul_up(weights[i])?)?;
        }

        let mut invariant_ratio = Wad::ONE;
        for i in 0..balances.len() {
            let amount_out_with_fee = if invariant_ratio_without_fees > ratios_without_fee[i] {
                let non_taxable =
                    balances[i].mul_down(invariant_ratio_without_fees.complement())?;
                let taxable = amounts_out[i].checked_sub(non_taxable)?;
                non_taxable.checked_add(taxable.div_up(swap_fee.complement())?)?
            } else {
                amounts_out[i]
            };
            let balance_ratio = balances[i]
                .checked_sub(amount_out_with_fee)?
                .div_down(balances[i])?;
            invariant_ratio = invariant_ratio.mul_down(balance_ratio.pow_down(weights[i])?)?;
        }

        Ok(total_supply.mul_up(invariant_ratio.complement())?)
    }

    /// Amount of one token received for burning an exact BPT amount.
    pub fn token_out_given_exact_bpt_in(
        balance: Wad,
        weight: Wad,
        bpt_in: Wad,
        total_supply: Wad,
        swap_fee: Wad,
    ) -> Result<Wad, PoolMathError> {
        let invariant_ratio = total_supply.checked_sub(bpt_in)?.div_up(total_supply)?;
        if invariant_ratio < MIN_INVARIANT_RATIO {
            return Err(PoolMathError::RatioExceeded { side: RatioSide::Out });
        }
        let balance_ratio = invariant_ratio.pow_up(Wad::ONE.div_down(weight)?)?;
        let amount_out_without_fee = balance.mul_down(balance_ratio.complement())?;

        // Only the share a proportional exit would not have touched is a
        // disguised swap, so only that share pays the fee.
        let taxable = amount_out_without_fee.mul_up(weight.complement())?;
        let non_taxable = amount_out_without_fee.checked_sub(taxable)?;
        Ok(non_taxable.checked_add(taxable.mul_down(swap_fee.complement())?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(s: &str) -> Wad {
        Wad::from_decimal_str(s).unwrap()
    }

    #[test]
    fn test_out_given_in_even_pool() {
        // 50/50 pool, equal balances: spot price is one, so a small trade
        // returns slightly less than it puts in.
        let out = WeightedMath::out_given_in(
            Wad::from_int(1_000_000),
            wad("0.5"),
            Wad::from_int(1_000_000),
            wad("0.5"),
            Wad::from_int(1_000),
        )
        .unwrap();
        assert!(out < Wad::from_int(1_000));
        // x*y=k with equal weights: out = 1000*1e6/(1e6+1000) = 999.000999...
        let expected = wad("999.000999000999000999");
        let diff = expected.raw().saturating_sub(out.raw());
        assert!(diff < wad("0.001").raw(), "out = {out}, expected ~{expected}");
    }

    #[test]
    fn test_out_given_in_respects_ratio_guard() {
        let result = WeightedMath::out_given_in(
            Wad::from_int(100),
            wad("0.5"),
            Wad::from_int(100),
            wad("0.5"),
            Wad::from_int(31),
        );
        assert!(matches!(
            result,
            Err(PoolMathError::RatioExceeded { side: RatioSide::In })
        ));
    }

    #[test]
    fn test_in_given_out_round_trips_above_out_given_in() {
        let balance_in = Wad::from_int(2_000_000);
        let balance_out = Wad::from_int(1_000_000);
        let (w_in, w_out) = (wad("0.6"), wad("0.4"));
        let amount_in = Wad::from_int(5_000);

        let out = WeightedMath::out_given_in(balance_in, w_in, balance_out, w_out, amount_in)
            .unwrap();
        let required =
            WeightedMath::in_given_out(balance_in, w_in, balance_out, w_out, out).unwrap();
        // Paying what in_given_out asks must always cover the original input.
        assert!(required >= amount_in.mul_down(wad("0.99999")).unwrap());
        assert!(required <= amount_in.mul_up(wad("1.00001")).unwrap());
    }

    #[test]
    fn test_proportional_join_mints_share_of_supply() {
        let balances = vec![Wad::from_int(1_000_000), Wad::from_int(1_000_000)];
        let weights = vec![wad("0.5"), wad("0.5")];
        let supply = Wad::from_int(2_000_000);
        // 1% proportional deposit, zero fee
        let amounts = vec![Wad::from_int(10_000), Wad::from_int(10_000)];
        let bpt =
            WeightedMath::bpt_out_given_exact_tokens_in(&balances, &weights, &amounts, supply, Wad::ZERO)
                .unwrap();
        let ideal = Wad::from_int(20_000);
        assert!(bpt <= ideal);
        let shortfall = ideal.raw() - bpt.raw();
        // within the pow error margin
        assert!(shortfall < wad("0.001").raw(), "bpt = {bpt}");
    }

    #[test]
    fn test_lopsided_join_mints_less_than_proportional() {
        let balances = vec![Wad::from_int(1_000_000), Wad::from_int(1_000_000)];
        let weights = vec![wad("0.5"), wad("0.5")];
        let supply = Wad::from_int(2_000_000);
        let proportional = vec![Wad::from_int(10_000), Wad::from_int(10_000)];
        let lopsided = vec![Wad::from_int(20_000), Wad::ZERO];

        let fee = wad("0.003");
        let balanced =
            WeightedMath::bpt_out_given_exact_tokens_in(&balances, &weights, &proportional, supply, fee)
                .unwrap();
        let skewed =
            WeightedMath::bpt_out_given_exact_tokens_in(&balances, &weights, &lopsided, supply, fee)
                .unwrap();
        // Same nominal value deposited, but the one-sided basket pays fees
        // and slips along the curve.
        assert!(skewed < balanced);
    }

    #[test]
    fn test_join_is_monotone_in_each_input() {
        let balances = vec![Wad::from_int(1_000_000), Wad::from_int(500_000)];
        let weights = vec![wad("0.8"), wad("0.2")];
        let supply = Wad::from_int(1_000_000);
        let fee = wad("0.001");

        let mut previous = Wad::ZERO;
        for step in 0..12u64 {
            let amounts = vec![Wad::from_int(1_000 + step * 2_500), Wad::from_int(700)];
            let bpt = WeightedMath::bpt_out_given_exact_tokens_in(
                &balances, &weights, &amounts, supply, fee,
            )
            .unwrap();
            assert!(bpt >= previous, "BPT out decreased when input grew");
            previous = bpt;
        }
    }

    #[test]
    fn test_single_token_exit_burn_guard() {
        let result = WeightedMath::token_out_given_exact_bpt_in(
            Wad::from_int(1_000_000),
            wad("0.5"),
            Wad::from_int(400_000),
            Wad::from_int(1_000_000),
            Wad::ZERO,
        );
        assert!(matches!(result, Err(PoolMathError::RatioExceeded { .. })));
    }

    #[test]
    fn test_exit_then_join_never_profits() {
        let balances = vec![Wad::from_int(1_000_000), Wad::from_int(1_000_000)];
        let weights = vec![wad("0.5"), wad("0.5")];
        let supply = Wad::from_int(2_000_000);
        let fee = wad("0.003");

        let out = WeightedMath::token_out_given_exact_bpt_in(
            balances[0],
            weights[0],
            Wad::from_int(1_000),
            supply,
            fee,
        )
        .unwrap();
        let bpt_back = WeightedMath::bpt_out_given_exact_tokens_in(
            &balances,
            &weights,
            &[out, Wad::ZERO],
            supply,
            fee,
        )
        .unwrap();
        assert!(bpt_back < Wad::from_int(1_000));
    }
}
