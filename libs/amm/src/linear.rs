//! Linear-pool math
//!
//! A linear pool pairs an unwrapped "main" token with its yield-bearing
//! wrapped form and keeps the main balance inside a target band. BPT trades
//! against the main token on a piecewise-linear curve: inside the band the
//! exchange is one-to-one on nominal value; outside it, the distance to the
//! nearest target is charged the fee, which pays arbitrageurs to push the
//! balance back.
//!
//! The nominal mapping below the lower target L is
//! `n = r - fee * (L - r)`, so the inverse is `r = (n + fee*L) / (1 + fee)`;
//! above the upper target U it is `n = r - fee * (r - U)` with inverse
//! `r = (n - fee*U) / (1 - fee)`. Wrapped balances arrive here already
//! scaled by the wrapper rate.

use basin_types::{LinearParams, PoolMathError, Wad};

/// Static math over linear-pool state.
pub struct LinearMath;

impl LinearMath {
    /// BPT minted for an exact main-token deposit (a swap main -> BPT).
    pub fn bpt_out_per_main_in(
        main_in: Wad,
        main_balance: Wad,
        wrapped_nominal: Wad,
        bpt_supply: Wad,
        fee: Wad,
        params: &LinearParams,
    ) -> Result<Wad, PoolMathError> {
        let after_balance = main_balance.checked_add(main_in)?;
        if bpt_supply.is_zero() {
            // Pool seeding: the first join mints nominal value one-to-one.
            return Self::to_nominal(after_balance, fee, params);
        }
        let previous_nominal = Self::to_nominal(main_balance, fee, params)?;
        let after_nominal = Self::to_nominal(after_balance, fee, params)?;
        let delta = after_nominal.checked_sub(previous_nominal)?;
        let invariant = previous_nominal.checked_add(wrapped_nominal)?;
        Ok(bpt_supply.mul_div_down(delta, invariant)?)
    }

    /// Main tokens released for an exact BPT burn (a swap BPT -> main).
    pub fn main_out_per_bpt_in(
        bpt_in: Wad,
        main_balance: Wad,
        wrapped_nominal: Wad,
        bpt_supply: Wad,
        fee: Wad,
        params: &LinearParams,
    ) -> Result<Wad, PoolMathError> {
        if bpt_supply.is_zero() {
            return Err(PoolMathError::InvalidPoolState {
                reason: "linear pool has no supply to burn".to_string(),
            });
        }
        let previous_nominal = Self::to_nominal(main_balance, fee, params)?;
        let invariant = previous_nominal.checked_add(wrapped_nominal)?;
        let delta = invariant.mul_div_down(bpt_in, bpt_supply)?;
        let after_nominal = previous_nominal.checked_sub(delta)?;
        let new_balance = Self::from_nominal(after_nominal, fee, params)?;
        Ok(main_balance.checked_sub(new_balance)?)
    }

    /// Main tokens required to mint an exact BPT amount.
    pub fn main_in_per_bpt_out(
        bpt_out: Wad,
        main_balance: Wad,
        wrapped_nominal: Wad,
        bpt_supply: Wad,
        fee: Wad,
        params: &LinearParams,
    ) -> Result<Wad, PoolMathError> {
        if bpt_supply.is_zero() {
            let after = Self::from_nominal(bpt_out, fee, params)?;
            return Ok(after.checked_sub(main_balance)?);
        }
        let previous_nominal = Self::to_nominal(main_balance, fee, params)?;
        let invariant = previous_nominal.checked_add(wrapped_nominal)?;
        let delta = invariant.mul_div_up(bpt_out, bpt_supply)?;
        let after_nominal = previous_nominal.checked_add(delta)?;
        let new_balance = Self::from_nominal(after_nominal, fee, params)?;
        Ok(new_balance.checked_sub(main_balance)?)
    }

    /// BPT burned to release an exact main-token amount.
    pub fn bpt_in_per_main_out(
        main_out: Wad,
        main_balance: Wad,
        wrapped_nominal: Wad,
        bpt_supply: Wad,
        fee: Wad,
        params: &LinearParams,
    ) -> Result<Wad, PoolMathError> {
        let after_balance = main_balance.checked_sub(main_out)?;
        let previous_nominal = Self::to_nominal(main_balance, fee, params)?;
        let after_nominal = Self::to_nominal(after_balance, fee, params)?;
        let delta = previous_nominal.checked_sub(after_nominal)?;
        let invariant = previous_nominal.checked_add(wrapped_nominal)?;
        Ok(bpt_supply.mul_div_up(delta, invariant)?)
    }

    fn to_nominal(real: Wad, fee: Wad, params: &LinearParams) -> Result<Wad, PoolMathError> {
        if real < params.lower_target {
            let fees = params.lower_target.checked_sub(real)?.mul_down(fee)?;
            Ok(real.checked_sub(fees)?)
        } else if real <= params.upper_target {
            Ok(real)
        } else {
            let fees = real.checked_sub(params.upper_target)?.mul_down(fee)?;
            Ok(real.checked_sub(fees)?)
        }
    }

    fn from_nominal(nominal: Wad, fee: Wad, params: &LinearParams) -> Result<Wad, PoolMathError> {
        if nominal < params.lower_target {
            let numerator = nominal.checked_add(fee.mul_down(params.lower_target)?)?;
            Ok(numerator.div_down(Wad::ONE.checked_add(fee)?)?)
        } else if nominal <= params.upper_target {
            Ok(nominal)
        } else {
            let numerator = nominal.checked_sub(fee.mul_down(params.upper_target)?)?;
            Ok(numerator.div_down(Wad::ONE.checked_sub(fee)?)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LinearParams {
        LinearParams {
            main_index: 0,
            wrapped_index: 1,
            rate: Wad::ONE,
            lower_target: Wad::from_int(100_000),
            upper_target: Wad::from_int(900_000),
        }
    }

    fn fee() -> Wad {
        Wad::from_decimal_str("0.0002").unwrap()
    }

    #[test]
    fn test_deposit_inside_band_is_one_to_one_on_nominal_value() {
        // Balanced pool inside the target band, BPT trades at par.
        let bpt = LinearMath::bpt_out_per_main_in(
            Wad::from_int(1_000),
            Wad::from_int(500_000),
            Wad::from_int(500_000),
            Wad::from_int(1_000_000),
            fee(),
            &params(),
        )
        .unwrap();
        assert_eq!(bpt, Wad::from_int(1_000));
    }

    #[test]
    fn test_deposit_beyond_upper_target_pays_fee() {
        let bpt = LinearMath::bpt_out_per_main_in(
            Wad::from_int(10_000),
            Wad::from_int(895_000),
            Wad::from_int(105_000),
            Wad::from_int(1_000_000),
            fee(),
            &params(),
        )
        .unwrap();
        // 5_000 of the deposit lands beyond the upper target and is taxed.
        assert!(bpt < Wad::from_int(10_000));
        assert!(bpt > Wad::from_int(9_990));
    }

    #[test]
    fn test_round_trip_inside_band_is_lossless_to_dust() {
        let main_balance = Wad::from_int(400_000);
        let wrapped = Wad::from_int(300_000);
        let supply = Wad::from_int(700_000);
        let main_in = Wad::from_int(2_000);

        let bpt = LinearMath::bpt_out_per_main_in(
            main_in, main_balance, wrapped, supply, fee(), &params(),
        )
        .unwrap();
        let back = LinearMath::main_out_per_bpt_in(
            bpt, main_balance, wrapped, supply, fee(), &params(),
        )
        .unwrap();
        // Inside the band the curve is the identity on nominal value.
        assert!(back <= main_in);
        assert!(main_in.raw() - back.raw() < Wad::from_decimal_str("0.000001").unwrap().raw());
    }

    #[test]
    fn test_exact_bpt_out_charges_at_least_the_forward_quote() {
        let main_balance = Wad::from_int(400_000);
        let wrapped = Wad::from_int(300_000);
        let supply = Wad::from_int(700_000);

        let target_bpt = Wad::from_int(1_500);
        let needed = LinearMath::main_in_per_bpt_out(
            target_bpt, main_balance, wrapped, supply, fee(), &params(),
        )
        .unwrap();
        let minted = LinearMath::bpt_out_per_main_in(
            needed, main_balance, wrapped, supply, fee(), &params(),
        )
        .unwrap();
        assert!(minted >= target_bpt.saturating_sub(Wad(ethers::types::U256::from(10u64))));
    }

    #[test]
    fn test_seeding_an_empty_pool_mints_nominal() {
        let bpt = LinearMath::bpt_out_per_main_in(
            Wad::from_int(50_000),
            Wad::ZERO,
            Wad::ZERO,
            Wad::ZERO,
            fee(),
            &params(),
        )
        .unwrap();
        // 50_000 sits below the lower target, so seeding nets fees out.
        assert!(bpt < Wad::from_int(50_000));
        assert!(bpt > Wad::from_int(49_989));
    }

    #[test]
    fn test_burning_against_empty_pool_fails() {
        let result = LinearMath::main_out_per_bpt_in(
            Wad::from_int(10),
            Wad::ZERO,
            Wad::ZERO,
            Wad::ZERO,
            fee(),
            &params(),
        );
        assert!(matches!(result, Err(PoolMathError::InvalidPoolState { .. })));
    }
}
