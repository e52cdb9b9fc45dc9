//! 18-decimal fixed-point arithmetic for raw on-chain amounts
//!
//! All pool balances, swap fees, and pool-token amounts flow through [`Wad`],
//! a `U256`-backed value scaled by 10^18 (Solidity's `ufixed256x18`). Every
//! operation that can lose precision exists in two flavors with an explicit
//! rounding direction: round **up** for amounts the user must pay, round
//! **down** for amounts the user will receive. Floating point never touches
//! an amount that can reach a transaction.

use crate::error::FixedPointError;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimals in the scaled representation.
pub const WAD_DECIMALS: u8 = 18;

/// Fractional bits evaluated by `pow` before the error margin is applied.
/// 2^-60 is below one part in 10^18, so the truncated exponent tail is
/// always smaller than the margin in [`Wad::pow_down`] / [`Wad::pow_up`].
const POW_FRACTION_BITS: usize = 60;

/// Upper bound for the integer part of a `pow` exponent. Weight ratios in
/// practice stay in single digits; anything this large is a malformed pool.
const MAX_POW_INTEGER_EXPONENT: u64 = 64;

/// Relative error margin applied after `pow`, expressed in 18-decimal raw
/// units (10^-14). The raw power is accurate to well under this bound, so
/// subtracting (adding) the margin makes the result a strict lower (upper)
/// bound of the exact value.
const MAX_POW_RELATIVE_ERROR: U256 = U256([10_000, 0, 0, 0]);

/// Scaled fixed-point amount with 18 decimals of precision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Wad(pub U256);

impl Wad {
    /// Scale factor, 10^18.
    pub const ONE: Self = Self(U256([1_000_000_000_000_000_000, 0, 0, 0]));

    /// Zero amount.
    pub const ZERO: Self = Self(U256([0, 0, 0, 0]));

    /// Two, used by the `pow` square shortcut.
    pub const TWO: Self = Self(U256([2_000_000_000_000_000_000, 0, 0, 0]));

    /// Wrap an already-scaled raw value.
    pub const fn from_scaled(raw: U256) -> Self {
        Self(raw)
    }

    /// Whole-unit constructor: `from_int(3)` is 3.0.
    pub fn from_int(units: u64) -> Self {
        Self(U256::from(units) * Self::ONE.0)
    }

    /// Upscale a raw amount in `decimals` native units to the 18-decimal
    /// representation. Exact integer operation; tokens with more than 18
    /// decimals are rejected rather than truncated.
    pub fn from_raw(amount: U256, decimals: u8) -> Result<Self, FixedPointError> {
        if decimals > WAD_DECIMALS {
            return Err(FixedPointError::DecimalsTooLarge { decimals });
        }
        let factor = U256::exp10((WAD_DECIMALS - decimals) as usize);
        amount
            .checked_mul(factor)
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    /// Downscale to raw native units, rounding down (receive side).
    pub fn to_raw_down(self, decimals: u8) -> Result<U256, FixedPointError> {
        if decimals > WAD_DECIMALS {
            return Err(FixedPointError::DecimalsTooLarge { decimals });
        }
        let factor = U256::exp10((WAD_DECIMALS - decimals) as usize);
        Ok(self.0 / factor)
    }

    /// Downscale to raw native units, rounding up (pay side).
    pub fn to_raw_up(self, decimals: u8) -> Result<U256, FixedPointError> {
        if decimals > WAD_DECIMALS {
            return Err(FixedPointError::DecimalsTooLarge { decimals });
        }
        let factor = U256::exp10((WAD_DECIMALS - decimals) as usize);
        if self.0.is_zero() {
            return Ok(U256::zero());
        }
        Ok((self.0 - U256::one()) / factor + U256::one())
    }

    /// Parse a non-negative decimal string ("0.003", "1.25") exactly.
    pub fn from_decimal_str(s: &str) -> Result<Self, FixedPointError> {
        use rust_decimal::Decimal;
        use std::str::FromStr;

        let decimal = Decimal::from_str(s)
            .map_err(|_| FixedPointError::InvalidDecimal { input: s.to_string() })?
            .normalize();
        if decimal.is_sign_negative() {
            return Err(FixedPointError::InvalidDecimal { input: s.to_string() });
        }
        let scale = decimal.scale();
        if scale > WAD_DECIMALS as u32 {
            return Err(FixedPointError::InvalidDecimal { input: s.to_string() });
        }
        let mantissa = decimal.mantissa().unsigned_abs();
        let factor = U256::exp10((WAD_DECIMALS as u32 - scale) as usize);
        U256::from(mantissa)
            .checked_mul(factor)
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Raw scaled value.
    pub fn raw(self) -> U256 {
        self.0
    }

    // CHECKED ARITHMETIC

    pub fn checked_add(self, rhs: Self) -> Result<Self, FixedPointError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, FixedPointError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(FixedPointError::Underflow)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// `a * b / ONE`, rounded down.
    pub fn mul_down(self, rhs: Self) -> Result<Self, FixedPointError> {
        let product = self
            .0
            .checked_mul(rhs.0)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self(product / Self::ONE.0))
    }

    /// `a * b / ONE`, rounded up.
    pub fn mul_up(self, rhs: Self) -> Result<Self, FixedPointError> {
        let product = self
            .0
            .checked_mul(rhs.0)
            .ok_or(FixedPointError::Overflow)?;
        if product.is_zero() {
            return Ok(Self::ZERO);
        }
        Ok(Self((product - U256::one()) / Self::ONE.0 + U256::one()))
    }

    /// `a * ONE / b`, rounded down.
    pub fn div_down(self, rhs: Self) -> Result<Self, FixedPointError> {
        if rhs.0.is_zero() {
            return Err(FixedPointError::DivisionByZero);
        }
        let scaled = self
            .0
            .checked_mul(Self::ONE.0)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self(scaled / rhs.0))
    }

    /// `a * ONE / b`, rounded up.
    pub fn div_up(self, rhs: Self) -> Result<Self, FixedPointError> {
        if rhs.0.is_zero() {
            return Err(FixedPointError::DivisionByZero);
        }
        if self.0.is_zero() {
            return Ok(Self::ZERO);
        }
        let scaled = self
            .0
            .checked_mul(Self::ONE.0)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self((scaled - U256::one()) / rhs.0 + U256::one()))
    }

    /// `max(1 - x, 0)`, the share left over after taking a fraction.
    pub fn complement(self) -> Self {
        Self(Self::ONE.0.saturating_sub(self.0))
    }

    /// `self * mul / div` in one step, rounded down. Scale-preserving, and
    /// avoids the intermediate precision loss of chaining `mul_down` and
    /// `div_down`.
    pub fn mul_div_down(self, mul: Self, div: Self) -> Result<Self, FixedPointError> {
        if div.0.is_zero() {
            return Err(FixedPointError::DivisionByZero);
        }
        let product = self
            .0
            .checked_mul(mul.0)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self(product / div.0))
    }

    /// `self * mul / div` in one step, rounded up.
    pub fn mul_div_up(self, mul: Self, div: Self) -> Result<Self, FixedPointError> {
        if div.0.is_zero() {
            return Err(FixedPointError::DivisionByZero);
        }
        let product = self
            .0
            .checked_mul(mul.0)
            .ok_or(FixedPointError::Overflow)?;
        if product.is_zero() {
            return Ok(Self::ZERO);
        }
        Ok(Self((product - U256::one()) / div.0 + U256::one()))
    }

    /// Fixed-point square root, rounded down.
    pub fn sqrt_down(self) -> Result<Self, FixedPointError> {
        let scaled = self
            .0
            .checked_mul(Self::ONE.0)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self(integer_sqrt(scaled)))
    }

    /// Fixed-point square root, rounded up.
    pub fn sqrt_up(self) -> Result<Self, FixedPointError> {
        let scaled = self
            .0
            .checked_mul(Self::ONE.0)
            .ok_or(FixedPointError::Overflow)?;
        let root = integer_sqrt(scaled);
        if root * root == scaled {
            Ok(Self(root))
        } else {
            Ok(Self(root + U256::one()))
        }
    }

    /// `x^y` as a lower bound of the exact value.
    ///
    /// The raw power is evaluated by square-and-multiply on the integer part
    /// of the exponent and binary-fraction expansion over repeated square
    /// roots for the fractional part, then shrunk by a fixed relative error
    /// margin so callers can rely on the bound direction regardless of
    /// whether the base is above or below one.
    pub fn pow_down(self, exp: Self) -> Result<Self, FixedPointError> {
        // Exact shortcuts for the overwhelmingly common exponents.
        if exp == Self::ONE {
            return Ok(self);
        }
        if exp == Self::TWO {
            return self.mul_down(self);
        }
        let raw = self.pow_raw(exp, Rounding::Down)?;
        let margin = raw
            .mul_up(Self(MAX_POW_RELATIVE_ERROR))?
            .checked_add(Self(U256::one()))?;
        Ok(raw.saturating_sub(margin))
    }

    /// `x^y` as an upper bound of the exact value.
    pub fn pow_up(self, exp: Self) -> Result<Self, FixedPointError> {
        if exp == Self::ONE {
            return Ok(self);
        }
        if exp == Self::TWO {
            return self.mul_up(self);
        }
        let raw = self.pow_raw(exp, Rounding::Up)?;
        if raw.is_zero() {
            return Ok(raw);
        }
        let margin = raw
            .mul_up(Self(MAX_POW_RELATIVE_ERROR))?
            .checked_add(Self(U256::one()))?;
        raw.checked_add(margin)
    }

    fn pow_raw(self, exp: Self, rounding: Rounding) -> Result<Self, FixedPointError> {
        if exp.is_zero() {
            return Ok(Self::ONE);
        }
        if self.is_zero() {
            return Ok(Self::ZERO);
        }
        if self == Self::ONE {
            return Ok(Self::ONE);
        }

        let integer_part = exp.0 / Self::ONE.0;
        let fraction_part = exp.0 % Self::ONE.0;
        if integer_part > U256::from(MAX_POW_INTEGER_EXPONENT) {
            return Err(FixedPointError::ExponentTooLarge);
        }

        let mul = |a: Self, b: Self| match rounding {
            Rounding::Down => a.mul_down(b),
            Rounding::Up => a.mul_up(b),
        };
        let sqrt = |a: Self| match rounding {
            Rounding::Down => a.sqrt_down(),
            Rounding::Up => a.sqrt_up(),
        };

        let mut acc = Self::ONE;

        // Integer part by square-and-multiply.
        let mut n = integer_part.low_u64();
        let mut base = self;
        while n > 0 {
            if n & 1 == 1 {
                acc = mul(acc, base)?;
            }
            n >>= 1;
            if n > 0 {
                base = mul(base, base)?;
            }
        }

        // Fractional part: x^(b1/2 + b2/4 + ...) over repeated square roots.
        let mut remainder = fraction_part;
        if !remainder.is_zero() {
            let mut layer = self;
            for _ in 0..POW_FRACTION_BITS {
                layer = sqrt(layer)?;
                remainder = remainder << 1usize;
                if remainder >= Self::ONE.0 {
                    remainder = remainder - Self::ONE.0;
                    acc = mul(acc, layer)?;
                }
                if remainder.is_zero() {
                    break;
                }
            }
        }

        Ok(acc)
    }
}

#[derive(Clone, Copy)]
enum Rounding {
    Down,
    Up,
}

/// Integer square root by Newton's method; exact floor for all inputs.
fn integer_sqrt(value: U256) -> U256 {
    if value.is_zero() {
        return U256::zero();
    }
    let mut x = U256::one() << ((value.bits() + 1) / 2);
    loop {
        let y = (x + value / x) >> 1usize;
        if y >= x {
            return x;
        }
        x = y;
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let integer = self.0 / Self::ONE.0;
        let fraction = self.0 % Self::ONE.0;
        if fraction.is_zero() {
            return write!(f, "{integer}");
        }
        let digits = format!("{fraction:018}");
        write!(f, "{}.{}", integer, digits.trim_end_matches('0'))
    }
}
