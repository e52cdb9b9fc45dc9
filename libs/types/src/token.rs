//! Token identity and raw integer amounts
//!
//! A [`TokenAmount`] always carries its amount in raw native units (the
//! integer the chain sees). Conversions to the 18-decimal scaled form used
//! by pool math, and from human-readable decimal strings, are exact integer
//! operations.

use crate::error::FixedPointError;
use crate::fixed_point::Wad;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ERC-20 token as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
    /// Display symbol, used only in logs.
    #[serde(default)]
    pub symbol: Option<String>,
}

impl Token {
    pub fn new(address: Address, decimals: u8) -> Self {
        Self { address, decimals, symbol: None }
    }

    pub fn with_symbol(address: Address, decimals: u8, symbol: &str) -> Self {
        Self { address, decimals, symbol: Some(symbol.to_string()) }
    }

    /// Short label for log lines: symbol when known, shortened address otherwise.
    pub fn label(&self) -> String {
        match &self.symbol {
            Some(symbol) => symbol.clone(),
            None => {
                let hex = hex::encode(self.address.as_bytes());
                format!("0x{}..{}", &hex[..4], &hex[hex.len() - 4..])
            }
        }
    }
}

/// A raw integer amount of a specific token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: Token,
    /// Raw amount in the token's native units; never negative by construction.
    pub amount: U256,
}

impl TokenAmount {
    pub fn new(token: Token, amount: U256) -> Self {
        Self { token, amount }
    }

    pub fn zero(token: Token) -> Self {
        Self { token, amount: U256::zero() }
    }

    /// Parse a human-readable decimal amount ("10000", "1.5") into raw units.
    /// Fails if the literal has more fractional digits than the token can
    /// represent; nothing is silently truncated.
    pub fn from_human_str(token: Token, human: &str) -> Result<Self, FixedPointError> {
        use rust_decimal::Decimal;
        use std::str::FromStr;

        let decimal = Decimal::from_str(human)
            .map_err(|_| FixedPointError::InvalidDecimal { input: human.to_string() })?
            .normalize();
        if decimal.is_sign_negative() {
            return Err(FixedPointError::InvalidDecimal { input: human.to_string() });
        }
        let scale = decimal.scale();
        if scale > token.decimals as u32 {
            return Err(FixedPointError::InvalidDecimal { input: human.to_string() });
        }
        let factor = U256::exp10((token.decimals as u32 - scale) as usize);
        let amount = U256::from(decimal.mantissa().unsigned_abs())
            .checked_mul(factor)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self { token, amount })
    }

    /// Upscale to the 18-decimal representation pool math runs on.
    pub fn to_scaled(&self) -> Result<Wad, FixedPointError> {
        Wad::from_raw(self.amount, self.token.decimals)
    }

    /// Downscale a pool-math result back to raw units, rounding down
    /// (the receive side).
    pub fn from_scaled_down(token: Token, scaled: Wad) -> Result<Self, FixedPointError> {
        let amount = scaled.to_raw_down(token.decimals)?;
        Ok(Self { token, amount })
    }

    /// Downscale back to raw units, rounding up (the pay side).
    pub fn from_scaled_up(token: Token, scaled: Wad) -> Result<Self, FixedPointError> {
        let amount = scaled.to_raw_up(token.decimals)?;
        Ok(Self { token, amount })
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factor = U256::exp10(self.token.decimals as usize);
        let integer = self.amount / factor;
        let fraction = self.amount % factor;
        if fraction.is_zero() {
            write!(f, "{} {}", integer, self.token.label())
        } else {
            let digits = format!("{:0width$}", fraction, width = self.token.decimals as usize);
            write!(f, "{}.{} {}", integer, digits.trim_end_matches('0'), self.token.label())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> Token {
        Token::with_symbol(Address::repeat_byte(0x01), 6, "USDC")
    }

    fn dai() -> Token {
        Token::with_symbol(Address::repeat_byte(0x02), 18, "DAI")
    }

    #[test]
    fn test_human_parsing_is_exact() {
        let amount = TokenAmount::from_human_str(usdc(), "10000").unwrap();
        assert_eq!(amount.amount, U256::from(10_000_000_000u64));

        let amount = TokenAmount::from_human_str(usdc(), "1.5").unwrap();
        assert_eq!(amount.amount, U256::from(1_500_000u64));

        // 7 fractional digits do not fit in 6 decimals
        assert!(TokenAmount::from_human_str(usdc(), "1.0000001").is_err());
        assert!(TokenAmount::from_human_str(usdc(), "-3").is_err());
    }

    #[test]
    fn test_scaled_conversion_aligns_decimals() {
        let usdc_amount = TokenAmount::from_human_str(usdc(), "10000").unwrap();
        let dai_amount = TokenAmount::from_human_str(dai(), "10000").unwrap();
        // Same human value, same scaled value, despite 6 vs 18 decimals
        assert_eq!(usdc_amount.to_scaled().unwrap(), dai_amount.to_scaled().unwrap());
    }

    #[test]
    fn test_downscale_rounding() {
        // One sub-unit of scaled dust
        let dust = Wad(U256::one());
        assert!(TokenAmount::from_scaled_down(usdc(), dust).unwrap().is_zero());
        assert_eq!(
            TokenAmount::from_scaled_up(usdc(), dust).unwrap().amount,
            U256::one()
        );
    }

    #[test]
    fn test_display_uses_symbol() {
        let amount = TokenAmount::from_human_str(usdc(), "1.5").unwrap();
        assert_eq!(amount.to_string(), "1.5 USDC");
    }
}
