//! Quotes and execution plans
//!
//! A [`Quote`] is one liquidity source's answer for a requested trade. The
//! winning quote is turned into a [`RoutePlan`], the immutable artifact the
//! transaction-submission layer consumes once and discards.

use crate::fixed_point::Wad;
use crate::token::TokenAmount;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Trade direction: is the fixed side what the user sends or receives?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapKind {
    GivenIn,
    GivenOut,
}

impl SwapKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapKind::GivenIn => "given-in",
            SwapKind::GivenOut => "given-out",
        }
    }
}

/// One pool traversal inside a quoted route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub pool_id: H256,
    pub token_in: Address,
    pub token_out: Address,
}

/// A single source's priced route for a requested trade. Immutable once
/// produced; superseded quotes are simply dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Identifier of the source that produced this quote.
    pub source: String,
    pub input: TokenAmount,
    pub output: TokenAmount,
    pub hops: Vec<Hop>,
    /// Estimated execution gas for the whole route, in gas units.
    pub gas_estimate: u64,
}

impl Quote {
    /// Quotes with nothing on the receive side are useless to the selector.
    pub fn has_positive_output(&self) -> bool {
        !self.output.amount.is_zero()
    }
}

/// What a plan step does on its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    Swap,
    JoinPool,
    ExitPool,
}

/// One executable step of a route plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: StepAction,
    pub pool_id: H256,
    pub token_in: Address,
    pub token_out: Address,
}

/// Overall shape of the winning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanKind {
    DirectSwap,
    JoinSwapExit,
}

/// The selected execution plan handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub kind: PlanKind,
    pub steps: Vec<PlanStep>,
    pub input: TokenAmount,
    pub expected_output: TokenAmount,
    /// Guaranteed minimum after the slippage buffer, raw integer units of
    /// the output token, rounded down. Never exceeds the expected output.
    pub minimum_output: U256,
    /// Fraction of value lost versus the no-slippage ideal.
    pub price_impact: Wad,
    /// Source that won the selection.
    pub source: String,
    pub gas_estimate: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    #[test]
    fn test_positive_output_check() {
        let token_in = Token::new(Address::repeat_byte(1), 18);
        let token_out = Token::new(Address::repeat_byte(2), 18);
        let quote = Quote {
            source: "sor".to_string(),
            input: TokenAmount::new(token_in, U256::from(100u64)),
            output: TokenAmount::zero(token_out),
            hops: vec![],
            gas_estimate: 90_000,
        };
        assert!(!quote.has_positive_output());
    }
}
