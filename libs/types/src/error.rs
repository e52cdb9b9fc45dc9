//! Error types shared by the data model and the pool-math kernels
//!
//! Pool math fails fast: a violated precondition returns an error instead of
//! a fabricated zero or garbage amount that could reach a transaction.

use ethers::types::Address;
use thiserror::Error;

/// Errors from 18-decimal fixed-point arithmetic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FixedPointError {
    /// Result exceeds the representable range
    #[error("fixed-point overflow")]
    Overflow,

    /// Subtraction below zero
    #[error("fixed-point underflow")]
    Underflow,

    /// Division by zero
    #[error("division by zero in fixed-point arithmetic")]
    DivisionByZero,

    /// Token declares more than 18 decimals
    #[error("token decimals {decimals} exceed the 18-decimal scaled representation")]
    DecimalsTooLarge { decimals: u8 },

    /// Decimal string did not parse or cannot be represented exactly
    #[error("invalid decimal literal: '{input}'")]
    InvalidDecimal { input: String },

    /// Power exponent outside the supported range
    #[error("pow exponent integer part exceeds supported range")]
    ExponentTooLarge,
}

/// Errors from invariant math over a pool snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolMathError {
    /// Zero total supply: proportional math is undefined before the pool is seeded
    #[error("pool {pool_id} is uninitialized (zero total supply)")]
    PoolUninitialized { pool_id: String },

    /// Snapshot violates a structural precondition (mismatched arrays, missing weights, ...)
    #[error("invalid pool state: {reason}")]
    InvalidPoolState { reason: String },

    /// Token is not part of the pool
    #[error("token {token:?} is not in the pool")]
    TokenNotInPool { token: Address },

    /// Swap amount beyond the canonical 30% balance ratio guard
    #[error("swap amount exceeds {side} ratio limit")]
    RatioExceeded { side: RatioSide },

    /// The stable invariant's Newton iteration did not converge
    #[error("stable invariant did not converge")]
    InvariantNotConverged,

    #[error(transparent)]
    Math(#[from] FixedPointError),
}

/// Which side of a swap tripped the ratio guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatioSide {
    In,
    Out,
}

impl std::fmt::Display for RatioSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RatioSide::In => write!(f, "input"),
            RatioSide::Out => write!(f, "output"),
        }
    }
}
