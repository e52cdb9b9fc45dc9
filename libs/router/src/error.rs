//! Router-level error taxonomy
//!
//! [`QuoteError`] is source-local: the aggregator absorbs it (the failing
//! source is dropped from the round) and it never reaches the caller unless
//! every source fails. [`RouteError`] is the user-visible end of the line.

use basin_multicall::MulticallError;
use basin_types::{FixedPointError, PoolMathError};
use thiserror::Error;

/// One liquidity source's failure to produce a usable quote.
#[derive(Debug, Error)]
pub enum QuoteError {
    /// The source did not answer within the per-source timeout
    #[error("source '{source_id}' timed out after {timeout_ms}ms")]
    Timeout { source_id: String, timeout_ms: u64 },

    /// The source answered with nothing on the receive side
    #[error("source '{source_id}' returned zero output")]
    ZeroOutput { source_id: String },

    /// The source cannot quote this pair or direction at all
    #[error("source '{source_id}' does not support the requested pair")]
    UnsupportedPair { source_id: String },

    /// Source-internal failure (upstream error, bad response, ...)
    #[error("source '{source_id}' failed: {reason}")]
    Source { source_id: String, reason: String },

    #[error(transparent)]
    Math(#[from] PoolMathError),

    #[error(transparent)]
    Fixed(#[from] FixedPointError),

    #[error(transparent)]
    Multicall(#[from] MulticallError),
}

/// Failures that make the overall routing request impossible.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Every source failed or returned zero liquidity. Maps to the
    /// user-facing "insufficient liquidity" condition.
    #[error("no route available from {token_in} to {token_out}")]
    NoRouteAvailable { token_in: String, token_out: String },
}
