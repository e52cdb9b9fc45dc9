//! # Basin AMM - Pool Invariant Math
//!
//! Pure invariant-math engine over immutable [`Pool`](basin_types::Pool)
//! snapshots: joins, exits, swaps, proportional amounts, and price impact.
//! One battle-tested kernel per pool family:
//!
//! - [`WeightedMath`] — constant weighted-product invariant
//! - [`StableMath`] — amplified StableSwap invariant (Newton iteration)
//! - [`LinearMath`] — piecewise-linear nominal-balance model
//!
//! [`PoolMath`] dispatches a snapshot to the right kernel and owns the
//! family-independent operations. Everything here is a pure function:
//! no I/O, no mutation, explicit rounding direction at every step.

pub mod linear;
pub mod pool_math;
pub mod stable;
pub mod weighted;

pub use linear::LinearMath;
pub use pool_math::{Direction, PoolMath, PropMax};
pub use stable::{StableMath, AMP_PRECISION};
pub use weighted::{WeightedMath, MAX_IN_RATIO, MAX_OUT_RATIO};
