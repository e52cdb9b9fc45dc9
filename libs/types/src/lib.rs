//! # Basin Types - Core Data Model
//!
//! Shared value types for the routing engine: 18-decimal fixed-point
//! arithmetic, token amounts, pool snapshots, quotes, and execution plans.
//!
//! ## Design Principles
//!
//! - **Values, not objects**: pools and amounts are freely clonable
//!   snapshots; every math operation is a pure function returning new values
//! - **No floating point on amounts**: anything that can reach a transaction
//!   is a [`Wad`] or a raw `U256`; rounding direction is always explicit
//! - **Fail fast**: malformed snapshots are rejected by [`Pool::validate`]
//!   before any kernel runs on them

pub mod error;
pub mod fixed_point;
pub mod pool;
pub mod quote;
pub mod token;

pub use error::{FixedPointError, PoolMathError, RatioSide};
pub use fixed_point::{Wad, WAD_DECIMALS};
pub use pool::{LinearParams, Pool, PoolType};
pub use quote::{Hop, PlanKind, PlanStep, Quote, RoutePlan, StepAction, SwapKind};
pub use token::{Token, TokenAmount};

// Re-export the chain primitive types so downstream crates agree on one
// source for them.
pub use ethers::types::{Address, H256, I256, U256};
