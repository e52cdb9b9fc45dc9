//! # Basin Router - Routing Engine
//!
//! The orchestration layer of the engine: fans a trade query out to the
//! enabled liquidity sources, prices the boosted join/swap/exit
//! decomposition from registry snapshots, selects the best net-value plan,
//! and memoizes plans against the chain head.
//!
//! ## Structure
//!
//! - [`engine::SwapEngine`] — the public facade
//! - [`source`] — the [`source::QuoteSource`] seam and its implementations
//! - [`aggregator`] — concurrent fan-out with per-source timeouts and the
//!   stale-generation guard
//! - [`selector`] — gas-aware net-value ranking and the slippage buffer
//! - [`cache`] — block-height-aware quote/plan memo
//! - [`registry`] — validated pool snapshots and topology lookups
//! - [`decorate`] — batched on-chain snapshot refresh
//! - [`gas`] — TTL-cached gas price oracle
//!
//! Everything is injected: the engine takes its transport, registry, and
//! sources at construction and holds no ambient state.

pub mod aggregator;
pub mod cache;
pub mod decorate;
pub mod engine;
pub mod error;
pub mod gas;
pub mod registry;
pub mod selector;
pub mod source;

pub use aggregator::QuoteAggregator;
pub use cache::{CacheKey, CachedValue, PlanCache};
pub use decorate::{decorate, DecoratedPool, DecoratedPools};
pub use engine::{JoinExitAmounts, JoinExitQuery, SwapEngine};
pub use error::{QuoteError, RouteError};
pub use gas::{route_gas_estimate, GasOracle};
pub use registry::PoolRegistry;
pub use selector::RouteSelector;
pub use source::{
    OnchainRouterSource, QuoteQuery, QuoteSource, RegistryRouterSource, SmartOrderRouter,
    SorSource,
};
