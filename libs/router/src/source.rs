//! Liquidity sources
//!
//! A [`QuoteSource`] is one venue the aggregator can ask for a price. Three
//! implementations ship with the engine:
//!
//! - [`SorSource`] adapts an external smart-order-router library behind the
//!   [`SmartOrderRouter`] seam
//! - [`RegistryRouterSource`] is the built-in reference optimizer: best
//!   single hop over the in-memory registry using the invariant math
//! - [`OnchainRouterSource`] queries an external AMM router's
//!   `getAmountsOut` through the batch executor

use crate::error::QuoteError;
use crate::registry::PoolRegistry;
use async_trait::async_trait;
use basin_amm::PoolMath;
use basin_multicall::{abi, CallRequest, MulticallExecutor};
use basin_types::{Address, Hop, Quote, SwapKind, Token, TokenAmount, U256};
use ethabi::Token as AbiToken;
use std::sync::Arc;
use tracing::debug;

/// One requested trade: the fixed side's raw amount plus the direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteQuery {
    pub token_in: Token,
    pub token_out: Token,
    /// Raw amount of the fixed side (`token_in` for `GivenIn`, `token_out`
    /// for `GivenOut`).
    pub amount: U256,
    pub kind: SwapKind,
}

impl QuoteQuery {
    pub fn given_in(token_in: Token, token_out: Token, amount: U256) -> Self {
        Self { token_in, token_out, amount, kind: SwapKind::GivenIn }
    }
}

/// A venue that can price a trade. Implementations do their own I/O; the
/// aggregator only orchestrates concurrency, timeout, and collection.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable identifier, used in quotes, logs, and the cache fingerprint.
    fn id(&self) -> &str;

    async fn quote(&self, query: &QuoteQuery) -> Result<Quote, QuoteError>;
}

/// External off-chain route optimizer seam. The real implementation is a
/// third-party library; tests and the reference deployment stub it.
#[async_trait]
pub trait SmartOrderRouter: Send + Sync {
    async fn find_route(
        &self,
        query: &QuoteQuery,
        pools: &[basin_types::Pool],
    ) -> Result<Quote, QuoteError>;
}

/// Adapts a [`SmartOrderRouter`] into a quote source, handing it the
/// registry's current snapshot set.
pub struct SorSource {
    id: String,
    router: Arc<dyn SmartOrderRouter>,
    registry: Arc<PoolRegistry>,
}

impl SorSource {
    pub fn new(id: impl Into<String>, router: Arc<dyn SmartOrderRouter>, registry: Arc<PoolRegistry>) -> Self {
        Self { id: id.into(), router, registry }
    }
}

#[async_trait]
impl QuoteSource for SorSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn quote(&self, query: &QuoteQuery) -> Result<Quote, QuoteError> {
        let pools: Vec<_> = self.registry.iter().cloned().collect();
        self.router.find_route(query, &pools).await
    }
}

/// Built-in reference optimizer: evaluates every registry pool trading the
/// pair with the invariant math and quotes the best single hop.
pub struct RegistryRouterSource {
    id: String,
    registry: Arc<PoolRegistry>,
    math: PoolMath,
    swap_gas_units: u64,
}

impl RegistryRouterSource {
    pub fn new(registry: Arc<PoolRegistry>, swap_gas_units: u64) -> Self {
        Self {
            id: "registry-router".to_string(),
            registry,
            math: PoolMath::new(),
            swap_gas_units,
        }
    }
}

#[async_trait]
impl QuoteSource for RegistryRouterSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn quote(&self, query: &QuoteQuery) -> Result<Quote, QuoteError> {
        let candidates = self
            .registry
            .pools_with_pair(query.token_in.address, query.token_out.address);
        if candidates.is_empty() {
            return Err(QuoteError::UnsupportedPair { source_id: self.id.clone() });
        }

        let mut best: Option<(Quote, U256)> = None;
        for pool in candidates {
            // Present by construction of pools_with_pair.
            let (Some(index_in), Some(index_out)) = (
                pool.token_index(query.token_in.address),
                pool.token_index(query.token_out.address),
            ) else {
                continue;
            };

            let quoted = match query.kind {
                SwapKind::GivenIn => {
                    let scaled_in =
                        TokenAmount::new(query.token_in.clone(), query.amount).to_scaled()?;
                    let scaled_out = match self.math.out_given_in(pool, index_in, index_out, scaled_in) {
                        Ok(out) => out,
                        Err(e) => {
                            debug!(pool = %pool.short_id(), error = %e, "pool cannot fill the trade");
                            continue;
                        }
                    };
                    let output =
                        TokenAmount::from_scaled_down(query.token_out.clone(), scaled_out)?;
                    (TokenAmount::new(query.token_in.clone(), query.amount), output)
                }
                SwapKind::GivenOut => {
                    let scaled_out =
                        TokenAmount::new(query.token_out.clone(), query.amount).to_scaled()?;
                    let scaled_in = match self.math.in_given_out(pool, index_in, index_out, scaled_out) {
                        Ok(input) => input,
                        Err(e) => {
                            debug!(pool = %pool.short_id(), error = %e, "pool cannot fill the trade");
                            continue;
                        }
                    };
                    let input = TokenAmount::from_scaled_up(query.token_in.clone(), scaled_in)?;
                    (input, TokenAmount::new(query.token_out.clone(), query.amount))
                }
            };

            let (input, output) = quoted;
            // GivenIn ranks by highest output, GivenOut by lowest input.
            let better = match (&best, query.kind) {
                (None, _) => true,
                (Some((_, mark)), SwapKind::GivenIn) => output.amount > *mark,
                (Some((_, mark)), SwapKind::GivenOut) => input.amount < *mark,
            };
            if better {
                let mark = match query.kind {
                    SwapKind::GivenIn => output.amount,
                    SwapKind::GivenOut => input.amount,
                };
                let quote = Quote {
                    source: self.id.clone(),
                    input,
                    output,
                    hops: vec![Hop {
                        pool_id: pool.id,
                        token_in: query.token_in.address,
                        token_out: query.token_out.address,
                    }],
                    gas_estimate: self.swap_gas_units,
                };
                best = Some((quote, mark));
            }
        }

        let (quote, _) = best.ok_or_else(|| QuoteError::ZeroOutput { source_id: self.id.clone() })?;
        if !quote.has_positive_output() {
            return Err(QuoteError::ZeroOutput { source_id: self.id.clone() });
        }
        Ok(quote)
    }
}

/// External AMM router queried with a `getAmountsOut` call through the
/// batch executor. Exact-out quoting is not part of that interface.
pub struct OnchainRouterSource {
    id: String,
    executor: Arc<MulticallExecutor>,
    router_address: Address,
    swap_gas_units: u64,
}

impl OnchainRouterSource {
    pub fn new(
        id: impl Into<String>,
        executor: Arc<MulticallExecutor>,
        router_address: Address,
        swap_gas_units: u64,
    ) -> Self {
        Self { id: id.into(), executor, router_address, swap_gas_units }
    }
}

#[async_trait]
impl QuoteSource for OnchainRouterSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn quote(&self, query: &QuoteQuery) -> Result<Quote, QuoteError> {
        if query.kind == SwapKind::GivenOut {
            return Err(QuoteError::UnsupportedPair { source_id: self.id.clone() });
        }

        let path = format!("{}.getAmountsOut", self.id);
        let request = CallRequest::new(
            path.clone(),
            self.router_address,
            &abi::ROUTER_GET_AMOUNTS_OUT,
            vec![
                AbiToken::Uint(query.amount),
                AbiToken::Array(vec![
                    AbiToken::Address(query.token_in.address),
                    AbiToken::Address(query.token_out.address),
                ]),
            ],
        );

        let results = self.executor.execute(vec![request]).await?;
        let amounts = results.uints(&path).ok_or_else(|| QuoteError::Source {
            source_id: self.id.clone(),
            reason: "router returned no amounts".to_string(),
        })?;
        let amount_out = amounts.last().copied().unwrap_or_default();
        if amount_out.is_zero() {
            return Err(QuoteError::ZeroOutput { source_id: self.id.clone() });
        }

        Ok(Quote {
            source: self.id.clone(),
            input: TokenAmount::new(query.token_in.clone(), query.amount),
            output: TokenAmount::new(query.token_out.clone(), amount_out),
            hops: vec![Hop {
                // External venue: the route is opaque, keyed by the router.
                pool_id: basin_types::H256::from_slice(&{
                    let mut id = [0u8; 32];
                    id[12..].copy_from_slice(self.router_address.as_bytes());
                    id
                }),
                token_in: query.token_in.address,
                token_out: query.token_out.address,
            }],
            gas_estimate: self.swap_gas_units,
        })
    }
}
