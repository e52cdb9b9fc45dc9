//! Engine facade
//!
//! [`SwapEngine`] wires the pieces together behind one surface: quote
//! fan-out, the boosted join/swap/exit decomposition, selection, the
//! block-height-aware cache, the gas oracle, and pool decoration. Every
//! collaborator is injected at construction; the engine holds no global
//! state.

use crate::aggregator::QuoteAggregator;
use crate::cache::{CacheKey, CachedValue, PlanCache};
use crate::decorate::{self, DecoratedPools};
use crate::error::{QuoteError, RouteError};
use crate::gas::{route_gas_estimate, GasOracle};
use crate::selector::RouteSelector;
use crate::source::{QuoteQuery, QuoteSource};
use crate::registry::PoolRegistry;
use basin_amm::{Direction, PoolMath};
use basin_config::EngineConfig;
use basin_multicall::{CallTransport, MulticallExecutor};
use basin_types::{
    Address, PlanKind, PlanStep, Pool, PoolMathError, PoolType, RoutePlan, StepAction, SwapKind,
    TokenAmount, U256, Wad,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A join or exit request against one pool.
#[derive(Debug, Clone)]
pub enum JoinExitQuery {
    /// Deposit proportionally, anchored on one token's raw amount.
    ProportionalJoin { reference: TokenAmount },
    /// Deposit an arbitrary basket; tokens absent from the basket count as
    /// zero.
    ExactTokensInJoin { amounts: Vec<TokenAmount> },
    /// Burn an exact BPT amount for a proportional share of every balance.
    ProportionalExit { bpt_in: Wad },
    /// Burn an exact BPT amount for a single token.
    SingleTokenExit { bpt_in: Wad, token_out: Address },
}

/// The answer to a join/exit request: per-token amounts (index-aligned with
/// the pool's tokens), the BPT minted or burned, and the price impact.
#[derive(Debug, Clone)]
pub struct JoinExitAmounts {
    pub amounts: Vec<TokenAmount>,
    pub bpt: Wad,
    pub price_impact: Wad,
}

/// The routing engine's public surface.
pub struct SwapEngine {
    config: EngineConfig,
    registry: Arc<PoolRegistry>,
    executor: Arc<MulticallExecutor>,
    aggregator: QuoteAggregator,
    selector: RouteSelector,
    cache: PlanCache,
    gas: GasOracle,
    math: PoolMath,
    vault: Address,
}

impl SwapEngine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn CallTransport>,
        registry: Arc<PoolRegistry>,
        sources: Vec<Arc<dyn QuoteSource>>,
        vault: Address,
    ) -> Self {
        let selector = RouteSelector::from_bps(
            config.quotes.slippage_bps,
            U256::from(config.quotes.tie_epsilon_raw),
        );
        let aggregator = QuoteAggregator::new(
            sources,
            Duration::from_millis(config.quotes.source_timeout_ms),
        );
        let cache = PlanCache::new(config.cache.stale_block_tolerance);
        let gas = GasOracle::new(Arc::clone(&transport), &config.gas);
        let executor = Arc::new(MulticallExecutor::new(transport));
        info!(
            sources = aggregator.source_ids().len(),
            pools = registry.len(),
            "swap engine constructed"
        );
        Self {
            config,
            registry,
            executor,
            aggregator,
            selector,
            cache,
            gas,
            math: PoolMath::new(),
            vault,
        }
    }

    /// The batch executor, shared so callers can build sources over the
    /// same transport.
    pub fn executor(&self) -> &Arc<MulticallExecutor> {
        &self.executor
    }

    /// Best execution plan for the requested trade.
    ///
    /// `native_per_output_token` prices one whole output token in the
    /// chain's native currency (18-decimal; zero disables gas-aware
    /// ranking). The winning plan is cached against the current block
    /// height; a later identical request within the staleness tolerance is
    /// served from the cache without touching any source.
    pub async fn get_best_swap(
        &self,
        query: &QuoteQuery,
        native_per_output_token: Wad,
    ) -> Result<RoutePlan, RouteError> {
        let key = CacheKey {
            token_in: query.token_in.address,
            token_out: query.token_out.address,
            kind: query.kind,
            sources_fingerprint: self.aggregator.sources_fingerprint(),
        };
        let height = match self.executor.transport().block_number().await {
            Ok(height) => Some(height),
            Err(e) => {
                warn!(error = %e, "block height unavailable, bypassing the cache");
                None
            }
        };
        if let Some(height) = height {
            if let Some(CachedValue::Plan(plan)) = self.cache.get(&key, query.amount, height) {
                debug!(
                    token_in = %query.token_in.label(),
                    token_out = %query.token_out.label(),
                    "serving cached plan"
                );
                return Ok(plan);
            }
        }

        let quotes = self.aggregator.get_quotes(query).await;
        let boosted = self.boosted_candidate(query);

        let gas_price = self.gas.gas_price_wei().await;
        let cost_of_output_token = GasOracle::cost_of_output_token(
            gas_price,
            native_per_output_token,
            query.token_out.decimals,
        );

        let mut plan = self.selector.select(quotes, boosted, cost_of_output_token)?;
        self.refine_price_impact(&mut plan);

        if let Some(height) = height {
            self.cache
                .put(key, query.amount, CachedValue::Plan(plan.clone()), height);
        }
        Ok(plan)
    }

    /// Join/exit math for one pool: amounts, BPT delta, and price impact.
    pub fn get_join_exit_amounts(
        &self,
        pool: &Pool,
        query: &JoinExitQuery,
    ) -> Result<JoinExitAmounts, QuoteError> {
        pool.validate()?;
        if !pool.is_initialized() {
            return Err(PoolMathError::PoolUninitialized { pool_id: pool.short_id() }.into());
        }

        match query {
            JoinExitQuery::ProportionalJoin { reference } => {
                let index = pool
                    .token_index(reference.token.address)
                    .ok_or(PoolMathError::TokenNotInPool { token: reference.token.address })?;
                let amounts = self.math.proportional_amounts_given(
                    pool,
                    reference.to_scaled()?,
                    index,
                    Direction::Send,
                )?;
                let scaled = scale_amounts(&amounts)?;
                let bpt = self.math.bpt_out_given_exact_tokens_in(pool, &scaled)?;
                let price_impact = self.math.price_impact(pool, &scaled)?;
                Ok(JoinExitAmounts { amounts, bpt, price_impact })
            }
            JoinExitQuery::ExactTokensInJoin { amounts } => {
                let mut scaled = vec![Wad::ZERO; pool.tokens.len()];
                let mut aligned = Vec::with_capacity(pool.tokens.len());
                for (i, token) in pool.tokens.iter().enumerate() {
                    let amount = amounts
                        .iter()
                        .find(|a| a.token.address == token.address)
                        .cloned()
                        .unwrap_or_else(|| TokenAmount::zero(token.clone()));
                    scaled[i] = amount.to_scaled()?;
                    aligned.push(amount);
                }
                let bpt = self.math.bpt_out_given_exact_tokens_in(pool, &scaled)?;
                let price_impact = self.math.price_impact(pool, &scaled)?;
                Ok(JoinExitAmounts { amounts: aligned, bpt, price_impact })
            }
            JoinExitQuery::ProportionalExit { bpt_in } => {
                let mut amounts = Vec::with_capacity(pool.tokens.len());
                for (i, token) in pool.tokens.iter().enumerate() {
                    if Some(i) == pool.bpt_index {
                        amounts.push(TokenAmount::zero(token.clone()));
                        continue;
                    }
                    let scaled = pool.balances[i].mul_div_down(*bpt_in, pool.total_supply)?;
                    amounts.push(TokenAmount::from_scaled_down(token.clone(), scaled)?);
                }
                // A proportional exit tracks the pool's composition exactly.
                Ok(JoinExitAmounts { amounts, bpt: *bpt_in, price_impact: Wad::ZERO })
            }
            JoinExitQuery::SingleTokenExit { bpt_in, token_out } => {
                let index = pool
                    .token_index(*token_out)
                    .ok_or(PoolMathError::TokenNotInPool { token: *token_out })?;
                let actual = self.math.token_out_given_exact_bpt_in(pool, index, *bpt_in)?;
                let price_impact = self.single_exit_impact(pool, index, *bpt_in, actual)?;

                let mut amounts = Vec::with_capacity(pool.tokens.len());
                for (i, token) in pool.tokens.iter().enumerate() {
                    if i == index {
                        amounts.push(TokenAmount::from_scaled_down(token.clone(), actual)?);
                    } else {
                        amounts.push(TokenAmount::zero(token.clone()));
                    }
                }
                Ok(JoinExitAmounts { amounts, bpt: *bpt_in, price_impact })
            }
        }
    }

    /// One multicall batch refreshing the given pool snapshots.
    pub async fn decorate(
        &self,
        pools: Vec<Pool>,
        account: Option<Address>,
    ) -> Result<DecoratedPools, QuoteError> {
        decorate::decorate(&self.executor, self.vault, pools, account).await
    }

    /// Drop cached plans that are stale at the observed height. Intended to
    /// hang off a new-block listener.
    pub fn purge_cache(&self, observed_height: u64) {
        self.cache.purge(observed_height);
    }

    /// Join/swap/exit decomposition through a boosted topology: the input
    /// wraps into its linear pool's BPT, the BPTs trade inside the linking
    /// composable-stable hub, and the output unwraps on the far side. Only
    /// exact-in trades decompose this way.
    fn boosted_candidate(&self, query: &QuoteQuery) -> Option<RoutePlan> {
        if query.kind != SwapKind::GivenIn {
            return None;
        }
        let linear_in = self.registry.linear_pool_for_main(query.token_in.address)?;
        let linear_out = self.registry.linear_pool_for_main(query.token_out.address)?;
        let hub = self
            .registry
            .composable_linking(linear_in.address, linear_out.address)?;
        let hub_in = hub.token_index(linear_in.address)?;
        let hub_out = hub.token_index(linear_out.address)?;

        match self.price_boosted(query, linear_in, linear_out, hub, hub_in, hub_out) {
            Ok(plan) => {
                debug!(
                    linear_in = %linear_in.short_id(),
                    hub = %hub.short_id(),
                    linear_out = %linear_out.short_id(),
                    "boosted decomposition priced"
                );
                Some(plan)
            }
            Err(e) => {
                debug!(error = %e, "boosted decomposition not priced");
                None
            }
        }
    }

    fn price_boosted(
        &self,
        query: &QuoteQuery,
        linear_in: &Pool,
        linear_out: &Pool,
        hub: &Pool,
        hub_in: usize,
        hub_out: usize,
    ) -> Result<RoutePlan, QuoteError> {
        let scaled_in = TokenAmount::new(query.token_in.clone(), query.amount).to_scaled()?;

        let mut join_amounts = vec![Wad::ZERO; linear_in.tokens.len()];
        let main_in = linear_in
            .linear
            .as_ref()
            .map(|p| p.main_index)
            .ok_or_else(|| PoolMathError::InvalidPoolState {
                reason: "linear pool without parameters".to_string(),
            })?;
        join_amounts[main_in] = scaled_in;
        let bpt_in_leg = self.math.bpt_out_given_exact_tokens_in(linear_in, &join_amounts)?;

        let bpt_out_leg = self.math.out_given_in(hub, hub_in, hub_out, bpt_in_leg)?;

        let main_out = linear_out
            .linear
            .as_ref()
            .map(|p| p.main_index)
            .ok_or_else(|| PoolMathError::InvalidPoolState {
                reason: "linear pool without parameters".to_string(),
            })?;
        let scaled_out = self
            .math
            .token_out_given_exact_bpt_in(linear_out, main_out, bpt_out_leg)?;
        let output = TokenAmount::from_scaled_down(query.token_out.clone(), scaled_out)?;

        let steps = vec![
            PlanStep {
                action: StepAction::JoinPool,
                pool_id: linear_in.id,
                token_in: query.token_in.address,
                token_out: linear_in.address,
            },
            PlanStep {
                action: StepAction::Swap,
                pool_id: hub.id,
                token_in: linear_in.address,
                token_out: linear_out.address,
            },
            PlanStep {
                action: StepAction::ExitPool,
                pool_id: linear_out.id,
                token_in: linear_out.address,
                token_out: query.token_out.address,
            },
        ];
        let gas_estimate = route_gas_estimate(&self.config.gas, steps.len());

        Ok(RoutePlan {
            kind: PlanKind::JoinSwapExit,
            steps,
            input: TokenAmount::new(query.token_in.clone(), query.amount),
            expected_output: output,
            // The selector applies the slippage buffer.
            minimum_output: U256::zero(),
            price_impact: Wad::ZERO,
            source: "boosted".to_string(),
            gas_estimate,
        })
    }

    /// Price impact for a single-hop winner through a pool the registry
    /// knows: the realized rate against the spot rate, the spot rate read
    /// from a small probe trade through the same kernel. External
    /// multi-venue routes stay at zero; the engine has no snapshot to
    /// measure them against.
    fn refine_price_impact(&self, plan: &mut RoutePlan) {
        if plan.kind != PlanKind::DirectSwap || plan.steps.len() != 1 {
            return;
        }
        let step = &plan.steps[0];
        let Some(pool) = self.registry.get(&step.pool_id) else {
            return;
        };
        let (Some(index_in), Some(index_out)) =
            (pool.token_index(step.token_in), pool.token_index(step.token_out))
        else {
            return;
        };
        let (Ok(scaled_in), Ok(scaled_out)) =
            (plan.input.to_scaled(), plan.expected_output.to_scaled())
        else {
            return;
        };

        let probe = Wad::from_scaled(scaled_in.raw() / U256::from(10_000u64));
        if probe.is_zero() {
            return;
        }
        let impact = self
            .math
            .out_given_in(pool, index_in, index_out, probe)
            .and_then(|probe_out| {
                let ideal_out = probe_out.mul_div_down(scaled_in, probe)?;
                if ideal_out.is_zero() || scaled_out >= ideal_out {
                    return Ok(Wad::ZERO);
                }
                Ok(scaled_out.div_down(ideal_out)?.complement())
            });
        match impact {
            Ok(impact) => plan.price_impact = impact,
            Err(e) => debug!(pool = %pool.short_id(), error = %e, "price impact not refined"),
        }
    }

    fn single_exit_impact(
        &self,
        pool: &Pool,
        index: usize,
        bpt_in: Wad,
        actual: Wad,
    ) -> Result<Wad, QuoteError> {
        // Ideal: the exited BPT's share of pool value paid out entirely in
        // this token at spot, no fee, no slippage.
        let ideal = match pool.pool_type {
            PoolType::Weighted | PoolType::LiquidityBootstrapping => {
                let weight = pool.weights()?[index];
                pool.balances[index]
                    .mul_div_down(bpt_in, pool.total_supply)?
                    .div_down(weight)?
            }
            _ => {
                let mut total = Wad::ZERO;
                for &i in &pool.invariant_indexes() {
                    total = total.checked_add(pool.balances[i])?;
                }
                total.mul_div_down(bpt_in, pool.total_supply)?
            }
        };
        if ideal.is_zero() || actual >= ideal {
            return Ok(Wad::ZERO);
        }
        Ok(actual.div_down(ideal)?.complement())
    }
}

fn scale_amounts(amounts: &[TokenAmount]) -> Result<Vec<Wad>, QuoteError> {
    amounts
        .iter()
        .map(|a| a.to_scaled().map_err(QuoteError::from))
        .collect()
}
