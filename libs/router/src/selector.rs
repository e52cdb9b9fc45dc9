//! Route selection
//!
//! Normalizes every candidate strategy to a net value in output-token raw
//! units (raw output minus the gas cost priced in output tokens), picks the
//! highest, and applies the slippage buffer to produce the guaranteed
//! minimum output. Candidates within the tie epsilon are decided by step
//! count: fewer steps means less gas variance and less failure surface.

use crate::error::RouteError;
use basin_types::{
    I256, PlanKind, PlanStep, Quote, RoutePlan, StepAction, U256, Wad,
};
use tracing::debug;

/// One normalized candidate during selection.
struct Candidate {
    plan: RoutePlan,
    net_value: I256,
    steps: usize,
}

/// Picks the best execution strategy among direct-swap quotes and an
/// optional join/swap/exit decomposition.
pub struct RouteSelector {
    /// Slippage buffer fraction applied to the winner's raw output.
    slippage: Wad,
    /// Net values within this many raw units count as tied.
    tie_epsilon: U256,
}

impl RouteSelector {
    pub fn new(slippage: Wad, tie_epsilon: U256) -> Self {
        Self { slippage, tie_epsilon }
    }

    /// From basis points, the usual configuration unit.
    pub fn from_bps(slippage_bps: u32, tie_epsilon: U256) -> Self {
        let slippage = Wad::from_scaled(
            U256::from(slippage_bps) * U256::exp10(14), // 1 bps = 10^14 in 18-dec
        );
        Self::new(slippage, tie_epsilon)
    }

    /// Select the best candidate. `cost_of_output_token` is the gas price
    /// expressed in output-token raw units per gas unit, as an 18-decimal
    /// fixed-point value.
    pub fn select(
        &self,
        quotes: Vec<Quote>,
        join_exit_candidate: Option<RoutePlan>,
        cost_of_output_token: Wad,
    ) -> Result<RoutePlan, RouteError> {
        let (token_in, token_out) = match quotes.first() {
            Some(quote) => (quote.input.token.label(), quote.output.token.label()),
            None => match &join_exit_candidate {
                Some(plan) => (plan.input.token.label(), plan.expected_output.token.label()),
                None => ("?".to_string(), "?".to_string()),
            },
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        for quote in quotes {
            if !quote.has_positive_output() {
                continue;
            }
            let net_value =
                net_value(quote.output.amount, quote.gas_estimate, cost_of_output_token);
            let steps = quote.hops.len().max(1);
            candidates.push(Candidate {
                plan: plan_from_quote(quote, self.slippage),
                net_value,
                steps,
            });
        }
        if let Some(mut plan) = join_exit_candidate {
            if !plan.expected_output.amount.is_zero() {
                let value = net_value(
                    plan.expected_output.amount,
                    plan.gas_estimate,
                    cost_of_output_token,
                );
                plan.minimum_output = minimum_output(plan.expected_output.amount, self.slippage);
                let steps = plan.steps.len();
                candidates.push(Candidate { plan, net_value: value, steps });
            }
        }

        let mut winner: Option<Candidate> = None;
        for candidate in candidates {
            match &winner {
                None => winner = Some(candidate),
                Some(best) => {
                    let diff = candidate.net_value - best.net_value;
                    let epsilon = I256::from_raw(self.tie_epsilon);
                    if diff > epsilon {
                        winner = Some(candidate);
                    } else if diff >= -epsilon && candidate.steps < best.steps {
                        // Tied on value: fewer steps wins.
                        winner = Some(candidate);
                    }
                }
            }
        }

        match winner {
            Some(candidate) => {
                debug!(
                    source = %candidate.plan.source,
                    net_value = %candidate.net_value,
                    steps = candidate.steps,
                    "route selected"
                );
                Ok(candidate.plan)
            }
            None => Err(RouteError::NoRouteAvailable { token_in, token_out }),
        }
    }
}

/// Raw output minus the route's gas priced in output-token raw units.
/// Signed so uniformly unprofitable candidates still rank.
fn net_value(raw_output: U256, gas_estimate: u64, cost_of_output_token: Wad) -> I256 {
    let gas_cost = U256::from(gas_estimate)
        .checked_mul(cost_of_output_token.raw())
        .map(|product| product / Wad::ONE.raw())
        .unwrap_or(U256::MAX);
    I256::from_raw(raw_output)
        .checked_sub(I256::from_raw(gas_cost))
        .unwrap_or(I256::MIN)
}

/// `floor(raw_output * (1 - slippage))`, in raw integer units. Never
/// exceeds the raw output; a slippage at or above one clamps to zero.
fn minimum_output(raw_output: U256, slippage: Wad) -> U256 {
    let keep = slippage.complement();
    raw_output
        .checked_mul(keep.raw())
        .map(|product| product / Wad::ONE.raw())
        .unwrap_or(U256::zero())
}

fn plan_from_quote(quote: Quote, slippage: Wad) -> RoutePlan {
    let steps = quote
        .hops
        .iter()
        .map(|hop| PlanStep {
            action: StepAction::Swap,
            pool_id: hop.pool_id,
            token_in: hop.token_in,
            token_out: hop.token_out,
        })
        .collect();
    RoutePlan {
        kind: PlanKind::DirectSwap,
        steps,
        minimum_output: minimum_output(quote.output.amount, slippage),
        input: quote.input,
        expected_output: quote.output,
        // Refined by the engine when the winning route runs through pools
        // it has snapshots for.
        price_impact: Wad::ZERO,
        source: quote.source,
        gas_estimate: quote.gas_estimate,
    }
}
