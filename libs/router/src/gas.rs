//! Gas price oracle
//!
//! Fetches `eth_gasPrice` through the transport seam, caches it behind a
//! TTL so interaction bursts do not hammer the node, and falls back to the
//! configured default when the fetch fails. Also converts a gas price into
//! the selector's normalization unit: output-token raw units per gas unit.

use basin_config::GasConfig;
use basin_multicall::CallTransport;
use basin_types::{U256, Wad};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct CachedPrice {
    gas_price_wei: U256,
    fetched_at: Instant,
}

/// TTL-cached gas price with a configured fallback.
pub struct GasOracle {
    transport: Arc<dyn CallTransport>,
    cache: RwLock<Option<CachedPrice>>,
    ttl: Duration,
    default_gas_price_wei: U256,
}

impl GasOracle {
    pub fn new(transport: Arc<dyn CallTransport>, config: &GasConfig) -> Self {
        Self {
            transport,
            cache: RwLock::new(None),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            default_gas_price_wei: U256::from(config.default_gas_price_wei),
        }
    }

    /// Current gas price in wei. Serves the cached value inside the TTL,
    /// refreshes past it, and degrades to the default on fetch failure
    /// rather than failing the routing request over a gas estimate.
    pub async fn gas_price_wei(&self) -> U256 {
        {
            let cache = self.cache.read();
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return cached.gas_price_wei;
                }
            }
        }

        match self.transport.gas_price().await {
            Ok(price) => {
                debug!(gas_price_wei = %price, "fetched fresh gas price");
                *self.cache.write() = Some(CachedPrice {
                    gas_price_wei: price,
                    fetched_at: Instant::now(),
                });
                price
            }
            Err(e) => {
                warn!(error = %e, default_wei = %self.default_gas_price_wei, "gas price fetch failed, using default");
                self.default_gas_price_wei
            }
        }
    }

    /// Convert a gas price into output-token raw units per gas unit, the
    /// unit the selector subtracts from raw outputs.
    ///
    /// `native_per_output_token` prices one whole output token in the
    /// chain's native currency (1e18 = parity). A zero price disables gas
    /// normalization rather than dividing by zero.
    pub fn cost_of_output_token(
        gas_price_wei: U256,
        native_per_output_token: Wad,
        output_decimals: u8,
    ) -> Wad {
        if native_per_output_token.is_zero() {
            return Wad::ZERO;
        }
        // raw-units-per-gas = gas_price_wei * 10^dec / wei-per-whole-token,
        // carried at 18-decimal precision.
        let numerator = gas_price_wei
            .checked_mul(U256::exp10(output_decimals as usize))
            .and_then(|v| v.checked_mul(Wad::ONE.raw()));
        match numerator {
            Some(value) => Wad::from_scaled(value / native_per_output_token.raw()),
            None => Wad::ZERO,
        }
    }
}

/// Route gas estimate: one base swap plus a per-extra-step surcharge.
pub fn route_gas_estimate(config: &GasConfig, steps: usize) -> u64 {
    let extra = steps.saturating_sub(1) as u64;
    config.swap_gas_units + extra * config.step_gas_units
}
