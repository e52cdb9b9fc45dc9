//! # Basin Config - Engine Configuration
//!
//! Runtime parameters for the routing engine with no hardcoded values in
//! the components themselves: RPC endpoints, quote fan-out timing, cache
//! staleness, and gas defaults. Loaded from a TOML file, overridable per
//! field from environment variables, validated before use.
//!
//! The engine takes an [`EngineConfig`] by value at construction; nothing
//! reads configuration from ambient state.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Complete configuration for the routing engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node connectivity
    pub rpc: RpcConfig,
    /// Quote fan-out parameters
    pub quotes: QuoteConfig,
    /// Quote/plan cache parameters
    pub cache: CacheConfig,
    /// Gas oracle parameters
    pub gas: GasConfig,
}

/// Node connectivity. Endpoints are tried in order; the first is primary,
/// the rest are failover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// RPC endpoints, primary first.
    pub endpoints: Vec<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

/// Quote fan-out parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Per-source quoting timeout in milliseconds. A source that takes
    /// longer is dropped from the round.
    pub source_timeout_ms: u64,
    /// Slippage buffer applied to the winning quote, in basis points.
    pub slippage_bps: u32,
    /// Net-value tie epsilon in output-token raw units: candidates within
    /// this spread count as tied and the one with fewer steps wins.
    pub tie_epsilon_raw: u64,
}

/// Quote/plan cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// A cached entry stays valid while the chain head is at most this many
    /// blocks past the entry's fetch height.
    pub stale_block_tolerance: u64,
}

/// Gas oracle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Fallback gas price in wei when the node cannot be queried.
    pub default_gas_price_wei: u64,
    /// How long a fetched gas price stays cached, in seconds.
    pub cache_ttl_secs: u64,
    /// Gas units estimated for a single direct swap.
    pub swap_gas_units: u64,
    /// Gas units estimated per extra hop, join, or exit step.
    pub step_gas_units: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["https://polygon-rpc.com".to_string()],
            request_timeout_ms: 5_000,
        }
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: 3_000,
            slippage_bps: 50, // 0.5%
            tie_epsilon_raw: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { stale_block_tolerance: 2 }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            default_gas_price_wei: 30_000_000_000, // 30 gwei
            cache_ttl_secs: 300,
            swap_gas_units: 120_000,
            step_gas_units: 60_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Defaults plus environment-variable overrides. Unparseable values are
    /// logged and ignored rather than aborting startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment overrides on top of whatever is already set, so
    /// file-loaded configuration can still be tweaked per deployment.
    pub fn apply_env(&mut self) {
        if let Ok(endpoints) = std::env::var("BASIN_RPC_ENDPOINTS") {
            let parsed: Vec<String> = endpoints
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if parsed.is_empty() {
                warn!("BASIN_RPC_ENDPOINTS is set but empty, keeping configured endpoints");
            } else {
                self.rpc.endpoints = parsed;
            }
        }
        override_u64(&mut self.rpc.request_timeout_ms, "BASIN_RPC_TIMEOUT_MS");
        override_u64(&mut self.quotes.source_timeout_ms, "BASIN_SOURCE_TIMEOUT_MS");
        override_u32(&mut self.quotes.slippage_bps, "BASIN_SLIPPAGE_BPS");
        override_u64(&mut self.cache.stale_block_tolerance, "BASIN_STALE_BLOCK_TOLERANCE");
        override_u64(&mut self.gas.default_gas_price_wei, "BASIN_DEFAULT_GAS_PRICE_WEI");
        override_u64(&mut self.gas.cache_ttl_secs, "BASIN_GAS_CACHE_TTL_SECS");
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate all parameters before the engine is constructed.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.endpoints.is_empty() {
            anyhow::bail!("at least one rpc endpoint is required");
        }
        for endpoint in &self.rpc.endpoints {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!("rpc endpoint '{endpoint}' is not an http(s) url");
            }
        }
        if self.rpc.request_timeout_ms == 0 {
            anyhow::bail!("request_timeout_ms must be positive");
        }
        if self.quotes.source_timeout_ms == 0 {
            anyhow::bail!("source_timeout_ms must be positive");
        }
        if self.quotes.slippage_bps > 10_000 {
            anyhow::bail!("slippage_bps must be <= 10000 (100%)");
        }
        if self.gas.swap_gas_units == 0 {
            anyhow::bail!("swap_gas_units must be positive");
        }
        Ok(())
    }
}

fn override_u64(field: &mut u64, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<u64>() {
            Ok(value) => *field = value,
            Err(_) => warn!(var, raw, "ignoring unparseable environment override"),
        }
    }
}

fn override_u32(field: &mut u32, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<u32>() {
            Ok(value) => *field = value,
            Err(_) => warn!(var, raw, "ignoring unparseable environment override"),
        }
    }
}
