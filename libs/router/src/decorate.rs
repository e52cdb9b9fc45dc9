//! Pool decoration
//!
//! Refreshes a set of pool snapshots (balances, total supply, swap fee) and
//! optionally an account's BPT holdings in one multicall batch. Paths
//! follow `"<poolId>.<field>"`. A failed leg leaves the corresponding
//! snapshot field at its previous value; the rest of the batch lands.

use crate::error::QuoteError;
use basin_multicall::{abi, BatchResults, CallRequest, MulticallExecutor};
use basin_types::{Address, Pool, U256, Wad};
use ethabi::Token as AbiToken;
use tracing::{debug, warn};

/// A refreshed snapshot plus, when requested, the account's raw BPT
/// balance. The observed block height rides along for cache keying.
#[derive(Debug, Clone)]
pub struct DecoratedPool {
    pub pool: Pool,
    /// Account's BPT balance in raw units; `None` when no account was
    /// given or that leg failed.
    pub account_bpt: Option<U256>,
}

#[derive(Debug)]
pub struct DecoratedPools {
    pub pools: Vec<DecoratedPool>,
    pub block_height: u64,
}

/// Refresh `pools` against the chain through one aggregate call.
pub async fn decorate(
    executor: &MulticallExecutor,
    vault: Address,
    pools: Vec<Pool>,
    account: Option<Address>,
) -> Result<DecoratedPools, QuoteError> {
    let mut requests = Vec::with_capacity(pools.len() * 4);
    for pool in &pools {
        let id = hex::encode(pool.id.as_bytes());
        requests.push(CallRequest::new(
            format!("{id}.poolTokens"),
            vault,
            &abi::VAULT_GET_POOL_TOKENS,
            vec![AbiToken::FixedBytes(pool.id.as_bytes().to_vec())],
        ));
        requests.push(CallRequest::new(
            format!("{id}.totalSupply"),
            pool.address,
            &abi::ERC20_TOTAL_SUPPLY,
            vec![],
        ));
        requests.push(CallRequest::new(
            format!("{id}.swapFee"),
            pool.address,
            &abi::POOL_SWAP_FEE,
            vec![],
        ));
        if let Some(account) = account {
            requests.push(CallRequest::new(
                format!("{id}.accountBpt"),
                pool.address,
                &abi::ERC20_BALANCE_OF,
                vec![AbiToken::Address(account)],
            ));
        }
    }

    let block_height = executor
        .transport()
        .block_number()
        .await
        .map_err(basin_multicall::MulticallError::from)?;
    let results = executor.execute(requests).await?;

    let decorated = pools
        .into_iter()
        .map(|mut pool| {
            let id = hex::encode(pool.id.as_bytes());
            apply_pool_tokens(&mut pool, &results, &id);

            if let Some(raw) = results.uint(&format!("{id}.totalSupply")) {
                pool.total_supply = Wad::from_scaled(raw);
            }
            if let Some(raw) = results.uint(&format!("{id}.swapFee")) {
                pool.swap_fee = Wad::from_scaled(raw);
            }
            let account_bpt = account.and_then(|_| results.uint(&format!("{id}.accountBpt")));
            DecoratedPool { pool, account_bpt }
        })
        .collect::<Vec<_>>();

    debug!(pools = decorated.len(), block_height, "decorated pool snapshots");
    Ok(DecoratedPools { pools: decorated, block_height })
}

/// Fold the vault's `getPoolTokens` answer into the snapshot. The vault's
/// token order is authoritative; a snapshot whose registered tokens do not
/// line up keeps its previous balances.
fn apply_pool_tokens(pool: &mut Pool, results: &BatchResults, id: &str) {
    let path = format!("{id}.poolTokens");
    let Some(fields) = results.tuple(&path) else {
        if results.is_failed(&path) {
            warn!(pool = %pool.short_id(), "pool token refresh leg failed, keeping stale balances");
        }
        return;
    };
    let (addresses, raw_balances) = match (fields.first(), fields.get(1)) {
        (Some(AbiToken::Array(addresses)), Some(AbiToken::Array(balances))) => {
            (addresses, balances)
        }
        _ => {
            warn!(pool = %pool.short_id(), "unexpected getPoolTokens shape");
            return;
        }
    };
    if addresses.len() != pool.tokens.len() {
        warn!(
            pool = %pool.short_id(),
            vault_tokens = addresses.len(),
            snapshot_tokens = pool.tokens.len(),
            "vault token set diverged from snapshot, keeping stale balances"
        );
        return;
    }

    for (i, (address, raw)) in addresses.iter().zip(raw_balances).enumerate() {
        let (AbiToken::Address(address), AbiToken::Uint(raw)) = (address, raw) else {
            continue;
        };
        if *address != pool.tokens[i].address {
            warn!(pool = %pool.short_id(), index = i, "vault token order diverged from snapshot");
            return;
        }
        match Wad::from_raw(*raw, pool.tokens[i].decimals) {
            Ok(scaled) => pool.balances[i] = scaled,
            Err(e) => {
                warn!(pool = %pool.short_id(), index = i, error = %e, "balance upscale failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use basin_multicall::{CallTransport, TransportError, abi::TRY_AGGREGATE};
    use basin_types::{PoolType, Token, H256};
    use ethers::types::Bytes;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Answers each leg by matching (target, selector) against a canned
    /// table; anything missing reverts.
    struct MockVaultNode {
        responses: HashMap<(Address, [u8; 4]), Vec<u8>>,
    }

    #[async_trait]
    impl CallTransport for MockVaultNode {
        async fn eth_call(&self, _to: Address, data: Bytes) -> Result<Bytes, TransportError> {
            let tokens = TRY_AGGREGATE.decode_input(&data[4..]).unwrap();
            let legs = match &tokens[1] {
                AbiToken::Array(items) => items.clone(),
                _ => panic!("malformed aggregate input"),
            };
            let mut outputs = Vec::new();
            for leg in legs {
                let (target, calldata) = match &leg {
                    AbiToken::Tuple(fields) => match (&fields[0], &fields[1]) {
                        (AbiToken::Address(a), AbiToken::Bytes(d)) => (*a, d.clone()),
                        _ => panic!(),
                    },
                    _ => panic!(),
                };
                let mut selector = [0u8; 4];
                selector.copy_from_slice(&calldata[..4]);
                match self.responses.get(&(target, selector)) {
                    Some(data) => outputs.push(AbiToken::Tuple(vec![
                        AbiToken::Bool(true),
                        AbiToken::Bytes(data.clone()),
                    ])),
                    None => outputs.push(AbiToken::Tuple(vec![
                        AbiToken::Bool(false),
                        AbiToken::Bytes(Vec::new()),
                    ])),
                }
            }
            Ok(Bytes::from(ethabi::encode(&[AbiToken::Array(outputs)])))
        }

        async fn block_number(&self) -> Result<u64, TransportError> {
            Ok(12_345)
        }

        async fn gas_price(&self) -> Result<U256, TransportError> {
            Ok(U256::from(30_000_000_000u64))
        }
    }

    fn pool() -> Pool {
        Pool {
            id: H256::repeat_byte(0x77),
            address: Address::repeat_byte(0x78),
            pool_type: PoolType::Weighted,
            tokens: vec![
                Token::new(Address::repeat_byte(1), 18),
                Token::new(Address::repeat_byte(2), 6),
            ],
            balances: vec![Wad::from_int(10), Wad::from_int(10)],
            weights: Some(vec![
                Wad::from_decimal_str("0.5").unwrap(),
                Wad::from_decimal_str("0.5").unwrap(),
            ]),
            amplification: None,
            swap_fee: Wad::ZERO,
            total_supply: Wad::from_int(20),
            bpt_index: None,
            linear: None,
        }
    }

    fn selector_of(function: &ethabi::Function) -> [u8; 4] {
        function.short_signature()
    }

    #[tokio::test]
    async fn test_decorate_refreshes_fields_and_tolerates_failed_legs() {
        let vault = Address::repeat_byte(0x7A);
        let pool = pool();
        let mut responses = HashMap::new();

        // Vault answers getPoolTokens with fresh balances in native units.
        responses.insert(
            (vault, selector_of(&abi::VAULT_GET_POOL_TOKENS)),
            ethabi::encode(&[
                AbiToken::Array(vec![
                    AbiToken::Address(Address::repeat_byte(1)),
                    AbiToken::Address(Address::repeat_byte(2)),
                ]),
                AbiToken::Array(vec![
                    AbiToken::Uint(U256::from(500u64) * U256::exp10(18)),
                    AbiToken::Uint(U256::from(600u64) * U256::exp10(6)),
                ]),
                AbiToken::Uint(U256::from(12_000u64)),
            ]),
        );
        // totalSupply answers; swapFee leg is left to revert.
        responses.insert(
            (pool.address, selector_of(&abi::ERC20_TOTAL_SUPPLY)),
            ethabi::encode(&[AbiToken::Uint(U256::from(1_100u64) * U256::exp10(18))]),
        );
        responses.insert(
            (pool.address, selector_of(&abi::ERC20_BALANCE_OF)),
            ethabi::encode(&[AbiToken::Uint(U256::from(7u64) * U256::exp10(18))]),
        );

        let executor = MulticallExecutor::new(Arc::new(MockVaultNode { responses }));
        let decorated = decorate(&executor, vault, vec![pool], Some(Address::repeat_byte(0xEE)))
            .await
            .unwrap();

        assert_eq!(decorated.block_height, 12_345);
        let refreshed = &decorated.pools[0];
        // Balances upscaled to 18 decimals regardless of native decimals.
        assert_eq!(refreshed.pool.balances[0], Wad::from_int(500));
        assert_eq!(refreshed.pool.balances[1], Wad::from_int(600));
        assert_eq!(refreshed.pool.total_supply, Wad::from_int(1_100));
        // The failed swap-fee leg keeps the previous value.
        assert_eq!(refreshed.pool.swap_fee, Wad::ZERO);
        assert_eq!(refreshed.account_bpt, Some(U256::from(7u64) * U256::exp10(18)));
    }
}
