//! End-to-end flow over a mock node: decorate stale snapshots, build the
//! registry from the refreshed pools, then route a trade through the full
//! engine with both the built-in optimizer and an external on-chain router
//! in the source set.

use async_trait::async_trait;
use basin_config::EngineConfig;
use basin_multicall::{abi, CallTransport, MulticallExecutor, TransportError};
use basin_router::{
    decorate, OnchainRouterSource, PoolRegistry, QuoteQuery, QuoteSource, RegistryRouterSource,
    SwapEngine,
};
use basin_types::{Address, PlanKind, Pool, PoolType, Token, TokenAmount, H256, U256, Wad};
use ethabi::Token as AbiToken;
use ethers::types::Bytes;
use std::sync::Arc;

const VAULT: Address = Address::repeat_byte(0xAA);
const EXTERNAL_ROUTER: Address = Address::repeat_byte(0xBB);

fn dai() -> Token {
    Token::with_symbol(Address::repeat_byte(0x01), 18, "DAI")
}

fn usdc() -> Token {
    Token::with_symbol(Address::repeat_byte(0x02), 6, "USDC")
}

/// The weighted DAI/USDC pool as the metadata provider handed it over:
/// balances are placeholders that only decoration makes current.
fn stale_pool() -> Pool {
    Pool {
        id: H256::repeat_byte(0x50),
        address: Address::repeat_byte(0x51),
        pool_type: PoolType::Weighted,
        tokens: vec![dai(), usdc()],
        balances: vec![Wad::from_int(1), Wad::from_int(1)],
        weights: Some(vec![
            Wad::from_decimal_str("0.5").unwrap(),
            Wad::from_decimal_str("0.5").unwrap(),
        ]),
        amplification: None,
        swap_fee: Wad::ZERO,
        total_supply: Wad::from_int(2),
        bpt_index: None,
        linear: None,
    }
}

/// Mock node: serves the aggregate call by dispatching each leg on
/// (target, selector). Knows the vault, the pool contract, and an external
/// router whose quote is configurable.
struct MockChain {
    /// Raw USDC units the external router answers for any exact-in query.
    external_amount_out: U256,
}

impl MockChain {
    fn answer_leg(&self, target: Address, selector: [u8; 4], calldata: &[u8]) -> Option<Vec<u8>> {
        let pool = stale_pool();
        if target == VAULT && selector == abi::VAULT_GET_POOL_TOKENS.short_signature() {
            return Some(ethabi::encode(&[
                AbiToken::Array(vec![
                    AbiToken::Address(dai().address),
                    AbiToken::Address(usdc().address),
                ]),
                AbiToken::Array(vec![
                    AbiToken::Uint(U256::from(1_000_000u64) * U256::exp10(18)),
                    AbiToken::Uint(U256::from(1_000_000u64) * U256::exp10(6)),
                ]),
                AbiToken::Uint(U256::from(7_000u64)),
            ]));
        }
        if target == pool.address && selector == abi::ERC20_TOTAL_SUPPLY.short_signature() {
            return Some(ethabi::encode(&[AbiToken::Uint(
                U256::from(2_000_000u64) * U256::exp10(18),
            )]));
        }
        if target == pool.address && selector == abi::POOL_SWAP_FEE.short_signature() {
            // 30 bps
            return Some(ethabi::encode(&[AbiToken::Uint(U256::exp10(15) * 3u64)]));
        }
        if target == EXTERNAL_ROUTER && selector == abi::ROUTER_GET_AMOUNTS_OUT.short_signature() {
            let tokens = abi::ROUTER_GET_AMOUNTS_OUT.decode_input(calldata).ok()?;
            let amount_in = match tokens.first() {
                Some(AbiToken::Uint(amount)) => *amount,
                _ => return None,
            };
            return Some(ethabi::encode(&[AbiToken::Array(vec![
                AbiToken::Uint(amount_in),
                AbiToken::Uint(self.external_amount_out),
            ])]));
        }
        None
    }
}

#[async_trait]
impl CallTransport for MockChain {
    async fn eth_call(&self, _to: Address, data: Bytes) -> Result<Bytes, TransportError> {
        let tokens = abi::TRY_AGGREGATE
            .decode_input(&data[4..])
            .map_err(|e| TransportError::Rpc(e.to_string()))?;
        let legs = match &tokens[1] {
            AbiToken::Array(items) => items.clone(),
            _ => return Err(TransportError::Rpc("malformed aggregate input".to_string())),
        };

        let mut outputs = Vec::new();
        for leg in legs {
            let (target, calldata) = match &leg {
                AbiToken::Tuple(fields) => match (&fields[0], &fields[1]) {
                    (AbiToken::Address(a), AbiToken::Bytes(d)) => (*a, d.clone()),
                    _ => return Err(TransportError::Rpc("malformed leg".to_string())),
                },
                _ => return Err(TransportError::Rpc("malformed leg".to_string())),
            };
            let mut selector = [0u8; 4];
            selector.copy_from_slice(&calldata[..4]);
            match self.answer_leg(target, selector, &calldata[4..]) {
                Some(data) => outputs.push(AbiToken::Tuple(vec![
                    AbiToken::Bool(true),
                    AbiToken::Bytes(data),
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
        Ok(18_000_000)
    }

    async fn gas_price(&self) -> Result<U256, TransportError> {
        Ok(U256::from(30_000_000_000u64))
    }
}

async fn decorated_registry(transport: Arc<dyn CallTransport>) -> Arc<PoolRegistry> {
    let executor = MulticallExecutor::new(transport);
    let refreshed = decorate(&executor, VAULT, vec![stale_pool()], None)
        .await
        .expect("decoration must succeed against the mock node");
    assert_eq!(refreshed.block_height, 18_000_000);
    Arc::new(PoolRegistry::new(
        refreshed.pools.into_iter().map(|d| d.pool).collect(),
    ))
}

fn engine_with(
    transport: Arc<dyn CallTransport>,
    registry: Arc<PoolRegistry>,
    include_external: bool,
) -> SwapEngine {
    let config = EngineConfig::default();
    let mut sources: Vec<Arc<dyn QuoteSource>> = vec![Arc::new(RegistryRouterSource::new(
        Arc::clone(&registry),
        config.gas.swap_gas_units,
    ))];
    if include_external {
        let executor = Arc::new(MulticallExecutor::new(Arc::clone(&transport)));
        sources.push(Arc::new(OnchainRouterSource::new(
            "external-router",
            executor,
            EXTERNAL_ROUTER,
            config.gas.swap_gas_units,
        )));
    }
    SwapEngine::new(config, transport, registry, sources, VAULT)
}

#[tokio::test]
async fn test_decoration_makes_the_stale_pool_routable() {
    let transport: Arc<dyn CallTransport> = Arc::new(MockChain {
        external_amount_out: U256::zero(),
    });
    let registry = decorated_registry(Arc::clone(&transport)).await;

    let pool = registry.get(&H256::repeat_byte(0x50)).unwrap();
    assert_eq!(pool.balances[0], Wad::from_int(1_000_000));
    assert_eq!(pool.balances[1], Wad::from_int(1_000_000));
    assert_eq!(pool.total_supply, Wad::from_int(2_000_000));
    assert_eq!(pool.swap_fee, Wad::from_decimal_str("0.003").unwrap());

    let engine = engine_with(transport, registry, false);
    let query = QuoteQuery::given_in(dai(), usdc(), U256::from(1_000u64) * U256::exp10(18));
    let plan = engine.get_best_swap(&query, Wad::ZERO).await.unwrap();

    assert_eq!(plan.kind, PlanKind::DirectSwap);
    assert_eq!(plan.source, "registry-router");
    // ~1000 USDC out of a deep pool, less fee and slippage.
    assert!(plan.expected_output.amount > U256::from(990u64) * U256::exp10(6));
    assert!(plan.expected_output.amount < U256::from(1_000u64) * U256::exp10(6));
    assert!(plan.minimum_output < plan.expected_output.amount);
}

#[tokio::test]
async fn test_external_router_wins_when_it_prices_better() {
    // External venue beats the pool's ~997 USDC answer.
    let transport: Arc<dyn CallTransport> = Arc::new(MockChain {
        external_amount_out: U256::from(1_005u64) * U256::exp10(6),
    });
    let registry = decorated_registry(Arc::clone(&transport)).await;
    let engine = engine_with(transport, registry, true);

    let query = QuoteQuery::given_in(dai(), usdc(), U256::from(1_000u64) * U256::exp10(18));
    let plan = engine.get_best_swap(&query, Wad::ZERO).await.unwrap();

    assert_eq!(plan.source, "external-router");
    assert_eq!(plan.expected_output.amount, U256::from(1_005u64) * U256::exp10(6));
}

#[tokio::test]
async fn test_zero_output_external_quote_never_wins() {
    let transport: Arc<dyn CallTransport> = Arc::new(MockChain {
        external_amount_out: U256::zero(),
    });
    let registry = decorated_registry(Arc::clone(&transport)).await;
    let engine = engine_with(transport, registry, true);

    let query = QuoteQuery::given_in(dai(), usdc(), U256::from(1_000u64) * U256::exp10(18));
    let plan = engine.get_best_swap(&query, Wad::ZERO).await.unwrap();
    assert_eq!(plan.source, "registry-router");
}

#[tokio::test]
async fn test_proportional_join_amounts_after_decoration() {
    let transport: Arc<dyn CallTransport> = Arc::new(MockChain {
        external_amount_out: U256::zero(),
    });
    let registry = decorated_registry(Arc::clone(&transport)).await;
    let pool = registry.get(&H256::repeat_byte(0x50)).unwrap().clone();
    let engine = engine_with(transport, registry, false);

    let reference = TokenAmount::new(dai(), U256::from(10_000u64) * U256::exp10(18));
    let answer = engine
        .get_join_exit_amounts(
            &pool,
            &basin_router::JoinExitQuery::ProportionalJoin { reference },
        )
        .unwrap();

    // 1% of the DAI side implies 1% of the USDC side and ~1% of the supply.
    assert_eq!(answer.amounts[1].amount, U256::from(10_000u64) * U256::exp10(6));
    assert!(answer.bpt > Wad::from_int(19_900));
    assert!(answer.bpt <= Wad::from_int(20_000));
    assert!(answer.price_impact <= Wad::from_decimal_str("0.0000001").unwrap());
}
