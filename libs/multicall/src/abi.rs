//! Contract ABI definitions used by the batch executor
//!
//! Function objects are built in code so each call descriptor carries its
//! own decoder. Only the read-only surface the engine actually batches is
//! defined here: the Multicall3 aggregator, the ERC-20 views, the vault's
//! pool queries, and the external-router quote call.

use ethabi::{Function, Param, ParamType, StateMutability};
use ethers::types::Address;
use once_cell::sync::Lazy;

/// Canonical Multicall3 deployment, same address on every major chain.
pub static MULTICALL3_ADDRESS: Lazy<Address> = Lazy::new(|| {
    "0xcA11bde05977b3631167028862bE2a173976CA11"
        .parse()
        .expect("static multicall3 address")
});

#[allow(deprecated)] // `constant` is still a struct field in ethabi 18
fn view_function(name: &str, inputs: Vec<Param>, outputs: Vec<Param>) -> Function {
    Function {
        name: name.to_string(),
        inputs,
        outputs,
        constant: Some(true),
        state_mutability: StateMutability::View,
    }
}

fn param(name: &str, kind: ParamType) -> Param {
    Param {
        name: name.to_string(),
        kind,
        internal_type: None,
    }
}

/// Multicall3 `tryAggregate(bool requireSuccess, (address,bytes)[] calls)
/// -> (bool success, bytes returnData)[]`. The `false` flag is what buys
/// per-leg failure tolerance.
pub static TRY_AGGREGATE: Lazy<Function> = Lazy::new(|| {
    view_function(
        "tryAggregate",
        vec![
            param("requireSuccess", ParamType::Bool),
            param(
                "calls",
                ParamType::Array(Box::new(ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::Bytes,
                ]))),
            ),
        ],
        vec![param(
            "returnData",
            ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
        )],
    )
});

/// ERC-20 `balanceOf(address) -> uint256`.
pub static ERC20_BALANCE_OF: Lazy<Function> = Lazy::new(|| {
    view_function(
        "balanceOf",
        vec![param("account", ParamType::Address)],
        vec![param("", ParamType::Uint(256))],
    )
});

/// ERC-20 `totalSupply() -> uint256`.
pub static ERC20_TOTAL_SUPPLY: Lazy<Function> = Lazy::new(|| {
    view_function("totalSupply", vec![], vec![param("", ParamType::Uint(256))])
});

/// ERC-20 `decimals() -> uint8`.
pub static ERC20_DECIMALS: Lazy<Function> = Lazy::new(|| {
    view_function("decimals", vec![], vec![param("", ParamType::Uint(8))])
});

/// Vault `getPoolTokens(bytes32 poolId) -> (address[] tokens,
/// uint256[] balances, uint256 lastChangeBlock)`.
pub static VAULT_GET_POOL_TOKENS: Lazy<Function> = Lazy::new(|| {
    view_function(
        "getPoolTokens",
        vec![param("poolId", ParamType::FixedBytes(32))],
        vec![
            param("tokens", ParamType::Array(Box::new(ParamType::Address))),
            param("balances", ParamType::Array(Box::new(ParamType::Uint(256)))),
            param("lastChangeBlock", ParamType::Uint(256)),
        ],
    )
});

/// Pool `getSwapFeePercentage() -> uint256` (18-decimal fraction).
pub static POOL_SWAP_FEE: Lazy<Function> = Lazy::new(|| {
    view_function(
        "getSwapFeePercentage",
        vec![],
        vec![param("", ParamType::Uint(256))],
    )
});

/// External AMM router `getAmountsOut(uint256 amountIn, address[] path)
/// -> uint256[] amounts`.
pub static ROUTER_GET_AMOUNTS_OUT: Lazy<Function> = Lazy::new(|| {
    view_function(
        "getAmountsOut",
        vec![
            param("amountIn", ParamType::Uint(256)),
            param("path", ParamType::Array(Box::new(ParamType::Address))),
        ],
        vec![param(
            "amounts",
            ParamType::Array(Box::new(ParamType::Uint(256))),
        )],
    )
});

#[cfg(test)]
mod tests {
    use super::*;
    use ethabi::Token as AbiToken;
    use ethers::types::U256;

    #[test]
    fn test_selectors_match_canonical_signatures() {
        // Known four-byte selectors for the standard ABIs.
        assert_eq!(hex::encode(ERC20_BALANCE_OF.short_signature()), "70a08231");
        assert_eq!(hex::encode(ERC20_TOTAL_SUPPLY.short_signature()), "18160ddd");
        assert_eq!(hex::encode(ERC20_DECIMALS.short_signature()), "313ce567");
        assert_eq!(hex::encode(TRY_AGGREGATE.short_signature()), "bce38bd7");
        assert_eq!(hex::encode(VAULT_GET_POOL_TOKENS.short_signature()), "f6c00927");
        assert_eq!(hex::encode(ROUTER_GET_AMOUNTS_OUT.short_signature()), "d06ca61f");
    }

    #[test]
    fn test_balance_of_round_trips_through_encoding() {
        let account = Address::repeat_byte(0x42);
        let data = ERC20_BALANCE_OF
            .encode_input(&[AbiToken::Address(account)])
            .unwrap();
        assert_eq!(&data[..4], ERC20_BALANCE_OF.short_signature());

        let output = ethabi::encode(&[AbiToken::Uint(U256::from(12345u64))]);
        let decoded = ERC20_BALANCE_OF.decode_output(&output).unwrap();
        assert_eq!(decoded, vec![AbiToken::Uint(U256::from(12345u64))]);
    }
}
