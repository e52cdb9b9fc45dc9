//! Typed call descriptors and decoded batch results
//!
//! Every queued call carries its own `ethabi::Function`, so the executor
//! can decode each leg's return data against the right signature and the
//! result arrives as a [`DecodedValue`] instead of an untyped blob.

use ethabi::{Function, Token as AbiToken};
use ethers::types::{Address, I256, U256};
use std::collections::HashMap;

/// One read-only contract call, tagged with a caller-chosen hierarchical
/// path (`"<poolId>.swapFee"`, `"account.bpt.<poolId>"`, ...) that keys its
/// result in the batch output.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub path: String,
    pub target: Address,
    pub function: Function,
    pub args: Vec<AbiToken>,
}

impl CallRequest {
    pub fn new(
        path: impl Into<String>,
        target: Address,
        function: &Function,
        args: Vec<AbiToken>,
    ) -> Self {
        Self {
            path: path.into(),
            target,
            function: function.clone(),
            args,
        }
    }
}

/// A decoded return value. Single-value returns are unwrapped into the
/// matching variant; multi-value returns stay a [`DecodedValue::Tuple`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Uint(U256),
    Int(I256),
    Address(Address),
    Bool(bool),
    Bytes(Vec<u8>),
    Uints(Vec<U256>),
    Addresses(Vec<Address>),
    Tuple(Vec<AbiToken>),
}

impl DecodedValue {
    /// Shape a decoded output token list into the typed union. Returns
    /// `None` for shapes the engine has no use for (nested arrays of
    /// tuples and the like), which the executor treats as a failed leg.
    pub fn from_tokens(mut tokens: Vec<AbiToken>) -> Option<Self> {
        if tokens.len() != 1 {
            return Some(Self::Tuple(tokens));
        }
        match tokens.remove(0) {
            AbiToken::Uint(v) => Some(Self::Uint(v)),
            AbiToken::Int(v) => Some(Self::Int(I256::from_raw(v))),
            AbiToken::Address(v) => Some(Self::Address(v)),
            AbiToken::Bool(v) => Some(Self::Bool(v)),
            AbiToken::Bytes(v) | AbiToken::FixedBytes(v) => Some(Self::Bytes(v)),
            AbiToken::Array(items) | AbiToken::FixedArray(items) => {
                if items.iter().all(|t| matches!(t, AbiToken::Uint(_))) {
                    Some(Self::Uints(
                        items
                            .into_iter()
                            .map(|t| match t {
                                AbiToken::Uint(v) => v,
                                _ => unreachable!(),
                            })
                            .collect(),
                    ))
                } else if items.iter().all(|t| matches!(t, AbiToken::Address(_))) {
                    Some(Self::Addresses(
                        items
                            .into_iter()
                            .map(|t| match t {
                                AbiToken::Address(v) => v,
                                _ => unreachable!(),
                            })
                            .collect(),
                    ))
                } else {
                    None
                }
            }
            AbiToken::Tuple(items) => Some(Self::Tuple(items)),
            AbiToken::String(_) => None,
        }
    }
}

/// Path-keyed results of one batch. A path that maps to `None` is a leg
/// that reverted or failed to decode; the rest of the batch is unaffected.
#[derive(Debug, Default)]
pub struct BatchResults {
    results: HashMap<String, Option<DecodedValue>>,
}

impl BatchResults {
    pub(crate) fn insert(&mut self, path: String, value: Option<DecodedValue>) {
        self.results.insert(path, value);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The raw outcome for a path; outer `None` means the path was never
    /// requested, inner `None` a failed leg.
    pub fn get(&self, path: &str) -> Option<&Option<DecodedValue>> {
        self.results.get(path)
    }

    /// True when the path was requested and its leg failed.
    pub fn is_failed(&self, path: &str) -> bool {
        matches!(self.results.get(path), Some(None))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn uint(&self, path: &str) -> Option<U256> {
        match self.results.get(path)? {
            Some(DecodedValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn address(&self, path: &str) -> Option<Address> {
        match self.results.get(path)? {
            Some(DecodedValue::Address(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn boolean(&self, path: &str) -> Option<bool> {
        match self.results.get(path)? {
            Some(DecodedValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn uints(&self, path: &str) -> Option<&[U256]> {
        match self.results.get(path)? {
            Some(DecodedValue::Uints(v)) => Some(v),
            _ => None,
        }
    }

    pub fn addresses(&self, path: &str) -> Option<&[Address]> {
        match self.results.get(path)? {
            Some(DecodedValue::Addresses(v)) => Some(v),
            _ => None,
        }
    }

    pub fn tuple(&self, path: &str) -> Option<&[AbiToken]> {
        match self.results.get(path)? {
            Some(DecodedValue::Tuple(v)) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_returns_unwrap() {
        let value = DecodedValue::from_tokens(vec![AbiToken::Uint(U256::from(7u64))]).unwrap();
        assert_eq!(value, DecodedValue::Uint(U256::from(7u64)));

        let addr = Address::repeat_byte(0x11);
        let value = DecodedValue::from_tokens(vec![AbiToken::Address(addr)]).unwrap();
        assert_eq!(value, DecodedValue::Address(addr));
    }

    #[test]
    fn test_multi_value_returns_stay_tuples() {
        let tokens = vec![
            AbiToken::Uint(U256::one()),
            AbiToken::Bool(true),
        ];
        let value = DecodedValue::from_tokens(tokens.clone()).unwrap();
        assert_eq!(value, DecodedValue::Tuple(tokens));
    }

    #[test]
    fn test_homogeneous_arrays_get_typed_variants() {
        let value = DecodedValue::from_tokens(vec![AbiToken::Array(vec![
            AbiToken::Uint(U256::one()),
            AbiToken::Uint(U256::from(2u64)),
        ])])
        .unwrap();
        assert_eq!(value, DecodedValue::Uints(vec![U256::one(), U256::from(2u64)]));
    }

    #[test]
    fn test_typed_accessors_reject_wrong_shapes() {
        let mut results = BatchResults::default();
        results.insert("a.supply".to_string(), Some(DecodedValue::Uint(U256::one())));
        results.insert("a.broken".to_string(), None);

        assert_eq!(results.uint("a.supply"), Some(U256::one()));
        assert_eq!(results.address("a.supply"), None);
        assert_eq!(results.uint("a.missing"), None);
        assert!(results.is_failed("a.broken"));
        assert!(!results.is_failed("a.supply"));
        assert!(!results.is_failed("a.missing"));
    }
}
