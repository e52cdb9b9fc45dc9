//! Batch call executor
//!
//! Wraps any number of independent read-only calls into a single Multicall3
//! `tryAggregate(false, ...)` round trip. One reverted or undecodable leg
//! marks only its own path absent; the batch as a whole still succeeds.
//! Only a transport failure fails everything.

use crate::abi::{MULTICALL3_ADDRESS, TRY_AGGREGATE};
use crate::request::{BatchResults, CallRequest, DecodedValue};
use crate::transport::{CallTransport, TransportError};
use ethabi::Token as AbiToken;
use ethers::types::{Address, Bytes};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Batch-level failures. Per-leg failures never appear here.
#[derive(Debug, Error)]
pub enum MulticallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode call '{path}': {reason}")]
    Encode { path: String, reason: String },

    #[error("failed to decode the aggregate response: {reason}")]
    AggregateDecode { reason: String },
}

/// Executor over an injected transport. Holds a pending queue so one
/// instance can serve repeated refresh cycles: `queue` accumulates,
/// `flush` consumes the queue and resets it.
pub struct MulticallExecutor {
    transport: Arc<dyn CallTransport>,
    multicall_address: Address,
    pending: Mutex<Vec<CallRequest>>,
}

impl MulticallExecutor {
    pub fn new(transport: Arc<dyn CallTransport>) -> Self {
        Self::with_address(transport, *MULTICALL3_ADDRESS)
    }

    /// Use a non-canonical aggregator deployment (test chains, forks).
    pub fn with_address(transport: Arc<dyn CallTransport>, multicall_address: Address) -> Self {
        Self {
            transport,
            multicall_address,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn CallTransport> {
        &self.transport
    }

    /// Add a call to the pending queue.
    pub fn queue(&self, request: CallRequest) {
        self.pending.lock().push(request);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Execute and clear the pending queue. The queue is consumed even on
    /// failure so a retry starts clean.
    pub async fn flush(&self) -> Result<BatchResults, MulticallError> {
        let requests = std::mem::take(&mut *self.pending.lock());
        self.execute(requests).await
    }

    /// Execute a batch of calls in one aggregate round trip.
    pub async fn execute(
        &self,
        requests: Vec<CallRequest>,
    ) -> Result<BatchResults, MulticallError> {
        if requests.is_empty() {
            return Ok(BatchResults::default());
        }

        let mut legs = Vec::with_capacity(requests.len());
        for request in &requests {
            let calldata = request
                .function
                .encode_input(&request.args)
                .map_err(|e| MulticallError::Encode {
                    path: request.path.clone(),
                    reason: e.to_string(),
                })?;
            legs.push(AbiToken::Tuple(vec![
                AbiToken::Address(request.target),
                AbiToken::Bytes(calldata),
            ]));
        }

        // requireSuccess = false: a reverted leg must not abort the batch.
        let calldata = TRY_AGGREGATE
            .encode_input(&[AbiToken::Bool(false), AbiToken::Array(legs)])
            .map_err(|e| MulticallError::Encode {
                path: "tryAggregate".to_string(),
                reason: e.to_string(),
            })?;

        debug!(calls = requests.len(), "submitting multicall batch");
        let raw = self
            .transport
            .eth_call(self.multicall_address, Bytes::from(calldata))
            .await?;

        let legs = decode_aggregate_output(&raw)?;
        if legs.len() != requests.len() {
            return Err(MulticallError::AggregateDecode {
                reason: format!("{} calls but {} results", requests.len(), legs.len()),
            });
        }

        let mut results = BatchResults::default();
        for (request, (success, return_data)) in requests.into_iter().zip(legs) {
            let decoded = if success {
                match request.function.decode_output(&return_data) {
                    Ok(tokens) => {
                        let value = DecodedValue::from_tokens(tokens);
                        if value.is_none() {
                            warn!(path = %request.path, "unsupported return shape, marking leg failed");
                        }
                        value
                    }
                    Err(e) => {
                        warn!(path = %request.path, error = %e, "leg returned undecodable data");
                        None
                    }
                }
            } else {
                warn!(path = %request.path, target = %request.target, "multicall leg reverted");
                None
            };
            results.insert(request.path, decoded);
        }
        Ok(results)
    }
}

/// Decode `(bool success, bytes returnData)[]` out of the aggregate call's
/// raw return.
fn decode_aggregate_output(raw: &[u8]) -> Result<Vec<(bool, Vec<u8>)>, MulticallError> {
    let tokens = TRY_AGGREGATE
        .decode_output(raw)
        .map_err(|e| MulticallError::AggregateDecode { reason: e.to_string() })?;
    let array = match tokens.into_iter().next() {
        Some(AbiToken::Array(items)) => items,
        other => {
            return Err(MulticallError::AggregateDecode {
                reason: format!("expected a result array, got {other:?}"),
            })
        }
    };

    let mut legs = Vec::with_capacity(array.len());
    for item in array {
        match item {
            AbiToken::Tuple(mut fields) if fields.len() == 2 => {
                let data = match fields.pop() {
                    Some(AbiToken::Bytes(data)) => data,
                    other => {
                        return Err(MulticallError::AggregateDecode {
                            reason: format!("expected return bytes, got {other:?}"),
                        })
                    }
                };
                let success = match fields.pop() {
                    Some(AbiToken::Bool(success)) => success,
                    other => {
                        return Err(MulticallError::AggregateDecode {
                            reason: format!("expected a success flag, got {other:?}"),
                        })
                    }
                };
                legs.push((success, data));
            }
            other => {
                return Err(MulticallError::AggregateDecode {
                    reason: format!("expected a (bool, bytes) tuple, got {other:?}"),
                })
            }
        }
    }
    Ok(legs)
}
