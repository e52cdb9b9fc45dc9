//! RPC transport seam
//!
//! The executor never talks to a node directly; it goes through
//! [`CallTransport`], so tests inject a mock and production wires
//! [`HttpTransport`]. The HTTP transport bounds every request with a
//! timeout and fails over across the configured endpoints in order.

use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider, ProviderError};
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// A transport-level failure: the node is unreachable, timed out, or
/// returned something unusable. Always fails the whole batch.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rpc request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("all {attempted} rpc endpoints failed; last error: {last_error}")]
    AllEndpointsFailed { attempted: usize, last_error: String },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("invalid rpc url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Read-only node access the batch executor needs.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Execute a read-only `eth_call` against `to` with `data` calldata.
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, TransportError>;

    /// Current chain head height.
    async fn block_number(&self) -> Result<u64, TransportError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<U256, TransportError>;
}

/// HTTP JSON-RPC transport with a per-request timeout and ordered endpoint
/// failover. An endpoint that fails is skipped for that request only; the
/// next request starts from the front of the list again (transient node
/// trouble should not demote a primary endpoint permanently).
pub struct HttpTransport {
    providers: Vec<(String, Provider<Http>)>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(rpc_urls: &[String], request_timeout: Duration) -> Result<Self, TransportError> {
        if rpc_urls.is_empty() {
            return Err(TransportError::InvalidUrl {
                url: String::new(),
                reason: "no rpc endpoints configured".to_string(),
            });
        }
        let mut providers = Vec::with_capacity(rpc_urls.len());
        for url in rpc_urls {
            let provider =
                Provider::<Http>::try_from(url.as_str()).map_err(|e| TransportError::InvalidUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            providers.push((url.clone(), provider));
        }
        Ok(Self { providers, request_timeout })
    }
}

/// Run `op` against each endpoint in order until one succeeds. Generic over
/// the provider's inner client so tests can drive it with a mock.
async fn with_failover<P, T, F, Fut>(
    providers: &[(String, Provider<P>)],
    request_timeout: Duration,
    op: F,
) -> Result<T, TransportError>
where
    P: JsonRpcClient + Clone,
    F: Fn(Provider<P>) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let timeout_ms = request_timeout.as_millis() as u64;
    let mut last_error = String::new();

    for (url, provider) in providers {
        match tokio::time::timeout(request_timeout, op(provider.clone())).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!(endpoint = %url, error = %e, "rpc request failed, trying next endpoint");
                last_error = e.to_string();
            }
            Err(_) => {
                warn!(endpoint = %url, timeout_ms, "rpc request timed out, trying next endpoint");
                last_error = format!("timed out after {timeout_ms}ms");
            }
        }
    }

    Err(TransportError::AllEndpointsFailed {
        attempted: providers.len(),
        last_error,
    })
}

#[async_trait]
impl CallTransport for HttpTransport {
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, TransportError> {
        debug!(to = %to, calldata_bytes = data.len(), "eth_call");
        with_failover(&self.providers, self.request_timeout, |provider| {
            let tx = TransactionRequest::new().to(to).data(data.clone());
            async move { provider.call(&tx.into(), None).await }
        })
        .await
    }

    async fn block_number(&self) -> Result<u64, TransportError> {
        let number = with_failover(&self.providers, self.request_timeout, |provider| {
            async move { provider.get_block_number().await }
        })
        .await?;
        Ok(number.as_u64())
    }

    async fn gas_price(&self) -> Result<U256, TransportError> {
        with_failover(&self.providers, self.request_timeout, |provider| async move {
            provider.get_gas_price().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_list_is_rejected() {
        let result = HttpTransport::new(&[], Duration::from_secs(5));
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }

    #[test]
    fn test_malformed_url_is_rejected() {
        let result = HttpTransport::new(
            &["not a url".to_string()],
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }

    #[test]
    fn test_valid_urls_build_one_provider_each() {
        let transport = HttpTransport::new(
            &[
                "https://polygon-rpc.com".to_string(),
                "https://rpc.ankr.com/polygon".to_string(),
            ],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.providers.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_primary_fails_over_to_the_next_endpoint() {
        // A mock with no queued responses errors on every request.
        let (broken, _) = Provider::mocked();
        let (healthy, mock) = Provider::mocked();
        mock.push(ethers::types::U64::from(42u64)).unwrap();

        let providers = vec![
            ("primary".to_string(), broken),
            ("secondary".to_string(), healthy),
        ];
        let number = with_failover(&providers, Duration::from_secs(1), |provider| async move {
            provider.get_block_number().await
        })
        .await
        .unwrap();
        assert_eq!(number.as_u64(), 42);
    }

    #[tokio::test]
    async fn test_all_endpoints_failing_fails_the_request() {
        let (broken_a, _) = Provider::mocked();
        let (broken_b, _) = Provider::mocked();
        let providers = vec![
            ("primary".to_string(), broken_a),
            ("secondary".to_string(), broken_b),
        ];
        let result = with_failover(&providers, Duration::from_secs(1), |provider| async move {
            provider.get_block_number().await
        })
        .await;
        assert!(matches!(
            result,
            Err(TransportError::AllEndpointsFailed { attempted: 2, .. })
        ));
    }
}
