//! # Basin Multicall - Batched On-Chain Reads
//!
//! Aggregates many independent read-only contract calls into a single
//! Multicall3 round trip, decodes each leg against its own function
//! signature, and keys every result by a caller-chosen path.
//!
//! The load-bearing design decision is partial-failure tolerance: the
//! aggregate is submitted with `requireSuccess = false`, so one deprecated
//! pool or mismatched selector marks only its own path absent instead of
//! blanking a whole page of independent data. Only transport failures
//! (node unreachable, malformed response) fail the batch.
//!
//! Node access goes through the [`CallTransport`] seam; production uses
//! [`HttpTransport`] with per-request timeouts and ordered endpoint
//! failover, tests inject mocks.

pub mod abi;
pub mod executor;
pub mod request;
pub mod transport;

pub use executor::{MulticallError, MulticallExecutor};
pub use request::{BatchResults, CallRequest, DecodedValue};
pub use transport::{CallTransport, HttpTransport, TransportError};
