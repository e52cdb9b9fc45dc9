//! Quote fan-out and collection
//!
//! One request per enabled source, concurrently, each bounded by the
//! per-source timeout. A source that errors, times out, or returns nothing
//! usable is dropped from the round with a warning; the partial-failure
//! philosophy of the batch executor, one level up.
//!
//! The stale-response guard: every logical slot (pair + direction) carries
//! a generation counter. A new request for the slot bumps the generation,
//! and results belonging to a superseded generation are discarded on
//! arrival instead of being surfaced. Cancellation is cooperative; nothing
//! aborts an in-flight network call.

use crate::error::QuoteError;
use crate::source::{QuoteQuery, QuoteSource};
use basin_types::{Address, Quote, SwapKind};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Logical request slot: a new amount for the same pair and direction
/// supersedes the previous request, a different pair does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    token_in: Address,
    token_out: Address,
    kind: SwapKind,
}

impl SlotKey {
    fn of(query: &QuoteQuery) -> Self {
        Self {
            token_in: query.token_in.address,
            token_out: query.token_out.address,
            kind: query.kind,
        }
    }
}

/// Concurrent fan-out over the enabled quote sources.
pub struct QuoteAggregator {
    sources: Vec<Arc<dyn QuoteSource>>,
    source_timeout: Duration,
    generations: DashMap<SlotKey, Arc<AtomicU64>>,
}

impl QuoteAggregator {
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>, source_timeout: Duration) -> Self {
        Self {
            sources,
            source_timeout,
            generations: DashMap::new(),
        }
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Deterministic fingerprint of the enabled source set, part of the
    /// cache key.
    pub fn sources_fingerprint(&self) -> String {
        let mut ids: Vec<&str> = self.sources.iter().map(|s| s.id()).collect();
        ids.sort_unstable();
        ids.join(",")
    }

    /// Fan out the query to every source and collect the survivors. An
    /// empty vector means every source failed or the whole round was
    /// superseded by a newer request for the same slot.
    pub async fn get_quotes(&self, query: &QuoteQuery) -> Vec<Quote> {
        let slot = self
            .generations
            .entry(SlotKey::of(query))
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        let generation = slot.fetch_add(1, Ordering::SeqCst) + 1;

        let rounds = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let id = source.id().to_string();
                match quote_with_timeout(&source, query, self.source_timeout).await {
                    Ok(quote) if quote.has_positive_output() => Some(quote),
                    Ok(_) => {
                        warn!(source = %id, "dropping zero-output quote");
                        None
                    }
                    Err(e) => {
                        warn!(source = %id, error = %e, "source dropped from round");
                        None
                    }
                }
            }
        });

        let quotes: Vec<Quote> = join_all(rounds).await.into_iter().flatten().collect();

        // Results for a superseded request are discarded, not surfaced.
        if slot.load(Ordering::SeqCst) != generation {
            debug!(
                token_in = %query.token_in.label(),
                token_out = %query.token_out.label(),
                "discarding quotes for a superseded request"
            );
            return Vec::new();
        }

        debug!(
            quotes = quotes.len(),
            sources = self.sources.len(),
            "quote round complete"
        );
        quotes
    }
}

/// One source's round: its own errors pass through, running past the
/// per-source budget becomes a [`QuoteError::Timeout`].
async fn quote_with_timeout(
    source: &Arc<dyn QuoteSource>,
    query: &QuoteQuery,
    timeout: Duration,
) -> Result<Quote, QuoteError> {
    match tokio::time::timeout(timeout, source.quote(query)).await {
        Ok(result) => result,
        Err(_) => Err(QuoteError::Timeout {
            source_id: source.id().to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
