//! Session-scoped metrics sink for the intelligence pipeline.
//!
//! The validator and router record every request outcome here; tests read
//! the snapshot to assert on retry and fallback behavior.

use crate::router::RequestKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a request was ultimately served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
    /// Validated model output.
    Success,
    /// Deterministic procedural substitute.
    Fallback,
    /// Served from the response cache.
    CacheHit,
    /// Collapsed onto another in-flight request.
    Deduped,
}

/// Accumulated counters for one request kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KindMetrics {
    pub success: u64,
    pub fallback: u64,
    pub cache_hits: u64,
    pub deduped: u64,
    pub retries: u64,
    pub validation_failures: u64,
    pub rate_limit_timeouts: u64,
    pub total_latency: Duration,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl KindMetrics {
    pub fn requests(&self) -> u64 {
        self.success + self.fallback + self.cache_hits + self.deduped
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    per_kind: HashMap<RequestKind, KindMetrics>,
}

/// Shared handle to the session's metrics. Cloning shares the sink.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink {
    inner: Arc<Mutex<MetricsInner>>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(
        &self,
        kind: RequestKind,
        outcome: RequestOutcome,
        latency: Duration,
        tokens: Option<(u64, u64)>,
    ) {
        let mut inner = self.inner.lock().expect("metrics lock");
        let entry = inner.per_kind.entry(kind).or_default();
        match outcome {
            RequestOutcome::Success => entry.success += 1,
            RequestOutcome::Fallback => entry.fallback += 1,
            RequestOutcome::CacheHit => entry.cache_hits += 1,
            RequestOutcome::Deduped => entry.deduped += 1,
        }
        entry.total_latency += latency;
        if let Some((prompt, completion)) = tokens {
            entry.prompt_tokens += prompt;
            entry.completion_tokens += completion;
        }
    }

    pub fn record_retry(&self, kind: RequestKind) {
        let mut inner = self.inner.lock().expect("metrics lock");
        inner.per_kind.entry(kind).or_default().retries += 1;
    }

    pub fn record_validation_failure(&self, kind: RequestKind) {
        let mut inner = self.inner.lock().expect("metrics lock");
        inner.per_kind.entry(kind).or_default().validation_failures += 1;
    }

    pub fn record_rate_limit_timeout(&self, kind: RequestKind) {
        let mut inner = self.inner.lock().expect("metrics lock");
        inner.per_kind.entry(kind).or_default().rate_limit_timeouts += 1;
    }

    /// Counters for one kind, at this instant.
    pub fn kind(&self, kind: RequestKind) -> KindMetrics {
        let inner = self.inner.lock().expect("metrics lock");
        inner.per_kind.get(&kind).cloned().unwrap_or_default()
    }

    /// A copy of every kind's counters.
    pub fn snapshot(&self) -> HashMap<RequestKind, KindMetrics> {
        let inner = self.inner.lock().expect("metrics lock");
        inner.per_kind.clone()
    }

    /// Total fallbacks across all kinds.
    pub fn total_fallbacks(&self) -> u64 {
        let inner = self.inner.lock().expect("metrics lock");
        inner.per_kind.values().map(|m| m.fallback).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_outcomes() {
        let sink = MetricsSink::new();
        sink.record_outcome(
            RequestKind::RoomDescription,
            RequestOutcome::Success,
            Duration::from_millis(120),
            Some((400, 80)),
        );
        sink.record_outcome(
            RequestKind::RoomDescription,
            RequestOutcome::Fallback,
            Duration::from_millis(10),
            None,
        );
        sink.record_retry(RequestKind::RoomDescription);

        let m = sink.kind(RequestKind::RoomDescription);
        assert_eq!(m.success, 1);
        assert_eq!(m.fallback, 1);
        assert_eq!(m.retries, 1);
        assert_eq!(m.requests(), 2);
        assert_eq!(m.prompt_tokens, 400);
    }

    #[test]
    fn test_shared_handles_see_the_same_counters() {
        let sink = MetricsSink::new();
        let clone = sink.clone();
        clone.record_validation_failure(RequestKind::NpcDialogue);
        assert_eq!(sink.kind(RequestKind::NpcDialogue).validation_failures, 1);
    }
}
