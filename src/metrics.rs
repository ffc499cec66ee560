//! Read-only metric counters updated as side effects of execution.
//!
//! The core never aggregates or exports; external reporting pulls the
//! snapshot structs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters maintained by the request executor
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    retries_scheduled: AtomicU64,
    redirects_followed: AtomicU64,
}

impl ExecutorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redirect(&self) {
        self.redirects_followed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExecutorMetricsSnapshot {
        ExecutorMetricsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            redirects_followed: self.redirects_followed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the executor counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutorMetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub retries_scheduled: u64,
    pub redirects_followed: u64,
}

/// Counters maintained by the rule engine
#[derive(Debug, Default)]
pub struct RuleMetrics {
    evaluations: AtomicU64,
    matches: AtomicU64,
    short_circuits: AtomicU64,
    reloads: AtomicU64,
}

impl RuleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_short_circuit(&self) {
        self.short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RuleMetricsSnapshot {
        RuleMetricsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the rule engine counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RuleMetricsSnapshot {
    pub evaluations: u64,
    pub matches: u64,
    pub short_circuits: u64,
    pub reloads: u64,
}

/// Counters maintained by the host resolver
#[derive(Debug, Default)]
pub struct ResolverMetrics {
    lookups: AtomicU64,
    empty_results: AtomicU64,
    failures: AtomicU64,
}

impl ResolverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty(&self) {
        self.empty_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ResolverMetricsSnapshot {
        ResolverMetricsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the resolver counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolverMetricsSnapshot {
    pub lookups: u64,
    pub empty_results: u64,
    pub failures: u64,
}
