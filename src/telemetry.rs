//! Injected metrics sinks for node and client operations.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Latency histograms are bucketed in microseconds up to this bound.
const LATENCY_HISTOGRAM_MAX_US: u64 = 10_000_000;

/// Capability handed to [`crate::node::Bookie`] and [`crate::client::LedgerClient`]
/// at construction time for recording operation outcomes.
pub trait StatsSink: Send + Sync {
    fn record_success(&self, op: &str, latency: Duration);
    fn record_failure(&self, op: &str, latency: Duration);
    fn inc_counter(&self, name: &str, delta: u64);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn record_success(&self, _op: &str, _latency: Duration) {}
    fn record_failure(&self, _op: &str, _latency: Duration) {}
    fn inc_counter(&self, _name: &str, _delta: u64) {}
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OpStats {
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Default, Clone)]
pub struct StatsSnapshot {
    pub ops: HashMap<String, OpStats>,
    pub counters: HashMap<String, u64>,
}

impl StatsSnapshot {
    pub fn successes(&self, op: &str) -> u64 {
        self.ops.get(op).map(|stats| stats.successes).unwrap_or(0)
    }

    pub fn failures(&self, op: &str) -> u64 {
        self.ops.get(op).map(|stats| stats.failures).unwrap_or(0)
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Keeps plain counts so tests can assert on what a component reported.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStats {
    inner: Arc<Mutex<StatsSnapshot>>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().clone()
    }
}

impl StatsSink for InMemoryStats {
    fn record_success(&self, op: &str, _latency: Duration) {
        let mut guard = self.inner.lock();
        let entry = guard.ops.entry(op.to_string()).or_default();
        entry.successes = entry.successes.saturating_add(1);
    }

    fn record_failure(&self, op: &str, _latency: Duration) {
        let mut guard = self.inner.lock();
        let entry = guard.ops.entry(op.to_string()).or_default();
        entry.failures = entry.failures.saturating_add(1);
    }

    fn inc_counter(&self, name: &str, delta: u64) {
        let mut guard = self.inner.lock();
        let counter = guard.counters.entry(name.to_string()).or_insert(0);
        *counter = counter.saturating_add(delta);
    }
}

#[derive(Debug)]
pub struct MetricsRegistry {
    namespace: String,
    counters: HashMap<String, u64>,
    histograms: HashMap<String, Histogram>,
    gauges: HashMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<u64>,
    counts: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub histograms: HashMap<String, Vec<u64>>,
    pub gauges: HashMap<String, u64>,
}

impl MetricsRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            counters: HashMap::new(),
            histograms: HashMap::new(),
            gauges: HashMap::new(),
        }
    }

    pub fn inc_counter(&mut self, name: impl Into<String>, delta: u64) -> u64 {
        let key = self.qualify(name.into());
        let counter = self.counters.entry(key).or_insert(0);
        *counter = counter.saturating_add(delta);
        *counter
    }

    /// Records `value` into the named histogram, creating it on first use.
    pub fn observe_histogram(&mut self, name: impl Into<String>, value: u64, max_value: u64) {
        let key = self.qualify(name.into());
        self.histograms
            .entry(key)
            .or_insert_with(|| Histogram::canonical(max_value))
            .observe(value);
    }

    pub fn set_gauge(&mut self, name: impl Into<String>, value: u64) {
        let key = self.qualify(name.into());
        self.gauges.insert(key, value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.clone(),
            histograms: self
                .histograms
                .iter()
                .map(|(name, hist)| (name.clone(), hist.counts.clone()))
                .collect(),
            gauges: self.gauges.clone(),
        }
    }

    fn qualify(&self, name: String) -> String {
        let namespace = if self.namespace.ends_with('.') {
            self.namespace.clone()
        } else {
            format!("{}.", self.namespace)
        };
        if name.starts_with(&namespace) {
            name
        } else {
            format!("{}{}", namespace, name)
        }
    }
}

impl Histogram {
    pub fn canonical(max_value: u64) -> Self {
        let mut buckets = Vec::new();
        let mut current = 1u64;
        while current < max_value {
            buckets.push(current);
            current = (current as f64 * 1.5).ceil() as u64;
        }
        buckets.push(max_value);
        let counts = vec![0; buckets.len()];
        Self { buckets, counts }
    }

    pub fn observe(&mut self, value: u64) {
        if let Some((idx, _)) = self
            .buckets
            .iter()
            .enumerate()
            .find(|(_, bucket)| value <= **bucket)
        {
            self.counts[idx] = self.counts[idx].saturating_add(1);
        } else if let Some(last) = self.counts.last_mut() {
            *last = last.saturating_add(1);
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// [`StatsSink`] that feeds a namespaced [`MetricsRegistry`]: one counter per
/// outcome plus a latency histogram per operation.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    registry: Arc<Mutex<MetricsRegistry>>,
}

impl RegistryStats {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(MetricsRegistry::new(namespace))),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.registry.lock().snapshot()
    }

    fn record(&self, op: &str, outcome: &str, latency: Duration) {
        let mut registry = self.registry.lock();
        registry.inc_counter(format!("{op}.{outcome}"), 1);
        registry.observe_histogram(
            format!("{op}.latency_us"),
            latency.as_micros().min(u128::from(u64::MAX)) as u64,
            LATENCY_HISTOGRAM_MAX_US,
        );
    }
}

impl StatsSink for RegistryStats {
    fn record_success(&self, op: &str, latency: Duration) {
        self.record(op, "success", latency);
    }

    fn record_failure(&self, op: &str, latency: Duration) {
        self.record(op, "failure", latency);
    }

    fn inc_counter(&self, name: &str, delta: u64) {
        self.registry.lock().inc_counter(name, delta);
    }
}
