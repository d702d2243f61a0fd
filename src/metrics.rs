//! Streaming metrics aggregation.
//!
//! Memory stays bounded at any iteration count: samples are folded into
//! per-cell counters and histograms as they arrive and never stored
//! individually. A cell exists per backend, per access label, and per route
//! category; workers touch cells through atomic increments plus one short
//! histogram lock, so recording never serializes the whole pool.

use crate::config::{BackendId, ResolvedBackend, RunConfig, Thresholds};
use crate::distribution::RouteCategory;
use crate::error::{BenchError, BenchResult};
use crate::tracker::Access;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One observation: a single request against a single backend.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub backend: BackendId,
    pub category: Option<RouteCategory>,
    pub access: Access,
    pub latency_us: u64,
    pub ok: bool,
}

/// Counters and a latency histogram for one (backend, label, category) cell.
struct LatencyCell {
    requests: AtomicU64,
    failures: AtomicU64,
    latency: Mutex<Histogram<u64>>,
}

impl LatencyCell {
    fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latency: Mutex::new(Histogram::new(3).expect("failed to create histogram")),
        }
    }

    fn record(&self, latency_us: u64, ok: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if ok {
            // Failed requests are counted but their latency is not part of
            // the distribution, so timeouts cannot dominate the percentiles.
            self.latency
                .lock()
                .expect("latency histogram lock poisoned")
                .record(latency_us)
                .ok();
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn histogram(&self) -> Histogram<u64> {
        self.latency
            .lock()
            .expect("latency histogram lock poisoned")
            .clone()
    }
}

/// The miss-likely/hit-likely pair of cells.
struct LabelCells {
    first: LatencyCell,
    repeat: LatencyCell,
}

impl LabelCells {
    fn new() -> Self {
        Self {
            first: LatencyCell::new(),
            repeat: LatencyCell::new(),
        }
    }

    fn cell(&self, access: Access) -> &LatencyCell {
        match access {
            Access::First => &self.first,
            Access::Repeat => &self.repeat,
        }
    }
}

struct BackendCells {
    overall: LabelCells,
    categories: [LabelCells; 3],
}

impl BackendCells {
    fn new() -> Self {
        Self {
            overall: LabelCells::new(),
            categories: [LabelCells::new(), LabelCells::new(), LabelCells::new()],
        }
    }
}

/// Concurrency-safe streaming aggregator shared by all workers.
pub struct MetricsAggregator {
    backends: [BackendCells; 2],
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            backends: [BackendCells::new(), BackendCells::new()],
        }
    }

    /// Fold one sample into the aggregates.
    pub fn record(&self, sample: &MetricSample) {
        let backend = &self.backends[sample.backend.index()];
        backend
            .overall
            .cell(sample.access)
            .record(sample.latency_us, sample.ok);
        if let Some(category) = sample.category {
            backend.categories[category.index()]
                .cell(sample.access)
                .record(sample.latency_us, sample.ok);
        }
    }

    /// Build a stable snapshot of everything recorded so far.
    pub fn summary(
        &self,
        config: &RunConfig,
        backends: &[ResolvedBackend; 2],
        duration: Duration,
    ) -> BenchResult<RunSummary> {
        let mut backend_summaries = Vec::with_capacity(2);
        for resolved in backends {
            backend_summaries.push(self.backend_summary(resolved)?);
        }

        let total_requests: u64 = backend_summaries.iter().map(|b| b.total_requests).sum();
        let duration_secs = duration.as_secs_f64();
        let requests_per_second = if duration_secs > 0.0 {
            total_requests as f64 / duration_secs
        } else {
            0.0
        };

        Ok(RunSummary {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario: config.name.clone(),
            description: config.description.clone(),
            iterations: config.total_iterations()?,
            concurrency: config.concurrency,
            duration_secs,
            total_requests,
            requests_per_second,
            backends: backend_summaries,
        })
    }

    fn backend_summary(&self, resolved: &ResolvedBackend) -> BenchResult<BackendSummary> {
        let cells = &self.backends[resolved.id.index()];

        let miss_likely = snapshot_cell(&cells.overall.first)?;
        let hit_likely = snapshot_cell(&cells.overall.repeat)?;

        let total_requests = miss_likely.requests + hit_likely.requests;
        let failed_requests = miss_likely.failures + hit_likely.failures;
        let failure_rate = rate(failed_requests, total_requests);
        let estimated_hit_rate = rate(hit_likely.requests, total_requests);

        let mut merged = cells.overall.first.histogram();
        merged
            .add(cells.overall.repeat.histogram())
            .map_err(|e| BenchError::Aggregation(format!("histogram merge failed: {}", e)))?;

        let mut categories = Vec::new();
        for category in RouteCategory::ALL {
            let label_cells = &cells.categories[category.index()];
            let first = snapshot_cell(&label_cells.first)?;
            let repeat = snapshot_cell(&label_cells.repeat)?;
            let requests = first.requests + repeat.requests;
            if requests == 0 {
                continue;
            }
            let mut latency = label_cells.first.histogram();
            latency
                .add(label_cells.repeat.histogram())
                .map_err(|e| BenchError::Aggregation(format!("histogram merge failed: {}", e)))?;
            categories.push(CategorySummary {
                category: category.label().to_string(),
                requests,
                failures: first.failures + repeat.failures,
                first_accesses: first.requests,
                repeat_accesses: repeat.requests,
                latency: LatencyStats::from_histogram(&latency),
            });
        }

        Ok(BackendSummary {
            name: resolved.name.clone(),
            base_url: resolved.base_url.clone(),
            total_requests,
            failed_requests,
            failure_rate,
            first_accesses: miss_likely.requests,
            repeat_accesses: hit_likely.requests,
            estimated_hit_rate,
            latency: LatencyStats::from_histogram(&merged),
            miss_likely,
            hit_likely,
            categories,
        })
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_cell(cell: &LatencyCell) -> BenchResult<AccessStats> {
    let requests = cell.requests();
    let failures = cell.failures();
    // Unreachable by construction: a failure increments requests first.
    if failures > requests {
        return Err(BenchError::Aggregation(format!(
            "{} failures recorded against {} requests",
            failures, requests
        )));
    }
    Ok(AccessStats {
        requests,
        failures,
        latency: LatencyStats::from_histogram(&cell.histogram()),
    })
}

fn rate(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64
    } else {
        0.0
    }
}

/// Latency percentiles in milliseconds, from successful requests only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

impl LatencyStats {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.len() == 0 {
            return Self {
                count: 0,
                p50_ms: 0.0,
                p90_ms: 0.0,
                p95_ms: 0.0,
                p99_ms: 0.0,
                max_ms: 0.0,
                mean_ms: 0.0,
            };
        }
        Self {
            count: histogram.len(),
            p50_ms: histogram.value_at_percentile(50.0) as f64 / 1000.0,
            p90_ms: histogram.value_at_percentile(90.0) as f64 / 1000.0,
            p95_ms: histogram.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: histogram.value_at_percentile(99.0) as f64 / 1000.0,
            max_ms: histogram.max() as f64 / 1000.0,
            mean_ms: histogram.mean() / 1000.0,
        }
    }
}

/// Counters and latency for one access label (or one category cell).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessStats {
    pub requests: u64,
    pub failures: u64,
    pub latency: LatencyStats,
}

/// Per-category breakdown within one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub requests: u64,
    pub failures: u64,
    pub first_accesses: u64,
    pub repeat_accesses: u64,
    pub latency: LatencyStats,
}

/// Everything observed for one backend during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSummary {
    pub name: String,
    pub base_url: String,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub failure_rate: f64,
    pub first_accesses: u64,
    pub repeat_accesses: u64,
    /// `repeat / total` within this run. An access-order estimate, not CDN
    /// telemetry; real cache hit rates may differ with TTLs and evictions.
    pub estimated_hit_rate: f64,
    pub latency: LatencyStats,
    pub miss_likely: AccessStats,
    pub hit_likely: AccessStats,
    /// Empty for route plans without category structure.
    pub categories: Vec<CategorySummary>,
}

/// Final run summary across both backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub scenario: String,
    pub description: String,
    pub iterations: u64,
    pub concurrency: u32,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub backends: Vec<BackendSummary>,
}

impl RunSummary {
    /// Evaluate pass/fail criteria. An empty result means the run passed.
    pub fn threshold_violations(&self, thresholds: &Thresholds) -> Vec<String> {
        let mut violations = Vec::new();
        for backend in &self.backends {
            if backend.failure_rate > thresholds.max_failure_rate {
                violations.push(format!(
                    "{}: failure rate {:.2}% exceeds {:.2}%",
                    backend.name,
                    backend.failure_rate * 100.0,
                    thresholds.max_failure_rate * 100.0
                ));
            }
            if backend.latency.p95_ms > thresholds.max_p95_ms {
                violations.push(format!(
                    "{}: p95 latency {:.1}ms exceeds {:.1}ms",
                    backend.name, backend.latency.p95_ms, thresholds.max_p95_ms
                ));
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendEndpoint, RoutePlan};

    fn sample(
        backend: BackendId,
        category: Option<RouteCategory>,
        access: Access,
        latency_us: u64,
        ok: bool,
    ) -> MetricSample {
        MetricSample {
            backend,
            category,
            access,
            latency_us,
            ok,
        }
    }

    fn test_config() -> RunConfig {
        RunConfig {
            name: "metrics-test".to_string(),
            description: String::new(),
            backend_a: BackendEndpoint {
                name: "cache-components".to_string(),
                base_url: Some("http://localhost:3000".to_string()),
                env: None,
            },
            backend_b: BackendEndpoint {
                name: "isr".to_string(),
                base_url: Some("http://localhost:3001".to_string()),
                env: None,
            },
            iterations: Some(4),
            concurrency: 1,
            route_plan: RoutePlan::UniqueSweep,
            delay: None,
            request_timeout_secs: 30,
            max_duration_secs: 7200,
            drain_timeout_secs: 60,
            inter_iteration_pause_ms: 0,
            thresholds: Thresholds::default(),
        }
    }

    fn resolved_backends(config: &RunConfig) -> [ResolvedBackend; 2] {
        config.resolve_backends().unwrap()
    }

    #[test]
    fn aggregates_counts_and_hit_rate() {
        let aggregator = MetricsAggregator::new();
        let cat = Some(RouteCategory::Popular);
        aggregator.record(&sample(BackendId::A, cat, Access::First, 10_000, true));
        aggregator.record(&sample(BackendId::A, cat, Access::Repeat, 2_000, true));
        aggregator.record(&sample(BackendId::A, cat, Access::Repeat, 3_000, true));
        aggregator.record(&sample(BackendId::A, cat, Access::Repeat, 1_000, false));

        let config = test_config();
        let summary = aggregator
            .summary(&config, &resolved_backends(&config), Duration::from_secs(1))
            .unwrap();

        let a = &summary.backends[0];
        assert_eq!(a.total_requests, 4);
        assert_eq!(a.failed_requests, 1);
        assert_eq!(a.first_accesses, 1);
        assert_eq!(a.repeat_accesses, 3);
        assert!((a.estimated_hit_rate - 0.75).abs() < 1e-9);
        assert!((a.failure_rate - 0.25).abs() < 1e-9);
        // Only the three successful latencies land in the distribution.
        assert_eq!(a.latency.count, 3);

        let b = &summary.backends[1];
        assert_eq!(b.total_requests, 0);
        assert_eq!(b.estimated_hit_rate, 0.0);
    }

    #[test]
    fn category_breakdown_only_covers_categorized_samples() {
        let aggregator = MetricsAggregator::new();
        aggregator.record(&sample(
            BackendId::A,
            Some(RouteCategory::Popular),
            Access::First,
            5_000,
            true,
        ));
        aggregator.record(&sample(BackendId::A, None, Access::First, 5_000, true));

        let config = test_config();
        let summary = aggregator
            .summary(&config, &resolved_backends(&config), Duration::from_secs(1))
            .unwrap();

        let a = &summary.backends[0];
        assert_eq!(a.total_requests, 2);
        assert_eq!(a.categories.len(), 1);
        assert_eq!(a.categories[0].category, "popular");
        assert_eq!(a.categories[0].requests, 1);
    }

    #[test]
    fn recording_is_safe_under_concurrency() {
        let aggregator = std::sync::Arc::new(MetricsAggregator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let aggregator = std::sync::Arc::clone(&aggregator);
            handles.push(std::thread::spawn(move || {
                for i in 0..1000u64 {
                    aggregator.record(&sample(
                        BackendId::B,
                        Some(RouteCategory::LongTail),
                        if i % 4 == 0 {
                            Access::First
                        } else {
                            Access::Repeat
                        },
                        i + 1,
                        true,
                    ));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let config = test_config();
        let summary = aggregator
            .summary(&config, &resolved_backends(&config), Duration::from_secs(1))
            .unwrap();
        let b = &summary.backends[1];
        assert_eq!(b.total_requests, 8_000);
        assert_eq!(b.first_accesses, 2_000);
        assert_eq!(b.repeat_accesses, 6_000);
        assert_eq!(b.latency.count, 8_000);
    }

    #[test]
    fn threshold_violations_cover_both_criteria() {
        let aggregator = MetricsAggregator::new();
        // 1 failure out of 2 requests: 50% failure rate.
        aggregator.record(&sample(BackendId::A, None, Access::First, 10_000, true));
        aggregator.record(&sample(BackendId::A, None, Access::Repeat, 10_000, false));

        let config = test_config();
        let summary = aggregator
            .summary(&config, &resolved_backends(&config), Duration::from_secs(1))
            .unwrap();

        let violations = summary.threshold_violations(&Thresholds::default());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("failure rate"));

        let strict = Thresholds {
            max_failure_rate: 0.6,
            max_p95_ms: 5.0,
        };
        let violations = summary.threshold_violations(&strict);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("p95"));
    }
}
