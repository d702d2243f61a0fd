//! Scenario orchestration: worker pool, claim-next dispatch, drain.
//!
//! A run moves through four phases: configuring (validation), running (a
//! fixed pool of workers pulling from one shared iteration counter),
//! draining (no new claims, in-flight requests allowed to finish), and
//! reported (the aggregated summary is emitted). Workers claim iteration
//! indices from a single atomic counter rather than owning static slices,
//! so a straggler never starves later iterations.

use crate::config::{BackendId, ResolvedBackend, RunConfig};
use crate::generator::RouteGenerator;
use crate::metrics::{MetricSample, MetricsAggregator, RunSummary};
use crate::tracker::AccessTracker;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Hands out iteration indices, each exactly once.
struct IterationCounter {
    next: AtomicU64,
    limit: u64,
}

impl IterationCounter {
    fn new(limit: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            limit,
        }
    }

    /// Claim the next unclaimed index, or `None` once the run is exhausted.
    fn claim(&self) -> Option<u64> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.limit).then_some(index)
    }
}

/// Result of a single HTTP request.
#[derive(Debug)]
pub struct RequestOutcome {
    pub status: u16,
    pub latency_us: u64,
    pub error: Option<String>,
}

impl RequestOutcome {
    /// Network errors, timeouts, and non-2xx responses all count as failures.
    pub fn ok(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// State shared by every worker in the pool.
struct RunContext {
    generator: RouteGenerator,
    tracker: AccessTracker,
    metrics: MetricsAggregator,
    counter: IterationCounter,
    backends: [ResolvedBackend; 2],
    deadline: Instant,
    pause: Duration,
    progress: ProgressBar,
}

/// Executes a scenario to completion within its time bounds.
pub struct ScenarioRunner {
    client: reqwest::Client,
    config: RunConfig,
}

impl ScenarioRunner {
    pub fn new(config: RunConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.concurrency as usize)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Run the scenario and return the aggregated summary.
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        self.config.validate()?;
        let iterations = self.config.total_iterations()?;
        let plan = self.config.resolve_plan()?;
        let backends = self.config.resolve_backends()?;

        info!(
            scenario = %self.config.name,
            iterations,
            concurrency = self.config.concurrency,
            backend_a = %backends[0].base_url,
            backend_b = %backends[1].base_url,
            "starting run"
        );

        let progress = ProgressBar::new(iterations);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} iterations {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );

        let ctx = Arc::new(RunContext {
            generator: RouteGenerator::new(plan, self.config.delay.clone()),
            tracker: AccessTracker::new(),
            metrics: MetricsAggregator::new(),
            counter: IterationCounter::new(iterations),
            backends,
            deadline: Instant::now() + self.config.max_duration(),
            pause: self.config.inter_iteration_pause(),
            progress,
        });

        let started = Instant::now();
        let mut workers = tokio::task::JoinSet::new();
        for _ in 0..self.config.concurrency {
            workers.spawn(worker_loop(Arc::clone(&ctx), self.client.clone()));
        }

        // Drain phase: workers stop claiming at the deadline, then get the
        // drain budget to finish in-flight requests before a hard abort.
        let drain_budget = ctx.deadline.saturating_duration_since(Instant::now())
            + self.config.drain_timeout();
        let drained = tokio::time::timeout(drain_budget, async {
            while let Some(result) = workers.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "worker task failed");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("drain timeout reached, aborting in-flight requests");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        ctx.progress.finish_with_message("Complete");
        let duration = started.elapsed();
        info!(duration_secs = duration.as_secs_f64(), "run complete");

        let summary = ctx.metrics.summary(&self.config, &ctx.backends, duration)?;
        Ok(summary)
    }
}

async fn worker_loop(ctx: Arc<RunContext>, client: reqwest::Client) {
    loop {
        // Past the deadline no new work is claimed; the iteration already
        // in flight below is the only thing left to finish.
        if Instant::now() >= ctx.deadline {
            break;
        }
        let Some(iteration) = ctx.counter.claim() else {
            break;
        };

        let route = ctx.generator.select(iteration);

        // Both backends get the identical route so the comparison stays
        // apples-to-apples.
        for backend in BackendId::BOTH {
            let target = &ctx.backends[backend.index()];
            let url = ctx.generator.request_url(&target.base_url, &route.key);
            let access = ctx.tracker.record_and_classify(backend, &route.key);

            let outcome = execute_request(&client, &url).await;
            if let Some(error) = &outcome.error {
                warn!(backend = %target.name, url = %url, %error, "request failed");
            } else if !outcome.ok() {
                warn!(backend = %target.name, url = %url, status = outcome.status, "unexpected status");
            }

            ctx.metrics.record(&MetricSample {
                backend,
                category: route.category,
                access,
                latency_us: outcome.latency_us,
                ok: outcome.ok(),
            });
        }

        ctx.progress.inc(1);
        if !ctx.pause.is_zero() {
            tokio::time::sleep(ctx.pause).await;
        }
    }
}

/// Execute a single GET. Never fails the run: errors become outcome data.
async fn execute_request(client: &reqwest::Client, url: &str) -> RequestOutcome {
    let start = Instant::now();

    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            // Drain the body so the connection can return to the pool.
            let _ = response.bytes().await;
            RequestOutcome {
                status,
                latency_us: start.elapsed().as_micros() as u64,
                error: None,
            }
        }
        Err(e) => RequestOutcome {
            status: 0,
            latency_us: start.elapsed().as_micros() as u64,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn outcome_classifies_status_ranges() {
        let ok = RequestOutcome {
            status: 200,
            latency_us: 1,
            error: None,
        };
        assert!(ok.ok());

        let not_found = RequestOutcome {
            status: 404,
            latency_us: 1,
            error: None,
        };
        assert!(!not_found.ok());

        let errored = RequestOutcome {
            status: 0,
            latency_us: 1,
            error: Some("connection refused".to_string()),
        };
        assert!(!errored.ok());
    }

    #[test]
    fn counter_exhausts_exactly_once() {
        let counter = IterationCounter::new(5);
        let claimed: Vec<_> = std::iter::from_fn(|| counter.claim()).collect();
        assert_eq!(claimed, vec![0, 1, 2, 3, 4]);
        assert_eq!(counter.claim(), None);
    }

    #[test]
    fn no_index_is_claimed_twice_under_contention() {
        let total = 10_000u64;
        let workers = 100;
        let counter = Arc::new(IterationCounter::new(total));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(index) = counter.claim() {
                        claimed.push(index);
                    }
                    claimed
                })
            })
            .collect();

        let mut claim_log: HashMap<u64, u64> = HashMap::new();
        for handle in handles {
            for index in handle.join().unwrap() {
                *claim_log.entry(index).or_default() += 1;
            }
        }

        assert_eq!(claim_log.len() as u64, total);
        for (index, count) in claim_log {
            assert_eq!(count, 1, "iteration {} claimed {} times", index, count);
        }
    }
}
