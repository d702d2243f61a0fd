//! Scenario configuration loading and validation.

use crate::distribution::{CategoryWeights, RouteSpace};
use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Identifies one of the two backends under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    A,
    B,
}

impl BackendId {
    pub const BOTH: [BackendId; 2] = [BackendId::A, BackendId::B];

    pub fn index(self) -> usize {
        match self {
            BackendId::A => 0,
            BackendId::B => 1,
        }
    }

    /// Environment variable consulted when the scenario does not name one.
    fn default_env(self) -> &'static str {
        match self {
            BackendId::A => "CACHE_URL",
            BackendId::B => "ISR_URL",
        }
    }
}

/// One backend endpoint as written in a scenario file.
///
/// The base URL may be given inline or resolved from an environment
/// variable, so scenario files can stay free of deployment URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoint {
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the base URL when `base_url` is unset.
    #[serde(default)]
    pub env: Option<String>,
}

/// A backend endpoint after URL resolution, ready for request building.
#[derive(Debug, Clone)]
pub struct ResolvedBackend {
    pub id: BackendId,
    pub name: String,
    pub base_url: String,
}

/// How iteration indices map to routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutePlan {
    /// Weighted popular/medium/long-tail traffic. The route space is given
    /// explicitly or derived once from a target overall miss rate.
    Weighted {
        #[serde(default)]
        weights: CategoryWeights,
        #[serde(default)]
        route_space: Option<RouteSpace>,
        #[serde(default)]
        target_miss_rate: Option<f64>,
    },
    /// Every iteration gets a distinct route: a pure cache-miss workload.
    UniqueSweep,
    /// Cycle through a fixed pool so each route is hit several times; the
    /// first full round is all misses, later rounds all hits.
    Cycling {
        unique_routes: u64,
        hits_per_route: u64,
    },
}

/// A route plan after the route space has been fixed at configuration time.
#[derive(Debug, Clone)]
pub enum ResolvedPlan {
    Weighted {
        weights: CategoryWeights,
        space: RouteSpace,
    },
    UniqueSweep,
    Cycling { unique_routes: u64 },
}

/// Pass/fail criteria evaluated against the final summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    /// Maximum tolerated failure rate per backend.
    pub max_failure_rate: f64,
    /// Maximum tolerated p95 latency per backend, in milliseconds.
    pub max_p95_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.05,
            max_p95_ms: 2000.0,
        }
    }
}

/// Main scenario configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub backend_a: BackendEndpoint,
    pub backend_b: BackendEndpoint,
    /// Total logical iterations; each issues one request per backend.
    /// Optional for cycling plans, where it is derived from the pool size.
    #[serde(default)]
    pub iterations: Option<u64>,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    pub route_plan: RoutePlan,
    /// Optional delay path segment; requests become `base/{delay}/{key}`.
    #[serde(default)]
    pub delay: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// Per-worker pause between iterations, bounding peak outbound load.
    #[serde(default = "default_pause_ms")]
    pub inter_iteration_pause_ms: u64,
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_concurrency() -> u32 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_duration_secs() -> u64 {
    7200
}

fn default_drain_timeout_secs() -> u64 {
    60
}

fn default_pause_ms() -> u64 {
    10
}

impl RunConfig {
    /// Load configuration from a YAML scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Total iteration count, derived for cycling plans when not explicit.
    pub fn total_iterations(&self) -> BenchResult<u64> {
        let total = match (self.iterations, &self.route_plan) {
            (Some(n), _) => n,
            (
                None,
                RoutePlan::Cycling {
                    unique_routes,
                    hits_per_route,
                },
            ) => unique_routes.saturating_mul(*hits_per_route),
            (None, _) => {
                return Err(BenchError::InvalidConfig {
                    field: "iterations",
                    message: "required unless the route plan is cycling".to_string(),
                })
            }
        };
        if total == 0 {
            return Err(BenchError::InvalidConfig {
                field: "iterations",
                message: "must be > 0".to_string(),
            });
        }
        Ok(total)
    }

    /// Fix the route space for the run. Derivation from a target miss rate
    /// happens here, before any worker starts, never per request.
    pub fn resolve_plan(&self) -> BenchResult<ResolvedPlan> {
        match &self.route_plan {
            RoutePlan::Weighted {
                weights,
                route_space,
                target_miss_rate,
            } => {
                weights.validate()?;
                let space = match (route_space, target_miss_rate) {
                    (Some(space), None) => *space,
                    (None, Some(rate)) => {
                        if !(*rate > 0.0 && *rate <= 1.0) {
                            return Err(BenchError::InvalidConfig {
                                field: "target_miss_rate",
                                message: format!("{} is outside (0, 1]", rate),
                            });
                        }
                        RouteSpace::for_target_miss_rate(self.total_iterations()?, *rate)
                    }
                    (Some(_), Some(_)) => {
                        return Err(BenchError::InvalidConfig {
                            field: "route_plan",
                            message: "route_space and target_miss_rate are mutually exclusive"
                                .to_string(),
                        })
                    }
                    (None, None) => {
                        return Err(BenchError::InvalidConfig {
                            field: "route_plan",
                            message: "either route_space or target_miss_rate is required"
                                .to_string(),
                        })
                    }
                };
                space.validate()?;
                Ok(ResolvedPlan::Weighted {
                    weights: *weights,
                    space,
                })
            }
            RoutePlan::UniqueSweep => Ok(ResolvedPlan::UniqueSweep),
            RoutePlan::Cycling {
                unique_routes,
                hits_per_route,
            } => {
                if *unique_routes == 0 {
                    return Err(BenchError::InvalidConfig {
                        field: "unique_routes",
                        message: "must be > 0".to_string(),
                    });
                }
                if *hits_per_route == 0 {
                    return Err(BenchError::InvalidConfig {
                        field: "hits_per_route",
                        message: "must be > 0".to_string(),
                    });
                }
                Ok(ResolvedPlan::Cycling {
                    unique_routes: *unique_routes,
                })
            }
        }
    }

    /// Resolve both backend base URLs, consulting the environment where the
    /// scenario file leaves them unset.
    pub fn resolve_backends(&self) -> BenchResult<[ResolvedBackend; 2]> {
        let resolve = |id: BackendId, endpoint: &BackendEndpoint| -> BenchResult<ResolvedBackend> {
            let env_name = endpoint
                .env
                .clone()
                .unwrap_or_else(|| id.default_env().to_string());
            let base_url = match &endpoint.base_url {
                Some(url) => url.clone(),
                None => match std::env::var(&env_name) {
                    Ok(url) if !url.is_empty() => url,
                    _ => {
                        return Err(BenchError::MissingEndpoint {
                            backend: endpoint.name.clone(),
                            env: env_name,
                        })
                    }
                },
            };
            Ok(ResolvedBackend {
                id,
                name: endpoint.name.clone(),
                base_url: base_url.trim_end_matches('/').to_string(),
            })
        };
        Ok([
            resolve(BackendId::A, &self.backend_a)?,
            resolve(BackendId::B, &self.backend_b)?,
        ])
    }

    /// Validate the whole configuration. Fails fast, before any request.
    pub fn validate(&self) -> BenchResult<()> {
        if self.concurrency == 0 {
            return Err(BenchError::InvalidConfig {
                field: "concurrency",
                message: "must be > 0".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(BenchError::InvalidConfig {
                field: "request_timeout_secs",
                message: "must be > 0".to_string(),
            });
        }
        if self.max_duration_secs == 0 {
            return Err(BenchError::InvalidConfig {
                field: "max_duration_secs",
                message: "must be > 0".to_string(),
            });
        }
        if !(self.thresholds.max_failure_rate > 0.0 && self.thresholds.max_failure_rate <= 1.0) {
            return Err(BenchError::InvalidConfig {
                field: "thresholds.max_failure_rate",
                message: "must be in (0, 1]".to_string(),
            });
        }
        if self.thresholds.max_p95_ms <= 0.0 {
            return Err(BenchError::InvalidConfig {
                field: "thresholds.max_p95_ms",
                message: "must be > 0".to_string(),
            });
        }
        self.total_iterations()?;
        self.resolve_plan()?;
        self.resolve_backends()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn inter_iteration_pause(&self) -> Duration {
        Duration::from_millis(self.inter_iteration_pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(plan: RoutePlan) -> RunConfig {
        RunConfig {
            name: "test".to_string(),
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
            iterations: Some(1000),
            concurrency: 10,
            route_plan: plan,
            delay: None,
            request_timeout_secs: 30,
            max_duration_secs: 7200,
            drain_timeout_secs: 60,
            inter_iteration_pause_ms: 10,
            thresholds: Thresholds::default(),
        }
    }

    #[test]
    fn parses_weighted_scenario_yaml() {
        let yaml = r#"
name: weather-today
description: Weighted traffic with a target miss rate
backend_a:
  name: cache-components
  base_url: http://localhost:3000
backend_b:
  name: isr
  base_url: http://localhost:3001
iterations: 100000
concurrency: 50
delay: "0"
route_plan:
  type: weighted
  weights:
    popular: 0.10
    medium: 0.20
    long_tail: 0.70
  target_miss_rate: 0.67
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.total_iterations().unwrap(), 100_000);
        match config.resolve_plan().unwrap() {
            ResolvedPlan::Weighted { space, .. } => assert_eq!(space.total(), 67_000),
            other => panic!("unexpected plan: {:?}", other),
        }
    }

    #[test]
    fn cycling_plan_derives_iterations() {
        let config = {
            let mut c = base_config(RoutePlan::Cycling {
                unique_routes: 10_000,
                hits_per_route: 10,
            });
            c.iterations = None;
            c
        };
        assert_eq!(config.total_iterations().unwrap(), 100_000);
        config.validate().unwrap();
    }

    #[test]
    fn missing_iterations_is_rejected() {
        let mut config = base_config(RoutePlan::UniqueSweep);
        config.iterations = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn route_space_and_miss_rate_are_exclusive() {
        let config = base_config(RoutePlan::Weighted {
            weights: CategoryWeights::default(),
            route_space: Some(RouteSpace {
                popular: 10,
                medium: 50,
                long_tail: 500,
            }),
            target_miss_rate: Some(0.5),
        });
        assert!(config.resolve_plan().is_err());
    }

    #[test]
    fn weighted_plan_requires_a_space_source() {
        let config = base_config(RoutePlan::Weighted {
            weights: CategoryWeights::default(),
            route_space: None,
            target_miss_rate: None,
        });
        assert!(config.resolve_plan().is_err());
    }

    #[test]
    fn missing_endpoint_fails_fast() {
        let mut config = base_config(RoutePlan::UniqueSweep);
        config.backend_b.base_url = None;
        config.backend_b.env = Some("CACHE_BENCH_TEST_UNSET_URL".to_string());
        match config.validate() {
            Err(BenchError::MissingEndpoint { backend, .. }) => {
                assert_eq!(backend, "isr");
            }
            other => panic!("expected MissingEndpoint, got {:?}", other),
        }
    }

    #[test]
    fn endpoint_resolves_from_env() {
        let mut config = base_config(RoutePlan::UniqueSweep);
        config.backend_a.base_url = None;
        config.backend_a.env = Some("CACHE_BENCH_TEST_SET_URL".to_string());
        std::env::set_var("CACHE_BENCH_TEST_SET_URL", "http://example.com/");
        let backends = config.resolve_backends().unwrap();
        assert_eq!(backends[0].base_url, "http://example.com");
        std::env::remove_var("CACHE_BENCH_TEST_SET_URL");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = base_config(RoutePlan::UniqueSweep);
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
