//! Deterministic route selection and request URL generation.
//!
//! Workers map a globally unique iteration index to a route without any
//! shared mutable state: two fixed-parameter linear-congruential transforms
//! derive decorrelated unit fractions from the index alone. The same index
//! yields the same route for any worker count or scheduling order, which is
//! what makes runs reproducible and the two backends comparable.

use crate::config::ResolvedPlan;
use crate::distribution::RouteCategory;

// LCG parameters for the category draw.
const CATEGORY_MULTIPLIER: u64 = 9301;
const CATEGORY_INCREMENT: u64 = 49297;
const CATEGORY_MODULUS: u64 = 233280;

// LCG parameters for the in-category index draw. Distinct prime
// multiplier/modulus decorrelate it from the category draw.
const ROUTE_MULTIPLIER: u64 = 7919;
const ROUTE_INCREMENT: u64 = 13;
const ROUTE_MODULUS: u64 = 104729;

/// Route key prefix for plans without category structure.
const FLAT_PREFIX: &str = "test";

/// Derive a unit fraction in [0, 1) from an iteration index.
fn unit_fraction(iteration: u64, multiplier: u64, increment: u64, modulus: u64) -> f64 {
    let residue = iteration
        .wrapping_mul(multiplier)
        .wrapping_add(increment)
        % modulus;
    residue as f64 / modulus as f64
}

/// The route computed for one iteration, shared by both backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRoute {
    /// Population category; `None` for flat (sweep/cycling) plans.
    pub category: Option<RouteCategory>,
    pub key: String,
}

/// Maps iteration indices to routes and builds request URLs.
pub struct RouteGenerator {
    plan: ResolvedPlan,
    delay: Option<String>,
}

impl RouteGenerator {
    pub fn new(plan: ResolvedPlan, delay: Option<String>) -> Self {
        Self { plan, delay }
    }

    /// Select the route for an iteration index.
    ///
    /// Pure function of the index: no RNG state, no locks, safe to call
    /// concurrently from any worker.
    pub fn select(&self, iteration: u64) -> SelectedRoute {
        match &self.plan {
            ResolvedPlan::Weighted { weights, space } => {
                let u1 = unit_fraction(
                    iteration,
                    CATEGORY_MULTIPLIER,
                    CATEGORY_INCREMENT,
                    CATEGORY_MODULUS,
                );
                let category = weights.category_for(u1);

                let u2 = unit_fraction(iteration, ROUTE_MULTIPLIER, ROUTE_INCREMENT, ROUTE_MODULUS);
                // Squaring concentrates popular traffic on low indices, the
                // Zipf-like hot set; medium and long-tail stay uniform.
                let biased = match category {
                    RouteCategory::Popular => u2 * u2,
                    RouteCategory::Medium | RouteCategory::LongTail => u2,
                };
                let size = space.size(category);
                let index = ((biased * size as f64) as u64).min(size - 1);

                SelectedRoute {
                    category: Some(category),
                    key: format!("{}-{}", category.prefix(), index),
                }
            }
            ResolvedPlan::UniqueSweep => SelectedRoute {
                category: None,
                key: format!("{}-{}", FLAT_PREFIX, iteration),
            },
            ResolvedPlan::Cycling { unique_routes } => SelectedRoute {
                category: None,
                key: format!("{}-{}", FLAT_PREFIX, iteration % unique_routes),
            },
        }
    }

    /// Build the request URL for a backend.
    ///
    /// Route shape is `base/{key}`, or `base/{delay}/{key}` when the
    /// scenario configures a delay path segment.
    pub fn request_url(&self, base_url: &str, route_key: &str) -> String {
        match &self.delay {
            Some(delay) => format!("{}/{}/{}", base_url, delay, route_key),
            None => format!("{}/{}", base_url, route_key),
        }
    }
}
