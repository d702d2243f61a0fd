//! Route population model: category weights and route-space sizes.
//!
//! Traffic is split across three route populations. Popular routes are few
//! and absorb repeated hits; long-tail routes are many and mostly see a
//! single access. The weights partition the unit interval into contiguous
//! bands, so a uniform fraction maps to exactly one category.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};

/// Tolerance when checking that weights sum to 1.0.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Minimum popular route count when auto-scaling from a target miss rate.
const MIN_POPULAR_ROUTES: u64 = 50;
/// Popular share of the unique route space when auto-scaling.
const POPULAR_SPACE_SHARE: f64 = 0.0015;
/// Medium share of the unique route space when auto-scaling.
const MEDIUM_SPACE_SHARE: f64 = 0.075;

/// A route population category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCategory {
    Popular,
    Medium,
    LongTail,
}

impl RouteCategory {
    pub const ALL: [RouteCategory; 3] = [
        RouteCategory::Popular,
        RouteCategory::Medium,
        RouteCategory::LongTail,
    ];

    /// Route key prefix, shared by both backends so hit/miss sequences are
    /// comparable on identical keys.
    pub fn prefix(self) -> &'static str {
        match self {
            RouteCategory::Popular => "metro",
            RouteCategory::Medium => "city",
            RouteCategory::LongTail => "town",
        }
    }

    /// Label used in metrics and reports.
    pub fn label(self) -> &'static str {
        match self {
            RouteCategory::Popular => "popular",
            RouteCategory::Medium => "medium",
            RouteCategory::LongTail => "long_tail",
        }
    }

    pub fn index(self) -> usize {
        match self {
            RouteCategory::Popular => 0,
            RouteCategory::Medium => 1,
            RouteCategory::LongTail => 2,
        }
    }
}

/// Traffic weight per category. Weights must sum to 1.0 within
/// [`WEIGHT_EPSILON`]; this is checked once at configuration time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub popular: f64,
    pub medium: f64,
    pub long_tail: f64,
}

impl Default for CategoryWeights {
    /// Heavy long-tail bias, matching observed production read/write ratios.
    fn default() -> Self {
        Self {
            popular: 0.10,
            medium: 0.20,
            long_tail: 0.70,
        }
    }
}

impl CategoryWeights {
    /// Validate that every weight is in (0, 1] and the sum is 1.0 ± ε.
    pub fn validate(&self) -> BenchResult<()> {
        for (label, w) in [
            ("popular", self.popular),
            ("medium", self.medium),
            ("long_tail", self.long_tail),
        ] {
            if !(w > 0.0 && w <= 1.0) {
                return Err(BenchError::InvalidWeights(format!(
                    "{} weight {} is outside (0, 1]",
                    label, w
                )));
            }
        }
        let sum = self.popular + self.medium + self.long_tail;
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(BenchError::InvalidWeights(format!(
                "weights sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }

    /// Map a uniform fraction in [0, 1) to its category.
    ///
    /// Bands are cumulative and left-inclusive, in the fixed order
    /// Popular, Medium, LongTail, so every fraction lands in exactly one.
    pub fn category_for(&self, u: f64) -> RouteCategory {
        if u < self.popular {
            RouteCategory::Popular
        } else if u < self.popular + self.medium {
            RouteCategory::Medium
        } else {
            RouteCategory::LongTail
        }
    }
}

/// Count of distinct routes available per category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteSpace {
    pub popular: u64,
    pub medium: u64,
    pub long_tail: u64,
}

impl RouteSpace {
    /// Derive route-space sizes from a target overall miss rate.
    ///
    /// The unique route count is `iterations * miss_rate`; the first access
    /// to each unique route is the expected miss. Popular keeps a small
    /// fixed floor so the hot set stays hot, medium takes a moderate share,
    /// long-tail absorbs the rest.
    pub fn for_target_miss_rate(iterations: u64, target_miss_rate: f64) -> Self {
        let total_unique = (iterations as f64 * target_miss_rate).floor() as u64;
        let popular = ((total_unique as f64 * POPULAR_SPACE_SHARE).floor() as u64)
            .max(MIN_POPULAR_ROUTES);
        let medium = ((total_unique as f64 * MEDIUM_SPACE_SHARE).floor() as u64).max(1);
        let long_tail = total_unique.saturating_sub(popular + medium).max(1);
        Self {
            popular,
            medium,
            long_tail,
        }
    }

    pub fn size(&self, category: RouteCategory) -> u64 {
        match category {
            RouteCategory::Popular => self.popular,
            RouteCategory::Medium => self.medium,
            RouteCategory::LongTail => self.long_tail,
        }
    }

    /// Total distinct routes across all categories.
    pub fn total(&self) -> u64 {
        self.popular + self.medium + self.long_tail
    }

    pub fn validate(&self) -> BenchResult<()> {
        for category in RouteCategory::ALL {
            if self.size(category) == 0 {
                return Err(BenchError::EmptyRouteSpace {
                    category: category.label(),
                });
            }
        }
        Ok(())
    }
}
