use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::errors::ValuationError;
use crate::core::geo_index::{query_with_retry, GeoIndex};
use crate::models::{AttributeFilters, ComparableMatch, ComparableQuery, GeoPoint, SqmRange};

/// How far and how fast a comparable search may widen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionPolicy {
    /// Usable comparables needed to stop widening
    #[serde(default = "default_min_evidence")]
    pub min_evidence: usize,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Radius ceiling in meters
    #[serde(default = "default_max_radius_m")]
    pub max_radius_m: f64,
}

fn default_min_evidence() -> usize {
    3
}

fn default_growth_factor() -> f64 {
    2.0
}

fn default_max_steps() -> u32 {
    4
}

fn default_max_radius_m() -> f64 {
    5_000.0
}

impl Default for ExpansionPolicy {
    fn default() -> Self {
        Self {
            min_evidence: default_min_evidence(),
            growth_factor: default_growth_factor(),
            max_steps: default_max_steps(),
            max_radius_m: default_max_radius_m(),
        }
    }
}

impl ExpansionPolicy {
    pub fn validate(&self) -> Result<(), ValuationError> {
        if self.min_evidence == 0 {
            return Err(ValuationError::Configuration(
                "min_evidence must be at least 1".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ValuationError::Configuration(
                "max_steps must be at least 1 so an exhausted search reaches max_radius_m".to_string(),
            ));
        }
        if !(self.growth_factor.is_finite() && self.growth_factor > 1.0) {
            return Err(ValuationError::Configuration(format!(
                "growth_factor must be greater than 1, got {}",
                self.growth_factor
            )));
        }
        if !(self.max_radius_m.is_finite() && self.max_radius_m > 0.0) {
            return Err(ValuationError::Configuration(format!(
                "max_radius_m must be positive, got {}",
                self.max_radius_m
            )));
        }
        Ok(())
    }

    /// The initial radius must be positive and within the ceiling
    pub fn validate_tolerance(&self, location_tolerance: f64) -> Result<(), ValuationError> {
        if !(location_tolerance.is_finite() && location_tolerance > 0.0) {
            return Err(ValuationError::Configuration(format!(
                "location_tolerance must be positive, got {}",
                location_tolerance
            )));
        }
        if location_tolerance > self.max_radius_m {
            return Err(ValuationError::Configuration(format!(
                "location_tolerance {}m exceeds the {}m ceiling",
                location_tolerance, self.max_radius_m
            )));
        }
        Ok(())
    }

    /// Radius for expansion step `step` (1-based), growing from `current`.
    ///
    /// The last permitted step goes straight to the ceiling.
    #[inline]
    pub fn next_radius(&self, current: f64, step: u32) -> f64 {
        if step >= self.max_steps {
            return self.max_radius_m;
        }
        (current * self.growth_factor).min(self.max_radius_m)
    }
}

/// Result of an expanded search
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub matches: Vec<ComparableMatch>,
    /// Radius of the last query, in meters
    pub searched_radius: f64,
    pub steps: u32,
}

impl Expansion {
    /// Matches with a usable price/sqm
    pub fn evidence_count(&self) -> usize {
        count_evidence(&self.matches)
    }
}

#[inline]
fn count_evidence(matches: &[ComparableMatch]) -> usize {
    matches
        .iter()
        .filter(|m| m.asset.price_per_sqm().is_some())
        .count()
}

/// Widens the search radius until enough evidence is found or the policy is
/// exhausted
pub struct ToleranceExpander<'a> {
    index: &'a dyn GeoIndex,
    policy: &'a ExpansionPolicy,
    timeout: Duration,
    retries: u32,
}

impl<'a> ToleranceExpander<'a> {
    pub fn new(index: &'a dyn GeoIndex, policy: &'a ExpansionPolicy) -> Self {
        Self {
            index,
            policy,
            timeout: Duration::from_secs(5),
            retries: 2,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration, retries: u32) -> Self {
        self.timeout = timeout;
        self.retries = retries;
        self
    }

    /// Query around `center`, widening the radius from `initial_radius`.
    ///
    /// Stops when the usable evidence reaches `min_evidence`, when the radius
    /// reaches the ceiling, or when `max_steps` expansions have been made.
    /// Finding nothing is not an error.
    pub async fn resolve(
        &self,
        center: GeoPoint,
        sqm_range: SqmRange,
        filters: &AttributeFilters,
        limit: usize,
        initial_radius: f64,
    ) -> Result<Expansion, ValuationError> {
        self.policy.validate_tolerance(initial_radius)?;

        let mut query = ComparableQuery {
            center,
            radius_m: initial_radius,
            sqm_range,
            filters: filters.clone(),
            limit,
        };
        let mut steps = 0;

        loop {
            let matches = query_with_retry(self.index, &query, self.timeout, self.retries).await?;
            let evidence = count_evidence(&matches);

            debug!(
                "Expansion step {}: radius {}m, {} matches, {} usable",
                steps,
                query.radius_m,
                matches.len(),
                evidence
            );

            if evidence >= self.policy.min_evidence
                || query.radius_m >= self.policy.max_radius_m
                || steps >= self.policy.max_steps
            {
                return Ok(Expansion {
                    matches,
                    searched_radius: query.radius_m,
                    steps,
                });
            }

            steps += 1;
            query.radius_m = self.policy.next_radius(query.radius_m, steps);
        }
    }
}
