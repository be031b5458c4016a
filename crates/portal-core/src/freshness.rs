//! Freshness policies and query descriptors.
//!
//! Freshness is not one fixed duration. Each endpoint family has its own rule:
//!
//! - [`QueryFamily::Batch`] - fresh until the next local midnight
//! - [`QueryFamily::Operational`] - short rolling window
//! - [`QueryFamily::Reference`] - about an hour
//! - [`QueryFamily::Identity`] - about five minutes

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{clock::Clock, key::CacheKey};

/// Rule deciding how long a fetched value may be served without a network call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Freshness {
    /// Fresh until the first local midnight after the fetch.
    UntilMidnight,
    /// Fresh for a rolling duration after the fetch.
    For(Duration),
}

impl Freshness {
    /// Returns the instant at which a value fetched at `fetched_at` goes stale.
    #[must_use]
    pub fn stale_at(&self, fetched_at: DateTime<Utc>, clock: &dyn Clock) -> DateTime<Utc> {
        match self {
            Self::UntilMidnight => clock.next_midnight(fetched_at),
            Self::For(window) => TimeDelta::from_std(*window)
                .ok()
                .and_then(|delta| fetched_at.checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Returns true if a value fetched at `fetched_at` is still fresh now.
    ///
    /// The boundary is recomputed on every call rather than cached.
    #[must_use]
    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, clock: &dyn Clock) -> bool {
        clock.now() < self.stale_at(fetched_at, clock)
    }
}

/// Endpoint family, each mapped to a freshness rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryFamily {
    /// Slow-changing data regenerated by the nightly batch (buildings, housing
    /// units, invoices, dashboard aggregates, consumption).
    Batch,
    /// Frequently-changing operational data (interventions, tickets).
    Operational,
    /// Static reference content (legal notices).
    Reference,
    /// User and session identity.
    Identity,
}

impl QueryFamily {
    /// Resolves the freshness rule of this family.
    #[must_use]
    pub const fn freshness(&self, windows: &FreshnessWindows) -> Freshness {
        match self {
            Self::Batch => Freshness::UntilMidnight,
            Self::Operational => Freshness::For(windows.operational),
            Self::Reference => Freshness::For(windows.reference),
            Self::Identity => Freshness::For(windows.identity),
        }
    }
}

/// Rolling windows for the non-batch families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessWindows {
    /// Window for operational data.
    pub operational: Duration,
    /// Window for reference content.
    pub reference: Duration,
    /// Window for identity data.
    pub identity: Duration,
}

impl Default for FreshnessWindows {
    fn default() -> Self {
        Self {
            operational: Duration::from_secs(2 * 60),
            reference: Duration::from_secs(60 * 60),
            identity: Duration::from_secs(5 * 60),
        }
    }
}

/// A request descriptor: what to cache and how long it stays fresh.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query {
    /// Cache key of the entry.
    pub key: CacheKey,
    /// Freshness rule applied to the entry.
    pub freshness: Freshness,
}

impl Query {
    /// Creates a new query descriptor.
    #[must_use]
    pub const fn new(key: CacheKey, freshness: Freshness) -> Self {
        Self { key, freshness }
    }

    /// Creates a query whose freshness follows `family`.
    #[must_use]
    pub const fn for_family(key: CacheKey, family: QueryFamily, windows: &FreshnessWindows) -> Self {
        Self::new(key, family.freshness(windows))
    }
}
