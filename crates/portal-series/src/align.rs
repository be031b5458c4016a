//! Putting two series on one category axis.

use polars::prelude::*;
use portal_core::{PortalError, Result};
use std::collections::{HashMap, HashSet};

use crate::point::ConsumptionSeries;

/// Two series mapped onto a shared category axis.
///
/// `None` marks a category the series has no reading for and must render as
/// a gap, not as zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlignedSeries {
    /// Union of both series' labels, first-seen order.
    pub categories: Vec<String>,
    /// First series, one slot per category.
    pub first: Vec<Option<f64>>,
    /// Second series, one slot per category.
    pub second: Vec<Option<f64>>,
}

impl AlignedSeries {
    /// Returns the number of categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Returns true if neither series had any point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Exports the aligned series with columns `label`, `first_name` and
    /// `second_name`; gaps become nulls.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be built, e.g. when both names
    /// are equal.
    pub fn to_frame(&self, first_name: &str, second_name: &str) -> Result<DataFrame> {
        DataFrame::new(vec![
            Column::new("label".into(), self.categories.clone()),
            Column::new(first_name.into(), self.first.clone()),
            Column::new(second_name.into(), self.second.clone()),
        ])
        .map_err(|e| PortalError::Unexpected(e.to_string()))
    }
}

/// Aligns `first` and `second` on the union of their labels.
///
/// The axis lists every label of `first` in order, then the labels of
/// `second` not seen yet. A label repeated within one series takes its first
/// value.
#[must_use]
pub fn align(first: &ConsumptionSeries, second: &ConsumptionSeries) -> AlignedSeries {
    let mut seen = HashSet::new();
    let categories: Vec<String> = first
        .labels()
        .chain(second.labels())
        .filter(|label| seen.insert(*label))
        .map(String::from)
        .collect();

    let project = |series: &ConsumptionSeries| {
        let mut by_label: HashMap<&str, f64> = HashMap::new();
        for point in series {
            by_label.entry(point.label.as_str()).or_insert(point.value);
        }
        categories
            .iter()
            .map(|label| by_label.get(label.as_str()).copied())
            .collect::<Vec<_>>()
    };

    AlignedSeries {
        first: project(first),
        second: project(second),
        categories,
    }
}

/// What a chart should show for a series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeriesPresence {
    /// Nothing fetched yet.
    Loading,
    /// Fetched, but no point survived decoding: show "no data".
    Empty,
    /// At least one point.
    Ready,
}

impl SeriesPresence {
    /// Classifies a series; `None` means it has not been fetched yet.
    #[must_use]
    pub fn of(series: Option<&ConsumptionSeries>) -> Self {
        match series {
            None => Self::Loading,
            Some(s) if s.is_empty() => Self::Empty,
            Some(_) => Self::Ready,
        }
    }
}
