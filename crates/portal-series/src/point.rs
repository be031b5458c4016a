//! Series points.

use polars::prelude::*;
use portal_core::{PortalError, Result};
use serde::{Deserialize, Serialize};

/// One decoded reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionPoint {
    /// Date or period identifier.
    pub label: String,
    /// Reading; always finite.
    pub value: f64,
    /// Display metadata, kept in its original text form.
    pub tooltip: String,
}

impl ConsumptionPoint {
    /// Creates a point.
    #[must_use]
    pub fn new(label: impl Into<String>, value: f64, tooltip: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value,
            tooltip: tooltip.into(),
        }
    }
}

/// Ordered readings, in the order the backend sent them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumptionSeries {
    points: Vec<ConsumptionPoint>,
}

impl ConsumptionSeries {
    /// Creates a series from points, keeping their order.
    #[must_use]
    pub const fn new(points: Vec<ConsumptionPoint>) -> Self {
        Self { points }
    }

    /// Returns the points.
    #[must_use]
    pub fn points(&self) -> &[ConsumptionPoint] {
        &self.points
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if no point survived decoding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates over the points.
    pub fn iter(&self) -> std::slice::Iter<'_, ConsumptionPoint> {
        self.points.iter()
    }

    /// Returns the labels in order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(|p| p.label.as_str())
    }

    /// Returns the value of the first point labelled `label`.
    #[must_use]
    pub fn value_of(&self, label: &str) -> Option<f64> {
        self.points.iter().find(|p| p.label == label).map(|p| p.value)
    }

    /// Sum of all values.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }

    /// Largest value, or `None` for an empty series.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).reduce(f64::max)
    }

    /// Exports the series as a `label`/`value`/`tooltip` frame.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be built.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let labels: Vec<&str> = self.labels().collect();
        let values: Vec<f64> = self.points.iter().map(|p| p.value).collect();
        let tooltips: Vec<&str> = self.points.iter().map(|p| p.tooltip.as_str()).collect();

        DataFrame::new(vec![
            Column::new("label".into(), labels),
            Column::new("value".into(), values),
            Column::new("tooltip".into(), tooltips),
        ])
        .map_err(|e| PortalError::Unexpected(e.to_string()))
    }
}

impl FromIterator<ConsumptionPoint> for ConsumptionSeries {
    fn from_iter<I: IntoIterator<Item = ConsumptionPoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ConsumptionSeries {
    type Item = ConsumptionPoint;
    type IntoIter = std::vec::IntoIter<ConsumptionPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConsumptionSeries {
    type Item = &'a ConsumptionPoint;
    type IntoIter = std::slice::Iter<'a, ConsumptionPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
