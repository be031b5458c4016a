//! Render-ready consumption chart state.

use polars::prelude::DataFrame;
use portal_cache::QueryView;
use portal_core::{Result, handle_api_error, pick};
use portal_series::{AlignedSeries, ConsumptionSeries, SeriesDecoder, align};
use serde_json::Value;

/// Keys holding the current-year series in a consumption payload.
const CURRENT_KEYS: &[&str] = &["consommation", "courante", "anneeEnCours", "current"];

/// Keys holding the previous-year series in a consumption payload.
const PREVIOUS_KEYS: &[&str] = &[
    "consommationPrecedente",
    "precedente",
    "anneePrecedente",
    "previous",
];

/// What the chart area shows.
#[derive(Clone, Debug, PartialEq)]
pub enum ChartBody {
    /// First fetch still running.
    Loading,
    /// Nothing to draw; the fetch failed before any data was cached.
    Blank,
    /// Fetched, but no reading survived decoding.
    NoData,
    /// Current and previous year on one axis.
    Series(AlignedSeries),
}

/// Chart state for one housing unit.
///
/// The body and the error are independent: a failed refresh over cached data
/// shows the cached series together with the error message.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartView {
    /// Chart contents.
    pub body: ChartBody,
    /// Message for the error banner, if the last fetch failed.
    pub error: Option<String>,
    /// True if the data shown is not fresh.
    pub stale: bool,
}

impl ChartView {
    /// Builds the chart state from a cache view of a consumption payload.
    #[must_use]
    pub fn from_view(view: &QueryView, decoder: &SeriesDecoder) -> Self {
        let body = match &view.data {
            Some(data) => {
                let (current, previous) = split_years(data, decoder);
                if current.is_empty() && previous.is_empty() {
                    ChartBody::NoData
                } else {
                    ChartBody::Series(align(&current, &previous))
                }
            }
            None if view.is_error() => ChartBody::Blank,
            None => ChartBody::Loading,
        };

        Self {
            body,
            error: view.error.as_ref().map(handle_api_error),
            stale: view.data.is_some() && view.is_stale,
        }
    }

    /// Returns the aligned series, if there is one to draw.
    #[must_use]
    pub const fn series(&self) -> Option<&AlignedSeries> {
        match &self.body {
            ChartBody::Series(series) => Some(series),
            _ => None,
        }
    }

    /// Exports the drawn series as a `label`/`n`/`n-1` frame.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be built.
    pub fn to_frame(&self) -> Result<Option<DataFrame>> {
        self.series()
            .map(|series| series.to_frame("n", "n-1"))
            .transpose()
    }
}

/// Splits a consumption payload into current and previous year series.
///
/// A payload that is not an object holding either year is decoded whole as
/// the current year.
#[must_use]
pub fn split_years(data: &Value, decoder: &SeriesDecoder) -> (ConsumptionSeries, ConsumptionSeries) {
    let current = pick(data, CURRENT_KEYS);
    let previous = pick(data, PREVIOUS_KEYS);
    if current.is_none() && previous.is_none() {
        return (decoder.decode(data), ConsumptionSeries::default());
    }
    (
        current.map(|c| decoder.decode(c)).unwrap_or_default(),
        previous.map(|p| decoder.decode(p)).unwrap_or_default(),
    )
}
