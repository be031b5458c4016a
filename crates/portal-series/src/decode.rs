//! Decoders for the three consumption shapes.
//!
//! None of these functions fail. A segment whose label is empty or whose
//! reading does not parse is dropped and decoding moves on.

use chrono::{FixedOffset, Local, Offset};
use portal_core::pick;
use serde_json::Value;
use tracing::trace;

use crate::parse::{format_label, parse_number, value_number, value_text};
use crate::point::{ConsumptionPoint, ConsumptionSeries};

/// Segment separator of delimited series.
pub const SEGMENT_SEPARATOR: char = ';';

/// Field separator inside a delimited segment.
pub const FIELD_SEPARATOR: char = '|';

/// Key names tried, in order, when decoding arrays of objects.
///
/// Each endpoint family names its fields differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectShape {
    /// Keys holding the date or period label.
    pub label_keys: &'static [&'static str],
    /// Keys holding the reading.
    pub value_keys: &'static [&'static str],
    /// Keys holding display metadata.
    pub tooltip_keys: &'static [&'static str],
}

impl ObjectShape {
    /// Monthly consumption objects.
    pub const CONSUMPTION: Self = Self {
        label_keys: &["label", "date", "periode", "mois"],
        value_keys: &["conso", "value", "consoRaw", "valueRaw"],
        tooltip_keys: &["tooltip", "consoRaw", "valueRaw", "hover"],
    };

    /// Meter index readings.
    pub const INDEX: Self = Self {
        label_keys: &["date", "label", "dateReleve"],
        value_keys: &["index", "valueRaw", "value"],
        tooltip_keys: &["tooltip", "valueRaw", "index"],
    };

    /// Returns the first value found under `keys`.
    fn first<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
        pick(record, keys)
    }
}

impl Default for ObjectShape {
    fn default() -> Self {
        Self::CONSUMPTION
    }
}

/// Decodes consumption data of any supported shape.
///
/// # Example
///
/// ```
/// use portal_series::SeriesDecoder;
/// use serde_json::json;
///
/// let decoder = SeriesDecoder::utc();
/// let series = decoder.decode(&json!("2024-01-01|12,5|100;2024-02-01||"));
/// assert_eq!(series.len(), 1);
/// assert_eq!(series.points()[0].value, 100.0);
/// assert_eq!(series.points()[0].tooltip, "12,5");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeriesDecoder {
    shape: ObjectShape,
    /// Fixed offset for timestamp labels; the host time zone when `None`.
    offset: Option<FixedOffset>,
}

impl Default for SeriesDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesDecoder {
    /// Creates a decoder for consumption objects, formatting dates in the
    /// host's time zone with the offset in force on each date.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shape: ObjectShape::CONSUMPTION,
            offset: None,
        }
    }

    /// Creates a decoder formatting dates in UTC.
    #[must_use]
    pub fn utc() -> Self {
        Self::new().with_offset(chrono::Utc.fix())
    }

    /// Uses `shape` for arrays of objects.
    #[must_use]
    pub const fn with_shape(mut self, shape: ObjectShape) -> Self {
        self.shape = shape;
        self
    }

    /// Formats timestamp labels in `offset` instead of the host time zone.
    #[must_use]
    pub const fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    fn label(&self, raw: &Value) -> Option<String> {
        match &self.offset {
            Some(offset) => format_label(raw, offset),
            None => format_label(raw, &Local),
        }
    }

    /// Decodes `raw`, detecting its shape.
    ///
    /// Strings are read as delimited series, arrays element by element as
    /// tuples or objects. Objects wrapping a series under `series`, `data` or
    /// `consommation` are unwrapped. Anything else decodes to an empty series.
    #[must_use]
    pub fn decode(&self, raw: &Value) -> ConsumptionSeries {
        match raw {
            Value::String(s) => self.decode_delimited(s),
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Array(tuple) => self.tuple_point(tuple),
                    Value::Object(_) => self.object_point(item),
                    _ => None,
                })
                .collect(),
            Value::Object(_) => pick(raw, &["series", "data", "consommation"])
                .filter(|inner| !inner.is_object())
                .map(|inner| self.decode(inner))
                .unwrap_or_default(),
            _ => ConsumptionSeries::default(),
        }
    }

    /// Decodes `date|secondary|primary;...`.
    ///
    /// The primary field is the reading and the secondary field is kept
    /// verbatim as the tooltip. A two-field segment `date|value` uses the
    /// value for both.
    #[must_use]
    pub fn decode_delimited(&self, raw: &str) -> ConsumptionSeries {
        raw.split(SEGMENT_SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| self.segment_point(segment))
            .collect()
    }

    fn segment_point(&self, segment: &str) -> Option<ConsumptionPoint> {
        let fields: Vec<&str> = segment.split(FIELD_SEPARATOR).map(str::trim).collect();
        let (date, tooltip, reading) = match fields.as_slice() {
            [date, secondary, primary, ..] => (*date, *secondary, *primary),
            [date, value] => (*date, *value, *value),
            _ => {
                trace!(segment, "Dropping segment without a reading");
                return None;
            }
        };

        let Some(label) = self.label(&Value::String(date.to_string())) else {
            trace!(segment, "Dropping segment without a date");
            return None;
        };
        let Some(value) = parse_number(reading) else {
            trace!(segment, "Dropping segment with an unparsable reading");
            return None;
        };
        Some(ConsumptionPoint::new(label, value, tooltip))
    }

    fn tuple_point(&self, tuple: &[Value]) -> Option<ConsumptionPoint> {
        let label = tuple.first().and_then(|l| self.label(l));
        let value = tuple.get(2).and_then(value_number);
        match (label, value) {
            (Some(label), Some(value)) => Some(ConsumptionPoint::new(
                label,
                value,
                value_text(tuple.get(1)),
            )),
            _ => {
                trace!(?tuple, "Dropping malformed tuple");
                None
            }
        }
    }

    fn object_point(&self, record: &Value) -> Option<ConsumptionPoint> {
        let label = ObjectShape::first(record, self.shape.label_keys)
            .and_then(|l| self.label(l));
        let value = ObjectShape::first(record, self.shape.value_keys).and_then(value_number);
        match (label, value) {
            (Some(label), Some(value)) => {
                let tooltip = ObjectShape::first(record, self.shape.tooltip_keys)
                    .map(|t| value_text(Some(t)))
                    .unwrap_or_else(|| value.to_string());
                Some(ConsumptionPoint::new(label, value, tooltip))
            }
            _ => {
                trace!(%record, "Dropping malformed record");
                None
            }
        }
    }
}
