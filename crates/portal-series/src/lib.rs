#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Consumption series decoding for the metering portal.
//!
//! Everything here is pure: no I/O and no dependency on the cache. Decoding
//! never fails; malformed input only makes the series shorter.

/// Category alignment of two series.
pub mod align;
/// Shape detection and decoding.
pub mod decode;
/// Field-level parsing.
pub mod parse;
/// Points and series.
pub mod point;

pub use align::{AlignedSeries, SeriesPresence, align};
pub use decode::{FIELD_SEPARATOR, ObjectShape, SEGMENT_SEPARATOR, SeriesDecoder};
pub use parse::{LABEL_DATE_FORMAT, format_label, format_label_str, parse_number};
pub use point::{ConsumptionPoint, ConsumptionSeries};
