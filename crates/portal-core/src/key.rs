//! Structural cache keys.
//!
//! A [`CacheKey`] is an ordered list of [`KeySegment`]s such as
//! `["logements", 42, "interventions"]`. Segments are normalized on creation so
//! that a number and its string form compare equal: `42`, `42.0` and `"42"`
//! all produce the segment `"42"`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One normalized segment of a [`CacheKey`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySegment(String);

impl KeySegment {
    /// Returns the normalized segment as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_f64(value: f64) -> Self {
        // Integral floats collapse onto their integer spelling.
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Self((value as i64).to_string())
        } else {
            Self(value.to_string())
        }
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&String> for KeySegment {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl From<f64> for KeySegment {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

impl From<bool> for KeySegment {
    fn from(value: bool) -> Self {
        Self(value.to_string())
    }
}

macro_rules! integer_segment {
    ($($t:ty),*) => {
        $(
            impl From<$t> for KeySegment {
                fn from(value: $t) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

integer_segment!(i32, i64, u32, u64, usize);

impl Serialize for KeySegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Any JSON primitive accepted as a segment when reading persisted keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSegment {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl<'de> Deserialize<'de> for KeySegment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawSegment::deserialize(deserializer)? {
            RawSegment::Text(s) => Self(s),
            RawSegment::Int(i) => Self::from(i),
            RawSegment::Float(f) => Self::from(f),
            RawSegment::Bool(b) => Self::from(b),
        })
    }
}

/// Ordered cache key compared structurally, segment by segment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<KeySegment>);

impl CacheKey {
    /// Creates a key with a single leading namespace segment.
    #[must_use]
    pub fn new(namespace: impl Into<KeySegment>) -> Self {
        Self(vec![namespace.into()])
    }

    /// Appends a segment, returning the extended key.
    #[must_use]
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Returns the leading segment, which names the key's namespace.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.0.first().map(KeySegment::as_str)
    }

    /// Returns the segments of this key.
    #[must_use]
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `prefix` matches the first segments of this key.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}

impl FromIterator<KeySegment> for CacheKey {
    fn from_iter<I: IntoIterator<Item = KeySegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Builds a [`CacheKey`] from heterogeneous segments.
///
/// ```
/// use portal_core::cache_key;
///
/// let key = cache_key!["logements", 42, "interventions"];
/// assert_eq!(key, cache_key!["logements", "42", "interventions"]);
/// ```
#[macro_export]
macro_rules! cache_key {
    ($($segment:expr),* $(,)?) => {
        <$crate::CacheKey as ::core::iter::FromIterator<$crate::KeySegment>>::from_iter(
            [$($crate::KeySegment::from($segment)),*]
        )
    };
}
