//! Declarative normalization of backend records.
//!
//! The backend spells the same logical field differently across endpoints
//! (`nom`, `Nom`, `NOM`) or nests it under different parents. Instead of
//! scattering fallbacks over call sites, each endpoint declares its
//! [`FieldMap`]s once: a target name plus the source keys to try, in order.
//! Source keys may be dotted paths (`adresse.ville`).

use serde_json::{Map, Value};

/// One normalized field and the source keys it may come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldMap {
    /// Name of the field in the normalized record.
    pub target: &'static str,
    /// Source keys tried in order; the first non-null match wins.
    pub sources: &'static [&'static str],
}

impl FieldMap {
    /// Creates a field mapping.
    #[must_use]
    pub const fn new(target: &'static str, sources: &'static [&'static str]) -> Self {
        Self { target, sources }
    }

    /// Resolves this field on `record`.
    #[must_use]
    pub fn resolve<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        pick(record, self.sources)
    }

    /// Builds a normalized object from `record` using `fields`.
    ///
    /// Fields without any matching source are omitted.
    #[must_use]
    pub fn normalize(record: &Value, fields: &[Self]) -> Value {
        let mut out = Map::new();
        for field in fields {
            if let Some(value) = field.resolve(record) {
                out.insert(field.target.to_string(), value.clone());
            }
        }
        Value::Object(out)
    }
}

/// Returns the first non-null value found under any of `keys`.
#[must_use]
pub fn pick<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| lookup(record, key))
        .find(|value| !value.is_null())
}

/// Like [`pick`], but renders the value as a string.
///
/// Strings are returned as-is, numbers and booleans are formatted.
#[must_use]
pub fn pick_str(record: &Value, keys: &[&str]) -> Option<String> {
    pick(record, keys).and_then(|value| match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |current, part| current.as_object()?.get(part))
}
