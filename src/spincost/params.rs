//! Parameter bag shared by every variant of a recalculation job.
//!
//! The bag is a flat mapping from parameter name to a 64-bit float,
//! normalized once at construction: JSON integers and floats coerce to
//! `f64`, anything else is a caller error. Evaluators never mutate it;
//! one `Arc<ParamBag>` is shared across all workers for the lifetime
//! of a job.
//!
//! The bag also defines the job's `version_hash`: SHA-256 of the
//! canonical JSON form (keys in lexicographic order, compact
//! separators, numbers in their shortest double-precision form),
//! rendered as lowercase hex. Two jobs with identical bags produce
//! identical hashes.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Parameter names that the calculator reads directly.
pub const MATERIAL_COST_KEY: &str = "material_cost";
pub const OVERHEAD_PERCENTAGE_KEY: &str = "overhead_percentage";

/// Default overhead fraction applied when the bag has no
/// `overhead_percentage` entry.
pub const DEFAULT_OVERHEAD_PERCENTAGE: f64 = 0.1;

/// Errors raised while building a parameter bag from JSON input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamBagError {
    /// The supplied JSON value was not an object
    #[error("parameter bag must be a JSON object, got {actual}")]
    NotAnObject { actual: String },

    /// An entry held a value that is not a JSON number
    #[error("parameter '{key}' must be numeric, got {actual}")]
    NonNumericValue { key: String, actual: String },
}

/// Immutable name → value mapping for one recalculation job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamBag {
    values: BTreeMap<String, f64>,
}

impl ParamBag {
    /// Build a bag from a JSON object, coercing every number to `f64`.
    ///
    /// Integers and floats are accepted; strings, booleans, nulls,
    /// arrays, and nested objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ParamBagError> {
        let object = value.as_object().ok_or_else(|| ParamBagError::NotAnObject {
            actual: json_kind(value).to_string(),
        })?;

        let mut values = BTreeMap::new();
        for (key, entry) in object {
            let number = entry
                .as_f64()
                .ok_or_else(|| ParamBagError::NonNumericValue {
                    key: key.clone(),
                    actual: json_kind(entry).to_string(),
                })?;
            values.insert(key.clone(), number);
        }

        Ok(Self { values })
    }

    /// Build a bag directly from name/value pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            values: entries.into_iter().collect(),
        }
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Look up a parameter, falling back to a default when absent.
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Canonical JSON serialization of the bag.
    ///
    /// Keys come out in lexicographic order with compact separators;
    /// numbers use serde_json's shortest-round-trip formatting, so
    /// parse followed by re-serialization is the identity.
    pub fn canonical_json(&self) -> String {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.values {
            let number = serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
            map.insert(key.clone(), number);
        }
        serde_json::Value::Object(map).to_string()
    }

    /// SHA-256 of the canonical JSON, as lowercase hex.
    ///
    /// A deterministic function of the bag contents alone; every
    /// summary written by one job carries the same hash.
    pub fn version_hash(&self) -> String {
        let digest = Sha256::digest(self.canonical_json().as_bytes());
        let mut hex = String::with_capacity(64);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
