//! Identity types: measures, tags and tag tuples

use super::error::{Result, StatsError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maximum length of measure names, view names, tag keys and tag values
pub const MAX_NAME_LENGTH: usize = 255;

/// Value substituted for a view column that the tag context does not carry
pub const UNKNOWN_TAG_VALUE: &str = "unknown/not set";

/// Checks that `name` is printable ASCII and at most [`MAX_NAME_LENGTH`] long
pub(crate) fn validate_name(kind: &'static str, name: &str, allow_empty: bool) -> Result<()> {
    let reason = if name.is_empty() && !allow_empty {
        Some("must not be empty")
    } else if name.len() > MAX_NAME_LENGTH {
        Some("longer than 255 characters")
    } else if !name.bytes().all(|b| (b' '..=b'~').contains(&b)) {
        Some("contains non-printable characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StatsError::InvalidName {
            kind,
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Numeric kind of a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MeasureKind {
    /// 64-bit floating point values
    Double,
    /// 64-bit signed integer values
    Long,
}

/// A named, typed quantity the application reports
///
/// Identity is the name; two measures with the same name must be
/// structurally equal to coexist in one registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Measure {
    name: Arc<str>,
    description: Arc<str>,
    unit: Arc<str>,
    kind: MeasureKind,
}

impl Measure {
    /// Create a floating point measure
    pub fn double(name: &str, description: &str, unit: &str) -> Result<Self> {
        Self::new(name, description, unit, MeasureKind::Double)
    }

    /// Create an integer measure
    pub fn long(name: &str, description: &str, unit: &str) -> Result<Self> {
        Self::new(name, description, unit, MeasureKind::Long)
    }

    pub fn new(name: &str, description: &str, unit: &str, kind: MeasureKind) -> Result<Self> {
        validate_name("measure", name, false)?;
        Ok(Measure {
            name: name.into(),
            description: description.into(),
            unit: unit.into(),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn kind(&self) -> MeasureKind {
        self.kind
    }
}

/// Value recorded against a measure
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MeasureValue {
    Double(f64),
    Long(i64),
}

impl MeasureValue {
    /// Get as f64, converting if necessary
    pub fn as_f64(&self) -> f64 {
        match self {
            MeasureValue::Double(d) => *d,
            MeasureValue::Long(l) => *l as f64,
        }
    }

    /// Get as i64, truncating doubles
    pub fn as_i64(&self) -> i64 {
        match self {
            MeasureValue::Double(d) => *d as i64,
            MeasureValue::Long(l) => *l,
        }
    }
}

impl From<i64> for MeasureValue {
    fn from(v: i64) -> Self {
        MeasureValue::Long(v)
    }
}

impl From<f64> for MeasureValue {
    fn from(v: f64) -> Self {
        MeasureValue::Double(v)
    }
}

/// One value of a recorded batch
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub measure: Measure,
    pub value: MeasureValue,
}

impl Measurement {
    pub fn new(measure: Measure, value: MeasureValue) -> Self {
        Measurement { measure, value }
    }
}

/// Tag key, validated and cheap to clone
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TagKey(Arc<str>);

impl TagKey {
    pub fn new(name: &str) -> Result<Self> {
        validate_name("tag key", name, false)?;
        Ok(TagKey(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag value, validated and cheap to clone. May be empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TagValue(Arc<str>);

impl TagValue {
    pub fn new(value: &str) -> Result<Self> {
        validate_name("tag value", value, true)?;
        Ok(TagValue(value.into()))
    }

    /// Sentinel for a column missing from the tag context
    pub fn unknown() -> Self {
        TagValue(UNKNOWN_TAG_VALUE.into())
    }

    pub fn is_unknown(&self) -> bool {
        &*self.0 == UNKNOWN_TAG_VALUE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of tags (key-value pairs) with unique keys
/// Tags are stored in sorted order so equal contexts compare equal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagContext {
    tags: BTreeMap<TagKey, TagValue>,
}

impl TagContext {
    pub fn new(tags: BTreeMap<TagKey, TagValue>) -> Self {
        TagContext { tags }
    }

    /// Create an empty TagContext
    pub fn empty() -> Self {
        TagContext::default()
    }

    /// Create TagContext from slice of (key, value) tuples.
    /// A repeated key keeps its last value.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut tags = BTreeMap::new();
        for (k, v) in pairs {
            tags.insert(TagKey::new(k)?, TagValue::new(v)?);
        }
        Ok(Self::new(tags))
    }

    /// Get a specific tag value
    pub fn get(&self, key: &TagKey) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Resolve the values for `columns` in order, substituting the
    /// unknown sentinel for keys this context does not carry
    pub fn tuple_for(&self, columns: &[TagKey]) -> TagTuple {
        TagTuple(
            columns
                .iter()
                .map(|key| self.get(key).cloned().unwrap_or_else(TagValue::unknown))
                .collect(),
        )
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Ordered tag values matching a view's columns; the per-series grouping key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TagTuple(Vec<TagValue>);

impl TagTuple {
    pub fn new(values: Vec<TagValue>) -> Self {
        TagTuple(values)
    }

    pub fn values(&self) -> &[TagValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TagTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(TagValue::as_str).collect();
        write!(f, "[{}]", joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_context_creation() {
        let tags = TagContext::from_pairs(&[("host", "web01"), ("env", "prod")]).unwrap();
        let host = TagKey::new("host").unwrap();
        let missing = TagKey::new("missing").unwrap();
        assert_eq!(tags.get(&host).map(TagValue::as_str), Some("web01"));
        assert_eq!(tags.get(&missing), None);
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_tag_context_order_independent() {
        let a = TagContext::from_pairs(&[("a", "1"), ("b", "2")]).unwrap();
        let b = TagContext::from_pairs(&[("b", "2"), ("a", "1")]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tuple_for_substitutes_unknown() {
        let tags = TagContext::from_pairs(&[("method", "GET")]).unwrap();
        let columns = vec![TagKey::new("method").unwrap(), TagKey::new("status").unwrap()];

        let tuple = tags.tuple_for(&columns);
        assert_eq!(tuple.len(), 2);
        assert_eq!(tuple.values()[0].as_str(), "GET");
        assert!(tuple.values()[1].is_unknown());
    }

    #[test]
    fn test_name_validation() {
        assert!(Measure::double("rpc/latency", "", "ms").is_ok());
        assert!(Measure::double("", "", "ms").is_err());
        assert!(Measure::double("caf\u{e9}", "", "ms").is_err());
        assert!(TagKey::new(&"k".repeat(256)).is_err());
        assert!(TagKey::new(&"k".repeat(255)).is_ok());
        assert!(TagValue::new("").is_ok());
        assert!(TagValue::new("tab\there").is_err());
    }

    #[test]
    fn test_measure_value_conversions() {
        let long = MeasureValue::from(42i64);
        assert_eq!(long.as_f64(), 42.0);

        let double = MeasureValue::from(3.75);
        assert_eq!(double.as_i64(), 3);
        assert_eq!(double.as_f64(), 3.75);
    }
}
