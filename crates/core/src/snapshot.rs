//! Semantic snapshot: the oracle's resolved view of a document.
//!
//! The value carries no positions. Every accessor fails closed: asking a
//! scalar for a key, or a mapping for an index, yields [`SemanticValue::Absent`]
//! instead of an error, so rules can chain lookups without shape checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SemanticValue {
    Mapping(BTreeMap<String, SemanticValue>),
    Sequence(Vec<SemanticValue>),
    Scalar(String),
    Absent,
}

static ABSENT: SemanticValue = SemanticValue::Absent;

impl SemanticValue {
    /// Parse oracle output. Empty or whitespace-only input is `None`.
    pub fn from_json_str(text: &str) -> Result<Option<Self>, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value = serde_json::from_str(text)?;
        Ok(Some(Self::from(value)))
    }

    pub fn get(&self, key: &str) -> &SemanticValue {
        match self {
            SemanticValue::Mapping(map) => map.get(key).unwrap_or(&ABSENT),
            _ => &ABSENT,
        }
    }

    pub fn index(&self, i: usize) -> &SemanticValue {
        match self {
            SemanticValue::Sequence(items) => items.get(i).unwrap_or(&ABSENT),
            _ => &ABSENT,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SemanticValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The scalar value if it has visible content.
    pub fn non_empty_str(&self) -> Option<&str> {
        self.as_str().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Items of a sequence; empty for anything else.
    pub fn as_sequence(&self) -> &[SemanticValue] {
        match self {
            SemanticValue::Sequence(items) => items,
            _ => &[],
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, SemanticValue::Absent)
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, SemanticValue::Mapping(_))
    }
}

impl From<serde_json::Value> for SemanticValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SemanticValue::Absent,
            serde_json::Value::Bool(b) => SemanticValue::Scalar(b.to_string()),
            serde_json::Value::Number(n) => SemanticValue::Scalar(n.to_string()),
            serde_json::Value::String(s) => SemanticValue::Scalar(s),
            serde_json::Value::Array(items) => {
                SemanticValue::Sequence(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => SemanticValue::Mapping(
                map.into_iter().map(|(k, v)| (k, Self::from(v))).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_fail_closed() {
        let value = SemanticValue::from(json!({
            "name": "platform",
            "blocks": [{ "name": "alpha", "replicas": 3 }],
            "empty": null
        }));
        assert_eq!(value.get("name").as_str(), Some("platform"));
        assert_eq!(value.get("blocks").index(0).get("replicas").as_str(), Some("3"));
        assert!(value.get("name").get("nested").is_absent());
        assert!(value.get("blocks").index(9).is_absent());
        assert!(value.get("empty").is_absent());
        assert!(value.get("name").as_sequence().is_empty());
    }

    #[test]
    fn empty_output_is_no_snapshot() {
        assert_eq!(SemanticValue::from_json_str("  \n").unwrap(), None);
        assert!(SemanticValue::from_json_str("{not json").is_err());
    }

    #[test]
    fn blank_scalars_are_not_content() {
        let value = SemanticValue::from(json!({ "name": "   " }));
        assert_eq!(value.get("name").non_empty_str(), None);
    }
}
