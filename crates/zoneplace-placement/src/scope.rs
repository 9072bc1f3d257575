//! Zone-configuration scope decoding.
//!
//! Two JSON shapes are accepted:
//!
//! ```text
//! ["+ssd", "-region=east"]                          uniform: every replica
//! {"[\"+ssd\",\"+region=west\"]": 2,
//!  "[\"+region=east\"]": 1}                        per group: `count` replicas each
//! ```
//!
//! The shape is decided once here and carried as a [`ScopeSpec`]; nothing
//! downstream looks at JSON again. Object keys keep their document order.

use std::str::FromStr;

use serde_json::Value;
use zoneplace_state::{ConstraintRule, ConstraintType, LabelKind};

use crate::error::CompileError;

/// One `+key=value` / `-key` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub constraint_type: ConstraintType,
    pub key: String,
    pub value: Option<String>,
}

impl Selector {
    /// Parse a selector. Zone-configuration selectors use the locality
    /// separator (`=`).
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        let trimmed = text.trim();
        let (constraint_type, body) = if let Some(rest) = trimmed.strip_prefix('+') {
            (ConstraintType::Required, rest)
        } else if let Some(rest) = trimmed.strip_prefix('-') {
            (ConstraintType::Prohibited, rest)
        } else {
            return Err(CompileError::MalformedSelector(text.to_string()));
        };
        let (key, value) = parse_label(body, LabelKind::Locality.separator())
            .map_err(|_| CompileError::MalformedSelector(text.to_string()))?;
        Ok(Self {
            constraint_type,
            key,
            value,
        })
    }

    pub fn to_rule(&self) -> ConstraintRule {
        ConstraintRule {
            constraint_type: self.constraint_type,
            label_key: self.key.clone(),
            label_value: self.value.clone(),
        }
    }
}

impl FromStr for Selector {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

/// Split `key<sep>value` or a bare `key`.
///
/// Exactly one or two non-empty tokens are accepted; anything else is
/// malformed. Tokens are trimmed.
pub fn parse_label(text: &str, separator: char) -> Result<(String, Option<String>), CompileError> {
    let tokens: Vec<&str> = text.split(separator).map(str::trim).collect();
    match tokens.as_slice() {
        [key] if !key.is_empty() => Ok((key.to_string(), None)),
        [key, value] if !key.is_empty() && !value.is_empty() => {
            Ok((key.to_string(), Some(value.to_string())))
        }
        _ => Err(CompileError::MalformedSelector(text.to_string())),
    }
}

/// A decoded constraint scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSpec {
    /// The same selectors apply to every replica of every range.
    Uniform(Vec<Selector>),
    /// Each selector list applies to `count` replicas per range, in order.
    PerGroup(Vec<(Vec<Selector>, u32)>),
}

impl ScopeSpec {
    /// Decode a zone-configuration string.
    ///
    /// An empty string or `null` means "no constraints".
    pub fn parse(json: &str) -> Result<Self, CompileError> {
        if json.trim().is_empty() {
            return Ok(ScopeSpec::Uniform(Vec::new()));
        }
        let value: Value =
            serde_json::from_str(json).map_err(|e| CompileError::MalformedJson(e.to_string()))?;
        match value {
            Value::Null => Ok(ScopeSpec::Uniform(Vec::new())),
            Value::Array(items) => Ok(ScopeSpec::Uniform(selectors(&items)?)),
            Value::Object(map) => {
                let mut groups = Vec::with_capacity(map.len());
                for (key, count) in map {
                    let inner: Value = serde_json::from_str(&key).map_err(|e| {
                        CompileError::MalformedJson(format!("group key {key:?}: {e}"))
                    })?;
                    let Value::Array(items) = inner else {
                        return Err(CompileError::UnsupportedShape(format!(
                            "group key {key:?} is not a JSON array"
                        )));
                    };
                    let count = count
                        .as_u64()
                        .and_then(|c| u32::try_from(c).ok())
                        .ok_or_else(|| {
                            CompileError::UnsupportedShape(format!(
                                "replica count for {key:?} must be a non-negative integer, got {count}"
                            ))
                        })?;
                    groups.push((selectors(&items)?, count));
                }
                Ok(ScopeSpec::PerGroup(groups))
            }
            other => Err(CompileError::UnsupportedShape(format!(
                "expected an array or object, got {other}"
            ))),
        }
    }

    /// Replicas per range that carry at least a (possibly empty) group's
    /// selectors. `None` for uniform scope, which covers every replica.
    pub fn constrained_replicas(&self) -> Option<u64> {
        match self {
            ScopeSpec::Uniform(_) => None,
            ScopeSpec::PerGroup(groups) => Some(groups.iter().map(|(_, c)| u64::from(*c)).sum()),
        }
    }
}

fn selectors(items: &[Value]) -> Result<Vec<Selector>, CompileError> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Selector::parse(s),
            other => Err(CompileError::UnsupportedShape(format!(
                "selector must be a string, got {other}"
            ))),
        })
        .collect()
}
