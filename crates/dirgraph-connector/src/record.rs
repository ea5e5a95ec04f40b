//! Raw directory record types
//!
//! Records arrive from the directory client already parsed into named
//! attributes. Values keep whatever shape the client produced: most are
//! sequences even when the attribute is single-valued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of security principal enumerated from the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Machine,
    Group,
}

impl PrincipalKind {
    /// All kinds, in the order they are ingested.
    pub const ALL: [PrincipalKind; 3] = [Self::User, Self::Machine, Self::Group];

    /// Stable lowercase name used in logs and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Machine => "machine",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "machine" => Ok(Self::Machine),
            "group" => Ok(Self::Group),
            _ => Err(format!("Unknown principal kind: {}", s)),
        }
    }
}

/// One directory object as attribute name to value.
///
/// Attribute names compare case-insensitively, as they do in the directory:
/// `sAMAccountName` and `samaccountname` are the same attribute. Names are
/// folded to ASCII lowercase on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, AttributeValue>",
    into = "BTreeMap<String, AttributeValue>"
)]
pub struct AttributeSet {
    attributes: BTreeMap<String, AttributeValue>,
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        self.attributes.insert(fold(&name), value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(&fold(name))
    }

    /// Value of an attribute stored as a plain string.
    ///
    /// A one-element sequence is not a plain string; use
    /// [`get_strings`](Self::get_strings) for those.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_string)
    }

    /// String values of an attribute, whether stored single or multi-valued.
    /// Non-string elements are ignored.
    pub fn get_strings(&self, name: &str) -> Vec<&str> {
        match self.get(name) {
            Some(AttributeValue::String(s)) => vec![s.as_str()],
            Some(AttributeValue::Array(values)) => {
                values.iter().filter_map(AttributeValue::as_string).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(&fold(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(&fold(name))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(name, value)| (fold(&name), value))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeSet {
    fn from(attributes: BTreeMap<String, AttributeValue>) -> Self {
        attributes.into_iter().collect()
    }
}

impl From<AttributeSet> for BTreeMap<String, AttributeValue> {
    fn from(set: AttributeSet) -> Self {
        set.attributes
    }
}

/// Raw value of one attribute, in whatever shape the directory client
/// produced. Most attributes arrive as [`Array`](Self::Array) even when
/// single-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    String(String),
    Integer(i64),
    Boolean(bool),
    /// A time the client already resolved to calendar time.
    Timestamp(DateTime<Utc>),
    /// Binary data such as `objectGUID` or `objectSid`.
    Binary(Vec<u8>),
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The string, if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is a single integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i as i64)
    }
}

impl From<u32> for AttributeValue {
    fn from(i: u32) -> Self {
        AttributeValue::Integer(i as i64)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(t: DateTime<Utc>) -> Self {
        AttributeValue::Timestamp(t)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(values: Vec<&str>) -> Self {
        AttributeValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(values: Vec<AttributeValue>) -> Self {
        AttributeValue::Array(values)
    }
}
