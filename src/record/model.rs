//! Record model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Unique, stable key of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A line on an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: u32,
    /// Line price in cents
    pub price: i64,
}

/// One entry of the synchronized collection
///
/// Identity is `id` alone; every other field is payload that an update
/// replaces wholesale. The backend keys orders by their sort key, so `sk` is
/// the key when `id` is absent; numeric keys become strings.
///
/// Decoding is lenient: a field whose value does not fit its typed slot
/// (a fractional `total`, say) stays in `extra` instead of failing the
/// record. `extra` also holds every unmodelled field, and all of it
/// round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Order total in cents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<LineItem>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Create a record with only an id
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            status: None,
            total: None,
            created: None,
            first_name: None,
            last_name: None,
            items: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_total(mut self, cents: i64) -> Self {
        self.total = Some(cents);
        self
    }

    /// Customer display name, when both parts are present
    pub fn customer_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(name), None) | (None, Some(name)) => Some(name.clone()),
            (None, None) => None,
        }
    }

    /// Sum of line prices in cents
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(|item| item.price).sum()
    }

    /// Build a record from a decoded JSON object
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self, DecodeError> {
        let id = take_key(&mut object)?;

        Ok(Self {
            id,
            status: take_typed(&mut object, "status"),
            total: take_typed(&mut object, "total"),
            created: take_typed(&mut object, "created"),
            first_name: take_typed(&mut object, "firstName"),
            last_name: take_typed(&mut object, "lastName"),
            items: take_typed(&mut object, "items").unwrap_or_default(),
            extra: object,
        })
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = Map::deserialize(deserializer)?;
        Record::from_object(object).map_err(de::Error::custom)
    }
}

/// Key as a string, if `value` can serve as one
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Remove the record key from `object`: `id` first, then `sk`.
///
/// An `sk` that is not used as the key stays in the object.
fn take_key(object: &mut Map<String, Value>) -> Result<RecordId, DecodeError> {
    if let Some(id) = object.get("id").and_then(key_text) {
        object.remove("id");
        return Ok(RecordId(id));
    }
    if let Some(sk) = object.get("sk").and_then(key_text) {
        object.remove("sk");
        // an unusable `id` would otherwise be written out next to the key
        object.remove("id");
        return Ok(RecordId(sk));
    }

    match object.get("id").or_else(|| object.get("sk")) {
        Some(other) => Err(DecodeError::InvalidRecord(format!(
            "record key must be a string or number, got {}",
            other
        ))),
        None => Err(DecodeError::MissingId),
    }
}

/// Move `key` into a typed slot; a value that does not fit stays in `object`
fn take_typed<T: DeserializeOwned>(object: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = object.remove(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(typed) => Some(typed),
        Err(_) => {
            object.insert(key.to_string(), value);
            None
        }
    }
}
