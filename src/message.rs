//! Generic message envelope carried inside every frame.
//!
//! A [`Message`] is a JSON object with a string `type` tag and an open set of
//! further fields. The codec only ever sees this envelope; the typed request
//! and reply vocabulary in [`crate::protocol`] is layered on top through
//! [`Message::from_payload`] and [`Message::to_payload`].

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Name of the tag field present on every message.
pub const TYPE_FIELD: &str = "type";

/// Name of the optional correlation field copied from requests to replies.
pub const REQUEST_ID_FIELD: &str = "request_id";

/// Timestamps exchanged on the wire, always UTC.
pub type Timestamp = DateTime<Utc>;

/// Current time truncated to microseconds, the precision used on the wire.
#[must_use]
pub fn now() -> Timestamp { Utc::now().trunc_subsecs(6) }

/// A decoded frame payload: a `type` tag plus arbitrary JSON fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Message {
    /// Create a message with the given `type` and no other fields.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Builder form of [`Message::insert`].
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field, returning the previous value.
    ///
    /// The `type` tag is not a field; attempts to insert it are ignored so
    /// the encoded object never carries the key twice.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        if key == TYPE_FIELD {
            return None;
        }
        self.fields.insert(key, value.into())
    }

    /// The `type` tag.
    #[must_use]
    pub fn kind(&self) -> &str { &self.kind }

    /// Look up a field other than `type`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> { self.fields.get(key) }

    /// Look up a string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> { self.get(key).and_then(Value::as_str) }

    /// All fields other than `type`.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> { &self.fields }

    /// Correlation identifier, if the sender stamped one.
    #[must_use]
    pub fn request_id(&self) -> Option<u64> { self.get(REQUEST_ID_FIELD).and_then(Value::as_u64) }

    /// Stamp or clear the correlation identifier.
    pub fn set_request_id(&mut self, request_id: Option<u64>) {
        match request_id {
            Some(id) => {
                self.fields.insert(REQUEST_ID_FIELD.to_owned(), Value::from(id));
            }
            None => {
                self.fields.remove(REQUEST_ID_FIELD);
            }
        }
    }

    /// Build an envelope from a typed payload that serializes to an object
    /// with a string `type` field.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload does not serialize to
    /// such an object.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(payload)?)
    }

    /// Interpret the envelope as a typed payload.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the fields do not match `T`.
    pub fn to_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    /// Serialize to the UTF-8 JSON bytes carried in a frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> { serde_json::to_vec(self) }

    /// Parse frame payload bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] unless `bytes` hold a JSON object with
    /// a string `type` field.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Serde adapter for wire timestamps.
///
/// Writes RFC 3339 in UTC with microsecond precision. Reads RFC 3339 with any
/// offset, and also naive ISO-8601 date-times (no offset), which are taken to
/// be UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use super::Timestamp;

    /// Serialize a [`Timestamp`].
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    /// Render a [`Timestamp`] the way it is written on the wire.
    #[must_use]
    pub fn format(value: &Timestamp) -> String { value.to_rfc3339_opts(SecondsFormat::Micros, true) }

    /// Deserialize a [`Timestamp`].
    ///
    /// # Errors
    ///
    /// Fails if the string is neither RFC 3339 nor a naive ISO-8601 date-time.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    /// Parse a wire timestamp.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Timestamp> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
