// Item Domain Model - the unit of work

use super::error::{DomainError, Result};
use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Item ID (32 hex chars when generated)
pub type ItemId = String;

/// A work item: a unique id plus an opaque byte payload.
///
/// The payload is always held as bytes, whatever form it was built from.
/// The id is always a string; non-string ids are stringified on the way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    data: Vec<u8>,
}

impl Item {
    /// Create an item with a freshly generated random id
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: generate_item_id(),
            data: data.into(),
        }
    }

    /// Create an item with an explicit id
    pub fn with_id(id: impl ToString, data: impl Into<Vec<u8>>) -> Result<Self> {
        let id = id.to_string();
        if id.is_empty() {
            return Err(DomainError::EmptyItemId);
        }
        Ok(Self {
            id,
            data: data.into(),
        })
    }

    /// Create an item whose payload is the JSON serialization of `value`
    pub fn from_json_data<T: Serialize + ?Sized>(
        value: &T,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    /// Same as [`Item::from_json_data`] with an explicit id
    pub fn from_json_data_with_id<T: Serialize + ?Sized>(
        id: impl ToString,
        value: &T,
    ) -> crate::error::Result<Self> {
        let data = serde_json::to_vec(value)?;
        Ok(Self::with_id(id, data)?)
    }

    /// Build an item from an envelope object with a `data` key and an
    /// optional `id` key.
    ///
    /// `data` may be a string or an array of byte values. `id` may be a
    /// string, number or bool; null or missing means "generate one".
    pub fn from_envelope(envelope: Value) -> Result<Self> {
        let Value::Object(mut fields) = envelope else {
            return Err(DomainError::InvalidEnvelope(
                "envelope must be a JSON object".to_string(),
            ));
        };

        let data = match fields.remove("data") {
            Some(data) => envelope_data(data)?,
            None => {
                return Err(DomainError::InvalidEnvelope(
                    "missing 'data' field".to_string(),
                ))
            }
        };

        match fields.remove("id") {
            None | Some(Value::Null) => Ok(Self::new(data)),
            Some(Value::String(id)) => Self::with_id(id, data),
            Some(Value::Number(id)) => Self::with_id(id, data),
            Some(Value::Bool(id)) => Self::with_id(id, data),
            Some(other) => Err(DomainError::InvalidEnvelope(format!(
                "'id' must be a string or number, got {}",
                other
            ))),
        }
    }

    /// Parse an item from an envelope in JSON text form
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        let envelope: Value = serde_json::from_str(s)?;
        Ok(Self::from_envelope(envelope)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// The payload parsed as JSON
    pub fn data_json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }

    /// Rebuild an item read back from the store. The id came out of a queue
    /// list, so it is not re-validated.
    pub(crate) fn from_store(id: ItemId, data: Vec<u8>) -> Self {
        Self { id, data }
    }
}

/// Generate a random 128-bit item id rendered as 32 lowercase hex chars
pub fn generate_item_id() -> ItemId {
    uuid::Uuid::new_v4().simple().to_string()
}

fn envelope_data(data: Value) -> Result<Vec<u8>> {
    match data {
        Value::String(text) => Ok(text.into_bytes()),
        Value::Array(values) => values
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| {
                        DomainError::InvalidEnvelope(format!("{} is not a byte value", v))
                    })
            })
            .collect(),
        other => Err(DomainError::InvalidEnvelope(format!(
            "'data' must be a string or byte array, got {}",
            other
        ))),
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Item", 2)?;
        state.serialize_field("id", &self.id)?;
        // Text payloads stay readable; anything else goes out as a byte array
        match std::str::from_utf8(&self.data) {
            Ok(text) => state.serialize_field("data", text)?,
            Err(_) => state.serialize_field("data", &self.data)?,
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let envelope = Value::deserialize(deserializer)?;
        Item::from_envelope(envelope).map_err(serde::de::Error::custom)
    }
}
