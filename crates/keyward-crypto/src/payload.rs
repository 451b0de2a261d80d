// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed plaintext accepted by the encryption service.

use keyward_core::KeywardError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use zeroize::Zeroizing;

/// Which [`Payload`] variant a blob decrypts back into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Text,
    Object,
    Binary,
}

/// Plaintext handed to or returned from the encryption service.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 text.
    Text(String),
    /// A JSON object or array. Scalars are rejected.
    Object(Value),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl Payload {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Text(_) => DataType::Text,
            Self::Object(_) => DataType::Object,
            Self::Binary(_) => DataType::Binary,
        }
    }

    /// Serialized plaintext bytes. `Object` payloads must be a JSON object
    /// or array.
    pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, KeywardError> {
        match self {
            Self::Text(text) => Ok(Zeroizing::new(text.as_bytes().to_vec())),
            Self::Object(value @ (Value::Object(_) | Value::Array(_))) => serde_json::to_vec(value)
                .map(Zeroizing::new)
                .map_err(|e| KeywardError::Validation(format!("object payload: {e}"))),
            Self::Object(other) => Err(KeywardError::Validation(format!(
                "object payload must be a JSON object or array, got {}",
                json_kind(other)
            ))),
            Self::Binary(bytes) => Ok(Zeroizing::new(bytes.clone())),
        }
    }

    /// Rebuild a payload of `data_type` from decrypted bytes.
    pub(crate) fn from_bytes(bytes: Vec<u8>, data_type: DataType) -> Result<Self, KeywardError> {
        match data_type {
            DataType::Text => String::from_utf8(bytes).map(Self::Text).map_err(|e| {
                drop(Zeroizing::new(e.into_bytes()));
                KeywardError::InvalidFormat("decrypted data is not valid UTF-8".into())
            }),
            DataType::Object => {
                let bytes = Zeroizing::new(bytes);
                let value: Value = serde_json::from_slice(&bytes).map_err(|_| {
                    KeywardError::InvalidFormat("decrypted data is not valid JSON".into())
                })?;
                Ok(Self::Object(value))
            }
            DataType::Binary => Ok(Self::Binary(bytes)),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
