// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field-level encryption of JSON objects.
//!
//! Only fields mapped to [`FieldAction::Encrypt`] are touched. An encrypted
//! field's value is replaced by the JSON form of its `EncryptedBlob`.

use std::collections::HashMap;

use keyward_core::KeywardError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What to do with a named field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAction {
    Encrypt,
    Plain,
}

/// Field name to action. Fields not listed pass through unchanged.
pub type FieldMap = HashMap<String, FieldAction>;

/// Build a map that encrypts exactly `names`.
pub fn encrypt_only<I, S>(names: I) -> FieldMap
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(|name| (name.into(), FieldAction::Encrypt))
        .collect()
}

/// Copy `object`, replacing every present `Encrypt` field with `transform`'s
/// output. Absent fields are skipped.
pub(crate) fn transform<F>(
    object: &Value,
    fields: &FieldMap,
    mut transform: F,
) -> Result<Value, KeywardError>
where
    F: FnMut(&str, &Value) -> Result<Value, KeywardError>,
{
    let Value::Object(source) = object else {
        return Err(KeywardError::Validation(
            "field encryption requires a JSON object".into(),
        ));
    };

    let mut out = Map::with_capacity(source.len());
    for (name, value) in source {
        let replaced = match fields.get(name) {
            Some(FieldAction::Encrypt) => transform(name, value)?,
            Some(FieldAction::Plain) | None => value.clone(),
        };
        out.insert(name.clone(), replaced);
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_marked_fields_are_transformed() {
        let mut map = encrypt_only(["secret"]);
        map.insert("label".into(), FieldAction::Plain);
        let input = json!({ "secret": "s3cr3t", "label": "prod", "other": 1 });

        let out = transform(&input, &map, |_, _| Ok(json!("<sealed>"))).unwrap();
        assert_eq!(out, json!({ "secret": "<sealed>", "label": "prod", "other": 1 }));
    }

    #[test]
    fn missing_fields_are_skipped() {
        let map = encrypt_only(["absent"]);
        let input = json!({ "present": true });
        let out = transform(&input, &map, |_, _| unreachable!()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn non_object_is_rejected() {
        let err = transform(&json!([1]), &FieldMap::new(), |_, v| Ok(v.clone())).unwrap_err();
        assert!(matches!(err, KeywardError::Validation(_)));
    }

    #[test]
    fn field_actions_parse_lowercase() {
        let map: FieldMap = serde_json::from_value(json!({ "a": "encrypt", "b": "plain" })).unwrap();
        assert_eq!(map["a"], FieldAction::Encrypt);
        assert_eq!(map["b"], FieldAction::Plain);
    }
}
