//! The variable value tree exchanged with Fleet.
//!
//! Responses tag values with `{type, value}` envelopes and replace secrets
//! with `{id, isSecretRef}` markers. Requests, the declared model and the
//! persisted secret store only ever hold plaintext, so there are two decode
//! paths: [`Value::from_response_json`] classifies objects into the closed
//! union, [`Value::from_plain_json`] never does.
//!
//! Envelopes are only recognized along the envelope chain: the variable's own
//! node, and the payload of an envelope whose kind is not structured. Below
//! that, an object with a `type` key is the user's data.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number};
use std::collections::{BTreeMap, BTreeSet};

/// Envelope kinds whose payload is a user document rather than another
/// envelope.
const STRUCTURED_KINDS: &[&str] = &["yaml", "object", "json"];

/// Variables by name. Ordered only so that serialized output is stable.
pub type VariableSet = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Sequence(Vec<Value>),
    Nested(VariableSet),
    /// `{"type": kind, "value": ...}`. A missing or null `value` is `None`.
    Envelope {
        kind: String,
        value: Option<Box<Value>>,
    },
    /// `{"id": id, "isSecretRef": true}`: the server holds the plaintext.
    SecretMarker { id: String },
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::String(s.into()))
    }

    pub fn marker(id: impl Into<String>) -> Self {
        Value::SecretMarker { id: id.into() }
    }

    pub fn envelope(kind: impl Into<String>, value: Option<Value>) -> Self {
        Value::Envelope {
            kind: kind.into(),
            value: value.map(Box::new),
        }
    }

    /// The reference id if this node is a secret marker.
    pub fn as_secret_ref(&self) -> Option<&str> {
        match self {
            Value::SecretMarker { id } => Some(id),
            _ => None,
        }
    }

    /// Decode one variable as received from the server.
    ///
    /// An object is tried as a secret marker first, then as an envelope, and
    /// falls back to a nested set whose contents are not classified again.
    pub fn from_response_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => classify_object(map),
            other => decode_payload(other),
        }
    }

    /// Decode a plaintext value. Objects are always nested sets.
    pub fn from_plain_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from_plain_json).collect())
            }
            serde_json::Value::Object(map) => Value::Nested(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_plain_json(v)))
                    .collect(),
            ),
            other => Value::Scalar(scalar_from_json(other)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Scalar(Scalar::Null) => serde_json::Value::Null,
            Value::Scalar(Scalar::Bool(b)) => serde_json::Value::Bool(*b),
            Value::Scalar(Scalar::Number(n)) => serde_json::Value::Number(n.clone()),
            Value::Scalar(Scalar::String(s)) => serde_json::Value::String(s.clone()),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Nested(set) => set_to_json(set),
            Value::Envelope { kind, value } => {
                let mut map = Map::new();
                map.insert("type".into(), serde_json::Value::String(kind.clone()));
                if let Some(inner) = value {
                    map.insert("value".into(), inner.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::SecretMarker { id } => serde_json::json!({ "id": id, "isSecretRef": true }),
        }
    }

    /// Collect the id of every secret marker reachable from this node.
    pub fn collect_secret_refs(&self, out: &mut BTreeSet<String>) {
        match self {
            Value::SecretMarker { id } => {
                out.insert(id.clone());
            }
            Value::Sequence(items) => items.iter().for_each(|v| v.collect_secret_refs(out)),
            Value::Nested(set) => set.values().for_each(|v| v.collect_secret_refs(out)),
            Value::Envelope {
                value: Some(inner), ..
            } => inner.collect_secret_refs(out),
            Value::Envelope { value: None, .. } | Value::Scalar(_) => {}
        }
    }
}

fn scalar_from_json(json: serde_json::Value) -> Scalar {
    match json {
        serde_json::Value::Bool(b) => Scalar::Bool(b),
        serde_json::Value::Number(n) => Scalar::Number(n),
        serde_json::Value::String(s) => Scalar::String(s),
        // Arrays and objects never reach here; both callers match them first.
        _ => Scalar::Null,
    }
}

fn marker_id(map: &Map<String, serde_json::Value>) -> Option<String> {
    if map.get("isSecretRef").and_then(|v| v.as_bool()) != Some(true) {
        return None;
    }
    match map.get("id") {
        Some(serde_json::Value::String(id)) => Some(id.clone()),
        _ => None,
    }
}

fn classify_object(mut map: Map<String, serde_json::Value>) -> Value {
    if let Some(id) = marker_id(&map) {
        return Value::SecretMarker { id };
    }

    let envelope_shaped = matches!(map.get("type"), Some(serde_json::Value::String(_)))
        && map.keys().all(|k| k == "type" || k == "value");
    if !envelope_shaped {
        return decode_payload(serde_json::Value::Object(map));
    }

    let kind = match map.remove("type") {
        Some(serde_json::Value::String(kind)) => kind,
        _ => String::new(),
    };
    let value = match map.remove("value") {
        None | Some(serde_json::Value::Null) => None,
        Some(inner) if STRUCTURED_KINDS.contains(&kind.as_str()) => {
            Some(Box::new(decode_payload(inner)))
        }
        Some(inner) => Some(Box::new(Value::from_response_json(inner))),
    };
    Value::Envelope { kind, value }
}

/// Data below the envelope chain: plaintext, except that secret markers are
/// still recognized wherever Fleet put them.
fn decode_payload(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Array(items) => {
            Value::Sequence(items.into_iter().map(decode_payload).collect())
        }
        serde_json::Value::Object(map) => match marker_id(&map) {
            Some(id) => Value::SecretMarker { id },
            None => Value::Nested(
                map.into_iter()
                    .map(|(k, v)| (k, decode_payload(v)))
                    .collect(),
            ),
        },
        other => Value::Scalar(scalar_from_json(other)),
    }
}

pub fn set_to_json(set: &VariableSet) -> serde_json::Value {
    serde_json::Value::Object(set.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Scalar(Scalar::Number(n.into()))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Deserializes with response classification. Fields holding plaintext use
/// the [`plain`] helpers instead.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_response_json)
    }
}

/// `deserialize_with` helpers for fields that only ever hold plaintext.
pub mod plain {
    use super::{Value, VariableSet};
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;

    pub fn set<'de, D: Deserializer<'de>>(deserializer: D) -> Result<VariableSet, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| (k, Value::from_plain_json(v)))
            .collect())
    }

    pub fn option_set<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<VariableSet>, D::Error> {
        let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
        Ok(raw.map(|map| {
            map.into_iter()
                .map(|(k, v)| (k, Value::from_plain_json(v)))
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn classifies_secret_marker() {
        let v = Value::from_response_json(json!({"id": "ref-1", "isSecretRef": true}));
        assert_eq!(v, Value::marker("ref-1"));
        assert_eq!(v.as_secret_ref(), Some("ref-1"));
    }

    #[test]
    fn marker_requires_true_flag() {
        let v = Value::from_response_json(json!({"id": "ref-1", "isSecretRef": false}));
        assert!(matches!(v, Value::Nested(_)));
    }

    #[test]
    fn classifies_envelope_with_and_without_value() {
        let v = Value::from_response_json(json!({"type": "text", "value": "abc"}));
        assert_eq!(v, Value::envelope("text", Some("abc".into())));

        let v = Value::from_response_json(json!({"type": "text"}));
        assert_eq!(v, Value::envelope("text", None));

        let v = Value::from_response_json(json!({"type": "text", "value": null}));
        assert_eq!(v, Value::envelope("text", None));
    }

    #[test]
    fn extra_keys_make_a_nested_set() {
        let v = Value::from_response_json(json!({"type": "text", "value": 1, "other": 2}));
        let Value::Nested(set) = v else {
            panic!("expected nested set");
        };
        assert_eq!(set.len(), 3);
        assert_eq!(set["value"], Value::from(1));
    }

    #[test]
    fn envelope_shapes_below_the_chain_stay_plaintext() {
        let cases = [
            // structured payloads are documents
            (
                json!({"type": "yaml", "value": {"type": "drop_event"}}),
                Value::envelope("yaml", Some(Value::from_plain_json(json!({"type": "drop_event"})))),
            ),
            (
                json!({"type": "object", "value": {"type": "a", "value": "b"}}),
                Value::envelope(
                    "object",
                    Some(Value::from_plain_json(json!({"type": "a", "value": "b"}))),
                ),
            ),
            // nested sets and sequence items are never envelopes
            (
                json!({"processor": {"type": "drop_event"}, "n": 1}),
                Value::from_plain_json(json!({"processor": {"type": "drop_event"}, "n": 1})),
            ),
            (
                json!({"type": "text", "value": [{"type": "a", "value": "b"}]}),
                Value::envelope(
                    "text",
                    Some(Value::from_plain_json(json!([{"type": "a", "value": "b"}]))),
                ),
            ),
            // a non-structured payload continues the chain
            (
                json!({"type": "password", "value": {"type": "text", "value": "x"}}),
                Value::envelope("password", Some(Value::envelope("text", Some("x".into())))),
            ),
        ];

        for (wire, expected) in cases {
            assert_eq!(Value::from_response_json(wire.clone()), expected, "wire {wire}");
        }
    }

    #[test]
    fn markers_are_recognized_inside_payloads() {
        let v = Value::from_response_json(json!({
            "type": "yaml",
            "value": {"user": "u", "password": {"id": "r1", "isSecretRef": true}}
        }));
        let Value::Envelope { value: Some(inner), .. } = v else {
            panic!("expected envelope");
        };
        let Value::Nested(set) = *inner else {
            panic!("expected nested payload");
        };
        assert_eq!(set["password"], Value::marker("r1"));
    }

    #[test]
    fn plain_decoding_never_classifies() {
        let v = Value::from_plain_json(json!({"type": "text", "value": "x"}));
        assert!(matches!(v, Value::Nested(_)));

        let v = Value::from_plain_json(json!({"id": "a", "isSecretRef": true}));
        assert!(matches!(v, Value::Nested(_)));
    }

    #[test]
    fn to_json_restores_wire_shapes() {
        let set: VariableSet = [
            ("a".to_string(), Value::envelope("text", Some("x".into()))),
            ("b".to_string(), Value::marker("r")),
            (
                "c".to_string(),
                Value::Sequence(vec![Value::from(1), Value::Scalar(Scalar::Null)]),
            ),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            set_to_json(&set),
            json!({
                "a": {"type": "text", "value": "x"},
                "b": {"id": "r", "isSecretRef": true},
                "c": [1, null]
            })
        );
    }

    #[test]
    fn collects_nested_secret_refs() {
        let v = Value::from_response_json(json!({
            "outer": {"type": "yaml", "value": {"id": "r1", "isSecretRef": true}},
            "list": [{"id": "r2", "isSecretRef": true}, "plain"]
        }));
        let mut refs = BTreeSet::new();
        v.collect_secret_refs(&mut refs);
        assert_eq!(
            refs.into_iter().collect::<Vec<_>>(),
            vec!["r1".to_string(), "r2".to_string()]
        );
    }

    #[test]
    fn plain_helper_reads_sets() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default, deserialize_with = "plain::option_set")]
            vars: Option<VariableSet>,
        }

        let h: Holder =
            serde_json::from_value(json!({"vars": {"k": {"type": "t", "value": 1}}})).unwrap();
        let vars = h.vars.unwrap();
        assert!(matches!(vars["k"], Value::Nested(_)));

        let h: Holder = serde_json::from_value(json!({})).unwrap();
        assert!(h.vars.is_none());
    }
}
