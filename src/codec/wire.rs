//! Flat wire format for value graphs.
//!
//! A message is a JSON array `[root, node_1, node_2, ...]`. `root` is a slot;
//! every other entry is a node.
//!
//! | Slot | Meaning |
//! |------|---------|
//! | number, `true`, `false`, `null` | itself |
//! | `[]` | the absent marker |
//! | `"N"` | reference to node `N` (N ≥ 1) |
//!
//! | Node | Meaning |
//! |------|---------|
//! | JSON string | a hoisted string (each distinct string appears once) |
//! | JSON array of slots | an array |
//! | JSON object of slots | an object |
//!
//! Every composite is emitted once, so shared references and cycles come
//! back with the same identity. Both walks are iterative.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};

use super::value::{Arena, Value, number_to_json};

// ============================================================================
// Encode
// ============================================================================

/// Encodes a value graph into its wire string.
///
/// Never fails: non-finite numbers become `null`.
#[must_use]
pub fn encode(value: &Value) -> String {
    let mut encoder = Encoder::default();
    let root = encoder.slot(value);
    encoder.nodes[0] = root;

    while let Some((index, composite)) = encoder.pending.pop_front() {
        let node = match &composite {
            Value::Array(array) => {
                let slots = array.to_vec().iter().map(|item| encoder.slot(item)).collect();
                JsonValue::Array(slots)
            }
            Value::Object(object) => {
                let mut map = Map::new();
                for (key, item) in object.entries() {
                    let slot = encoder.slot(&item);
                    map.insert(key, slot);
                }
                JsonValue::Object(map)
            }
            _ => continue,
        };
        encoder.nodes[index] = node;
    }

    JsonValue::Array(encoder.nodes).to_string()
}

#[derive(Default)]
struct Encoder {
    /// Wire entries; index 0 is the root slot.
    nodes: Vec<JsonValue>,
    /// Composite identity to node index.
    seen: FxHashMap<(usize, usize), usize>,
    /// Hoisted string to node index.
    strings: FxHashMap<String, usize>,
    /// Composites allocated but not yet walked.
    pending: VecDeque<(usize, Value)>,
}

impl Encoder {
    fn slot(&mut self, value: &Value) -> JsonValue {
        if self.nodes.is_empty() {
            self.nodes.push(JsonValue::Null);
        }

        match value {
            Value::Undefined => JsonValue::Array(Vec::new()),
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => {
                let index = match self.strings.get(s) {
                    Some(&index) => index,
                    None => {
                        let index = self.allocate(JsonValue::String(s.clone()));
                        self.strings.insert(s.clone(), index);
                        index
                    }
                };
                reference(index)
            }
            Value::Array(_) | Value::Object(_) => {
                let Some(id) = value.identity() else {
                    return JsonValue::Null;
                };
                let index = match self.seen.get(&id) {
                    Some(&index) => index,
                    None => {
                        let index = self.allocate(JsonValue::Null);
                        self.seen.insert(id, index);
                        self.pending.push_back((index, value.clone()));
                        index
                    }
                };
                reference(index)
            }
        }
    }

    fn allocate(&mut self, node: JsonValue) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

#[inline]
fn reference(index: usize) -> JsonValue {
    JsonValue::String(index.to_string())
}

// ============================================================================
// Decode
// ============================================================================

/// Decodes a wire string back into a value graph.
///
/// Nodes are materialized first and populated second, so forward and
/// backward references (cycles included) resolve to shared handles. All
/// composites of one message share an arena, so its cycles are freed with
/// the last outside handle.
///
/// # Errors
///
/// Returns [`Error::Decode`] for malformed input: not a JSON array, an empty
/// array, a node of the wrong kind, an unknown slot shape or a reference
/// outside `1..len`.
pub fn decode(input: &str) -> Result<Value> {
    let wire: JsonValue =
        serde_json::from_str(input).map_err(|e| Error::decode(format!("invalid JSON: {e}")))?;

    let JsonValue::Array(entries) = wire else {
        return Err(Error::decode("message is not an array"));
    };
    let Some((root, rest)) = entries.split_first() else {
        return Err(Error::decode("message is empty"));
    };

    let arena = Arena::with_capacity(rest.len());
    let mut nodes = Vec::with_capacity(rest.len());
    for (offset, node) in rest.iter().enumerate() {
        let materialized = match node {
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(_) => Value::Array(arena.array()),
            JsonValue::Object(_) => Value::Object(arena.object()),
            _ => {
                return Err(Error::decode(format!(
                    "node {} is not a string, array or object",
                    offset + 1
                )));
            }
        };
        nodes.push(materialized);
    }

    for (node, target) in rest.iter().zip(&nodes) {
        match (node, target) {
            (JsonValue::Array(slots), Value::Array(array)) => {
                for slot in slots {
                    array.push(resolve(slot, &nodes)?);
                }
            }
            (JsonValue::Object(map), Value::Object(object)) => {
                for (key, slot) in map {
                    object.insert(key.clone(), resolve(slot, &nodes)?);
                }
            }
            _ => {}
        }
    }

    resolve(root, &nodes)
}

fn resolve(slot: &JsonValue, nodes: &[Value]) -> Result<Value> {
    match slot {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| Error::decode(format!("unrepresentable number {n}"))),
        JsonValue::String(s) => {
            let index: usize = s
                .parse()
                .map_err(|_| Error::decode(format!("invalid reference {s:?}")))?;
            if index == 0 || index > nodes.len() {
                return Err(Error::decode(format!("reference {index} out of range")));
            }
            Ok(nodes[index - 1].clone())
        }
        JsonValue::Array(items) if items.is_empty() => Ok(Value::Undefined),
        _ => Err(Error::decode("invalid slot")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Array, Object};

    use proptest::prelude::*;
    use serde_json::json;

    fn object(entries: &[(&str, Value)]) -> Value {
        Value::Object(entries.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    #[test]
    fn test_scalars_inline() {
        assert_eq!(encode(&Value::Number(1.0)), "[1]");
        assert_eq!(encode(&Value::Bool(true)), "[true]");
        assert_eq!(encode(&Value::Null), "[null]");
        assert_eq!(encode(&Value::Undefined), "[[]]");
        assert_eq!(encode(&Value::Number(f64::NAN)), "[null]");
    }

    #[test]
    fn test_strings_are_hoisted_once() {
        let value = Value::Array(vec![Value::from("a"), Value::from("a")].into());
        let wire: JsonValue = serde_json::from_str(&encode(&value)).expect("json");
        assert_eq!(wire, json!(["1", ["2", "2"], "a"]));
    }

    #[test]
    fn test_object_layout() {
        let value = object(&[("a", Value::from(1))]);
        assert_eq!(encode(&value), r#"["1",{"a":1}]"#);
    }

    #[test]
    fn test_decode_simple_object() {
        let value = decode(r#"["1",{"a":1,"b":"2","c":[]},"text"]"#).expect("decode");
        assert_eq!(value.get("a"), Some(Value::Number(1.0)));
        assert_eq!(value.get("b").and_then(|v| v.as_string()).as_deref(), Some("text"));
        assert!(value.get("c").expect("present").is_undefined());
    }

    #[test]
    fn test_absent_is_preserved() {
        let value = object(&[("gone", Value::Undefined)]);
        let decoded = decode(&encode(&value)).expect("decode");
        let object = decoded.as_object().expect("object");
        assert!(object.contains_key("gone"));
        assert!(object.get("gone").expect("slot").is_undefined());
    }

    #[test]
    fn test_self_reference_keeps_identity() {
        let a = Object::new();
        a.insert("self", a.clone());
        let root = Object::new();
        root.insert("a", a.clone());

        let decoded = decode(&encode(&Value::Object(root))).expect("decode");
        let inner = decoded.get("a").expect("a");
        let again = inner.get("self").expect("self");
        assert!(inner.ptr_eq(&again));
    }

    #[test]
    fn test_shared_reference_keeps_identity() {
        let shared = Array::new();
        shared.push(1);
        let root = Object::new();
        root.insert("x", shared.clone());
        root.insert("y", shared);

        let decoded = decode(&encode(&Value::Object(root))).expect("decode");
        let x = decoded.get("x").expect("x");
        let y = decoded.get("y").expect("y");
        assert!(x.ptr_eq(&y));
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let root = Array::new();
        let mut current = root.clone();
        for _ in 0..200_000 {
            let next = Array::new();
            current.push(next.clone());
            current = next;
        }
        drop(current);

        let wire = encode(&Value::Array(root));
        let decoded = decode(&wire).expect("decode");

        let mut depth = 0;
        let mut cursor = decoded.as_array().and_then(|array| array.get(0));
        while let Some(Value::Array(next)) = cursor {
            depth += 1;
            cursor = next.get(0);
        }
        assert_eq!(depth, 200_000);

        drop(decoded);
    }

    #[test]
    fn test_deep_decoded_message_drops() {
        let count = 200_000;
        let mut entries = vec![JsonValue::from("1")];
        for index in 1..count {
            entries.push(json!([reference(index + 1)]));
        }
        entries.push(json!([]));
        let wire = JsonValue::Array(entries).to_string();

        let decoded = decode(&wire).expect("decode");
        assert_eq!(format!("{decoded:?}").len(), 2 * count);
        drop(decoded);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for input in ["{}", "[]", "not json", r#"["5"]"#, r#"["0"]"#, r#"[[1]]"#, r#"["1", 3]"#] {
            let err = decode(input).unwrap_err();
            assert!(matches!(err, Error::Decode { .. }), "{input}: {err}");
        }
    }

    fn arb_json() -> impl Strategy<Value = JsonValue> {
        let leaf = prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::Bool),
            (-1_000_000i64..1_000_000).prop_map(JsonValue::from),
            "[a-z0-9 ]{0,8}".prop_map(JsonValue::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(JsonValue::Array),
                prop::collection::vec(("[a-z]{1,4}", inner), 0..6)
                    .prop_map(|entries| JsonValue::Object(entries.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_acyclic_values_survive(json in arb_json()) {
            let value = Value::from(json.clone());
            let decoded = decode(&encode(&value)).expect("decode");
            prop_assert_eq!(&decoded, &value);
            prop_assert_eq!(decoded.to_json().expect("acyclic"), json);
        }
    }
}
