//! The generic value tree the evaluator walks.
//!
//! `Node` mirrors the YAML/JSON data model with an explicit variant per kind.
//! Numbers keep their integer or floating representation; [`Node::normalized`]
//! forces everything to floating point when values from different sources
//! need to be compared.

use indexmap::IndexMap;
use itertools::Itertools;
use serde::de::{self, Deserialize, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;
use std::fmt::{self, Write as _};

pub type Mapping = IndexMap<String, Node>;

// 2^63, the first float past i64::MAX
const I64_EDGE: f64 = 9_223_372_036_854_775_808.0;

#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Int(i) => Some(i),
            Number::Float(_) => None,
        }
    }
}

// Integers and floats with the same numeric value compare equal.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => (*i as f64) == *f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl Node {
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Node::Sequence(_) | Node::Mapping(_))
    }

    /// Short human name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Number(_) => "number",
            Node::String(_) => "string",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }

    /// Member lookup on a mapping; `None` for every other kind.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Recursively converts integers to floats. Not applied during regular
    /// evaluation; used when comparing values decoded from different sources.
    pub fn normalized(&self) -> Node {
        match self {
            Node::Number(n) => Node::Number(Number::Float(n.as_f64())),
            Node::Sequence(items) => Node::Sequence(items.iter().map(Node::normalized).collect()),
            Node::Mapping(map) => Node::Mapping(map.iter().map(|(k, v)| (k.clone(), v.normalized())).collect()),
            other => other.clone(),
        }
    }

    /// Order-independent textual key: mapping keys sorted, whole numbers
    /// spelled the same whether stored as integer or float.
    pub fn canonical_key(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Node::Null => out.push_str("null"),
            Node::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Node::Number(Number::Int(i)) => {
                let _ = write!(out, "{i}");
            }
            Node::Number(Number::Float(f)) => {
                // Whole floats inside the i64 range share the integer spelling, so
                // 1 and 1.0 collide. Integers beyond 2^53 that only equal a float
                // after rounding keep their own key.
                if f.fract() == 0.0 && (-I64_EDGE..I64_EDGE).contains(f) {
                    let _ = write!(out, "{}", *f as i64);
                } else {
                    let _ = write!(out, "{f:?}");
                }
            }
            Node::String(s) => {
                let _ = write!(out, "{s:?}");
            }
            Node::Sequence(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Node::Mapping(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().sorted_by(|a, b| a.0.cmp(b.0)).enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{k:?}:");
                    v.write_canonical(out);
                }
                out.push('}');
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Number(Number::Int(i)),
                None => Node::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => Node::String(s),
            Value::Array(a) => Node::Sequence(a.into_iter().map(Node::from).collect()),
            Value::Object(o) => Node::Mapping(o.into_iter().map(|(k, v)| (k, Node::from(v))).collect()),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(b),
            Node::Number(Number::Int(i)) => Value::from(i),
            // Non-finite floats have no JSON form
            Node::Number(Number::Float(f)) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            Node::String(s) => Value::String(s),
            Node::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Node::Mapping(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Number(Number::Int(i))
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Self {
        Node::Number(Number::Float(f))
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Sequence(items)
    }
}

impl From<Mapping> for Node {
    fn from(map: Mapping) -> Self {
        Node::Mapping(map)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(Number::Int(i)) => serializer.serialize_i64(*i),
            Node::Number(Number::Float(f)) => serializer.serialize_f64(*f),
            Node::String(s) => serializer.serialize_str(s),
            Node::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Mapping(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a YAML or JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Node, E> {
        Ok(Node::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Node, E> {
        Ok(Node::Number(Number::Int(i)))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Node, E> {
        Ok(Node::Number(match i64::try_from(u) {
            Ok(i) => Number::Int(i),
            Err(_) => Number::Float(u as f64),
        }))
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<Node, E> {
        Ok(Node::Number(Number::Float(f)))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Node, E> {
        Ok(Node::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Node, E> {
        Ok(Node::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Node, A::Error> {
        let mut map = Mapping::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<Node, Node>()? {
            map.insert(key_to_string(key).map_err(de::Error::custom)?, value);
        }
        Ok(Node::Mapping(map))
    }

    // YAML custom tags (`!foo value`) arrive as enums; the tag is dropped.
    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Node, A::Error> {
        let (_tag, variant) = data.variant::<String>()?;
        variant.newtype_variant::<Node>()
    }
}

// YAML allows scalar keys of any type; they are stringified.
fn key_to_string(key: Node) -> Result<String, String> {
    match key {
        Node::String(s) => Ok(s),
        Node::Number(n) => Ok(n.to_string()),
        Node::Bool(b) => Ok(b.to_string()),
        Node::Null => Ok("null".to_string()),
        other => Err(format!("mapping keys must be scalars, got {}", other.kind_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn json_round_trip_keeps_integers() {
        let node = Node::from(json!({"port": 5432, "ratio": 0.5, "tags": ["a", null]}));
        assert_eq!(node.get("port"), Some(&Node::Number(Number::Int(5432))));
        assert_eq!(Value::from(node), json!({"port": 5432, "ratio": 0.5, "tags": ["a", null]}));
    }

    #[test]
    fn yaml_scalar_keys_are_stringified() {
        let node: Node = serde_yaml::from_str("1: one\ntrue: yes\nname: x").unwrap();
        assert_eq!(node, Node::from(json!({"1": "one", "true": "yes", "name": "x"})));
    }

    #[test]
    fn normalization_forces_floats() {
        let node = Node::from(json!({"a": [1, 2.5]}));
        assert_eq!(
            node.normalized(),
            Node::Mapping(Mapping::from_iter([(
                "a".to_string(),
                Node::Sequence(vec![Node::Number(Number::Float(1.0)), Node::Number(Number::Float(2.5))])
            )]))
        );
    }

    #[test]
    fn mixed_numeric_equality() {
        assert_eq!(Node::from(1i64), Node::from(1.0));
        assert_ne!(Node::from(1i64), Node::from(1.5));
    }

    #[test]
    fn canonical_key_agrees_with_equality_for_large_whole_numbers() {
        let int = Node::from(1i64 << 60);
        let float = Node::Number(Number::Float(2f64.powi(60)));
        assert_eq!(int, float);
        assert_eq!(int.canonical_key(), float.canonical_key());
        let edge = Node::Number(Number::Float(-(2f64.powi(63))));
        assert_eq!(edge.canonical_key(), Node::from(i64::MIN).canonical_key());
        assert_ne!(Node::Number(Number::Float(1.0e300)).canonical_key(), Node::from(i64::MAX).canonical_key());
    }

    #[test]
    fn canonical_key_ignores_mapping_order() {
        let a = Node::from(json!({"x": 1, "y": [true, "s"]}));
        let b = Node::from(json!({"y": [true, "s"], "x": 1.0}));
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_ne!(a.canonical_key(), Node::from(json!({"x": "1"})).canonical_key());
    }
}
