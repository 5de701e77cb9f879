//! Strategy-based combination of two nodes.
//!
//! Unsupported type pairs (a mapping over a scalar, a sequence over a mapping,
//! ...) fall back to `replace`: the right-hand side wins. Merging never fails
//! on shape alone; only the `error` key-conflict policy can reject a merge.

use crate::errors::{EvalError, Result};
use crate::node::{Mapping, Node};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How two mappings combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Deep,
    Shallow,
    Replace,
}

/// How two sequences combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayStrategy {
    #[default]
    Concat,
    Prepend,
    Append,
    Unique,
    Union,
}

/// Which side wins when both mappings define the same top-level key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyConflict {
    #[default]
    Replace,
    First,
    Error,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "deep" => Ok(Strategy::Deep),
            "shallow" => Ok(Strategy::Shallow),
            "replace" => Ok(Strategy::Replace),
            other => Err(format!("invalid object merge strategy '{other}'")),
        }
    }
}

impl FromStr for ArrayStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "concat" => Ok(ArrayStrategy::Concat),
            "prepend" => Ok(ArrayStrategy::Prepend),
            "append" => Ok(ArrayStrategy::Append),
            "unique" => Ok(ArrayStrategy::Unique),
            "union" => Ok(ArrayStrategy::Union),
            other => Err(format!("invalid array merge strategy '{other}'")),
        }
    }
}

impl FromStr for KeyConflict {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "replace" => Ok(KeyConflict::Replace),
            "first" => Ok(KeyConflict::First),
            "error" => Ok(KeyConflict::Error),
            other => Err(format!("invalid key_conflict '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub strategy: Strategy,
    pub array: ArrayStrategy,
    pub key_conflict: KeyConflict,
}

impl MergeOptions {
    pub fn new(strategy: Strategy, array: ArrayStrategy, key_conflict: KeyConflict) -> Self {
        Self {
            strategy,
            array,
            key_conflict,
        }
    }

    /// Parses the body of a `!merge:` suffix: `<deep>`, `<shallow,first>`,
    /// `<unique>`, `deep,error`. The first item may name an object or an array
    /// strategy; the second is the key-conflict policy.
    pub fn parse_inline(spec: &str) -> std::result::Result<Self, String> {
        let spec = spec.trim();
        let body = spec
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(spec);
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() > 2 {
            return Err(format!("too many merge options in '{spec}'"));
        }
        let mut opts = MergeOptions::default();
        match parts[0] {
            "" => {}
            name => match (name.parse::<Strategy>(), name.parse::<ArrayStrategy>()) {
                (Ok(strategy), _) => opts.strategy = strategy,
                (_, Ok(array)) => opts.array = array,
                _ => return Err(format!("invalid merge strategy '{name}'")),
            },
        }
        if let Some(conflict) = parts.get(1) {
            opts.key_conflict = conflict.parse()?;
        }
        Ok(opts)
    }
}

/// Combines `left` and `right`; `right` is the later, overriding side.
/// The key-conflict policy applies to the top-level keys only; nested
/// mappings merged under `deep` always let the right side win.
pub fn merge(left: Node, right: Node, opts: &MergeOptions) -> Result<Node> {
    merge_values(left, right, opts, opts.key_conflict)
}

fn merge_values(left: Node, right: Node, opts: &MergeOptions, conflict: KeyConflict) -> Result<Node> {
    match opts.strategy {
        Strategy::Replace => Ok(right),
        Strategy::Shallow => match (left, right) {
            (Node::Mapping(a), Node::Mapping(b)) => overlay(a, b, conflict, |_, b| Ok(b)),
            (_, right) => Ok(right),
        },
        Strategy::Deep => match (left, right) {
            (Node::Mapping(a), Node::Mapping(b)) => {
                overlay(a, b, conflict, |av, bv| merge_values(av, bv, opts, KeyConflict::Replace))
            }
            (Node::Sequence(a), Node::Sequence(b)) => Ok(Node::Sequence(merge_arrays(a, b, opts.array))),
            (_, right) => Ok(right),
        },
    }
}

fn overlay<F>(mut base: Mapping, over: Mapping, conflict: KeyConflict, combine: F) -> Result<Node>
where
    F: Fn(Node, Node) -> Result<Node>,
{
    for (key, value) in over {
        match base.get_mut(&key) {
            None => {
                base.insert(key, value);
            }
            Some(slot) => match conflict {
                KeyConflict::Replace => {
                    let existing = std::mem::take(slot);
                    *slot = combine(existing, value)?;
                }
                KeyConflict::First => {}
                KeyConflict::Error => return Err(EvalError::KeyConflict { key }),
            },
        }
    }
    Ok(Node::Mapping(base))
}

/// Applies an array sub-strategy. `unique`/`union` keep the first occurrence
/// of every value and the relative order of the survivors.
pub fn merge_arrays(left: Vec<Node>, right: Vec<Node>, strategy: ArrayStrategy) -> Vec<Node> {
    match strategy {
        ArrayStrategy::Concat | ArrayStrategy::Append => left.into_iter().chain(right).collect(),
        ArrayStrategy::Prepend => right.into_iter().chain(left).collect(),
        ArrayStrategy::Unique | ArrayStrategy::Union => left
            .into_iter()
            .chain(right)
            .unique_by(Node::canonical_key)
            .collect(),
    }
}

/// Combines a directive's resolved value with the literal keys that sat next
/// to the directive in the same mapping.
///
/// The key-conflict policy decides overlaps: `replace` lets the siblings win,
/// `first` keeps the directive result, `error` rejects any overlap. The object
/// strategy still shapes the combination. Under the default `deep` strategy
/// nested mappings present on both sides are deep-merged key by key.
/// Under `replace` the directive result is kept whole and siblings are dropped.
pub fn inline_merge(result: Node, siblings: Mapping, opts: &MergeOptions) -> Result<Node> {
    if siblings.is_empty() {
        return Ok(result);
    }
    match result {
        Node::Null => Ok(Node::Mapping(siblings)),
        Node::Mapping(resolved) => match opts.strategy {
            Strategy::Replace => Ok(Node::Mapping(resolved)),
            _ => merge(Node::Mapping(resolved), Node::Mapping(siblings), opts),
        },
        Node::Sequence(_) => Err(EvalError::InlineMerge(
            "cannot merge array result with object siblings".into(),
        )),
        other => Err(EvalError::InlineMerge(format!(
            "cannot merge scalar result with siblings (got {})",
            other.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn n(v: serde_json::Value) -> Node {
        Node::from(v)
    }

    fn mapping(v: serde_json::Value) -> Mapping {
        match Node::from(v) {
            Node::Mapping(m) => m,
            other => panic!("expected mapping, got {other}"),
        }
    }

    fn arrays(strategy: ArrayStrategy) -> MergeOptions {
        MergeOptions {
            array: strategy,
            ..MergeOptions::default()
        }
    }

    #[test]
    fn array_strategies() {
        let concat = merge(n(json!(["a", "b"])), n(json!(["c"])), &arrays(ArrayStrategy::Concat)).unwrap();
        assert_eq!(concat, n(json!(["a", "b", "c"])));
        let prepend = merge(n(json!(["a", "b"])), n(json!(["c"])), &arrays(ArrayStrategy::Prepend)).unwrap();
        assert_eq!(prepend, n(json!(["c", "a", "b"])));
        let unique = merge(n(json!(["a", "b"])), n(json!(["b", "c"])), &arrays(ArrayStrategy::Unique)).unwrap();
        assert_eq!(unique, n(json!(["a", "b", "c"])));
    }

    #[test]
    fn union_compares_by_value() {
        let merged = merge_arrays(
            vec![n(json!({"a": 1, "b": 2})), n(json!(1))],
            vec![n(json!({"b": 2, "a": 1})), n(json!(1.0)), n(json!(2))],
            ArrayStrategy::Union,
        );
        assert_eq!(merged, vec![n(json!({"a": 1, "b": 2})), n(json!(1)), n(json!(2))]);
        let big = merge_arrays(vec![Node::from(1i64 << 60)], vec![n(json!(1152921504606846976.0))], ArrayStrategy::Unique);
        assert_eq!(big, vec![Node::from(1i64 << 60)]);
    }

    #[test]
    fn deep_merge_recurses_into_mappings_and_sequences() {
        let left = n(json!({"replicas": 1, "resources": {"cpu": "100m", "memory": "128Mi"}, "tags": ["a"]}));
        let right = n(json!({"replicas": 3, "resources": {"cpu": "500m"}, "tags": ["b"]}));
        let merged = merge(left, right, &MergeOptions::default()).unwrap();
        assert_eq!(
            merged,
            n(json!({"replicas": 3, "resources": {"cpu": "500m", "memory": "128Mi"}, "tags": ["a", "b"]}))
        );
    }

    #[test]
    fn shallow_merge_replaces_nested_values_wholesale() {
        let opts = MergeOptions::new(Strategy::Shallow, ArrayStrategy::Concat, KeyConflict::Replace);
        let merged = merge(
            n(json!({"resources": {"cpu": "100m", "memory": "128Mi"}, "keep": true})),
            n(json!({"resources": {"cpu": "500m"}})),
            &opts,
        )
        .unwrap();
        assert_eq!(merged, n(json!({"resources": {"cpu": "500m"}, "keep": true})));
    }

    #[test]
    fn mismatched_shapes_fall_back_to_replace() {
        let merged = merge(n(json!("scalar")), n(json!({"a": 1})), &MergeOptions::default()).unwrap();
        assert_eq!(merged, n(json!({"a": 1})));
        let merged = merge(n(json!({"a": 1})), n(json!([1])), &MergeOptions::default()).unwrap();
        assert_eq!(merged, n(json!([1])));
    }

    #[test]
    fn key_conflict_policies() {
        let first = MergeOptions { key_conflict: KeyConflict::First, ..Default::default() };
        let merged = merge(n(json!({"port": 8080})), n(json!({"port": 9090, "host": "h"})), &first).unwrap();
        assert_eq!(merged, n(json!({"port": 8080, "host": "h"})));

        let error = MergeOptions { key_conflict: KeyConflict::Error, ..Default::default() };
        let err = merge(n(json!({"port": 8080})), n(json!({"port": 9090})), &error).unwrap_err();
        assert!(matches!(err, EvalError::KeyConflict { ref key } if key == "port"));
    }

    #[test]
    fn inline_merge_rules() {
        let resolved = n(json!({"host": "localhost", "port": 5001}));
        let siblings = mapping(json!({"port": 9090, "ssl": true}));
        let merged = inline_merge(resolved.clone(), siblings.clone(), &MergeOptions::default()).unwrap();
        assert_eq!(merged, n(json!({"host": "localhost", "port": 9090, "ssl": true})));

        let error = MergeOptions { key_conflict: KeyConflict::Error, ..Default::default() };
        let err = inline_merge(resolved.clone(), siblings.clone(), &error).unwrap_err();
        assert!(matches!(err, EvalError::KeyConflict { ref key } if key == "port"));

        let first = MergeOptions { key_conflict: KeyConflict::First, ..Default::default() };
        let merged = inline_merge(resolved.clone(), siblings.clone(), &first).unwrap();
        assert_eq!(merged, n(json!({"host": "localhost", "port": 5001, "ssl": true})));

        let replace = MergeOptions { strategy: Strategy::Replace, ..Default::default() };
        assert_eq!(inline_merge(resolved, siblings.clone(), &replace).unwrap(), n(json!({"host": "localhost", "port": 5001})));

        assert_eq!(inline_merge(Node::Null, siblings.clone(), &MergeOptions::default()).unwrap(), n(json!({"port": 9090, "ssl": true})));
        assert!(matches!(inline_merge(n(json!([1])), siblings.clone(), &MergeOptions::default()), Err(EvalError::InlineMerge(_))));
        assert!(matches!(inline_merge(n(json!("x")), siblings, &MergeOptions::default()), Err(EvalError::InlineMerge(_))));
    }

    #[test]
    fn parse_inline_options() {
        assert_eq!(MergeOptions::parse_inline("<deep>").unwrap(), MergeOptions::default());
        assert_eq!(
            MergeOptions::parse_inline("<shallow,first>").unwrap(),
            MergeOptions::new(Strategy::Shallow, ArrayStrategy::Concat, KeyConflict::First)
        );
        assert_eq!(
            MergeOptions::parse_inline("unique,error").unwrap(),
            MergeOptions::new(Strategy::Deep, ArrayStrategy::Unique, KeyConflict::Error)
        );
        assert!(MergeOptions::parse_inline("<sideways>").is_err());
        assert!(MergeOptions::parse_inline("<deep,maybe>").is_err());
        assert!(MergeOptions::parse_inline("<deep,first,extra>").is_err());
    }
}
