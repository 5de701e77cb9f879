//! Path-query capability and the default dotted-path engine.
//!
//! The evaluator only depends on [`PathQuery`]; [`DottedPath`] is the engine it
//! uses unless the caller plugs in another one.
//!
//! Syntax accepted by [`DottedPath`]:
//!
//! | form | meaning |
//! |---|---|
//! | `a.b.c` | member access, keys may be any unicode text (`\.` escapes a dot) |
//! | `items.1`, `items[1]`, `items[-1]` | sequence index |
//! | `['odd key']` | quoted member access |
//! | `*`, `[*]` | every child (projection) |
//! | `items.#` | length of a sequence or mapping |
//! | `items.#.name` | `name` of every element (projection) |
//! | `items.#(id=="x")` | first element matching the predicate |
//! | `items.#(age>30)#` | every element matching the predicate (projection) |
//! | `items[?(@.age>30)]` | every element matching the predicate (projection) |
//! | `items[1:4:2]` | slice (projection) |
//! | `a..name` | recursive descent (projection) |
//!
//! A path that went through a projection yields a sequence of every match;
//! otherwise it yields the single matched value.

use crate::filter::{children, eval_filter, index_of, parse_filter, FilterExpr};
use crate::node::Node;
use crate::parser::{ParseError, Parser};
use std::borrow::Cow;

/// Given a document and a path expression, return the matched sub-value.
pub trait PathQuery: Send + Sync {
    fn query(&self, root: &Node, path: &str) -> Option<Node>;
}

/// Default [`PathQuery`] engine. Unparsable paths match nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DottedPath;

impl PathQuery for DottedPath {
    fn query(&self, root: &Node, path: &str) -> Option<Node> {
        match compile(path) {
            Ok(compiled) => compiled.select(root),
            Err(err) => {
                tracing::debug!(path, %err, "unparsable path");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),                  // .foo or ['foo']; numeric keys also index sequences
    Index(i64),                   // [0]
    Wildcard,                     // * or [*]
    Count,                        // #
    First(Box<FilterExpr>),       // #(expr)
    All(Box<FilterExpr>),         // #(expr)#
    Filter(Box<FilterExpr>),      // [?(expr)]
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    }, // [start:end:step]
    Recursive,                    // ..
}

impl Segment {
    fn projects(&self, is_last: bool) -> bool {
        match self {
            Segment::Count => !is_last,
            Segment::Wildcard | Segment::All(_) | Segment::Filter(_) | Segment::Slice { .. } | Segment::Recursive => true,
            Segment::Key(_) | Segment::Index(_) | Segment::First(_) => false,
        }
    }
}

/// Parses a path expression. The empty path selects the root.
pub fn compile(input: &str) -> Result<Path, ParseError> {
    let mut p = Parser::new(input.trim());
    // Tolerate a JSONPath-style root marker
    if p.peek_str("$.") || p.peek_str("$[") || p.rest() == "$" {
        p.consume_char('$');
        p.consume_char('.');
    }
    let mut segments = Vec::new();
    if p.eof() {
        return Ok(Path { segments });
    }
    loop {
        segments.push(parse_segment(&mut p)?);
        if p.eof() {
            break;
        }
        if p.consume_str("..") {
            segments.push(Segment::Recursive);
            continue;
        }
        if p.consume_char('.') || p.peek_char() == Some('[') {
            continue;
        }
        return Err(ParseError::InvalidSyntax(format!("unexpected input: {}", p.rest())));
    }
    Ok(Path { segments })
}

fn parse_segment(p: &mut Parser) -> Result<Segment, ParseError> {
    if p.consume_char('[') {
        return parse_bracket(p);
    }
    if p.consume_str("#(") {
        let expr = parse_filter(p.capture_balanced('(', ')')?)?;
        p.expect(')')?;
        return Ok(if p.consume_char('#') {
            Segment::All(Box::new(expr))
        } else {
            Segment::First(Box::new(expr))
        });
    }
    if at_boundary_after(p, "#") {
        p.consume_char('#');
        return Ok(Segment::Count);
    }
    if at_boundary_after(p, "*") {
        p.consume_char('*');
        return Ok(Segment::Wildcard);
    }
    parse_key(p).map(Segment::Key)
}

// True when `lit` is the whole segment
fn at_boundary_after(p: &Parser, lit: &str) -> bool {
    p.peek_str(lit) && matches!(p.rest()[lit.len()..].chars().next(), None | Some('.') | Some('['))
}

fn parse_key(p: &mut Parser) -> Result<String, ParseError> {
    let mut key = String::new();
    while let Some(c) = p.peek_char() {
        match c {
            '.' | '[' => break,
            '\\' => {
                p.bump();
                match p.bump() {
                    Some(escaped) => key.push(escaped),
                    None => return Err(ParseError::InvalidSyntax("dangling escape".into())),
                }
            }
            _ => {
                p.bump();
                key.push(c);
            }
        }
    }
    if key.is_empty() {
        return Err(ParseError::InvalidSyntax("empty path segment".into()));
    }
    Ok(key)
}

fn parse_bracket(p: &mut Parser) -> Result<Segment, ParseError> {
    p.skip_ws();
    if p.consume_char('*') {
        p.expect(']')?;
        return Ok(Segment::Wildcard);
    }
    if p.consume_char('?') {
        p.expect('(')?;
        let expr = parse_filter(p.capture_balanced('(', ')')?)?;
        p.expect(')')?;
        p.expect(']')?;
        return Ok(Segment::Filter(Box::new(expr)));
    }
    if p.peek_char() == Some('\'') || p.peek_char() == Some('"') {
        let key = p.parse_quoted_string()?;
        p.expect(']')?;
        return Ok(Segment::Key(key));
    }
    let content = p.capture_until(']')?;
    p.expect(']')?;
    if content.contains(':') {
        let parts: Vec<&str> = content.split(':').collect();
        if parts.len() > 3 {
            return Err(ParseError::InvalidSyntax("slice too many components".into()));
        }
        let parse_opt_i64 = |s: &str| -> Result<Option<i64>, ParseError> {
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                t.parse::<i64>()
                    .map(Some)
                    .map_err(|_| ParseError::InvalidSyntax("bad slice number".into()))
            }
        };
        let start = parse_opt_i64(parts.first().copied().unwrap_or(""))?;
        let end = parse_opt_i64(parts.get(1).copied().unwrap_or(""))?;
        let step = parse_opt_i64(parts.get(2).copied().unwrap_or(""))?;
        return Ok(Segment::Slice { start, end, step });
    }
    let idx = Parser::new(content.trim()).parse_int()?;
    Ok(Segment::Index(idx))
}

impl Path {
    /// Runs the path against `root`.
    pub fn select(&self, root: &Node) -> Option<Node> {
        let mut current: Vec<Cow<'_, Node>> = vec![Cow::Borrowed(root)];
        let mut projected = false;
        let last = self.segments.len().saturating_sub(1);
        for (i, seg) in self.segments.iter().enumerate() {
            projected |= seg.projects(i == last);
            current = current
                .into_iter()
                .flat_map(|node| apply(seg, node, i == last))
                .collect();
        }
        if projected {
            Some(Node::Sequence(current.into_iter().map(Cow::into_owned).collect()))
        } else {
            current.into_iter().next().map(Cow::into_owned)
        }
    }
}

fn apply<'a>(seg: &Segment, node: Cow<'a, Node>, is_last: bool) -> Vec<Cow<'a, Node>> {
    match seg {
        Segment::Key(k) => descend(node, |n| match n {
            Node::Mapping(m) => m.get(k).into_iter().collect(),
            Node::Sequence(a) => k.parse::<usize>().ok().and_then(|i| a.get(i)).into_iter().collect(),
            _ => Vec::new(),
        }),
        Segment::Index(i) => descend(node, |n| match n {
            Node::Sequence(a) => index_of(a.len(), *i).map(|idx| &a[idx]).into_iter().collect(),
            _ => Vec::new(),
        }),
        Segment::Wildcard => descend(node, children),
        Segment::Count if is_last => match node.as_ref() {
            Node::Sequence(a) => vec![Cow::Owned(Node::from(a.len() as i64))],
            Node::Mapping(m) => vec![Cow::Owned(Node::from(m.len() as i64))],
            _ => Vec::new(),
        },
        Segment::Count => descend(node, |n| match n {
            Node::Sequence(a) => a.iter().collect(),
            _ => Vec::new(),
        }),
        Segment::First(expr) => descend(node, |n| match n {
            Node::Sequence(a) => a.iter().find(|v| eval_filter(expr, v)).into_iter().collect(),
            _ => Vec::new(),
        }),
        Segment::All(expr) => descend(node, |n| match n {
            Node::Sequence(a) => a.iter().filter(|v| eval_filter(expr, v)).collect(),
            _ => Vec::new(),
        }),
        Segment::Filter(expr) => descend(node, |n| match n {
            Node::Sequence(a) => a.iter().filter(|v| eval_filter(expr, v)).collect(),
            other => [other].into_iter().filter(|v| eval_filter(expr, v)).collect(),
        }),
        Segment::Slice { start, end, step } => descend(node, |n| match n {
            Node::Sequence(a) => slice_array(a, *start, *end, *step),
            _ => Vec::new(),
        }),
        Segment::Recursive => descend(node, |n| {
            let mut out = Vec::new();
            recurse_collect(n, &mut out);
            out
        }),
    }
}

// Borrowed inputs yield borrowed outputs; owned intermediates (from `#`) are cloned out.
fn descend<'a, F>(node: Cow<'a, Node>, f: F) -> Vec<Cow<'a, Node>>
where
    F: for<'b> Fn(&'b Node) -> Vec<&'b Node>,
{
    match node {
        Cow::Borrowed(n) => f(n).into_iter().map(Cow::Borrowed).collect(),
        Cow::Owned(n) => f(&n).into_iter().map(|v| Cow::Owned(v.clone())).collect(),
    }
}

fn slice_array(arr: &[Node], start: Option<i64>, end: Option<i64>, step: Option<i64>) -> Vec<&Node> {
    let n = arr.len() as i64;
    let step = step.unwrap_or(1);
    if step == 0 {
        return Vec::new();
    }
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (n + i).clamp(0, n)
        } else {
            i.clamp(0, n)
        }
    };
    let lo = norm(start.unwrap_or(0));
    let hi = norm(end.unwrap_or(n));
    let mut out = Vec::new();
    if step > 0 {
        let mut i = lo;
        while i < hi {
            out.extend(arr.get(i as usize));
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    } else {
        if hi == 0 {
            return out;
        }
        let mut i = (hi - 1).clamp(0, n - 1);
        while i >= lo {
            out.extend(arr.get(i as usize));
            i = match i.checked_add(step) {
                Some(next) if next >= 0 => next,
                _ => break,
            };
        }
    }
    out
}

fn recurse_collect<'a>(v: &'a Node, out: &mut Vec<&'a Node>) {
    out.push(v);
    for child in children(v) {
        recurse_collect(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc() -> Node {
        Node::from(json!({
            "schemas": [
                {"id": "city_input", "type": "object"},
                {"id": "weather_output", "type": "array"}
            ],
            "nested": {"level1": {"level2": {
                "value": "deep_value",
                "array": [{"name": "first", "value": 1}, {"name": "second", "value": 2}]
            }}},
            "métricas": {"latência": 99},
            "dotted.key": true
        }))
    }

    fn q(path: &str) -> Option<serde_json::Value> {
        DottedPath.query(&doc(), path).map(serde_json::Value::from)
    }

    #[test]
    fn empty_path_is_root() {
        assert_eq!(DottedPath.query(&doc(), ""), Some(doc()));
    }

    #[test]
    fn dotted_members_and_indices() {
        assert_eq!(q("nested.level1.level2.value"), Some(json!("deep_value")));
        assert_eq!(q("schemas.0.id"), Some(json!("city_input")));
        assert_eq!(q("schemas[-1].type"), Some(json!("array")));
        assert_eq!(q("métricas.latência"), Some(json!(99)));
        assert_eq!(q(r"dotted\.key"), Some(json!(true)));
        assert_eq!(q("['dotted.key']"), Some(json!(true)));
    }

    #[test]
    fn predicates() {
        assert_eq!(q(r#"schemas.#(id=="weather_output").type"#), Some(json!("array")));
        assert_eq!(q(r#"nested.level1.level2.array.#(name=="first").value"#), Some(json!(1)));
        assert_eq!(q("nested.level1.level2.array.#(value>0)#.name"), Some(json!(["first", "second"])));
        assert_eq!(q("nested.level1.level2.array[?(@.value >= 2)].name"), Some(json!(["second"])));
        assert_eq!(q(r#"schemas.#(id=="missing")"#), None);
    }

    #[test]
    fn length_and_projection() {
        assert_eq!(q("schemas.#"), Some(json!(2)));
        assert_eq!(q("schemas.#.id"), Some(json!(["city_input", "weather_output"])));
        assert_eq!(q("schemas.*.type"), Some(json!(["object", "array"])));
        assert_eq!(q("schemas[0:1]"), Some(json!([{"id": "city_input", "type": "object"}])));
        assert_eq!(q("nested..name"), Some(json!(["first", "second"])));
    }

    #[test]
    fn slice_steps_near_integer_limits() {
        let first = json!({"id": "city_input", "type": "object"});
        let second = json!({"id": "weather_output", "type": "array"});
        assert_eq!(q("schemas[0::9223372036854775807]"), Some(json!([first.clone()])));
        assert_eq!(q("schemas[1::-9223372036854775808]"), Some(json!([second.clone()])));
        assert_eq!(q("schemas[::-1]"), Some(json!([second, first])));
    }

    #[test]
    fn misses() {
        assert_eq!(q("nonexistent.path"), None);
        assert_eq!(q("schemas.5"), None);
        assert_eq!(q("schemas..."), None);
        assert_eq!(q("schemas[1:x]"), None);
    }
}
