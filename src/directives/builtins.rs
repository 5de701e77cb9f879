//! Validators and handlers for `$ref`, `$use` and `$merge`.

use super::{MERGE, REF, USE};
use crate::context::EvalContext;
use crate::errors::{EvalError, Result};
use crate::merge::{merge, MergeOptions};
use crate::node::{Mapping, Node};
use crate::scope::Reference;

/// Component kinds accepted by `$use`.
pub const COMPONENTS: [&str; 4] = ["agent", "tool", "task", "mcp"];

const MERGE_KEYS: [&str; 3] = ["sources", "strategy", "key_conflict"];

fn expect_string<'n>(directive: &str, payload: &'n Node) -> Result<&'n str> {
    payload.as_str().ok_or_else(|| {
        EvalError::validation(directive, format!("{directive} must be a string, got {}", payload.kind_name()))
    })
}

// `{$ref: ...}` style payloads are evaluated first and checked afterwards
fn is_directive_bearing(node: &Node) -> bool {
    node.as_mapping().is_some_and(|m| m.keys().any(|k| k.starts_with('$')))
}

pub(crate) fn validate_ref(payload: &Node) -> Result<()> {
    Reference::parse(expect_string(REF, payload)?, REF).map(|_| ())
}

pub(crate) fn handle_ref(ctx: &mut EvalContext<'_>, payload: &Node) -> Result<Node> {
    let reference = Reference::parse(expect_string(REF, payload)?, REF)?;
    let value = ctx.resolve(&reference)?;
    if let Some(options) = reference.merge {
        ctx.set_inline_merge(options);
    }
    Ok(value)
}

/// Splits `component(scope::path)[!merge:<opts>]`.
pub fn parse_use(token: &str) -> Result<(String, Reference)> {
    let token = token.trim();
    let syntax_error = || EvalError::validation(USE, format!("invalid $use syntax '{token}', expected component(scope::path)"));

    let (component, rest) = token.split_once('(').ok_or_else(syntax_error)?;
    let close = rest.rfind(')').ok_or_else(syntax_error)?;
    let (inner, tail) = (&rest[..close], rest[close + 1..].trim());

    let component = component.trim();
    if !COMPONENTS.contains(&component) {
        return Err(EvalError::validation(
            USE,
            format!("unknown component '{component}', expected one of {}", COMPONENTS.join(", ")),
        ));
    }

    let mut reference = Reference::parse(inner, USE)?;
    if !tail.is_empty() {
        let options = tail.strip_prefix("!merge:").ok_or_else(syntax_error)?;
        reference.merge = Some(MergeOptions::parse_inline(options).map_err(|e| EvalError::validation(USE, e))?);
    }
    Ok((component.to_string(), reference))
}

pub(crate) fn validate_use(payload: &Node) -> Result<()> {
    parse_use(expect_string(USE, payload)?).map(|_| ())
}

pub(crate) fn handle_use(ctx: &mut EvalContext<'_>, payload: &Node) -> Result<Node> {
    let (component, reference) = parse_use(expect_string(USE, payload)?)?;
    let value = ctx.resolve(&reference)?;
    let (key, value) = match ctx.evaluator().transform() {
        Some(transform) => transform
            .transform(&component, value)
            .map_err(|source| EvalError::Transform { component: component.clone(), source })?,
        None => (component, value),
    };
    if let Some(options) = reference.merge {
        ctx.set_inline_merge(options);
    }
    let mut out = Mapping::new();
    out.insert(key, value);
    Ok(Node::Mapping(out))
}

pub(crate) fn validate_merge(payload: &Node) -> Result<()> {
    match payload {
        Node::Sequence(_) => Ok(()),
        node if is_directive_bearing(node) => Ok(()),
        Node::Mapping(m) => {
            if let Some(key) = m.keys().find(|k| !MERGE_KEYS.contains(&k.as_str())) {
                return Err(EvalError::validation(MERGE, format!("unknown key in $merge: '{key}'")));
            }
            match m.get("sources") {
                None => return Err(EvalError::validation(MERGE, "$merge must contain 'sources' key")),
                Some(Node::Sequence(_)) => {}
                Some(node) if is_directive_bearing(node) => {}
                Some(other) => {
                    return Err(EvalError::validation(
                        MERGE,
                        format!("sources must be a sequence, got {}", other.kind_name()),
                    ))
                }
            }
            for key in ["strategy", "key_conflict"] {
                if m.get(key).is_some_and(|v| v.as_str().is_none()) {
                    return Err(EvalError::validation(MERGE, format!("{key} must be a string")));
                }
            }
            Ok(())
        }
        other => Err(EvalError::validation(
            MERGE,
            format!("$merge must be an object or array, got {}", other.kind_name()),
        )),
    }
}

pub(crate) fn handle_merge(ctx: &mut EvalContext<'_>, payload: &Node) -> Result<Node> {
    let (raw_sources, strategy, key_conflict) = match payload {
        Node::Mapping(m) if !is_directive_bearing(payload) => (
            m.get("sources")
                .ok_or_else(|| EvalError::validation(MERGE, "$merge must contain 'sources' key"))?,
            m.get("strategy").and_then(Node::as_str),
            m.get("key_conflict").and_then(Node::as_str),
        ),
        other => (other, None, None),
    };

    let sources = match ctx.eval(raw_sources)? {
        Node::Sequence(items) => items,
        other => {
            return Err(EvalError::validation(
                MERGE,
                format!("sources must be a sequence, got {}", other.kind_name()),
            ))
        }
    };
    if sources.is_empty() {
        return Err(EvalError::validation(MERGE, "sources cannot be empty"));
    }

    let sources: Vec<Node> = sources.into_iter().filter(|n| !n.is_null()).collect();
    if let Some((i, bad)) = sources.iter().enumerate().find(|(_, n)| n.is_scalar()) {
        return Err(EvalError::validation(
            MERGE,
            format!("source {i} must be an object or array, got {}", bad.kind_name()),
        ));
    }
    let all_mappings = sources.iter().all(|n| matches!(n, Node::Mapping(_)));
    let all_sequences = sources.iter().all(|n| matches!(n, Node::Sequence(_)));
    if !all_mappings && !all_sequences {
        return Err(EvalError::validation(MERGE, "sources must be all objects or all arrays"));
    }

    let mut options = MergeOptions::default();
    if let Some(name) = strategy {
        let invalid = |e: String| EvalError::validation(MERGE, e);
        if all_mappings {
            options.strategy = name.parse().map_err(invalid)?;
        } else {
            options.array = name.parse().map_err(invalid)?;
        }
    }
    if let Some(name) = key_conflict {
        options.key_conflict = name.parse().map_err(|e: String| EvalError::validation(MERGE, e))?;
    }

    tracing::debug!(sources = sources.len(), options = ?options, "merging sources");
    let mut sources = sources.into_iter();
    let Some(first) = sources.next() else {
        return Ok(Node::Null);
    };
    sources.try_fold(first, |acc, next| merge(acc, next, &options))
}
