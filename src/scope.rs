use crate::context::DocMetadata;
use crate::errors::{BoxError, EvalError, Result};
use crate::merge::MergeOptions;
use crate::node::Node;
use crate::path::PathQuery;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const MERGE_SUFFIX: &str = "!merge:";

/// Named source a reference can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Local,
    Global,
    Resource,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Local => "local",
            ScopeKind::Global => "global",
            ScopeKind::Resource => "resource",
        }
    }
}

impl FromStr for ScopeKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(ScopeKind::Local),
            "global" => Ok(ScopeKind::Global),
            "resource" => Ok(ScopeKind::Resource),
            other => Err(EvalError::UnknownScope { scope: other.to_string() }),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `scope::path[!merge:<opts>]` token.
///
/// Resource references carry the resource id separately:
/// `resource::<id>::<path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub scope: ScopeKind,
    pub resource: Option<String>,
    pub path: String,
    pub merge: Option<MergeOptions>,
}

impl Reference {
    /// Parses a reference token. `directive` only labels validation errors.
    pub fn parse(token: &str, directive: &str) -> Result<Self> {
        let token = token.trim();
        let (target, merge) = match token.rsplit_once(MERGE_SUFFIX) {
            Some((target, opts)) => {
                let opts = MergeOptions::parse_inline(opts).map_err(|e| EvalError::validation(directive, e))?;
                (target.trim_end(), Some(opts))
            }
            None => (token, None),
        };

        let Some((scope, rest)) = target.split_once("::") else {
            return Err(EvalError::validation(
                directive,
                format!("invalid {directive} syntax '{token}', expected scope::path"),
            ));
        };
        let scope: ScopeKind = scope.trim().parse()?;

        let (resource, path) = match scope {
            ScopeKind::Resource => {
                let Some((id, selector)) = rest.split_once("::") else {
                    return Err(EvalError::validation(
                        directive,
                        format!("invalid resource reference '{token}', expected resource::<id>::<path>"),
                    ));
                };
                if id.is_empty() {
                    return Err(EvalError::validation(directive, "resource id cannot be empty"));
                }
                if selector.contains("::") {
                    return Err(EvalError::validation(
                        directive,
                        format!("resource selector '{selector}' cannot contain '::'"),
                    ));
                }
                (Some(id.to_string()), selector)
            }
            _ => (None, rest),
        };

        if path.trim().is_empty() {
            return Err(EvalError::validation(directive, format!("empty path in '{token}'")));
        }

        Ok(Reference {
            scope,
            resource,
            path: path.trim().to_string(),
            merge,
        })
    }

    /// Identity used by the cycle guard: the scope plus the target path,
    /// without merge options.
    pub fn identity(&self) -> String {
        match &self.resource {
            Some(id) => format!("{}::{}::{}", self.scope, id, self.path),
            None => format!("{}::{}", self.scope, self.path),
        }
    }

    fn display_path(&self) -> String {
        match &self.resource {
            Some(id) => format!("{id}::{}", self.path),
            None => self.path.clone(),
        }
    }
}

/// Fetches a resource document by identifier.
pub trait ResourceResolver: Send + Sync {
    fn resolve_resource(&self, id: &str) -> std::result::Result<Node, BoxError>;
}

impl<F> ResourceResolver for F
where
    F: Fn(&str) -> std::result::Result<Node, BoxError> + Send + Sync,
{
    fn resolve_resource(&self, id: &str) -> std::result::Result<Node, BoxError> {
        self(id)
    }
}

/// Maps a reference onto the raw (unevaluated) node it points at.
#[derive(Clone)]
pub(crate) struct ScopeResolver {
    pub(crate) local: Option<Arc<Node>>,
    pub(crate) global: Option<Arc<Node>>,
    pub(crate) resources: Option<Arc<dyn ResourceResolver>>,
    pub(crate) query: Arc<dyn PathQuery>,
}

impl ScopeResolver {
    pub(crate) fn lookup(&self, reference: &Reference, meta: &mut DocMetadata) -> Result<Node> {
        let root = match reference.scope {
            ScopeKind::Local => self.local.clone(),
            ScopeKind::Global => self.global.clone(),
            ScopeKind::Resource => match &reference.resource {
                Some(id) => Some(self.fetch_resource(id, meta)?),
                None => None,
            },
        };
        let root = root.ok_or_else(|| EvalError::ScopeNotConfigured {
            scope: reference.scope.to_string(),
        })?;

        self.query
            .query(&root, &reference.path)
            .ok_or_else(|| EvalError::PathNotFound {
                scope: reference.scope.to_string(),
                path: reference.display_path(),
            })
    }

    // Each resource is fetched at most once per evaluation call
    fn fetch_resource(&self, id: &str, meta: &mut DocMetadata) -> Result<Arc<Node>> {
        if let Some(root) = meta.resource(id) {
            return Ok(root);
        }
        let resolver = self.resources.as_ref().ok_or_else(|| EvalError::ScopeNotConfigured {
            scope: ScopeKind::Resource.to_string(),
        })?;
        tracing::debug!(resource = id, "fetching resource");
        let root = resolver
            .resolve_resource(id)
            .map_err(|source| EvalError::ResourceResolution { id: id.to_string(), source })?;
        Ok(meta.remember_resource(id, root))
    }
}
