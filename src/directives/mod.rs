use crate::context::EvalContext;
use crate::errors::{EvalError, Result};
use crate::node::{Mapping, Node};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub mod builtins;

pub const REF: &str = "$ref";
pub const USE: &str = "$use";
pub const MERGE: &str = "$merge";

/// A user-supplied directive. The name must start with `$`.
pub trait CustomDirective: Send + Sync {
    fn name(&self) -> &str;

    /// Rejects malformed payloads before the handler runs.
    fn validate(&self, _payload: &Node) -> Result<()> {
        Ok(())
    }

    /// Produces the replacement node. The result is evaluated again, so it
    /// may itself contain directives.
    fn handle(&self, ctx: &mut EvalContext<'_>, payload: &Node) -> Result<Node>;
}

#[derive(Clone)]
pub enum Directive {
    Ref,
    Use,
    Merge,
    Custom(Arc<dyn CustomDirective>),
}

impl Directive {
    pub fn name(&self) -> &str {
        match self {
            Directive::Ref => REF,
            Directive::Use => USE,
            Directive::Merge => MERGE,
            Directive::Custom(d) => d.name(),
        }
    }

    pub fn validate(&self, payload: &Node) -> Result<()> {
        match self {
            Directive::Ref => builtins::validate_ref(payload),
            Directive::Use => builtins::validate_use(payload),
            Directive::Merge => builtins::validate_merge(payload),
            Directive::Custom(d) => d.validate(payload),
        }
    }

    pub fn handle(&self, ctx: &mut EvalContext<'_>, payload: &Node) -> Result<Node> {
        match self {
            Directive::Ref => builtins::handle_ref(ctx, payload),
            Directive::Use => builtins::handle_use(ctx, payload),
            Directive::Merge => builtins::handle_merge(ctx, payload),
            Directive::Custom(d) => d.handle(ctx, payload),
        }
    }

    /// `$merge` must stand alone in its mapping.
    pub fn allows_siblings(&self) -> bool {
        !matches!(self, Directive::Merge)
    }
}

impl fmt::Debug for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Directive({})", self.name())
    }
}

/// Thread-safe directive registry. Cloning is cheap; registering on a clone
/// copies the table once and leaves other holders untouched.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    inner: Arc<HashMap<String, Directive>>,
}

impl Registry {
    /// An empty registry. Most callers want [`Registry::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let map: HashMap<String, Directive> = [Directive::Ref, Directive::Use, Directive::Merge]
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();
        Self { inner: Arc::new(map) }
    }

    pub fn register<D: CustomDirective + 'static>(&mut self, directive: D) -> Result<()> {
        let name = directive.name().to_string();
        if name.is_empty() {
            return Err(EvalError::InvalidDirective("directive name cannot be empty".into()));
        }
        if !name.starts_with('$') {
            return Err(EvalError::InvalidDirective(format!("directive name '{name}' must start with '$'")));
        }
        if name.len() == 1 {
            return Err(EvalError::InvalidDirective("directive name needs characters after '$'".into()));
        }
        if self.inner.contains_key(&name) {
            return Err(EvalError::DuplicateDirective { name });
        }
        tracing::debug!(directive = %name, "registering directive");
        Arc::make_mut(&mut self.inner).insert(name, Directive::Custom(Arc::new(directive)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Directive> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered directive keys present in `map`, in document order.
    pub fn directive_keys<'m>(&self, map: &'m Mapping) -> Vec<&'m str> {
        map.keys()
            .map(String::as_str)
            .filter(|k| self.contains(k))
            .collect()
    }
}
