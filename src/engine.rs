use crate::cache::RefCache;
use crate::config::{CacheConfig, EvaluatorConfig};
use crate::context::EvalContext;
use crate::directives::Registry;
use crate::errors::{BoxError, EvalError, Result};
use crate::merge::{inline_merge, MergeOptions};
use crate::node::{Mapping, Node};
use crate::path::{DottedPath, PathQuery};
use crate::scope::{Reference, ResourceResolver, ScopeResolver};
use std::sync::Arc;

/// Rewrites the output of `$use`: `(component, resolved) -> (key, value)`.
/// Without one, `$use` yields `{component: resolved}`.
pub trait TransformUse: Send + Sync {
    fn transform(&self, component: &str, node: Node) -> std::result::Result<(String, Node), BoxError>;
}

impl<F> TransformUse for F
where
    F: Fn(&str, Node) -> std::result::Result<(String, Node), BoxError> + Send + Sync,
{
    fn transform(&self, component: &str, node: Node) -> std::result::Result<(String, Node), BoxError> {
        self(component, node)
    }
}

/// Runs on every node before it is evaluated. Returning `Some` replaces the
/// node; `None` keeps it as is.
pub trait PreEval: Send + Sync {
    fn pre_eval(&self, node: &Node) -> std::result::Result<Option<Node>, BoxError>;
}

impl<F> PreEval for F
where
    F: Fn(&Node) -> std::result::Result<Option<Node>, BoxError> + Send + Sync,
{
    fn pre_eval(&self, node: &Node) -> std::result::Result<Option<Node>, BoxError> {
        self(node)
    }
}

/// Directive evaluator. Immutable once built, so one instance can serve
/// concurrent `eval` calls.
pub struct Evaluator {
    scopes: ScopeResolver,
    registry: Registry,
    transform: Option<Arc<dyn TransformUse>>,
    pre_eval: Option<Arc<dyn PreEval>>,
    cache: Option<RefCache>,
    inline_merge: MergeOptions,
    max_depth: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Evaluator {
    /// An evaluator with the built-in directives and no scopes configured.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::default()
    }

    /// Returns a new tree with every directive resolved. The input is not modified.
    pub fn eval(&self, node: &Node) -> Result<Node> {
        let mut ctx = EvalContext::new(self);
        let out = ctx.eval(node);
        if let Err(err) = &out {
            tracing::debug!(error = %err, "evaluation failed");
        }
        out
    }

    /// Resolves `scope::path` directly, as if it were the target of a `$ref`.
    pub fn resolve_path(&self, scope: &str, path: &str) -> Result<Node> {
        let reference = Reference::parse(&format!("{scope}::{path}"), "reference")?;
        EvalContext::new(self).resolve(&reference)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> Option<&RefCache> {
        self.cache.as_ref()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn inline_merge_defaults(&self) -> MergeOptions {
        self.inline_merge
    }

    pub(crate) fn transform(&self) -> Option<&dyn TransformUse> {
        self.transform.as_deref()
    }

    pub(crate) fn scopes(&self) -> &ScopeResolver {
        &self.scopes
    }

    pub(crate) fn eval_node(&self, ctx: &mut EvalContext<'_>, node: &Node) -> Result<Node> {
        let rewritten;
        let node = match &self.pre_eval {
            Some(hook) => match hook.pre_eval(node).map_err(EvalError::PreEval)? {
                Some(replacement) => {
                    rewritten = replacement;
                    &rewritten
                }
                None => node,
            },
            None => node,
        };

        match node {
            Node::Sequence(items) => items
                .iter()
                .map(|item| ctx.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Node::Sequence),
            Node::Mapping(map) => self.eval_mapping(ctx, map),
            scalar => Ok(scalar.clone()),
        }
    }

    fn eval_mapping(&self, ctx: &mut EvalContext<'_>, map: &Mapping) -> Result<Node> {
        let keys = self.registry.directive_keys(map);
        let name = match keys.as_slice() {
            [] => return eval_entries(ctx, map.iter()).map(Node::Mapping),
            [name] => *name,
            _ => {
                return Err(EvalError::MultipleDirectives {
                    keys: keys.iter().map(|k| k.to_string()).collect(),
                })
            }
        };
        let (Some(directive), Some(payload)) = (self.registry.get(name), map.get(name)) else {
            return Err(EvalError::InvalidDirective(format!("'{name}' is not registered")));
        };

        let has_siblings = map.len() > 1;
        if has_siblings && !directive.allows_siblings() {
            return Err(EvalError::validation(name, format!("{name} directive cannot have sibling keys")));
        }

        directive.validate(payload)?;
        tracing::trace!(directive = name, "applying directive");
        ctx.take_inline_merge();
        let result = directive.handle(ctx, payload)?;
        let options = ctx.take_inline_merge().unwrap_or(self.inline_merge);
        let result = ctx.eval(&result)?;
        if !has_siblings {
            return Ok(result);
        }

        let siblings = eval_entries(ctx, map.iter().filter(|(k, _)| k.as_str() != name))?;
        inline_merge(result, siblings, &options)
    }
}

fn eval_entries<'m, I>(ctx: &mut EvalContext<'_>, entries: I) -> Result<Mapping>
where
    I: Iterator<Item = (&'m String, &'m Node)>,
{
    entries
        .map(|(key, value)| ctx.eval(value).map(|v| (key.clone(), v)))
        .collect()
}

/// Assembles an [`Evaluator`]. Every capability is optional.
#[derive(Default)]
pub struct EvaluatorBuilder {
    local: Option<Arc<Node>>,
    global: Option<Arc<Node>>,
    resources: Option<Arc<dyn ResourceResolver>>,
    query: Option<Arc<dyn PathQuery>>,
    registry: Option<Registry>,
    transform: Option<Arc<dyn TransformUse>>,
    pre_eval: Option<Arc<dyn PreEval>>,
    config: EvaluatorConfig,
}

impl EvaluatorBuilder {
    pub fn local_scope(mut self, root: impl Into<Node>) -> Self {
        self.local = Some(Arc::new(root.into()));
        self
    }

    pub fn global_scope(mut self, root: impl Into<Node>) -> Self {
        self.global = Some(Arc::new(root.into()));
        self
    }

    pub fn scopes(self, local: impl Into<Node>, global: impl Into<Node>) -> Self {
        self.local_scope(local).global_scope(global)
    }

    pub fn resource_resolver<R: ResourceResolver + 'static>(mut self, resolver: R) -> Self {
        self.resources = Some(Arc::new(resolver));
        self
    }

    /// Replaces the default dotted-path engine.
    pub fn path_query<Q: PathQuery + 'static>(mut self, query: Q) -> Self {
        self.query = Some(Arc::new(query));
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn transform_use<T: TransformUse + 'static>(mut self, transform: T) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn pre_eval<H: PreEval + 'static>(mut self, hook: H) -> Self {
        self.pre_eval = Some(Arc::new(hook));
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.config.cache = Some(config);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.config.cache = None;
        self
    }

    pub fn inline_merge(mut self, options: MergeOptions) -> Self {
        self.config.inline_merge = options;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Evaluator {
        let EvaluatorConfig { max_depth, inline_merge, cache } = self.config;
        tracing::debug!(
            local = self.local.is_some(),
            global = self.global.is_some(),
            resources = self.resources.is_some(),
            cache = cache.is_some(),
            max_depth,
            "building evaluator"
        );
        Evaluator {
            scopes: ScopeResolver {
                local: self.local,
                global: self.global,
                resources: self.resources,
                query: self.query.unwrap_or_else(|| Arc::new(DottedPath)),
            },
            registry: self.registry.unwrap_or_else(Registry::with_builtins),
            transform: self.transform,
            pre_eval: self.pre_eval,
            cache: cache.map(RefCache::new),
            inline_merge,
            max_depth,
        }
    }
}
