use crate::cache::Fingerprint;
use crate::directives::Registry;
use crate::engine::Evaluator;
use crate::errors::{EvalError, Result};
use crate::merge::MergeOptions;
use crate::node::Node;
use crate::scope::Reference;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Per-call memo of fetched resource documents.
#[derive(Debug, Default)]
pub struct DocMetadata {
    resources: HashMap<String, Arc<Node>>,
}

impl DocMetadata {
    pub fn resource(&self, id: &str) -> Option<Arc<Node>> {
        self.resources.get(id).cloned()
    }

    pub(crate) fn remember_resource(&mut self, id: &str, root: Node) -> Arc<Node> {
        let root = Arc::new(root);
        self.resources.insert(id.to_string(), Arc::clone(&root));
        root
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

/// State threaded through one `Evaluator::eval` call.
///
/// Every call gets a fresh context, so evaluations never share cycle-guard
/// or resource state even when they run concurrently on one evaluator.
pub struct EvalContext<'e> {
    evaluator: &'e Evaluator,
    // In-progress references, outermost first. The set mirrors the stack.
    stack: Vec<String>,
    active: HashSet<String>,
    // Deepest stack length reached inside the reference being resolved,
    // counting the replayed height of cache hits.
    peak: usize,
    metadata: DocMetadata,
    inline_merge: Option<MergeOptions>,
}

impl<'e> EvalContext<'e> {
    pub(crate) fn new(evaluator: &'e Evaluator) -> Self {
        Self {
            evaluator,
            stack: Vec::new(),
            active: HashSet::new(),
            peak: 0,
            metadata: DocMetadata::default(),
            inline_merge: None,
        }
    }

    pub fn evaluator(&self) -> &'e Evaluator {
        self.evaluator
    }

    pub fn registry(&self) -> &'e Registry {
        self.evaluator.registry()
    }

    pub fn metadata(&self) -> &DocMetadata {
        &self.metadata
    }

    /// References currently being resolved, outermost first.
    pub fn chain(&self) -> &[String] {
        &self.stack
    }

    /// Evaluates a nested node within this context.
    pub fn eval(&mut self, node: &Node) -> Result<Node> {
        self.evaluator.eval_node(self, node)
    }

    /// Resolves a reference to its fully evaluated target, consulting the
    /// cache and guarding against cycles.
    pub fn resolve(&mut self, reference: &Reference) -> Result<Node> {
        let identity = reference.identity();
        if self.active.contains(&identity) {
            let mut chain = self.stack.clone();
            chain.push(identity);
            tracing::debug!(chain = ?chain, "cycle detected");
            return Err(EvalError::CycleDetected { chain });
        }

        let limit = self.evaluator.max_depth();
        let base = self.stack.len();
        if base >= limit {
            return Err(EvalError::DepthExceeded { limit });
        }

        let fingerprint = Fingerprint::from(reference);
        if let Some(hit) = self.evaluator.cache().and_then(|c| c.get(&fingerprint)) {
            // A hit stands in for its whole chain, which must still fit under the cap
            if base + hit.height <= limit {
                self.peak = self.peak.max(base + hit.height);
                return Ok(hit.node);
            }
            tracing::trace!(reference = %identity, height = hit.height, depth = base, "cached chain too deep here");
        }

        let outer_peak = std::mem::replace(&mut self.peak, base + 1);
        self.stack.push(identity.clone());
        self.active.insert(identity.clone());
        let result = self.resolve_uncached(reference);
        self.stack.pop();
        self.active.remove(&identity);
        let height = self.peak - base;
        self.peak = self.peak.max(outer_peak);

        let node = result?;
        if let Some(cache) = self.evaluator.cache() {
            cache.insert(fingerprint, &node, height);
        }
        Ok(node)
    }

    fn resolve_uncached(&mut self, reference: &Reference) -> Result<Node> {
        tracing::debug!(reference = %reference.identity(), depth = self.stack.len(), "resolving reference");
        let raw = self.evaluator.scopes().lookup(reference, &mut self.metadata)?;
        self.eval(&raw)
    }

    /// Attaches inline merge options to the directive currently being handled.
    pub fn set_inline_merge(&mut self, options: MergeOptions) {
        self.inline_merge = Some(options);
    }

    pub(crate) fn take_inline_merge(&mut self) -> Option<MergeOptions> {
        self.inline_merge.take()
    }
}
