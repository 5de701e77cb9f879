//! Cost-bounded memo of resolved references.
//!
//! Entries are keyed by the full reference fingerprint (scope, resource id,
//! path and inline merge options), so two references that differ in any of
//! these never share an entry. The cache stores the evaluated target of a
//! reference before any `$use` transform or inline merge is applied.
//!
//! Each entry also records the height of the reference chain walked to
//! produce it, so a hit can be refused when replaying that chain from the
//! current depth would exceed the evaluator's depth cap.
//!
//! Eviction is approximate: when over budget, a small sample of entries is
//! inspected and the least-hit one is dropped.

use crate::config::CacheConfig;
use crate::merge::MergeOptions;
use crate::node::Node;
use crate::scope::{Reference, ScopeKind};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

const EVICTION_SAMPLE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub scope: ScopeKind,
    pub resource: Option<String>,
    pub path: String,
    pub merge: Option<MergeOptions>,
}

impl From<&Reference> for Fingerprint {
    fn from(r: &Reference) -> Self {
        Self {
            scope: r.scope,
            resource: r.resource.clone(),
            path: r.path.clone(),
            merge: r.merge,
        }
    }
}

/// A cached reference target.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached {
    pub node: Node,
    /// Longest reference chain, counting the reference itself, walked to
    /// produce `node`.
    pub height: usize,
}

struct Entry {
    node: Arc<Node>,
    height: usize,
    cost: i64,
    hits: AtomicU64,
}

pub struct RefCache {
    entries: DashMap<Fingerprint, Entry>,
    // Signed so concurrent insert/evict interleavings cannot wrap
    used: AtomicI64,
    config: CacheConfig,
}

impl RefCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            used: AtomicI64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get(&self, key: &Fingerprint) -> Option<Cached> {
        let entry = self.entries.get(key)?;
        entry.hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(scope = %key.scope, path = %key.path, "cache hit");
        Some(Cached {
            node: Node::clone(&entry.node),
            height: entry.height,
        })
    }

    /// Stores `node` under `key` together with the height of the reference
    /// chain that produced it. Returns `false` when the value alone is
    /// larger than the whole budget and was not admitted.
    pub fn insert(&self, key: Fingerprint, node: &Node, height: usize) -> bool {
        let cost = estimate_cost(node);
        if cost as u64 > self.config.max_cost || self.config.max_entries == 0 {
            tracing::debug!(scope = %key.scope, path = %key.path, cost, "value too large to cache");
            return false;
        }
        let entry = Entry {
            node: Arc::new(node.clone()),
            height,
            cost,
            hits: AtomicU64::new(0),
        };
        if let Some(previous) = self.entries.insert(key, entry) {
            self.used.fetch_sub(previous.cost, Ordering::Relaxed);
        }
        self.used.fetch_add(cost, Ordering::Relaxed);
        self.evict_over_budget();
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated cost of everything currently held.
    pub fn used_cost(&self) -> u64 {
        self.used.load(Ordering::Relaxed).max(0) as u64
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.used.store(0, Ordering::Relaxed);
    }

    fn over_budget(&self) -> bool {
        self.used_cost() > self.config.max_cost || self.entries.len() > self.config.max_entries
    }

    fn evict_over_budget(&self) {
        while self.over_budget() {
            // The iterator holds shard locks; pick the victim before removing it.
            let victim = self
                .entries
                .iter()
                .take(EVICTION_SAMPLE)
                .min_by_key(|e| e.value().hits.load(Ordering::Relaxed))
                .map(|e| e.key().clone());
            let Some(victim) = victim else { break };
            if let Some((key, entry)) = self.entries.remove(&victim) {
                self.used.fetch_sub(entry.cost, Ordering::Relaxed);
                tracing::trace!(scope = %key.scope, path = %key.path, "evicted cache entry");
            }
        }
    }
}

/// Rough in-memory size of a node, in bytes.
pub fn estimate_cost(node: &Node) -> i64 {
    match node {
        Node::Null | Node::Bool(_) => 1,
        Node::Number(_) => 8,
        Node::String(s) => 16 + s.len() as i64,
        Node::Sequence(items) => 24 + items.iter().map(estimate_cost).sum::<i64>(),
        Node::Mapping(m) => 48 + m.iter().map(|(k, v)| 16 + k.len() as i64 + estimate_cost(v)).sum::<i64>(),
    }
}
