//! Dependent-query gating.
//!
//! A dependent query is declared up front but only fetched once its parent
//! key holds a successful result. The graph here just remembers who is
//! waiting on whom; `QueryCache` drains it when a parent succeeds.

use std::collections::HashMap;

use crate::query_cache::{ErasedFetcher, QueryOptions};
use crate::query_key::QueryKey;

/// `dependent` may only fetch after `parent` has succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub parent: QueryKey,
    pub dependent: QueryKey,
}

impl DependencyEdge {
    pub fn new(parent: QueryKey, dependent: QueryKey) -> Self {
        Self { parent, dependent }
    }
}

pub(crate) struct PendingQuery {
    pub(crate) key: QueryKey,
    pub(crate) fetcher: ErasedFetcher,
    pub(crate) options: QueryOptions,
}

#[derive(Default)]
pub(crate) struct DependencyGraph {
    waiting: HashMap<QueryKey, Vec<PendingQuery>>,
}

impl DependencyGraph {
    /// Park `pending` until `parent` succeeds. Re-registering the same
    /// dependent replaces the earlier fetcher.
    pub(crate) fn register(&mut self, parent: QueryKey, pending: PendingQuery) {
        let list = self.waiting.entry(parent).or_default();
        list.retain(|p| p.key != pending.key);
        list.push(pending);
    }

    /// Remove and return everything gated on `parent`.
    pub(crate) fn take_ready(&mut self, parent: &QueryKey) -> Vec<PendingQuery> {
        self.waiting.remove(parent).unwrap_or_default()
    }

    /// Drop everything gated on `parent` without starting it. Returns how
    /// many dependents were discarded.
    pub(crate) fn forget(&mut self, parent: &QueryKey) -> usize {
        self.waiting.remove(parent).map_or(0, |list| list.len())
    }

    pub(crate) fn clear(&mut self) {
        self.waiting.clear();
    }

    pub(crate) fn waiting_on(&self, parent: &QueryKey) -> usize {
        self.waiting.get(parent).map_or(0, Vec::len)
    }

    pub(crate) fn is_waiting(&self, dependent: &QueryKey) -> bool {
        self.waiting
            .values()
            .any(|list| list.iter().any(|p| &p.key == dependent))
    }
}
