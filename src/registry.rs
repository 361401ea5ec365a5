use std::collections::{HashMap, HashSet};

use crate::document::NodeId;

#[derive(Clone, Debug)]
pub struct Registry<P> {
    entries: HashMap<NodeId, P>,
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<P> Registry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: NodeId) -> Option<&P> {
        self.entries.get(&key)
    }

    pub fn put(&mut self, key: NodeId, node: P) -> Option<P> {
        self.entries.insert(key, node)
    }

    pub fn contains(&self, key: NodeId) -> bool {
        self.entries.contains_key(&key)
    }

    /// Drops every entry whose key is not in `live`. Returns how many were evicted.
    pub fn evict_all_except<I>(&mut self, live: I) -> usize
    where
        I: IntoIterator<Item = NodeId>,
    {
        let live: HashSet<NodeId> = live.into_iter().collect();
        let before = self.entries.len();
        self.entries.retain(|key, _| live.contains(key));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
