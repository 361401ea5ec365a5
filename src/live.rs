use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::reconcile::{reconcile, Decision, Materializer, Reconciliation, Strategy};
use crate::registry::Registry;

/// Reconciled but not yet applied work for one text revision.
#[derive(Debug)]
pub struct PendingUpdate<P> {
    revision: u64,
    document: Document,
    result: Reconciliation<P>,
}

impl<P> PendingUpdate<P> {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn reconciliation(&self) -> &Reconciliation<P> {
        &self.result
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub revision: u64,
    pub decisions: Vec<Decision>,
    pub created: usize,
    pub strategy: Strategy,
}

impl Applied {
    pub fn reused(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d, Decision::Reuse { .. }))
            .count()
    }
}

pub struct LiveDocument<M: Materializer> {
    materializer: M,
    current: Option<Document>,
    registry: Registry<M::Output>,
    nodes: Vec<M::Output>,
    revision: u64,
}

impl<M: Materializer> LiveDocument<M> {
    pub fn new(materializer: M) -> Self {
        Self {
            materializer,
            current: None,
            registry: Registry::new(),
            nodes: Vec::new(),
            revision: 0,
        }
    }

    pub fn nodes(&self) -> &[M::Output] {
        &self.nodes
    }

    pub fn document(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    pub fn registry(&self) -> &Registry<M::Output> {
        &self.registry
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn materializer(&self) -> &M {
        &self.materializer
    }

    pub fn materializer_mut(&mut self) -> &mut M {
        &mut self.materializer
    }

    /// Parses and reconciles `text` without touching the live state. Any
    /// update prepared earlier can no longer be committed.
    pub fn prepare(&mut self, text: impl Into<String>) -> PendingUpdate<M::Output> {
        self.revision += 1;
        let document = Document::parse(text);
        let result = reconcile(
            self.current.as_ref(),
            &document,
            &self.registry,
            &mut self.materializer,
        );
        PendingUpdate {
            revision: self.revision,
            document,
            result,
        }
    }

    /// Applies `pending` wholesale, or rejects it if a newer update was prepared.
    pub fn commit(&mut self, pending: PendingUpdate<M::Output>) -> Result<Applied> {
        if pending.revision != self.revision {
            debug!(
                pending = pending.revision,
                current = self.revision,
                "dropping superseded update"
            );
            return Err(Error::Superseded {
                pending: pending.revision,
                current: self.revision,
            });
        }

        let PendingUpdate {
            revision,
            document,
            result,
        } = pending;
        let mut registry = result.registry;
        let stale = registry.evict_all_except(document.blocks().iter().map(|node| node.id));
        if stale > 0 {
            debug!(stale, "evicted entries without a live block");
        }
        self.current = Some(document);
        self.registry = registry;
        self.nodes = result.nodes;
        Ok(Applied {
            revision,
            decisions: result.decisions,
            created: result.created,
            strategy: result.strategy,
        })
    }

    pub fn update(&mut self, text: impl Into<String>) -> Result<Applied> {
        let pending = self.prepare(text);
        self.commit(pending)
    }

    /// Forgets the previous document so the next update rebuilds every block.
    /// The current nodes stay visible until then.
    pub fn invalidate(&mut self) {
        self.current = None;
        self.registry.clear();
    }
}
