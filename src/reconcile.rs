//! Alignment is positional: block `i` of the old document is compared with
//! block `i` of the new one. An insertion or deletion in the middle of the
//! sequence therefore shows up as Replace for every later index.
//!
//! When the new text strictly extends the old text, blocks that end before
//! the last line break of the old text are kept without being compared.

use tracing::debug;

use crate::document::{Document, Node};
use crate::fingerprint::fingerprint;
use crate::registry::Registry;

pub trait Materializer {
    /// Handle to a materialized node. Clones must refer to the same node.
    type Output: Clone;

    fn materialize(&mut self, node: &Node) -> Self::Output;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Reuse { index: usize },
    Replace { index: usize },
    Insert { index: usize },
    Remove { index: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Rebuild,
    Positional,
    SafeBoundary { index: usize },
}

#[derive(Debug)]
pub struct Reconciliation<P> {
    pub nodes: Vec<P>,
    pub decisions: Vec<Decision>,
    pub registry: Registry<P>,
    pub created: usize,
    pub strategy: Strategy,
}

impl<P> Reconciliation<P> {
    pub fn reused(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d, Decision::Reuse { .. }))
            .count()
    }
}

/// Reconciles `new` against `old`, reading reusable nodes from `registry`.
///
/// `registry` is left untouched; the result carries the replacement registry
/// holding exactly one entry per block of `new`.
pub fn reconcile<M: Materializer>(
    old: Option<&Document>,
    new: &Document,
    registry: &Registry<M::Output>,
    materializer: &mut M,
) -> Reconciliation<M::Output> {
    let Some(old) = old.filter(|doc| !doc.is_empty()) else {
        return rebuild(new, materializer);
    };

    if is_strict_extension(old.source(), new.source()) {
        return match boundary_index(old).filter(|&index| index <= new.blocks().len()) {
            Some(index) => incremental(old, new, index, registry, materializer),
            None => {
                debug!("no safe boundary in appended text, rebuilding");
                rebuild(new, materializer)
            }
        };
    }

    positional(old, new, registry, materializer)
}

/// Index of the first old block that may be affected by text appended to
/// `old`, or `None` when `new_source` does not strictly extend it or no
/// boundary can be established.
pub fn safe_boundary(old: &Document, new_source: &str) -> Option<usize> {
    if !is_strict_extension(old.source(), new_source) {
        return None;
    }
    boundary_index(old)
}

fn is_strict_extension(old: &str, new: &str) -> bool {
    old.len() < new.len() && new.starts_with(old)
}

fn boundary_index(old: &Document) -> Option<usize> {
    let boundary = old.source().rfind('\n')?;
    if old.blocks().iter().any(|node| node.span.end < node.span.start) {
        debug!("inverted block span, treating boundary as not found");
        return None;
    }
    old.blocks()
        .iter()
        .position(|node| node.span.end >= boundary)
}

struct Pass<'m, M: Materializer> {
    materializer: &'m mut M,
    nodes: Vec<M::Output>,
    decisions: Vec<Decision>,
    registry: Registry<M::Output>,
    created: usize,
}

impl<'m, M: Materializer> Pass<'m, M> {
    fn new(materializer: &'m mut M, capacity: usize) -> Self {
        Self {
            materializer,
            nodes: Vec::with_capacity(capacity),
            decisions: Vec::with_capacity(capacity),
            registry: Registry::with_capacity(capacity),
            created: 0,
        }
    }

    fn keep(&mut self, index: usize, node: &Node, presented: M::Output) {
        self.registry.put(node.id, presented.clone());
        self.nodes.push(presented);
        self.decisions.push(Decision::Reuse { index });
    }

    fn carry(&mut self, index: usize, old: &Node, new: &Node, previous: &Registry<M::Output>) {
        match previous.get(old.id) {
            Some(presented) => self.keep(index, new, presented.clone()),
            None => self.build(new, Decision::Replace { index }),
        }
    }

    fn build(&mut self, node: &Node, decision: Decision) {
        let presented = self.materializer.materialize(node);
        self.created += 1;
        self.registry.put(node.id, presented.clone());
        self.nodes.push(presented);
        self.decisions.push(decision);
    }

    fn remove(&mut self, index: usize) {
        self.decisions.push(Decision::Remove { index });
    }

    fn finish(self, strategy: Strategy) -> Reconciliation<M::Output> {
        let result = Reconciliation {
            nodes: self.nodes,
            decisions: self.decisions,
            registry: self.registry,
            created: self.created,
            strategy,
        };
        debug!(
            ?strategy,
            created = result.created,
            reused = result.reused(),
            blocks = result.nodes.len(),
            "reconciled document"
        );
        result
    }
}

fn rebuild<M: Materializer>(new: &Document, materializer: &mut M) -> Reconciliation<M::Output> {
    let mut pass = Pass::new(materializer, new.blocks().len());
    for (index, node) in new.blocks().iter().enumerate() {
        pass.build(node, Decision::Insert { index });
    }
    pass.finish(Strategy::Rebuild)
}

fn positional<M: Materializer>(
    old: &Document,
    new: &Document,
    registry: &Registry<M::Output>,
    materializer: &mut M,
) -> Reconciliation<M::Output> {
    let len = old.blocks().len().max(new.blocks().len());
    let mut pass = Pass::new(materializer, new.blocks().len());
    for index in 0..len {
        match (old.blocks().get(index), new.blocks().get(index)) {
            (Some(before), Some(after)) => {
                let same = before.block.kind() == after.block.kind()
                    && fingerprint(before) == fingerprint(after);
                if same {
                    pass.carry(index, before, after, registry);
                } else {
                    pass.build(after, Decision::Replace { index });
                }
            }
            (None, Some(after)) => pass.build(after, Decision::Insert { index }),
            (Some(_), None) => pass.remove(index),
            (None, None) => break,
        }
    }
    pass.finish(Strategy::Positional)
}

fn incremental<M: Materializer>(
    old: &Document,
    new: &Document,
    boundary: usize,
    registry: &Registry<M::Output>,
    materializer: &mut M,
) -> Reconciliation<M::Output> {
    let len = old.blocks().len().max(new.blocks().len());
    let mut pass = Pass::new(materializer, new.blocks().len());
    for index in 0..len {
        match (old.blocks().get(index), new.blocks().get(index)) {
            (Some(before), Some(after)) if index < boundary => {
                pass.carry(index, before, after, registry);
            }
            (Some(_), Some(after)) => pass.build(after, Decision::Replace { index }),
            (None, Some(after)) => pass.build(after, Decision::Insert { index }),
            (Some(_), None) => pass.remove(index),
            (None, None) => break,
        }
    }
    pass.finish(Strategy::SafeBoundary { index: boundary })
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::document::Block;

    #[derive(Default)]
    struct Recorder {
        built: Vec<String>,
    }

    impl Materializer for Recorder {
        type Output = Rc<String>;

        fn materialize(&mut self, node: &Node) -> Rc<String> {
            let label = fingerprint(node).as_str().to_string();
            self.built.push(label.clone());
            Rc::new(label)
        }
    }

    fn first_pass(source: &str, recorder: &mut Recorder) -> (Document, Reconciliation<Rc<String>>) {
        let doc = Document::parse(source);
        let result = reconcile(None, &doc, &Registry::new(), recorder);
        (doc, result)
    }

    #[test]
    fn empty_text_produces_nothing() {
        let mut recorder = Recorder::default();
        let (_, result) = first_pass("", &mut recorder);
        assert!(result.decisions.is_empty());
        assert!(result.nodes.is_empty());
        assert_eq!(result.created, 0);
        assert!(recorder.built.is_empty());
    }

    #[test]
    fn first_render_inserts_every_block() {
        let mut recorder = Recorder::default();
        let (doc, result) = first_pass("# A\n\nB\n\n- c\n", &mut recorder);
        assert_eq!(result.strategy, Strategy::Rebuild);
        assert_eq!(
            result.decisions,
            vec![
                Decision::Insert { index: 0 },
                Decision::Insert { index: 1 },
                Decision::Insert { index: 2 },
            ]
        );
        assert_eq!(result.created, 3);
        assert_eq!(result.registry.len(), 3);
        for node in doc.blocks() {
            assert!(result.registry.contains(node.id));
        }
    }

    #[test]
    fn reconciling_a_document_with_itself_reuses_everything() {
        let mut recorder = Recorder::default();
        let (doc, first) = first_pass("# A\n\nB\n\n```rust\nx\n```\n", &mut recorder);
        let second = reconcile(Some(&doc), &doc, &first.registry, &mut recorder);

        assert_eq!(second.strategy, Strategy::Positional);
        assert_eq!(second.created, 0);
        assert!(second
            .decisions
            .iter()
            .all(|d| matches!(d, Decision::Reuse { .. })));
        for (a, b) in first.nodes.iter().zip(&second.nodes) {
            assert!(Rc::ptr_eq(a, b));
        }
    }

    #[test]
    fn safe_boundary_for_single_paragraph_points_at_it() {
        let old = Document::parse("A\nB");
        assert_eq!(safe_boundary(&old, "A\nB\nC"), Some(0));
    }

    #[test]
    fn blocks_before_the_boundary_keep_their_presentation() {
        let mut recorder = Recorder::default();
        let (old, first) = first_pass("# A\n\nB", &mut recorder);
        let new = Document::parse("# A\n\nB\n\nC");
        assert_eq!(safe_boundary(&old, new.source()), Some(1));

        let second = reconcile(Some(&old), &new, &first.registry, &mut recorder);
        assert_eq!(second.strategy, Strategy::SafeBoundary { index: 1 });
        assert!(Rc::ptr_eq(&first.nodes[0], &second.nodes[0]));
        assert_eq!(
            second.decisions,
            vec![
                Decision::Reuse { index: 0 },
                Decision::Replace { index: 1 },
                Decision::Insert { index: 2 },
            ]
        );
        assert_eq!(second.created, 2);
        assert!(second.registry.contains(new.blocks()[0].id));
        assert!(!second.registry.contains(old.blocks()[0].id));
    }

    #[test]
    fn non_extension_uses_positional_comparison() {
        let old = Document::parse("A\nB");
        assert_eq!(safe_boundary(&old, "X\nB"), None);

        let mut recorder = Recorder::default();
        let (old, first) = first_pass("# A\n\nB", &mut recorder);
        let new = Document::parse("# X\n\nB");
        let second = reconcile(Some(&old), &new, &first.registry, &mut recorder);

        assert_eq!(second.strategy, Strategy::Positional);
        assert_eq!(
            second.decisions,
            vec![Decision::Replace { index: 0 }, Decision::Reuse { index: 1 }]
        );
        assert!(Rc::ptr_eq(&first.nodes[1], &second.nodes[1]));
    }

    #[test]
    fn appended_text_without_line_break_rebuilds() {
        let mut recorder = Recorder::default();
        let (old, first) = first_pass("# A", &mut recorder);
        let new = Document::parse("# AB");
        let second = reconcile(Some(&old), &new, &first.registry, &mut recorder);
        assert_eq!(second.strategy, Strategy::Rebuild);
        assert_eq!(second.decisions, vec![Decision::Insert { index: 0 }]);
    }

    #[test]
    fn boundary_past_every_block_rebuilds() {
        let mut recorder = Recorder::default();
        let (old, first) = first_pass("a\n\n", &mut recorder);
        let new = Document::parse("a\n\nb");
        let second = reconcile(Some(&old), &new, &first.registry, &mut recorder);
        assert_eq!(second.strategy, Strategy::Rebuild);
        assert_eq!(second.created, 2);
    }

    #[test]
    fn inverted_spans_fail_safe() {
        let old = Document::from_blocks(
            "x\ny",
            vec![Node::new(
                Block::Paragraph(vec![crate::document::Inline::Text("x y".into())]),
                3..1,
            )],
        );
        assert_eq!(safe_boundary(&old, "x\ny\nz"), None);

        let mut recorder = Recorder::default();
        let new = Document::parse("x\ny\nz");
        let result = reconcile(Some(&old), &new, &Registry::new(), &mut recorder);
        assert_eq!(result.strategy, Strategy::Rebuild);
    }

    #[test]
    fn trailing_blocks_are_removed() {
        let mut recorder = Recorder::default();
        let (old, first) = first_pass("a\n\nb\n\nc", &mut recorder);
        let new = Document::parse("a\n\nb");
        let second = reconcile(Some(&old), &new, &first.registry, &mut recorder);
        assert_eq!(
            second.decisions,
            vec![
                Decision::Reuse { index: 0 },
                Decision::Reuse { index: 1 },
                Decision::Remove { index: 2 },
            ]
        );
        assert_eq!(second.nodes.len(), 2);
        assert_eq!(second.registry.len(), 2);
    }

    #[test]
    fn middle_insertion_misaligns_later_blocks() {
        let mut recorder = Recorder::default();
        let (old, first) = first_pass("a\n\nc", &mut recorder);
        let new = Document::parse("a\n\nb\n\nc");
        let second = reconcile(Some(&old), &new, &first.registry, &mut recorder);
        assert_eq!(
            second.decisions,
            vec![
                Decision::Reuse { index: 0 },
                Decision::Replace { index: 1 },
                Decision::Insert { index: 2 },
            ]
        );
    }

    #[test]
    fn kind_change_replaces() {
        let mut recorder = Recorder::default();
        let (old, first) = first_pass("text", &mut recorder);
        let new = Document::parse("# text");
        let second = reconcile(Some(&old), &new, &first.registry, &mut recorder);
        assert_eq!(second.decisions, vec![Decision::Replace { index: 0 }]);
    }

    #[test]
    fn missing_registry_entry_is_rebuilt() {
        let mut recorder = Recorder::default();
        let doc = Document::parse("a\n\nb");
        let result = reconcile(Some(&doc), &doc, &Registry::new(), &mut recorder);
        assert_eq!(result.created, 2);
        assert_eq!(
            result.decisions,
            vec![Decision::Replace { index: 0 }, Decision::Replace { index: 1 }]
        );
    }
}
