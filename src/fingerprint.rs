//! Content fingerprints for presentation reuse.
//!
//! Every free-text field is written as `<byte len>:<text>` and every child
//! fingerprint is framed the same way, so no content can be mistaken for
//! structure. Spans and node ids never contribute.

use std::fmt::Write as _;

use crate::document::{Block, Inline, Node};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn fingerprint(node: &Node) -> Fingerprint {
    let mut out = String::new();
    write_block(&mut out, &node.block);
    Fingerprint(out)
}

fn field(out: &mut String, text: &str) {
    let _ = write!(out, "{}:{}", text.len(), text);
}

fn framed(out: &mut String, build: impl FnOnce(&mut String)) {
    let mut inner = String::new();
    build(&mut inner);
    field(out, &inner);
}

fn write_block(out: &mut String, block: &Block) {
    match block {
        Block::Paragraph(inlines) => {
            out.push('P');
            write_inlines(out, inlines);
        }
        Block::Heading { level, inlines } => {
            let _ = write!(out, "H{level}");
            write_inlines(out, inlines);
        }
        Block::FencedCode { info, lines } => {
            out.push('C');
            field(out, info);
            let _ = write!(out, "#{}", lines.len());
            for line in lines {
                field(out, line);
            }
        }
        Block::List {
            ordered,
            start,
            items,
        } => {
            if *ordered {
                let _ = write!(out, "Lo{start}#{}", items.len());
            } else {
                let _ = write!(out, "Lu#{}", items.len());
            }
            for item in items {
                framed(out, |inner| write_children(inner, &item.children));
            }
        }
        Block::Quote(children) => {
            out.push('Q');
            write_children(out, children);
        }
        Block::ThematicBreak => out.push('T'),
        Block::Other(raw) => {
            out.push('O');
            field(out, raw);
        }
    }
}

fn write_children(out: &mut String, children: &[Node]) {
    let _ = write!(out, "#{}", children.len());
    for child in children {
        framed(out, |inner| write_block(inner, &child.block));
    }
}

fn write_inlines(out: &mut String, inlines: &[Inline]) {
    let _ = write!(out, "[{}", inlines.len());
    for inline in inlines {
        framed(out, |inner| write_inline(inner, inline));
    }
    out.push(']');
}

fn write_inline(out: &mut String, inline: &Inline) {
    match inline {
        Inline::Text(text) => {
            out.push('t');
            field(out, text);
        }
        Inline::Code(code) => {
            out.push('c');
            field(out, code);
        }
        Inline::Emphasis(children) => {
            out.push('e');
            write_inlines(out, children);
        }
        Inline::Strong(children) => {
            out.push('s');
            write_inlines(out, children);
        }
        Inline::Strikethrough(children) => {
            out.push('x');
            write_inlines(out, children);
        }
        Inline::Link { url, children } => {
            out.push('l');
            field(out, url);
            write_inlines(out, children);
        }
        Inline::Image { url, alt } => {
            out.push('i');
            field(out, url);
            field(out, alt);
        }
        Inline::SoftBreak => out.push('b'),
        Inline::HardBreak => out.push('B'),
        Inline::Html(html) => {
            out.push('h');
            field(out, html);
        }
        Inline::TaskMarker(done) => out.push(if *done { 'K' } else { 'k' }),
        Inline::FootnoteRef(name) => {
            out.push('f');
            field(out, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, ListItem};
    use proptest::prelude::*;

    fn block_fingerprints(source: &str) -> Vec<Fingerprint> {
        Document::parse(source)
            .blocks()
            .iter()
            .map(fingerprint)
            .collect()
    }

    #[test]
    fn stable_across_copies_and_parses() {
        let doc = Document::parse("# T\n\n- a\n- b\n\n> q\n");
        for node in doc.blocks() {
            assert_eq!(fingerprint(node), fingerprint(&node.clone()));
        }
        assert_eq!(
            block_fingerprints("# T\n\n- a\n- b\n"),
            block_fingerprints("# T\n\n- a\n- b\n")
        );
    }

    #[test]
    fn heading_level_change_is_local() {
        let before = block_fingerprints("# Title\n\nbody\n");
        let after = block_fingerprints("## Title\n\nbody\n");
        assert_ne!(before[0], after[0]);
        assert_eq!(before[1], after[1]);
    }

    #[test]
    fn code_language_change_is_local() {
        let before = block_fingerprints("intro\n\n```rust\nlet x = 1;\n```\n\noutro\n");
        let after = block_fingerprints("intro\n\n```python\nlet x = 1;\n```\n\noutro\n");
        assert_eq!(before[0], after[0]);
        assert_ne!(before[1], after[1]);
        assert_eq!(before[2], after[2]);
    }

    #[test]
    fn list_ordering_and_start_are_part_of_the_fingerprint() {
        let unordered = block_fingerprints("- a\n");
        let ordered = block_fingerprints("1. a\n");
        let ordered_late = block_fingerprints("2. a\n");
        assert_ne!(unordered[0], ordered[0]);
        assert_ne!(ordered[0], ordered_late[0]);
    }

    #[test]
    fn nesting_does_not_collide_with_flattening() {
        let text = |s: &str| Node::new(Block::Paragraph(vec![Inline::Text(s.into())]), 0..0);
        let one_item_two_paras = Node::new(
            Block::List {
                ordered: false,
                start: 1,
                items: vec![ListItem {
                    children: vec![text("a"), text("b")],
                }],
            },
            0..0,
        );
        let two_items = Node::new(
            Block::List {
                ordered: false,
                start: 1,
                items: vec![
                    ListItem {
                        children: vec![text("a")],
                    },
                    ListItem {
                        children: vec![text("b")],
                    },
                ],
            },
            0..0,
        );
        assert_ne!(fingerprint(&one_item_two_paras), fingerprint(&two_items));
    }

    #[test]
    fn separator_characters_in_text_cannot_forge_structure() {
        let split = Node::new(
            Block::Paragraph(vec![Inline::Text("a".into()), Inline::Text("b".into())]),
            0..0,
        );
        let forged = Node::new(Block::Paragraph(vec![Inline::Text("a3:t1:b".into())]), 0..0);
        let joined = Node::new(Block::Paragraph(vec![Inline::Text("ab".into())]), 0..0);
        assert_ne!(fingerprint(&split), fingerprint(&forged));
        assert_ne!(fingerprint(&split), fingerprint(&joined));
    }

    #[test]
    fn span_and_identity_do_not_matter() {
        let a = Node::new(Block::ThematicBreak, 0..3);
        let b = Node::new(Block::ThematicBreak, 10..13);
        assert_ne!(a.id, b.id);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    proptest! {
        #[test]
        fn reparsing_yields_identical_fingerprints(
            parts in proptest::collection::vec(
                prop_oneof![
                    Just("# head\n\n"),
                    Just("para *em* **strong**\n\n"),
                    Just("```rust\nfn x() {}\n```\n\n"),
                    Just("- a\n- b\n\n"),
                    Just("1. one\n\n"),
                    Just("> quote\n\n"),
                    Just("---\n\n"),
                    Just("| a |\n|---|\n| 1 |\n\n"),
                ],
                0..8,
            )
        ) {
            let source: String = parts.concat();
            let first = Document::parse(source.clone());
            let second = Document::parse(source);
            prop_assert_eq!(first.blocks().len(), second.blocks().len());
            for (a, b) in first.blocks().iter().zip(second.blocks()) {
                prop_assert_eq!(fingerprint(a), fingerprint(b));
                prop_assert_eq!(fingerprint(a), fingerprint(&a.clone()));
            }
        }
    }
}
