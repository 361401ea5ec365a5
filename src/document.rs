use std::iter::Peekable;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

/// Identity of a parsed node. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Link { url: String, children: Vec<Inline> },
    Image { url: String, alt: String },
    SoftBreak,
    HardBreak,
    Html(String),
    TaskMarker(bool),
    FootnoteRef(String),
}

impl Inline {
    pub fn plain_text(inlines: &[Inline]) -> String {
        let mut out = String::new();
        for inline in inlines {
            match inline {
                Inline::Text(text) | Inline::Code(text) | Inline::Html(text) => {
                    out.push_str(text);
                }
                Inline::Emphasis(children)
                | Inline::Strong(children)
                | Inline::Strikethrough(children)
                | Inline::Link { children, .. } => out.push_str(&Inline::plain_text(children)),
                Inline::Image { alt, .. } => out.push_str(alt),
                Inline::SoftBreak => out.push(' '),
                Inline::HardBreak => out.push('\n'),
                Inline::TaskMarker(done) => out.push_str(if *done { "[x] " } else { "[ ] " }),
                Inline::FootnoteRef(name) => {
                    out.push_str("[^");
                    out.push_str(name);
                    out.push(']');
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListItem {
    pub children: Vec<Node>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Heading {
        level: u8,
        inlines: Vec<Inline>,
    },
    FencedCode {
        info: String,
        lines: Vec<String>,
    },
    List {
        ordered: bool,
        start: u64,
        items: Vec<ListItem>,
    },
    Quote(Vec<Node>),
    ThematicBreak,
    Other(String),
}

/// Discriminant of a [`Block`], compared before fingerprints during reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    Heading,
    FencedCode,
    List,
    Quote,
    ThematicBreak,
    Other,
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Paragraph(_) => BlockKind::Paragraph,
            Block::Heading { .. } => BlockKind::Heading,
            Block::FencedCode { .. } => BlockKind::FencedCode,
            Block::List { .. } => BlockKind::List,
            Block::Quote(_) => BlockKind::Quote,
            Block::ThematicBreak => BlockKind::ThematicBreak,
            Block::Other(_) => BlockKind::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub span: Range<usize>,
    pub block: Block,
}

impl Node {
    pub fn new(block: Block, span: Range<usize>) -> Self {
        Self {
            id: NodeId::next(),
            span,
            block,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Document {
    source: String,
    blocks: Vec<Node>,
}

impl Document {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let blocks = parse_blocks(&source);
        Self { source, blocks }
    }

    pub fn from_blocks(source: impl Into<String>, blocks: Vec<Node>) -> Self {
        Self {
            source: source.into(),
            blocks,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn blocks(&self) -> &[Node] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

fn heading_level_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn parse_blocks(source: &str) -> Vec<Node> {
    let events: Vec<(Event<'_>, Range<usize>)> = Parser::new_ext(source, markdown_options())
        .into_offset_iter()
        .collect();
    let mut builder = TreeBuilder {
        source,
        events: events.into_iter().peekable(),
    };
    builder.blocks()
}

fn is_inline_event(event: &Event<'_>) -> bool {
    match event {
        Event::Start(tag) => matches!(
            tag,
            Tag::Emphasis
                | Tag::Strong
                | Tag::Strikethrough
                | Tag::Link { .. }
                | Tag::Image { .. }
        ),
        Event::Text(_)
        | Event::Code(_)
        | Event::InlineHtml(_)
        | Event::FootnoteReference(_)
        | Event::SoftBreak
        | Event::HardBreak
        | Event::TaskListMarker(_) => true,
        _ => false,
    }
}

/// Drops trailing line terminators so a span ends on its last content byte.
fn trim_span(source: &str, span: Range<usize>) -> Range<usize> {
    let start = span.start.min(source.len());
    let mut end = span.end.min(source.len()).max(start);
    let bytes = source.as_bytes();
    while end > start && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    start..end
}

struct TreeBuilder<'a> {
    source: &'a str,
    events: Peekable<std::vec::IntoIter<(Event<'a>, Range<usize>)>>,
}

impl<'a> TreeBuilder<'a> {
    fn node(&self, block: Block, span: Range<usize>) -> Node {
        Node::new(block, trim_span(self.source, span))
    }

    fn blocks(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        loop {
            let Some((event, _)) = self.events.peek() else {
                return nodes;
            };
            if is_inline_event(event) {
                // Tight list items carry inline content without a paragraph.
                let (inlines, span) = self.inline_run();
                if let Some(span) = span {
                    nodes.push(self.node(Block::Paragraph(inlines), span));
                }
                continue;
            }

            let Some((event, range)) = self.events.next() else {
                return nodes;
            };
            match event {
                Event::End(_) => return nodes,
                Event::Start(tag) => nodes.push(self.block(tag, range)),
                Event::Rule => nodes.push(self.node(Block::ThematicBreak, range)),
                Event::Html(raw) => nodes.push(self.node(Block::Other(raw.to_string()), range)),
                _ => {}
            }
        }
    }

    fn block(&mut self, tag: Tag<'a>, range: Range<usize>) -> Node {
        match tag {
            Tag::Paragraph => {
                let inlines = self.inlines();
                self.node(Block::Paragraph(inlines), range)
            }
            Tag::Heading { level, .. } => {
                let inlines = self.inlines();
                self.node(
                    Block::Heading {
                        level: heading_level_u8(level),
                        inlines,
                    },
                    range,
                )
            }
            Tag::CodeBlock(kind) => {
                let info = match kind {
                    CodeBlockKind::Fenced(info) => info.trim().to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                let code = self.code_text();
                let code = code.strip_suffix('\n').unwrap_or(&code);
                let lines = code.split('\n').map(str::to_string).collect();
                self.node(Block::FencedCode { info, lines }, range)
            }
            Tag::List(start) => {
                let items = self.list_items();
                self.node(
                    Block::List {
                        ordered: start.is_some(),
                        start: start.unwrap_or(1),
                        items,
                    },
                    range,
                )
            }
            Tag::BlockQuote(..) => {
                let children = self.blocks();
                self.node(Block::Quote(children), range)
            }
            _ => {
                self.skip_container();
                let span = trim_span(self.source, range);
                let raw = self.source[span.clone()].to_string();
                Node::new(Block::Other(raw), span)
            }
        }
    }

    fn list_items(&mut self) -> Vec<ListItem> {
        let mut items = Vec::new();
        while let Some((event, _)) = self.events.next() {
            match event {
                Event::Start(Tag::Item) => items.push(ListItem {
                    children: self.blocks(),
                }),
                Event::End(_) => break,
                _ => {}
            }
        }
        items
    }

    fn code_text(&mut self) -> String {
        let mut code = String::new();
        while let Some((event, _)) = self.events.next() {
            match event {
                Event::Text(text) => code.push_str(&text),
                Event::End(_) => break,
                _ => {}
            }
        }
        code
    }

    fn skip_container(&mut self) {
        let mut depth = 1usize;
        while let Some((event, _)) = self.events.next() {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn inline_run(&mut self) -> (Vec<Inline>, Option<Range<usize>>) {
        let mut inlines = Vec::new();
        let mut span: Option<Range<usize>> = None;
        while let Some((event, _)) = self.events.peek() {
            if !is_inline_event(event) {
                break;
            }
            let Some((event, range)) = self.events.next() else {
                break;
            };
            span = Some(match span {
                Some(current) => current.start.min(range.start)..current.end.max(range.end),
                None => range,
            });
            if let Some(inline) = self.inline(event) {
                inlines.push(inline);
            }
        }
        (inlines, span)
    }

    fn inlines(&mut self) -> Vec<Inline> {
        let mut inlines = Vec::new();
        while let Some((event, _)) = self.events.next() {
            if matches!(event, Event::End(_)) {
                break;
            }
            if let Some(inline) = self.inline(event) {
                inlines.push(inline);
            }
        }
        inlines
    }

    fn inline(&mut self, event: Event<'a>) -> Option<Inline> {
        let inline = match event {
            Event::Text(text) => Inline::Text(text.to_string()),
            Event::Code(code) => Inline::Code(code.to_string()),
            Event::InlineHtml(html) | Event::Html(html) => Inline::Html(html.to_string()),
            Event::FootnoteReference(name) => Inline::FootnoteRef(name.to_string()),
            Event::SoftBreak => Inline::SoftBreak,
            Event::HardBreak => Inline::HardBreak,
            Event::TaskListMarker(done) => Inline::TaskMarker(done),
            Event::Start(Tag::Emphasis) => Inline::Emphasis(self.inlines()),
            Event::Start(Tag::Strong) => Inline::Strong(self.inlines()),
            Event::Start(Tag::Strikethrough) => Inline::Strikethrough(self.inlines()),
            Event::Start(Tag::Link { dest_url, .. }) => Inline::Link {
                url: dest_url.to_string(),
                children: self.inlines(),
            },
            Event::Start(Tag::Image { dest_url, .. }) => {
                let alt = self.inlines();
                Inline::Image {
                    url: dest_url.to_string(),
                    alt: Inline::plain_text(&alt),
                }
            }
            Event::Start(_) => {
                self.skip_container();
                return None;
            }
            _ => return None,
        };
        Some(inline)
    }
}
