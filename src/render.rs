use std::rc::Rc;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::color::{Appearance, Rgb};
use crate::document::{Block, Inline, ListItem, Node};
use crate::reconcile::Materializer;
use crate::style::{highlight_code, ConcreteStyle, FontStyle, ThemeRules};
use crate::syntax::{SyntaxCatalog, SyntectGrammar};

const LINK_COLOR: Rgb = Rgb::new(0x00, 0x78, 0xd4);
const RULE: &str = "────────────────────────────────────────────────────────────────";

#[derive(Clone, Debug)]
pub struct StyledSegment {
    pub text: String,
    pub style: Style,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkTarget {
    pub label: String,
    pub url: String,
}

#[derive(Clone, Debug, Default)]
pub struct RenderedLine {
    pub segments: Vec<StyledSegment>,
    pub plain: String,
    /// Links that start on this line.
    pub links: Vec<LinkTarget>,
}

impl RenderedLine {
    pub fn to_line(&self) -> Line<'static> {
        if self.segments.is_empty() {
            return Line::raw("");
        }
        Line::from(
            self.segments
                .iter()
                .map(|segment| Span::styled(segment.text.clone(), segment.style))
                .collect::<Vec<_>>(),
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct RenderedBlock {
    pub lines: Vec<RenderedLine>,
}

impl RenderedBlock {
    pub fn plain(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.plain.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Link targets with the index of the line each one starts on.
    pub fn links(&self) -> impl Iterator<Item = (usize, &LinkTarget)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .flat_map(|(idx, line)| line.links.iter().map(move |link| (idx, link)))
    }
}

pub fn font_modifiers(flags: FontStyle) -> Modifier {
    let mut modifier = Modifier::empty();
    if flags.contains(FontStyle::BOLD) {
        modifier |= Modifier::BOLD;
    }
    if flags.contains(FontStyle::ITALIC) {
        modifier |= Modifier::ITALIC;
    }
    if flags.contains(FontStyle::UNDERLINE) {
        modifier |= Modifier::UNDERLINED;
    }
    modifier
}

fn code_style(style: ConcreteStyle) -> Style {
    let mut out = Style::default()
        .fg(style.foreground.into())
        .add_modifier(font_modifiers(style.font_style));
    if let Some(background) = style.background {
        out = out.bg(background.into());
    }
    out
}

#[derive(Default)]
struct InlineState {
    emphasis: usize,
    strong: usize,
    strikethrough: usize,
    link_depth: usize,
}

impl InlineState {
    fn style(&self, base: Style) -> Style {
        let mut style = base;
        if self.emphasis > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.strikethrough > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        if self.link_depth > 0 {
            style = style
                .fg(LINK_COLOR.into())
                .add_modifier(Modifier::UNDERLINED);
        }
        style
    }
}

struct LineBuilder {
    lines: Vec<RenderedLine>,
    current: RenderedLine,
}

impl LineBuilder {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            current: RenderedLine::default(),
        }
    }

    fn push_text(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        self.current.plain.push_str(text);
        self.current.segments.push(StyledSegment {
            text: text.to_string(),
            style,
        });
    }

    fn push_link(&mut self, link: LinkTarget) {
        self.current.links.push(link);
    }

    fn flush_line(&mut self, force_empty: bool) {
        if !force_empty && self.current.segments.is_empty() && self.current.links.is_empty() {
            return;
        }
        self.lines.push(std::mem::take(&mut self.current));
    }

    fn finish(mut self) -> Vec<RenderedLine> {
        self.flush_line(false);
        self.lines
    }
}

fn prefixed(lines: Vec<RenderedLine>, first: &str, rest: &str, style: Style) -> Vec<RenderedLine> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            let prefix = if idx == 0 { first } else { rest };
            let mut out = RenderedLine::default();
            out.plain.push_str(prefix);
            out.plain.push_str(&line.plain);
            out.segments.push(StyledSegment {
                text: prefix.to_string(),
                style,
            });
            out.segments.extend(line.segments);
            out.links = line.links;
            out
        })
        .collect()
}

pub struct BlockRenderer<'a> {
    catalog: &'a SyntaxCatalog,
    theme: &'a dyn ThemeRules,
    appearance: Appearance,
}

impl<'a> BlockRenderer<'a> {
    pub fn new(catalog: &'a SyntaxCatalog, theme: &'a dyn ThemeRules, appearance: Appearance) -> Self {
        Self {
            catalog,
            theme,
            appearance,
        }
    }

    pub fn appearance(&self) -> Appearance {
        self.appearance
    }

    /// Callers must invalidate previously built blocks after switching.
    pub fn set_theme(&mut self, theme: &'a dyn ThemeRules, appearance: Appearance) {
        self.theme = theme;
        self.appearance = appearance;
    }

    pub fn render(&self, node: &Node) -> RenderedBlock {
        RenderedBlock {
            lines: self.block_lines(&node.block),
        }
    }

    fn muted(&self) -> Style {
        Style::default().fg(Color::DarkGray)
    }

    fn block_lines(&self, block: &Block) -> Vec<RenderedLine> {
        match block {
            Block::Paragraph(inlines) => self.inline_lines(inlines, Style::default()),
            Block::Heading { level, inlines } => {
                let color = match level {
                    1 => Color::Yellow,
                    2 => Color::LightMagenta,
                    _ => Color::LightCyan,
                };
                let base = Style::default().fg(color).add_modifier(Modifier::BOLD);
                self.inline_lines(inlines, base)
            }
            Block::FencedCode { info, lines } => self.code_lines(info, lines),
            Block::List {
                ordered,
                start,
                items,
            } => self.list_lines(*ordered, *start, items),
            Block::Quote(children) => {
                let inner = self.children_lines(children);
                prefixed(inner, "│ ", "│ ", self.muted())
            }
            Block::ThematicBreak => {
                let mut builder = LineBuilder::new();
                builder.push_text(RULE, self.muted());
                builder.finish()
            }
            Block::Other(raw) => {
                let mut builder = LineBuilder::new();
                for line in raw.split('\n') {
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    builder.push_text(line, Style::default());
                    builder.flush_line(true);
                }
                builder.finish()
            }
        }
    }

    fn children_lines(&self, children: &[Node]) -> Vec<RenderedLine> {
        let mut lines = Vec::new();
        for (idx, child) in children.iter().enumerate() {
            if idx > 0 && !matches!(child.block, Block::List { .. }) {
                lines.push(RenderedLine::default());
            }
            lines.extend(self.block_lines(&child.block));
        }
        lines
    }

    fn list_lines(&self, ordered: bool, start: u64, items: &[ListItem]) -> Vec<RenderedLine> {
        let mut lines = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            let marker = if ordered {
                format!("{}. ", start.saturating_add(idx as u64))
            } else {
                "  • ".to_string()
            };
            let indent = " ".repeat(marker.chars().count());
            let mut inner = self.children_lines(&item.children);
            if inner.is_empty() {
                inner.push(RenderedLine::default());
            }
            let style = Style::default().add_modifier(Modifier::BOLD);
            lines.extend(prefixed(inner, &marker, &indent, style));
        }
        lines
    }

    fn inline_lines(&self, inlines: &[Inline], base: Style) -> Vec<RenderedLine> {
        let mut builder = LineBuilder::new();
        let mut state = InlineState::default();
        self.push_inlines(&mut builder, &mut state, inlines, base);
        builder.finish()
    }

    fn inline_code_style(&self) -> Style {
        let (fg, bg) = match self.appearance {
            Appearance::Light => (Rgb::new(0x00, 0x00, 0x00), Rgb::new(0xf0, 0xf0, 0xf0)),
            Appearance::Dark => (Rgb::new(0xf0, 0xf0, 0xf0), Rgb::new(0x31, 0x31, 0x31)),
        };
        Style::default().fg(fg.into()).bg(bg.into())
    }

    fn push_inlines(
        &self,
        builder: &mut LineBuilder,
        state: &mut InlineState,
        inlines: &[Inline],
        base: Style,
    ) {
        for inline in inlines {
            match inline {
                Inline::Text(text) => builder.push_text(text, state.style(base)),
                Inline::Code(code) => builder.push_text(code, self.inline_code_style()),
                Inline::Html(_) => {}
                Inline::Emphasis(children) => {
                    state.emphasis += 1;
                    self.push_inlines(builder, state, children, base);
                    state.emphasis -= 1;
                }
                Inline::Strong(children) => {
                    state.strong += 1;
                    self.push_inlines(builder, state, children, base);
                    state.strong -= 1;
                }
                Inline::Strikethrough(children) => {
                    state.strikethrough += 1;
                    self.push_inlines(builder, state, children, base);
                    state.strikethrough -= 1;
                }
                Inline::Link { url, children } => {
                    builder.push_link(LinkTarget {
                        label: Inline::plain_text(children),
                        url: url.clone(),
                    });
                    state.link_depth += 1;
                    self.push_inlines(builder, state, children, base);
                    state.link_depth -= 1;
                }
                Inline::Image { url, alt } => {
                    let alt = if alt.trim().is_empty() { "image" } else { alt.trim() };
                    builder.push_text(
                        &format!("[image: {alt}] ({url})"),
                        Style::default().fg(Color::LightBlue),
                    );
                }
                Inline::SoftBreak => builder.push_text(" ", state.style(base)),
                Inline::HardBreak => builder.flush_line(true),
                Inline::TaskMarker(done) => {
                    builder.push_text(if *done { "[x] " } else { "[ ] " }, self.muted());
                }
                Inline::FootnoteRef(name) => {
                    builder.push_text(&format!("[^{name}]"), self.muted());
                }
            }
        }
    }

    fn code_lines(&self, info: &str, lines: &[String]) -> Vec<RenderedLine> {
        let mut builder = LineBuilder::new();
        if lines.len() > 1 && !info.is_empty() {
            builder.push_text(info, self.muted().add_modifier(Modifier::ITALIC));
            builder.flush_line(false);
        }

        let grammar: Option<SyntectGrammar<'_>> = self.catalog.grammar(info);
        let code = lines.join("\n");
        for runs in highlight_code(&code, grammar.as_ref(), self.theme) {
            builder.push_text("  ", self.muted());
            for run in runs {
                let style = code_style(run.style.to_concrete(self.appearance));
                builder.push_text(&run.text, style);
            }
            builder.flush_line(true);
        }

        builder.finish()
    }
}

impl Materializer for BlockRenderer<'_> {
    type Output = Rc<RenderedBlock>;

    fn materialize(&mut self, node: &Node) -> Rc<RenderedBlock> {
        Rc::new(self.render(node))
    }
}
