use bitflags::bitflags;
use syntect::parsing::Scope;
use tracing::warn;

use crate::color::{parse_hex, Appearance, Rgb};
use crate::tokenize::{Grammar, TokenizerSession};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FontStyle: u8 {
        const BOLD = 0b001;
        const ITALIC = 0b010;
        const UNDERLINE = 0b100;
    }
}

impl From<syntect::highlighting::FontStyle> for FontStyle {
    fn from(style: syntect::highlighting::FontStyle) -> Self {
        use syntect::highlighting::FontStyle as Syn;
        let mut out = FontStyle::empty();
        out.set(FontStyle::BOLD, style.contains(Syn::BOLD));
        out.set(FontStyle::ITALIC, style.contains(Syn::ITALIC));
        out.set(FontStyle::UNDERLINE, style.contains(Syn::UNDERLINE));
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColorRef(pub String);

impl ColorRef {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Rgb> for ColorRef {
    fn from(rgb: Rgb) -> Self {
        Self(rgb.to_hex())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThemeRule {
    pub selector: String,
    pub foreground: Option<ColorRef>,
    pub background: Option<ColorRef>,
    pub font_style: Option<FontStyle>,
}

pub trait ThemeRules {
    /// Matching rules, most specific first.
    fn matching_rules(&self, scopes: &[Scope]) -> Vec<ThemeRule>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedStyle {
    pub foreground: Option<ColorRef>,
    pub background: Option<ColorRef>,
    pub font_style: FontStyle,
}

/// Colors take the first rule that sets them; font style flags from every
/// matching rule are OR-ed together.
pub fn resolve_style<T: ThemeRules + ?Sized>(scopes: &[Scope], theme: &T) -> ResolvedStyle {
    let mut style = ResolvedStyle::default();
    if scopes.is_empty() {
        return style;
    }
    for rule in theme.matching_rules(scopes) {
        if style.foreground.is_none() {
            style.foreground = rule.foreground;
        }
        if style.background.is_none() {
            style.background = rule.background;
        }
        if let Some(flags) = rule.font_style {
            style.font_style |= flags;
        }
    }
    style
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConcreteStyle {
    pub foreground: Rgb,
    pub background: Option<Rgb>,
    pub font_style: FontStyle,
}

impl ResolvedStyle {
    /// Resolves color references. Unusable colors fall back to the
    /// appearance default (foreground) or to unset (background).
    pub fn to_concrete(&self, appearance: Appearance) -> ConcreteStyle {
        let foreground = self
            .foreground
            .as_ref()
            .and_then(|color| convert(color, "foreground"))
            .unwrap_or_else(|| appearance.default_foreground());
        let background = self
            .background
            .as_ref()
            .and_then(|color| convert(color, "background"));
        ConcreteStyle {
            foreground,
            background,
            font_style: self.font_style,
        }
    }
}

fn convert(color: &ColorRef, role: &'static str) -> Option<Rgb> {
    match parse_hex(color.as_str()) {
        Ok(rgb) => Some(rgb),
        Err(err) => {
            warn!(role, error = %err, "unusable theme color");
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub style: ResolvedStyle,
}

pub fn highlight_code<G, T>(code: &str, grammar: Option<&G>, theme: &T) -> Vec<Vec<StyledRun>>
where
    G: Grammar,
    T: ThemeRules + ?Sized,
{
    let mut session = TokenizerSession::new(grammar);
    code.split('\n')
        .map(|line| {
            session
                .tokenize_line(line)
                .into_iter()
                .map(|token| StyledRun {
                    text: token.text(line).to_string(),
                    style: resolve_style(&token.scopes, theme),
                })
                .collect()
        })
        .collect()
}
