use std::cmp::Ordering;
use std::str::FromStr;

use syntect::highlighting::{ScopeSelectors, Theme, ThemeSet};
use syntect::parsing::{ParseState, Scope, ScopeStack, SyntaxReference, SyntaxSet};

use crate::color::Rgb;
use crate::error::{Error, Result};
use crate::style::{ColorRef, FontStyle, ThemeRule, ThemeRules};
use crate::tokenize::{Grammar, Token};

pub struct SyntaxCatalog {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for SyntaxCatalog {
    fn default() -> Self {
        Self::load_defaults()
    }
}

impl SyntaxCatalog {
    pub fn load_defaults() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    /// Resolves a fence info string such as `rust` or `py title="x"`.
    pub fn grammar(&self, language: &str) -> Option<SyntectGrammar<'_>> {
        let token = language.split_whitespace().next()?;
        let token = token.split(',').next().unwrap_or(token);
        let syntax = self
            .syntax_set
            .find_syntax_by_token(token)
            .or_else(|| self.syntax_set.find_syntax_by_name(token))?;
        Some(SyntectGrammar {
            syntax,
            syntax_set: &self.syntax_set,
        })
    }

    pub fn theme(&self, name: &str) -> Result<SyntectTheme> {
        self.theme_set
            .themes
            .get(name)
            .map(SyntectTheme::new)
            .ok_or_else(|| Error::UnknownTheme(name.to_string()))
    }

    pub fn theme_names(&self) -> impl Iterator<Item = &str> {
        self.theme_set.themes.keys().map(String::as_str)
    }
}

pub struct SyntectGrammar<'a> {
    syntax: &'a SyntaxReference,
    syntax_set: &'a SyntaxSet,
}

impl SyntectGrammar<'_> {
    pub fn name(&self) -> &str {
        &self.syntax.name
    }
}

#[derive(Clone)]
pub struct SyntectLineState {
    parse: ParseState,
    scopes: ScopeStack,
}

impl Grammar for SyntectGrammar<'_> {
    type State = SyntectLineState;

    fn tokenize_line(
        &self,
        line: &str,
        state: Option<&SyntectLineState>,
    ) -> Result<(Vec<Token>, SyntectLineState)> {
        let mut state = match state {
            Some(state) => state.clone(),
            None => SyntectLineState {
                parse: ParseState::new(self.syntax),
                scopes: ScopeStack::new(),
            },
        };

        // The bundled syntaxes expect a terminated line; the session clips the extra byte.
        let mut input = String::with_capacity(line.len() + 1);
        input.push_str(line);
        input.push('\n');

        let ops = state
            .parse
            .parse_line(&input, self.syntax_set)
            .map_err(|err| Error::Tokenize(err.to_string()))?;

        let mut tokens = Vec::new();
        let mut cursor = 0;
        for (offset, op) in ops {
            if offset > cursor {
                tokens.push(Token::new(cursor, offset, state.scopes.as_slice().to_vec()));
                cursor = offset;
            }
            state
                .scopes
                .apply(&op)
                .map_err(|err| Error::Tokenize(format!("{err:?}")))?;
        }
        if cursor < input.len() {
            tokens.push(Token::new(
                cursor,
                input.len(),
                state.scopes.as_slice().to_vec(),
            ));
        }
        Ok((tokens, state))
    }
}

pub struct SyntectTheme {
    name: Option<String>,
    rules: Vec<(ScopeSelectors, ThemeRule)>,
}

impl SyntectTheme {
    pub fn new(theme: &Theme) -> Self {
        let rules = theme
            .scopes
            .iter()
            .map(|item| {
                let rule = ThemeRule {
                    selector: format!("{:?}", item.scope),
                    foreground: item.style.foreground.map(|c| ColorRef::from(Rgb::from(c))),
                    background: item.style.background.map(|c| ColorRef::from(Rgb::from(c))),
                    font_style: item.style.font_style.map(FontStyle::from),
                };
                (item.scope.clone(), rule)
            })
            .collect();
        Self {
            name: theme.name.clone(),
            rules,
        }
    }

    /// Builds rules from `(selector, rule)` pairs, e.g. user overrides.
    pub fn from_rules<'s, I>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'s str, ThemeRule)>,
    {
        let rules = rules
            .into_iter()
            .map(|(selector, mut rule)| {
                let parsed = ScopeSelectors::from_str(selector)
                    .map_err(|err| Error::Tokenize(format!("bad selector {selector:?}: {err:?}")))?;
                rule.selector = selector.to_string();
                Ok((parsed, rule))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name: None, rules })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl ThemeRules for SyntectTheme {
    fn matching_rules(&self, scopes: &[Scope]) -> Vec<ThemeRule> {
        // Later items override earlier ones of equal specificity, so walk
        // backwards and rely on the stable sort to keep that order for ties.
        let mut matched: Vec<(f64, &ThemeRule)> = self
            .rules
            .iter()
            .rev()
            .filter_map(|(selectors, rule)| {
                selectors
                    .does_match(scopes)
                    .map(|power| (power.0, rule))
            })
            .collect();
        matched.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        matched.into_iter().map(|(_, rule)| rule.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::resolve_style;
    use crate::tokenize::testing::scope;
    use crate::tokenize::tokenize_document;

    #[test]
    fn resolves_languages_by_token_and_name() {
        let catalog = SyntaxCatalog::load_defaults();
        assert_eq!(catalog.grammar("rust").unwrap().name(), "Rust");
        assert_eq!(catalog.grammar("rs ignore").unwrap().name(), "Rust");
        assert!(catalog.grammar("").is_none());
        assert!(catalog.grammar("no-such-language").is_none());
    }

    #[test]
    fn unknown_theme_is_an_error() {
        let catalog = SyntaxCatalog::load_defaults();
        assert!(catalog.theme("base16-ocean.dark").is_ok());
        assert!(matches!(
            catalog.theme("missing"),
            Err(Error::UnknownTheme(name)) if name == "missing"
        ));
    }

    #[test]
    fn block_comment_state_spans_lines() {
        let catalog = SyntaxCatalog::load_defaults();
        let grammar = catalog.grammar("rust").unwrap();
        let in_comment = |token: &Token| {
            token
                .scopes
                .iter()
                .any(|s| s.build_string().starts_with("comment.block"))
        };

        let carried = tokenize_document("/* start\nend */", Some(&grammar));
        assert!(in_comment(&carried[1][0]));

        let reset = tokenize_document("end */", Some(&grammar));
        assert!(!in_comment(&reset[0][0]));
    }

    #[test]
    fn tokens_cover_line_without_newline() {
        let catalog = SyntaxCatalog::load_defaults();
        let grammar = catalog.grammar("rust").unwrap();
        let line = "let x = 1;";
        let tokens = &tokenize_document(line, Some(&grammar))[0];
        assert_eq!(tokens.first().map(|t| t.start), Some(0));
        assert_eq!(tokens.last().map(|t| t.end), Some(line.len()));
        for pair in tokens.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn more_specific_selectors_come_first() {
        let theme = SyntectTheme::from_rules([
            (
                "string",
                ThemeRule {
                    foreground: Some(ColorRef::new("#00ff00")),
                    font_style: Some(FontStyle::BOLD),
                    ..ThemeRule::default()
                },
            ),
            (
                "string.quoted.double",
                ThemeRule {
                    foreground: Some(ColorRef::new("#ff0000")),
                    font_style: Some(FontStyle::ITALIC),
                    ..ThemeRule::default()
                },
            ),
            (
                "comment",
                ThemeRule {
                    foreground: Some(ColorRef::new("#0000ff")),
                    ..ThemeRule::default()
                },
            ),
        ])
        .unwrap();

        let stack = vec![scope("source.rust"), scope("string.quoted.double.rust")];
        let rules = theme.matching_rules(&stack);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selector, "string.quoted.double");

        let style = resolve_style(&stack, &theme);
        assert_eq!(style.foreground, Some(ColorRef::new("#ff0000")));
        assert_eq!(style.font_style, FontStyle::BOLD | FontStyle::ITALIC);
    }

    #[test]
    fn bundled_theme_colors_strings() {
        let catalog = SyntaxCatalog::load_defaults();
        let grammar = catalog.grammar("rust").unwrap();
        let theme = catalog.theme("base16-ocean.dark").unwrap();
        let line = "let s = \"hi\";";
        let tokens = &tokenize_document(line, Some(&grammar))[0];
        let string_token = tokens
            .iter()
            .find(|t| t.text(line).contains("hi"))
            .unwrap();
        assert!(resolve_style(&string_token.scopes, &theme).foreground.is_some());
    }
}
