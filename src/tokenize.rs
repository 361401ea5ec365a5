use syntect::parsing::Scope;
use tracing::{trace, warn};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    /// Outermost scope first. Empty for unstyled passthrough text.
    pub scopes: Vec<Scope>,
}

impl Token {
    pub fn new(start: usize, end: usize, scopes: Vec<Scope>) -> Self {
        Self { start, end, scopes }
    }

    pub fn passthrough(len: usize) -> Self {
        Self::new(0, len, Vec::new())
    }

    pub fn text<'l>(&self, line: &'l str) -> &'l str {
        line.get(self.start..self.end).unwrap_or_default()
    }
}

/// A scope grammar that tokenizes one line at a time.
pub trait Grammar {
    /// Carried from one line to the next; never inspected by the session.
    type State: Clone;

    /// Tokenizes `line` (without its terminator). `state` is `None` for the
    /// first line of a session.
    fn tokenize_line(
        &self,
        line: &str,
        state: Option<&Self::State>,
    ) -> Result<(Vec<Token>, Self::State)>;
}

pub struct TokenizerSession<'g, G: Grammar> {
    grammar: Option<&'g G>,
    state: Option<G::State>,
    line: usize,
}

impl<'g, G: Grammar> TokenizerSession<'g, G> {
    /// With `grammar` absent every line is passed through unstyled.
    pub fn new(grammar: Option<&'g G>) -> Self {
        Self {
            grammar,
            state: None,
            line: 0,
        }
    }

    pub fn state(&self) -> Option<&G::State> {
        self.state.as_ref()
    }

    pub fn tokenize_line(&mut self, line: &str) -> Vec<Token> {
        let index = self.line;
        self.line += 1;

        let Some(grammar) = self.grammar else {
            return passthrough(line);
        };

        match grammar.tokenize_line(line, self.state.as_ref()) {
            Ok((tokens, state)) => {
                self.state = Some(state);
                let tokens = clip(tokens, line.len());
                trace!(line = index, tokens = tokens.len(), "tokenized line");
                tokens
            }
            Err(err) => {
                warn!(line = index, error = %err, "tokenizer failed, line left unstyled");
                passthrough(line)
            }
        }
    }
}

fn passthrough(line: &str) -> Vec<Token> {
    if line.is_empty() {
        Vec::new()
    } else {
        vec![Token::passthrough(line.len())]
    }
}

fn clip(tokens: Vec<Token>, len: usize) -> Vec<Token> {
    tokens
        .into_iter()
        .filter_map(|mut token| {
            token.start = token.start.min(len);
            token.end = token.end.min(len);
            (token.end > token.start).then_some(token)
        })
        .collect()
}

pub fn tokenize_document<G: Grammar>(text: &str, grammar: Option<&G>) -> Vec<Vec<Token>> {
    let mut session = TokenizerSession::new(grammar);
    text.split('\n')
        .map(|line| session.tokenize_line(line))
        .collect()
}
