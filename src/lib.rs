//! Incremental Markdown presentation with syntax-highlighted code blocks.

pub mod color;
pub mod config;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod live;
pub mod reconcile;
pub mod registry;
pub mod render;
pub mod style;
pub mod syntax;
pub mod tokenize;

pub use color::{Appearance, Rgb};
pub use config::Config;
pub use document::{Block, Document, Inline, Node, NodeId};
pub use error::{Error, Result};
pub use fingerprint::{fingerprint, Fingerprint};
pub use live::{Applied, LiveDocument, PendingUpdate};
pub use reconcile::{reconcile, safe_boundary, Decision, Materializer, Reconciliation, Strategy};
pub use registry::Registry;
pub use render::{BlockRenderer, LinkTarget, RenderedBlock, RenderedLine};
pub use style::{highlight_code, resolve_style, ResolvedStyle, StyledRun, ThemeRule, ThemeRules};
pub use syntax::{SyntaxCatalog, SyntectGrammar, SyntectTheme};
pub use tokenize::{tokenize_document, Grammar, Token, TokenizerSession};
