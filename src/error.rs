use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid color {input:?}: {reason}")]
    InvalidColor { input: String, reason: &'static str },

    #[error("tokenizer failed: {0}")]
    Tokenize(String),

    #[error("unknown theme {0:?}")]
    UnknownTheme(String),

    /// A prepared update was committed after a newer one had been prepared.
    #[error("update {pending} was superseded by update {current}")]
    Superseded { pending: u64, current: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
