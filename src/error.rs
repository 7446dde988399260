use thiserror::Error;

/// Why a notification body could not be turned into a `TransactionInfo`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("error while decoding base64 html: {0}")]
    Decode(String),

    #[error("error while parsing html: {0}")]
    Parse(String),

    #[error("could not find the quote image surrounding the note")]
    NoAnchor,

    #[error("no span text found next to the quote image")]
    NoText,

    #[error("no text in html matched the name/amount pattern")]
    NoMatch,

    #[error(transparent)]
    Amount(#[from] AmountError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("could not find locale information for currency '{0}'")]
    LocaleUnknown(String),

    #[error("could not parse amount '{text}': {reason}")]
    NumericParse { text: String, reason: String },
}

impl AmountError {
    pub(crate) fn numeric(text: &str, reason: impl Into<String>) -> Self {
        AmountError::NumericParse {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

/// Outcome of matching a note against the known pools when it is not exactly one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no money pool matches note '{note}'")]
    NoPoolFound { note: String },

    #[error("ambiguous note '{note}', found multiple money pools: {}", candidates.join(", "))]
    AmbiguousPool {
        note: String,
        candidates: Vec<String>,
    },
}

/// Raised once, while loading configuration, for an unusable name/amount regex.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid name/amount regex: {0}")]
    Syntax(#[from] regex::Error),

    #[error("name/amount regex is missing the named group '{0}'")]
    MissingGroup(&'static str),

    #[error("name/amount regex declares unexpected named group '{0}'")]
    UnexpectedGroup(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no name/amount regex configured")]
    MissingRegex,

    #[error(transparent)]
    Pattern(#[from] PatternError),
}
