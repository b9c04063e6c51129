use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The classifier could not produce a label (missing or malformed artifact).
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),
    #[error("invalid lexicon: {0}")]
    Lexicon(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn classifier(message: impl Into<String>) -> Self {
        Error::ClassifierUnavailable(message.into())
    }

    pub fn lexicon(message: impl Into<String>) -> Self {
        Error::Lexicon(message.into())
    }

    pub fn is_classifier_unavailable(&self) -> bool {
        matches!(self, Error::ClassifierUnavailable(_))
    }
}
