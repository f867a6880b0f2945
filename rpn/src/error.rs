use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("shape mismatch: {what}, expect {expect}, but get {actual}")]
    ShapeMismatch {
        what: &'static str,
        expect: usize,
        actual: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid score {score} at index {index}")]
    InvalidScore { index: usize, score: String },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    pub(crate) fn geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry(reason.into())
    }
}
