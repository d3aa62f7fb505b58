use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("failed to parse config {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Validation(String),

    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("ocr failed: {0}")]
    Ocr(String),

    #[error("pdf operation failed: {0}")]
    Pdf(String),

    #[error("image operation failed: {0}")]
    Image(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnnotateError {
    /// Collapses an `anyhow` chain from a shell-out into a single message.
    pub(crate) fn ocr(err: anyhow::Error) -> Self {
        AnnotateError::Ocr(format!("{:#}", err))
    }

    pub(crate) fn pdf(err: impl std::fmt::Display) -> Self {
        AnnotateError::Pdf(err.to_string())
    }

    pub(crate) fn image(err: impl std::fmt::Display) -> Self {
        AnnotateError::Image(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnnotateError>;
