use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output file {0} already exists - use --force to overwrite")]
    ExistingOutput(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("Metadata lookup failed: {0}")]
    MetadataLookup(String),

    #[error("Chapter parsing failed: {0}")]
    ChapterParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;
