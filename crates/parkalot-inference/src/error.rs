use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure. The request URL is stripped; it carries the API key.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid inference URL '{0}'")]
    InvalidUrl(String),

    #[error("inference timed out after {0}s")]
    Timeout(u64),
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        InferenceError::Http(e.without_url())
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no image found for lot {lot_id} (tried {})", .tried.len())]
    NotFound { lot_id: String, tried: Vec<PathBuf> },

    #[error("lot id {lot_id:?} cannot name an image file")]
    InvalidId { lot_id: String },
}
