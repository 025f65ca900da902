use std::borrow::Cow;
use std::path::PathBuf;

use async_trait::async_trait;
use parkalot_core::Detection;

use crate::error::InferenceError;

/// Image handed to an [`InferenceAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Path(PathBuf),
    Bytes { name: String, data: Vec<u8> },
}

impl ImageRef {
    /// Display name for logs.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            ImageRef::Path(path) => path.display().to_string(),
            ImageRef::Bytes { name, .. } => name.clone(),
        }
    }

    /// Load the image contents.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ReadImage`] if the file cannot be read.
    pub async fn read(&self) -> Result<Cow<'_, [u8]>, InferenceError> {
        match self {
            ImageRef::Path(path) => tokio::fs::read(path)
                .await
                .map(Cow::Owned)
                .map_err(|source| InferenceError::ReadImage {
                    path: path.clone(),
                    source,
                }),
            ImageRef::Bytes { data, .. } => Ok(Cow::Borrowed(data.as_slice())),
        }
    }
}

/// Turns an image into object detections.
///
/// Implementations must not write to the store; persisting results is the
/// refresh task's job.
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// Detections in the order the backend reported them.
    async fn infer(&self, image: &ImageRef) -> Result<Vec<Detection>, InferenceError>;
}
