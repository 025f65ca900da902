//! Image lookup, object detection and free-space counting.

pub mod adapter;
pub mod availability;
pub mod error;
pub mod http;
pub mod locator;
pub mod stub;

use std::sync::Arc;

use parkalot_core::{AppConfig, InferenceBackend};

pub use adapter::{ImageRef, InferenceAdapter};
pub use availability::{
    count_available, AvailabilityCounter, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FREE_CLASSES,
};
pub use error::{InferenceError, LocateError};
pub use http::HttpAdapter;
pub use locator::{ImageLocator, ImageMode};
pub use stub::StubAdapter;

/// Build the adapter selected by `config.inference_backend`.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidUrl`] when the HTTP backend is selected
/// without a usable URL, or [`InferenceError::Http`] if the client cannot be
/// built.
pub fn adapter_from_config(config: &AppConfig) -> Result<Arc<dyn InferenceAdapter>, InferenceError> {
    match config.inference_backend {
        InferenceBackend::Stub => Ok(Arc::new(StubAdapter::default())),
        InferenceBackend::Http => {
            let url = config
                .inference_url
                .as_deref()
                .ok_or_else(|| InferenceError::InvalidUrl(String::new()))?;
            let adapter = HttpAdapter::new(
                url,
                config.inference_api_key.as_deref(),
                config.inference_timeout_secs,
            )?;
            Ok(Arc::new(adapter))
        }
    }
}
