//! Adapter for Roboflow-style hosted detection endpoints.
//!
//! The image is POSTed as raw bytes; the API key travels as the `api_key`
//! query parameter. Responses carry a `predictions` array whose entries map
//! directly onto [`Detection`].

use std::time::Duration;

use async_trait::async_trait;
use parkalot_core::Detection;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::adapter::{ImageRef, InferenceAdapter};
use crate::error::InferenceError;

#[derive(Debug, Deserialize)]
struct PredictionEnvelope {
    #[serde(default)]
    predictions: Vec<Detection>,
}

pub struct HttpAdapter {
    client: Client,
    url: Url,
    api_key: Option<String>,
}

impl HttpAdapter {
    /// # Errors
    ///
    /// Returns [`InferenceError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`InferenceError::InvalidUrl`] if `url` does not parse.
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("parkalot/0.1 (occupancy)")
            .build()?;

        let url = Url::parse(url).map_err(|_| InferenceError::InvalidUrl(url.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key: api_key.map(str::to_owned),
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("api_key", key);
        }
        url
    }
}

#[async_trait]
impl InferenceAdapter for HttpAdapter {
    async fn infer(&self, image: &ImageRef) -> Result<Vec<Detection>, InferenceError> {
        let bytes = image.read().await?.into_owned();

        let response = self
            .client
            .post(self.request_url())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.url.to_string(),
            });
        }

        let body = response.text().await?;
        let envelope: PredictionEnvelope =
            serde_json::from_str(&body).map_err(|source| InferenceError::Deserialize {
                context: format!("predictions for {}", image.name()),
                source,
            })?;

        tracing::debug!(
            image = %image.name(),
            predictions = envelope.predictions.len(),
            "inference: received predictions"
        );
        Ok(envelope.predictions)
    }
}
